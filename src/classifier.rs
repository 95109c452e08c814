use serde_json::Value;

use crate::models::{Operation, OutcomeCategory};

/// Substring the backend puts in its "already pre-registered" error message.
pub const DUPLICATE_MARKER: &str = "이미 사전등록";

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    Number,
    Text,
}

const REGISTRATION_FIELDS: &[(&str, FieldKind)] = &[
    ("id", FieldKind::Number),
    ("eventId", FieldKind::Number),
    ("userId", FieldKind::Number),
    ("status", FieldKind::Text),
    ("createdAt", FieldKind::Text),
];

const SELECTION_FIELDS: &[(&str, FieldKind)] = &[
    ("ticketId", FieldKind::Number),
    ("eventId", FieldKind::Number),
    ("seatId", FieldKind::Number),
    ("seatCode", FieldKind::Text),
    ("seatGrade", FieldKind::Text),
    ("seatPrice", FieldKind::Number),
    ("seatStatus", FieldKind::Text),
    ("ticketStatus", FieldKind::Text),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: OutcomeCategory,
    pub message: Option<String>,
}

impl Classification {
    fn new(category: OutcomeCategory) -> Self {
        Classification { category, message: None }
    }

    fn with_message(category: OutcomeCategory, message: impl Into<String>) -> Self {
        Classification { category, message: Some(message.into()) }
    }
}

pub struct ResponseClassifier;

impl ResponseClassifier {
    pub fn classify(operation: &Operation, status: u16, body: &str) -> Classification {
        // deselect answers 204 with no body, so its body is never decoded
        if let Operation::DeselectSeat { .. } = operation {
            return if status == 204 {
                Classification::new(OutcomeCategory::Deselected)
            } else {
                Classification::with_message(
                    OutcomeCategory::Failed,
                    Self::server_message(body).unwrap_or_else(|| format!("Status {}", status)),
                )
            };
        }

        let json: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => {
                return Classification::with_message(
                    OutcomeCategory::ParseError,
                    format!("Status {}: body is not JSON ({})", status, e),
                )
            }
        };
        let message = json.get("message").and_then(|v| v.as_str()).unwrap_or("");
        let data = json.get("data").unwrap_or(&Value::Null);

        match operation {
            Operation::CreateRegistration { .. } => match status {
                201 => Self::check_fields(data, REGISTRATION_FIELDS, OutcomeCategory::Created),
                400 | 409 if message.contains(DUPLICATE_MARKER) => {
                    Classification::with_message(OutcomeCategory::DuplicateIgnored, message)
                }
                _ => Self::failed(status, message),
            },
            Operation::SelectSeat { .. } => match status {
                200 => Self::check_fields(data, SELECTION_FIELDS, OutcomeCategory::Selected),
                _ => Self::failed(status, message),
            },
            Operation::GetEvent { .. } => match status {
                200 if data.is_object() => Classification::new(OutcomeCategory::Fetched),
                200 => Classification::with_message(OutcomeCategory::Failed, "Malformed payload: data is not an object"),
                _ => Self::failed(status, message),
            },
            Operation::ListSeats { .. } => match status {
                200 if data.is_array() => Classification::new(OutcomeCategory::Fetched),
                200 => Classification::with_message(OutcomeCategory::Failed, "Malformed payload: data is not a list"),
                _ => Self::failed(status, message),
            },
            Operation::DeselectSeat { .. } => unreachable!("handled above"),
        }
    }

    fn check_fields(data: &Value, fields: &[(&str, FieldKind)], success: OutcomeCategory) -> Classification {
        if !data.is_object() {
            return Classification::with_message(OutcomeCategory::Failed, "Malformed payload: data missing");
        }
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(name, kind)| {
                let value = data.get(*name);
                match kind {
                    FieldKind::Number => !value.is_some_and(Value::is_number),
                    FieldKind::Text => !value.is_some_and(Value::is_string),
                }
            })
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Classification::new(success)
        } else {
            Classification::with_message(
                OutcomeCategory::Failed,
                format!("Malformed payload: missing or mistyped {}", missing.join(", ")),
            )
        }
    }

    fn failed(status: u16, message: &str) -> Classification {
        if message.is_empty() {
            Classification::with_message(OutcomeCategory::Failed, format!("Status {}", status))
        } else {
            Classification::with_message(OutcomeCategory::Failed, format!("Status {}: {}", status, message))
        }
    }

    fn server_message(body: &str) -> Option<String> {
        serde_json::from_str::<Value>(body)
            .ok()?
            .get("message")?
            .as_str()
            .map(|s| s.to_string())
    }
}
