use serde::{Deserialize, Serialize};
use std::fmt;

// ── Identity ──

/// A synthetic end-user. `credential` is the bearer token minted at setup.
#[derive(Clone)]
pub struct Identity {
    pub id: u64,
    pub email: String,
    pub display_name: String,
    pub credential: String,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

// ── Run Parameters ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunParameters {
    pub run_id: String,
    pub scenario: String,
    pub pool_size: usize,
    pub event_id: u64,
    /// Size of the full resource id range (seat count or event id range).
    pub resource_range: u64,
    pub hot_set_size: Option<u64>,
}

// ── VU Context ──

#[derive(Debug, Clone, Copy)]
pub struct VuContext<'a> {
    pub vu_index: u64,  // 1-based
    pub iteration: u64, // 0-based
    pub identity: &'a Identity,
}

// ── Operations ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeatGrade {
    #[serde(rename = "VIP")]
    Vip,
    R,
    S,
    A,
}

impl SeatGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatGrade::Vip => "VIP",
            SeatGrade::R => "R",
            SeatGrade::S => "S",
            SeatGrade::A => "A",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateRegistration { event_id: u64 },
    SelectSeat { event_id: u64, seat_id: u64 },
    DeselectSeat { event_id: u64, seat_id: u64 },
    GetEvent { event_id: u64 },
    ListSeats { event_id: u64, grade: Option<SeatGrade> },
}

impl Operation {
    /// Name used for the `api` tag and in persisted outcomes.
    pub fn api_name(&self) -> &'static str {
        match self {
            Operation::CreateRegistration { .. } => "createPreRegister",
            Operation::SelectSeat { .. } => "selectSeat",
            Operation::DeselectSeat { .. } => "deselectSeat",
            Operation::GetEvent { .. } => "getEvent",
            Operation::ListSeats { .. } => "getSeats",
        }
    }

    pub fn event_id(&self) -> u64 {
        match *self {
            Operation::CreateRegistration { event_id }
            | Operation::SelectSeat { event_id, .. }
            | Operation::DeselectSeat { event_id, .. }
            | Operation::GetEvent { event_id }
            | Operation::ListSeats { event_id, .. } => event_id,
        }
    }

    /// The contended resource: the seat for seat operations, the event otherwise.
    pub fn resource_id(&self) -> u64 {
        match *self {
            Operation::SelectSeat { seat_id, .. } | Operation::DeselectSeat { seat_id, .. } => seat_id,
            other => other.event_id(),
        }
    }
}

// ── Outcomes ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeCategory {
    Created,
    DuplicateIgnored,
    Selected,
    Deselected,
    Fetched,
    Failed,
    ParseError,
}

impl OutcomeCategory {
    pub const ALL: [OutcomeCategory; 7] = [
        OutcomeCategory::Created,
        OutcomeCategory::DuplicateIgnored,
        OutcomeCategory::Selected,
        OutcomeCategory::Deselected,
        OutcomeCategory::Fetched,
        OutcomeCategory::Failed,
        OutcomeCategory::ParseError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeCategory::Created => "created",
            OutcomeCategory::DuplicateIgnored => "duplicate_ignored",
            OutcomeCategory::Selected => "selected",
            OutcomeCategory::Deselected => "deselected",
            OutcomeCategory::Fetched => "fetched",
            OutcomeCategory::Failed => "failed",
            OutcomeCategory::ParseError => "parse_error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            OutcomeCategory::Created
                | OutcomeCategory::Selected
                | OutcomeCategory::Deselected
                | OutcomeCategory::Fetched
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, OutcomeCategory::Failed | OutcomeCategory::ParseError)
    }
}

impl fmt::Display for OutcomeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record per HTTP call. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub id: String,
    pub run_id: String,
    pub scenario: String,
    pub operation: String,
    pub vu_index: u64,
    pub iteration: u64,
    pub resource_id: u64,
    pub identity_id: u64,
    /// `0` when the request never produced a response.
    pub http_status: u16,
    pub category: OutcomeCategory,
    pub duration_ms: i64,
    pub message: Option<String>,
    pub timestamp: String,
}

// ── Test Run ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRun {
    pub id: String,
    pub scenario: String,
    pub status: String, // "running", "completed", "cancelled"
    pub started_at: String,
    pub completed_at: Option<String>,
    pub params_json: Option<String>,
    pub summary_json: Option<String>,
}

// ── Progress ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTestProgress {
    pub run_id: String,
    pub completed: usize,
    pub active_vus: usize,
    pub current_rps: f64,
    pub failure_count: usize,
}
