#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::{Request, Respond, ResponseTemplate};

use seat_contention_lib::allocation::AllocationStrategy;
use seat_contention_lib::client::{ClientOptions, TicketingClient};
use seat_contention_lib::error::Result;
use seat_contention_lib::identity::{IdentityClaims, IdentityPool, TokenMinter};
use seat_contention_lib::load_test::EngineOptions;
use seat_contention_lib::models::RunParameters;
use seat_contention_lib::scenario::{Pacer, RunContext, ScenarioKind, ScenarioPlan, ThinkTime};

pub const SECRET: &str = "c2VhdC1jb250ZW50aW9uLXRlc3Qtc2VjcmV0LWtleS0xMjM0NTY3ODkw";

/// Token is `user-<id>` so responders can tell identities apart.
pub struct UserTokens;

impl TokenMinter for UserTokens {
    fn mint(&self, claims: &IdentityClaims) -> Result<String> {
        Ok(format!("user-{}", claims.id))
    }
}

pub struct NoPause;

#[async_trait]
impl Pacer for NoPause {
    async fn pause(&self, _duration: Duration) {}
}

pub fn engine_options() -> EngineOptions {
    EngineOptions {
        graceful_stop: Duration::from_secs(5),
        tick: Duration::from_millis(10),
        progress_every: 0,
    }
}

pub fn context(
    base_url: &str,
    kind: ScenarioKind,
    allocation: AllocationStrategy,
    pool_size: usize,
    think: ThinkTime,
    pacer: Arc<dyn Pacer>,
) -> Arc<RunContext> {
    let client = TicketingClient::new(&ClientOptions {
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
        ..ClientOptions::default()
    })
    .unwrap();
    let params = RunParameters {
        run_id: format!("{}-test", kind.name()),
        scenario: kind.name().to_string(),
        pool_size,
        event_id: kind.default_event_id(),
        resource_range: allocation.upper_bound(),
        hot_set_size: None,
    };
    Arc::new(RunContext {
        client,
        pool: IdentityPool::build_with(pool_size, &UserTokens).unwrap(),
        plan: ScenarioPlan {
            kind,
            flow: kind.flow(),
            allocation,
            think,
            event_id: kind.default_event_id(),
        },
        params,
        pacer,
        seed: Some(7),
    })
}

pub fn bearer(request: &Request) -> String {
    request
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .trim_start_matches("Bearer ")
        .to_string()
}

/// `/api/v1/events/{event}/seats/{seat}/...` -> seat
pub fn seat_of(request: &Request) -> u64 {
    request
        .url
        .path_segments()
        .and_then(|mut s| s.nth(5))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

pub fn event_of(request: &Request) -> u64 {
    request
        .url
        .path_segments()
        .and_then(|mut s| s.nth(3))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

pub fn selection_body(event_id: u64, seat_id: u64) -> serde_json::Value {
    json!({
        "message": "좌석을 선택했습니다.",
        "data": {
            "ticketId": seat_id * 10,
            "eventId": event_id,
            "seatId": seat_id,
            "seatCode": format!("A{}", seat_id),
            "seatGrade": "VIP",
            "seatPrice": 150000,
            "seatStatus": "RESERVED",
            "ticketStatus": "DRAFT"
        }
    })
}

pub fn registration_body(event_id: u64, user_id: u64) -> serde_json::Value {
    json!({
        "message": "사전등록이 완료되었습니다.",
        "data": {
            "id": user_id,
            "eventId": event_id,
            "userId": user_id,
            "status": "REGISTERED",
            "createdAt": "2025-01-01T00:00:00"
        }
    })
}

/// Seat holders keyed by seat id, shared by the select and deselect mocks.
pub type SeatBook = Arc<Mutex<HashMap<u64, String>>>;

pub struct SelectSeat(pub SeatBook);

impl Respond for SelectSeat {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let seat = seat_of(request);
        let user = bearer(request);
        let mut book = self.0.lock().unwrap();
        match book.get(&seat) {
            Some(_) => ResponseTemplate::new(409).set_body_json(json!({"message": "이미 선택된 좌석입니다."})),
            None => {
                book.insert(seat, user);
                ResponseTemplate::new(200).set_body_json(selection_body(event_of(request), seat))
            }
        }
    }
}

pub struct DeselectSeat(pub SeatBook);

impl Respond for DeselectSeat {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let seat = seat_of(request);
        let user = bearer(request);
        let mut book = self.0.lock().unwrap();
        if book.get(&seat) == Some(&user) {
            book.remove(&seat);
            ResponseTemplate::new(204)
        } else {
            ResponseTemplate::new(403).set_body_json(json!({"message": "본인이 선택한 좌석이 아닙니다."}))
        }
    }
}
