use reqwest::{header, Client, Method};
use std::time::{Duration, Instant};
use tracing::Instrument;

use crate::error::{HarnessError, Result};
use crate::models::{Identity, Operation};

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub api_prefix: String,
    pub timeout: Duration,
    pub max_connections: usize,
    pub accept_invalid_certs: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            base_url: "http://host.docker.internal:8080".to_string(),
            api_prefix: "/api/v1".to_string(),
            timeout: Duration::from_secs(30),
            max_connections: 100,
            accept_invalid_certs: false,
        }
    }
}

/// Correlation metadata attached to every call. Never affects control flow.
#[derive(Debug, Clone, Copy)]
pub struct RequestTags<'a> {
    pub scenario: &'a str,
    pub run_id: &'a str,
}

pub struct RawResponse {
    pub status: u16,
    pub body: String,
    pub duration_ms: i64,
}

/// Thin HTTP executor for the ticketing API. One call per `execute`, no retries.
pub struct TicketingClient {
    client: Client,
    base_url: String,
}

impl TicketingClient {
    pub fn new(options: &ClientOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .pool_max_idle_per_host(options.max_connections)
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()
            .map_err(|e| HarnessError::config(format!("Failed to create HTTP client: {}", e)))?;

        let prefix = options.api_prefix.trim_matches('/');
        let base = options.base_url.trim_end_matches('/');
        let base_url = if prefix.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, prefix)
        };

        Ok(TicketingClient { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.base_url, path)
    }

    fn route(operation: &Operation) -> (Method, String) {
        match *operation {
            Operation::CreateRegistration { event_id } => {
                (Method::POST, format!("/events/{}/pre-registers", event_id))
            }
            Operation::SelectSeat { event_id, seat_id } => {
                (Method::POST, format!("/events/{}/seats/{}/select", event_id, seat_id))
            }
            Operation::DeselectSeat { event_id, seat_id } => {
                (Method::DELETE, format!("/events/{}/seats/{}/deselect", event_id, seat_id))
            }
            Operation::GetEvent { event_id } => (Method::GET, format!("/events/{}", event_id)),
            Operation::ListSeats { event_id, grade } => match grade {
                Some(g) => (Method::GET, format!("/events/{}/seats?grade={}", event_id, g.as_str())),
                None => (Method::GET, format!("/events/{}/seats", event_id)),
            },
        }
    }

    pub async fn execute(
        &self,
        operation: &Operation,
        identity: &Identity,
        tags: RequestTags<'_>,
    ) -> Result<RawResponse> {
        let span = tracing::debug_span!(
            "request",
            api = operation.api_name(),
            run_id = tags.run_id,
            scenario = tags.scenario,
            event_id = operation.event_id(),
            resource_id = operation.resource_id(),
            identity_id = identity.id,
        );
        let (method, path) = Self::route(operation);
        self.request(method, &path, &identity.credential).instrument(span).await
    }

    async fn request(&self, method: Method, path: &str, token: &str) -> Result<RawResponse> {
        let url = self.build_url(path);
        let start = Instant::now();

        let mut builder = self
            .client
            .request(method.clone(), &url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::ACCEPT, "application/json");

        if method == Method::POST {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }

        let response = builder
            .send()
            .await
            .map_err(|e| HarnessError::Transport(format!("{} {}: {}", method, url, e)))?;
        let status = response.status().as_u16();
        // the status already arrived; a truncated body is left for the classifier
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(status, error = %e, "failed to read response body");
                String::new()
            }
        };
        let duration_ms = start.elapsed().as_millis() as i64;

        tracing::trace!(status, duration_ms, "response received");

        Ok(RawResponse { status, body, duration_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ResponseClassifier;
    use crate::models::{OutcomeCategory, SeatGrade};

    fn client(base: &str, prefix: &str) -> TicketingClient {
        TicketingClient::new(&ClientOptions {
            base_url: base.to_string(),
            api_prefix: prefix.to_string(),
            ..ClientOptions::default()
        })
        .unwrap()
    }

    #[test]
    fn joins_base_and_prefix() {
        assert_eq!(client("http://localhost:8080/", "/api/v1").base_url(), "http://localhost:8080/api/v1");
        assert_eq!(client("http://localhost:8080", "").base_url(), "http://localhost:8080");
        assert_eq!(
            client("http://localhost:8080", "api/v1").build_url("/events/3"),
            "http://localhost:8080/api/v1/events/3"
        );
    }

    #[test]
    fn routes_match_ticketing_api() {
        let (m, p) = TicketingClient::route(&Operation::CreateRegistration { event_id: 5 });
        assert_eq!((m, p.as_str()), (Method::POST, "/events/5/pre-registers"));
        let (m, p) = TicketingClient::route(&Operation::DeselectSeat { event_id: 3, seat_id: 9 });
        assert_eq!((m, p.as_str()), (Method::DELETE, "/events/3/seats/9/deselect"));
        let (_, p) = TicketingClient::route(&Operation::ListSeats { event_id: 3, grade: Some(SeatGrade::Vip) });
        assert_eq!(p, "/events/3/seats?grade=VIP");
    }

    #[tokio::test]
    async fn truncated_body_keeps_the_status() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 512\r\n\r\n{\"data\":")
                .await
                .unwrap();
            let _ = socket.shutdown().await;
        });

        let who = Identity {
            id: 1,
            email: "test1@test.com".to_string(),
            display_name: "PerfUser1".to_string(),
            credential: "token".to_string(),
        };
        let op = Operation::GetEvent { event_id: 1 };
        let tags = RequestTags { scenario: "get-event", run_id: "r" };
        let raw = client(&format!("http://{}", addr), "/api/v1").execute(&op, &who, tags).await.unwrap();
        assert_eq!(raw.status, 200);
        assert!(raw.body.is_empty());
        assert_eq!(ResponseClassifier::classify(&op, raw.status, &raw.body).category, OutcomeCategory::ParseError);
    }
}
