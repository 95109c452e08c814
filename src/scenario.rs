use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::allocation::{AllocationKind, AllocationStrategy, GradeSelection, FOLLOW_UP_GRADES};
use crate::classifier::{Classification, ResponseClassifier};
use crate::client::{RequestTags, TicketingClient};
use crate::identity::IdentityPool;
use crate::models::*;

// ── Catalog ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// Staged pre-registration against one event; duplicates are tolerated
    PreRegister,
    /// Every VU pre-registers exactly once
    PreRegisterOnce,
    /// Random event detail reads
    GetEvent,
    /// VIP seat list, then one random grade tab
    SeatsByGrade,
    /// Random seat over the whole event
    SelectSeat,
    /// One seat per VU, released after each select (no contention)
    SelectSeatBaseline,
    /// Random seat within the hot set
    SelectSeatHot,
    /// Hot set seat rotating with the iteration, released after each select
    SelectSeatRotating,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 8] = [
        ScenarioKind::PreRegister,
        ScenarioKind::PreRegisterOnce,
        ScenarioKind::GetEvent,
        ScenarioKind::SeatsByGrade,
        ScenarioKind::SelectSeat,
        ScenarioKind::SelectSeatBaseline,
        ScenarioKind::SelectSeatHot,
        ScenarioKind::SelectSeatRotating,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioKind::PreRegister => "pre-register",
            ScenarioKind::PreRegisterOnce => "pre-register-once",
            ScenarioKind::GetEvent => "get-event",
            ScenarioKind::SeatsByGrade => "seats-by-grade",
            ScenarioKind::SelectSeat => "select-seat",
            ScenarioKind::SelectSeatBaseline => "select-seat-baseline",
            ScenarioKind::SelectSeatHot => "select-seat-hot",
            ScenarioKind::SelectSeatRotating => "select-seat-rotating",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScenarioKind::PreRegister => "staged pre-registration on one event, duplicates tolerated",
            ScenarioKind::PreRegisterOnce => "each VU pre-registers exactly once",
            ScenarioKind::GetEvent => "random event detail reads",
            ScenarioKind::SeatsByGrade => "VIP seat list, then a random R/S/A tab",
            ScenarioKind::SelectSeat => "random seat over the whole event",
            ScenarioKind::SelectSeatBaseline => "one seat per VU, select then release",
            ScenarioKind::SelectSeatHot => "random seat within the hot set",
            ScenarioKind::SelectSeatRotating => "hot set seat rotating per iteration, select then release",
        }
    }

    pub fn default_event_id(&self) -> u64 {
        match self {
            ScenarioKind::PreRegister | ScenarioKind::PreRegisterOnce => 5,
            _ => 3,
        }
    }

    pub fn default_allocation(&self) -> AllocationKind {
        match self {
            ScenarioKind::PreRegister | ScenarioKind::PreRegisterOnce | ScenarioKind::SeatsByGrade => {
                AllocationKind::Fixed
            }
            ScenarioKind::GetEvent | ScenarioKind::SelectSeat => AllocationKind::UniformRandom,
            ScenarioKind::SelectSeatBaseline => AllocationKind::FixedPerVu,
            ScenarioKind::SelectSeatHot => AllocationKind::HotSetRandom,
            ScenarioKind::SelectSeatRotating => AllocationKind::RotatingHotSet,
        }
    }

    pub fn default_total_seats(&self) -> u64 {
        match self {
            ScenarioKind::SelectSeatBaseline => 625,
            _ => 500,
        }
    }

    pub fn default_think(&self) -> ThinkTime {
        match self {
            ScenarioKind::PreRegisterOnce => ThinkTime::None,
            ScenarioKind::GetEvent | ScenarioKind::SeatsByGrade | ScenarioKind::SelectSeat => {
                ThinkTime::Fixed(Duration::from_secs(1))
            }
            _ => ThinkTime::HUMAN,
        }
    }

    /// Whether the allocated resource is a seat (otherwise it is an event).
    pub fn targets_seats(&self) -> bool {
        matches!(self.flow(), Flow::Select | Flow::SelectThenRelease { .. })
    }

    pub fn is_fixed_iteration(&self) -> bool {
        matches!(self, ScenarioKind::PreRegisterOnce)
    }

    pub fn flow(&self) -> Flow {
        match self {
            ScenarioKind::PreRegister | ScenarioKind::PreRegisterOnce => Flow::Register,
            ScenarioKind::GetEvent => Flow::ReadEvent,
            ScenarioKind::SeatsByGrade => Flow::BrowseGrades {
                first: GradeSelection::Fixed(SeatGrade::Vip),
                then: GradeSelection::UniformOf(&FOLLOW_UP_GRADES),
                between: ThinkTime::Fixed(Duration::from_millis(500)),
            },
            ScenarioKind::SelectSeat | ScenarioKind::SelectSeatHot => Flow::Select,
            ScenarioKind::SelectSeatBaseline => Flow::SelectThenRelease {
                after_release: ThinkTime::Fixed(Duration::from_millis(500)),
            },
            ScenarioKind::SelectSeatRotating => Flow::SelectThenRelease { after_release: ThinkTime::None },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThinkTime {
    None,
    Fixed(Duration),
    Uniform { min: Duration, max: Duration },
}

impl ThinkTime {
    pub const HUMAN: ThinkTime = ThinkTime::Uniform {
        min: Duration::from_millis(500),
        max: Duration::from_millis(2000),
    };

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        match *self {
            ThinkTime::None => Duration::ZERO,
            ThinkTime::Fixed(d) => d,
            ThinkTime::Uniform { min, max } if max > min => {
                Duration::from_secs_f64(rng.gen_range(min.as_secs_f64()..max.as_secs_f64()))
            }
            ThinkTime::Uniform { min, .. } => min,
        }
    }
}

/// What one iteration does with its allocated resource.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Flow {
    Register,
    ReadEvent,
    BrowseGrades { first: GradeSelection, then: GradeSelection, between: ThinkTime },
    Select,
    /// Deselect immediately when the select succeeded.
    SelectThenRelease { after_release: ThinkTime },
}

impl Flow {
    /// API name of the call that claims the allocated resource.
    pub fn primary_api(&self) -> &'static str {
        match self {
            Flow::Register => "createPreRegister",
            Flow::ReadEvent => "getEvent",
            Flow::BrowseGrades { .. } => "getSeats",
            Flow::Select | Flow::SelectThenRelease { .. } => "selectSeat",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioPlan {
    pub kind: ScenarioKind,
    pub flow: Flow,
    pub allocation: AllocationStrategy,
    pub think: ThinkTime,
    /// Event the seat operations run against.
    pub event_id: u64,
}

// ── Runtime seam ──

/// Sleep provider for think time.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, duration: Duration);
}

pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Everything a VU reads during the run. Immutable once built.
pub struct RunContext {
    pub client: TicketingClient,
    pub pool: IdentityPool,
    pub plan: ScenarioPlan,
    pub params: RunParameters,
    pub pacer: Arc<dyn Pacer>,
    pub seed: Option<u64>,
}

// ── Virtual user ──

pub struct VirtualUser {
    vu_index: u64,
    iteration: u64,
    rng: StdRng,
}

impl VirtualUser {
    pub fn new(vu_index: u64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s ^ vu_index.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            None => StdRng::from_entropy(),
        };
        VirtualUser { vu_index, iteration: 0, rng }
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// One pass of request → classify → compensate → think.
    pub async fn run_iteration(&mut self, ctx: &RunContext, sink: &UnboundedSender<RequestOutcome>) {
        let identity = ctx.pool.for_vu(self.vu_index);
        let vu = VuContext {
            vu_index: self.vu_index,
            iteration: self.iteration,
            identity,
        };
        let resource = ctx.plan.allocation.assign(self.vu_index, self.iteration, &mut self.rng);
        let event_id = ctx.plan.event_id;

        match ctx.plan.flow {
            Flow::Register => {
                Self::perform(ctx, &vu, Operation::CreateRegistration { event_id: resource }, sink).await;
            }
            Flow::ReadEvent => {
                Self::perform(ctx, &vu, Operation::GetEvent { event_id: resource }, sink).await;
            }
            Flow::BrowseGrades { first, then, between } => {
                let grade = first.pick(&mut self.rng);
                Self::perform(ctx, &vu, Operation::ListSeats { event_id: resource, grade: Some(grade) }, sink).await;
                ctx.pacer.pause(between.sample(&mut self.rng)).await;
                let grade = then.pick(&mut self.rng);
                Self::perform(ctx, &vu, Operation::ListSeats { event_id: resource, grade: Some(grade) }, sink).await;
            }
            Flow::Select => {
                Self::perform(ctx, &vu, Operation::SelectSeat { event_id, seat_id: resource }, sink).await;
            }
            Flow::SelectThenRelease { .. } => {
                let selected =
                    Self::perform(ctx, &vu, Operation::SelectSeat { event_id, seat_id: resource }, sink).await;
                if selected == OutcomeCategory::Selected {
                    Self::perform(ctx, &vu, Operation::DeselectSeat { event_id, seat_id: resource }, sink).await;
                }
            }
        }

        ctx.pacer.pause(ctx.plan.think.sample(&mut self.rng)).await;
        if let Flow::SelectThenRelease { after_release } = ctx.plan.flow {
            ctx.pacer.pause(after_release.sample(&mut self.rng)).await;
        }

        self.iteration += 1;
    }

    async fn perform(
        ctx: &RunContext,
        vu: &VuContext<'_>,
        operation: Operation,
        sink: &UnboundedSender<RequestOutcome>,
    ) -> OutcomeCategory {
        let tags = RequestTags {
            scenario: &ctx.params.scenario,
            run_id: &ctx.params.run_id,
        };
        let start = Instant::now();

        let (status, duration_ms, classification) = match ctx.client.execute(&operation, vu.identity, tags).await {
            Ok(raw) => {
                let classification = ResponseClassifier::classify(&operation, raw.status, &raw.body);
                (raw.status, raw.duration_ms, classification)
            }
            Err(e) => (
                0,
                start.elapsed().as_millis() as i64,
                Classification {
                    category: OutcomeCategory::Failed,
                    message: Some(e.to_string()),
                },
            ),
        };

        Self::log_outcome(&operation, vu, status, &classification);

        let category = classification.category;
        let outcome = RequestOutcome {
            id: Uuid::new_v4().to_string(),
            run_id: ctx.params.run_id.clone(),
            scenario: ctx.params.scenario.clone(),
            operation: operation.api_name().to_string(),
            vu_index: vu.vu_index,
            iteration: vu.iteration,
            resource_id: operation.resource_id(),
            identity_id: vu.identity.id,
            http_status: status,
            category,
            duration_ms,
            message: classification.message,
            timestamp: Utc::now().to_rfc3339(),
        };
        // the collector only goes away once the run is being torn down
        let _ = sink.send(outcome);
        category
    }

    fn log_outcome(operation: &Operation, vu: &VuContext<'_>, status: u16, classification: &Classification) {
        let api = operation.api_name();
        let event_id = operation.event_id();
        let resource_id = operation.resource_id();
        let identity_id = vu.identity.id;
        match classification.category {
            OutcomeCategory::DuplicateIgnored => {
                debug!(api, event_id, identity_id, "already exists (duplicate ignored)")
            }
            c if c.is_success() => debug!(api, status, event_id, resource_id, identity_id, "{}", c),
            c => warn!(
                api,
                status,
                event_id,
                resource_id,
                identity_id,
                message = classification.message.as_deref().unwrap_or(""),
                "{} failed ({})",
                api,
                c
            ),
        }
    }
}
