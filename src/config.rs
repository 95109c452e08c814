use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use uuid::Uuid;

use crate::allocation::{AllocationKind, AllocationStrategy};
use crate::client::ClientOptions;
use crate::error::{HarnessError, Result};
use crate::identity::JwtMinter;
use crate::load_test::EngineOptions;
use crate::models::RunParameters;
use crate::ramp::{parse_duration, RampProfile};
use crate::scenario::{ScenarioKind, ScenarioPlan, ThinkTime};

#[derive(Debug, Parser)]
#[command(name = "seat-contention", version, about = "Seat contention load harness for ticketing backends")]
pub struct Cli {
    /// Verbose per-request logging
    #[arg(long, env = "DEBUG", global = true)]
    pub debug: bool,

    /// SQLite file for run history; runs are not persisted without it
    #[arg(long, env = "HARNESS_DB", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a load scenario against the ticketing API
    Run(RunArgs),
    /// List persisted runs
    Runs {
        #[arg(long, value_enum)]
        scenario: Option<ScenarioKind>,
    },
    /// Export a persisted run
    Report {
        run_id: String,
        #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
        format: ReportFormat,
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Delete a persisted run and its outcomes
    DeleteRun { run_id: String },
    /// List built-in scenarios
    Scenarios,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Json,
    Csv,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[arg(value_enum)]
    pub scenario: ScenarioKind,

    /// Base64 signing secret shared with the backend
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    #[arg(long, env = "BASE_URL", default_value = "http://host.docker.internal:8080")]
    pub base_url: String,

    #[arg(long, env = "API_PREFIX", default_value = "/api/v1")]
    pub api_prefix: String,

    #[arg(long, env = "RAMP_UP_VUS", default_value_t = 50)]
    pub ramp_up_vus: usize,

    #[arg(long, env = "PEAK_VUS", default_value_t = 100)]
    pub peak_vus: usize,

    /// VU count for fixed-iteration scenarios
    #[arg(long, env = "VUS", default_value_t = 100)]
    pub vus: usize,

    #[arg(long, env = "ITERATIONS", default_value_t = 1)]
    pub iterations: u64,

    /// Custom stages, e.g. `10s:50,1m:50,10s:0`
    #[arg(long, env = "STAGES")]
    pub stages: Option<String>,

    #[arg(long, env = "EVENT_ID")]
    pub event_id: Option<u64>,

    #[arg(long, env = "EVENT_ID_RANGE", default_value_t = 10)]
    pub event_id_range: u64,

    #[arg(long, env = "TOTAL_SEATS")]
    pub total_seats: Option<u64>,

    #[arg(long, env = "HOT_SEATS", default_value_t = 50)]
    pub hot_seats: u64,

    #[arg(long, env = "USER_COUNT", default_value_t = 500)]
    pub user_count: usize,

    #[arg(long, env = "ALLOCATION", value_enum)]
    pub allocation: Option<AllocationKind>,

    #[arg(long)]
    pub think_min: Option<String>,

    #[arg(long)]
    pub think_max: Option<String>,

    #[arg(long, env = "SEED")]
    pub seed: Option<u64>,

    #[arg(long, default_value = "30s")]
    pub graceful_stop: String,

    /// Upper bound for fixed-iteration runs
    #[arg(long, default_value = "5m")]
    pub max_duration: String,

    /// Per-request timeout
    #[arg(long, default_value = "30s")]
    pub timeout: String,

    #[arg(long)]
    pub insecure: bool,
}

/// Everything a run needs, checked before any VU starts.
pub struct RunConfig {
    pub params: RunParameters,
    pub profile: RampProfile,
    pub plan: ScenarioPlan,
    pub client: ClientOptions,
    pub engine: EngineOptions,
    pub minter: JwtMinter,
    pub seed: Option<u64>,
    /// Requested VU count exceeds the user count, so identities are shared.
    pub cycles_identities: bool,
}

impl RunConfig {
    pub fn validate(args: &RunArgs) -> Result<Self> {
        let secret = args
            .jwt_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| HarnessError::config("JWT_SECRET is required"))?;
        let minter = JwtMinter::new(secret, JwtMinter::DEFAULT_TTL_SECS)?;

        let kind = args.scenario;
        let profile = Self::profile(args)?;
        profile.validate()?;

        if args.user_count == 0 {
            return Err(HarnessError::config("user count must be at least 1"));
        }
        let max_vus = profile.max_vus();
        let pool_size = max_vus.min(args.user_count);

        let resource_range = if kind.targets_seats() {
            args.total_seats.unwrap_or_else(|| kind.default_total_seats())
        } else {
            args.event_id_range
        };
        if resource_range == 0 {
            return Err(HarnessError::config("resource range must be at least 1"));
        }

        let allocation_kind = args.allocation.unwrap_or_else(|| kind.default_allocation());
        if matches!(allocation_kind, AllocationKind::HotSetRandom | AllocationKind::RotatingHotSet)
            && args.hot_seats > resource_range
        {
            return Err(HarnessError::config(format!(
                "hot set of {} exceeds the {} available resources",
                args.hot_seats, resource_range
            )));
        }

        let event_id = args.event_id.unwrap_or_else(|| kind.default_event_id());
        let params = RunParameters {
            run_id: Self::new_run_id(kind),
            scenario: kind.name().to_string(),
            pool_size,
            event_id,
            resource_range,
            hot_set_size: Some(args.hot_seats),
        };

        let plan = ScenarioPlan {
            kind,
            flow: kind.flow(),
            allocation: AllocationStrategy::from_kind(allocation_kind, &params)?,
            think: Self::think(args)?.unwrap_or_else(|| kind.default_think()),
            event_id,
        };

        let client = ClientOptions {
            base_url: args.base_url.clone(),
            api_prefix: args.api_prefix.clone(),
            timeout: parse_duration(&args.timeout)?,
            max_connections: max_vus.max(1),
            accept_invalid_certs: args.insecure,
        };

        let engine = EngineOptions {
            graceful_stop: parse_duration(&args.graceful_stop)?,
            ..EngineOptions::default()
        };

        Ok(RunConfig {
            params,
            profile,
            plan,
            client,
            engine,
            minter,
            seed: args.seed,
            cycles_identities: max_vus > args.user_count,
        })
    }

    fn profile(args: &RunArgs) -> Result<RampProfile> {
        if args.scenario.is_fixed_iteration() {
            return Ok(RampProfile::FixedIterations {
                vus: args.vus,
                iterations: args.iterations,
                max_duration: parse_duration(&args.max_duration)?,
            });
        }
        match args.stages.as_deref() {
            Some(stages) => Ok(RampProfile::Staged {
                stages: RampProfile::parse_stages(stages)?,
            }),
            None => Ok(RampProfile::default_staged(args.ramp_up_vus, args.peak_vus)),
        }
    }

    fn think(args: &RunArgs) -> Result<Option<ThinkTime>> {
        let (min, max) = match (&args.think_min, &args.think_max) {
            (None, None) => return Ok(None),
            (Some(min), Some(max)) => (parse_duration(min)?, parse_duration(max)?),
            (Some(one), None) | (None, Some(one)) => {
                let d = parse_duration(one)?;
                (d, d)
            }
        };
        if min > max {
            return Err(HarnessError::config("think-min must not exceed think-max"));
        }
        if min == max {
            return Ok(Some(if min.is_zero() { ThinkTime::None } else { ThinkTime::Fixed(min) }));
        }
        Ok(Some(ThinkTime::Uniform { min, max }))
    }

    fn new_run_id(kind: ScenarioKind) -> String {
        let short = Uuid::new_v4().simple().to_string();
        format!("{}-{}-{}", kind.name(), Utc::now().format("%Y%m%d%H%M%S"), &short[..8])
    }
}
