use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::client::TicketingClient;
use crate::config::{ReportFormat, RunArgs, RunConfig};
use crate::db::Database;
use crate::error::{HarnessError, Result};
use crate::export::ExportEngine;
use crate::identity::IdentityPool;
use crate::load_test::{LoadTestEngine, RunResult};
use crate::models::*;
use crate::scenario::{RunContext, ScenarioKind, TokioPacer};
use crate::summary::{RunSummary, SummaryBuilder};

pub struct RunReport {
    pub run_id: String,
    pub result: RunResult,
    pub summary: RunSummary,
}

// ── Load Test Commands ──

/// Setup, run, summarize and (with a store) persist one scenario run.
/// Setup errors are returned before any request is sent.
pub async fn start_load_test(args: &RunArgs, db: Option<&Database>) -> Result<RunReport> {
    let config = RunConfig::validate(args)?;
    let RunConfig {
        params,
        profile,
        plan,
        client,
        engine,
        minter,
        seed,
        cycles_identities,
    } = config;

    info!(
        run_id = %params.run_id,
        scenario = %params.scenario,
        base_url = %client.base_url,
        event_id = params.event_id,
        resource_range = params.resource_range,
        highest_resource = plan.allocation.upper_bound(),
        profile = %profile.describe(),
        "starting load test"
    );
    if cycles_identities {
        warn!(
            vus = profile.max_vus(),
            identities = params.pool_size,
            "more VUs than users; identities will be shared"
        );
    }

    let pool = IdentityPool::build_with(params.pool_size, &minter)?;
    let client = TicketingClient::new(&client)?;

    let test_run = TestRun {
        id: params.run_id.clone(),
        scenario: params.scenario.clone(),
        status: "running".to_string(),
        started_at: Utc::now().to_rfc3339(),
        completed_at: None,
        params_json: Some(serde_json::to_string(&params)?),
        summary_json: None,
    };
    if let Some(db) = db {
        db.save_test_run(&test_run)?;
    }

    let primary_api = plan.flow.primary_api();
    let ctx = Arc::new(RunContext {
        client,
        pool,
        plan,
        params,
        pacer: Arc::new(TokioPacer),
        seed,
    });

    let cancel_flag = Arc::new(AtomicBool::new(false));
    let interrupt = {
        let flag = cancel_flag.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted; stopping VUs");
                flag.store(true, Ordering::Relaxed);
            }
        })
    };

    let result = LoadTestEngine::run_scenario(ctx.clone(), &profile, &engine, cancel_flag.clone()).await;
    interrupt.abort();

    let summary = SummaryBuilder::compute(&result.outcomes, result.total_duration_ms, primary_api);
    let status = if result.cancelled { "cancelled" } else { "completed" };

    if let Some(db) = db {
        db.save_outcomes(&result.outcomes)?;
        let completed_run = TestRun {
            status: status.to_string(),
            completed_at: Some(Utc::now().to_rfc3339()),
            summary_json: Some(serde_json::to_string(&summary)?),
            ..test_run
        };
        db.save_test_run(&completed_run)?;
    }

    info!(
        run_id = %ctx.params.run_id,
        status,
        requests = summary.total_requests,
        failures = summary.failed,
        peak_vus = result.peak_active_vus,
        "load test finished"
    );

    Ok(RunReport {
        run_id: ctx.params.run_id.clone(),
        result,
        summary,
    })
}

// ── Test Run Commands ──

pub fn list_runs(db: &Database, scenario: Option<ScenarioKind>) -> Result<Vec<TestRun>> {
    db.get_test_runs(scenario.map(|s| s.name()))
}

pub fn export_report(db: &Database, run_id: &str, format: ReportFormat, output_path: &Path) -> Result<()> {
    let run = db
        .get_test_run(run_id)?
        .ok_or_else(|| HarnessError::Export(format!("run '{}' not found", run_id)))?;
    let results = db.get_outcomes(run_id)?;

    match format {
        ReportFormat::Json => {
            let summary = match run.summary_json.as_deref() {
                Some(json) => serde_json::from_str(json)?,
                None => {
                    warn!(run_id, "run has no stored summary; recomputing without duration");
                    let primary_api = ScenarioKind::from_name(&run.scenario)
                        .map(|kind| kind.flow().primary_api())
                        .unwrap_or_default();
                    SummaryBuilder::compute(&results, 0, primary_api)
                }
            };
            ExportEngine::export_json(&run, &results, &summary, output_path)
        }
        ReportFormat::Csv => ExportEngine::export_csv(&results, output_path),
    }
}

pub fn delete_run(db: &Database, run_id: &str) -> Result<()> {
    if !db.delete_test_run(run_id)? {
        warn!(run_id, "no such run");
    }
    Ok(())
}

pub fn list_scenarios() -> Vec<(ScenarioKind, String)> {
    ScenarioKind::ALL
        .iter()
        .map(|kind| {
            let profile = if kind.is_fixed_iteration() { "fixed-iteration" } else { "staged" };
            (*kind, format!("{} ({})", kind.description(), profile))
        })
        .collect()
}
