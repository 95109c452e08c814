use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::models::*;
use crate::ramp::RampProfile;
use crate::scenario::{RunContext, VirtualUser};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Gate {
    active: usize,
    stopped: bool,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// How long VUs may finish their current iteration once the profile ends.
    pub graceful_stop: Duration,
    pub tick: Duration,
    pub progress_every: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            graceful_stop: Duration::from_secs(30),
            tick: Duration::from_millis(100),
            progress_every: 100,
        }
    }
}

#[derive(Debug)]
pub struct RunResult {
    pub outcomes: Vec<RequestOutcome>,
    pub cancelled: bool,
    pub total_duration_ms: i64,
    pub peak_active_vus: usize,
    /// VUs still busy when the graceful window closed.
    pub abandoned_vus: usize,
}

pub struct LoadTestEngine;

impl LoadTestEngine {
    /// Drives one scenario under `profile` until the profile ends, every VU
    /// is done, or `cancel_flag` is raised.
    pub async fn run_scenario(
        ctx: Arc<RunContext>,
        profile: &RampProfile,
        options: &EngineOptions,
        cancel_flag: Arc<AtomicBool>,
    ) -> RunResult {
        let max_vus = profile.max_vus();
        let iteration_cap = profile.iterations_per_vu();
        let start = Instant::now();

        let (gate_tx, gate_rx) = watch::channel(Gate { active: 0, stopped: false });
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

        let collector = tokio::spawn(Self::collect_outcomes(
            outcome_rx,
            gate_rx.clone(),
            ctx.params.run_id.clone(),
            start,
            options.progress_every,
        ));

        let mut handles: Vec<JoinHandle<u64>> = Vec::with_capacity(max_vus);
        for vu_index in 1..=max_vus as u64 {
            let ctx = ctx.clone();
            let mut gate = gate_rx.clone();
            let outcome_tx = outcome_tx.clone();
            let cancel = cancel_flag.clone();

            handles.push(tokio::spawn(async move {
                let mut vu = VirtualUser::new(vu_index, ctx.seed);
                loop {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    let (active, stopped) = {
                        let g = gate.borrow_and_update();
                        (g.active as u64 >= vu_index, g.stopped)
                    };
                    if stopped {
                        break;
                    }
                    if !active {
                        // parked by ramp-down (or not yet ramped up); the iteration counter survives
                        if gate.changed().await.is_err() {
                            break;
                        }
                        continue;
                    }

                    vu.run_iteration(&ctx, &outcome_tx).await;

                    if iteration_cap.is_some_and(|cap| vu.iteration() >= cap) {
                        break;
                    }
                }
                vu.iteration()
            }));
        }
        drop(outcome_tx);

        // ── Population control ──
        let deadline = profile.total_duration();
        let mut ticker = tokio::time::interval(options.tick);
        let mut cancelled = false;
        let mut peak_active_vus = 0usize;

        loop {
            ticker.tick().await;
            let elapsed = start.elapsed();
            if cancel_flag.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }
            if handles.iter().all(|h| h.is_finished()) {
                break;
            }
            if elapsed >= deadline {
                if iteration_cap.is_some() {
                    warn!(
                        max_duration_secs = deadline.as_secs(),
                        "fixed-iteration run hit its maximum duration"
                    );
                }
                break;
            }

            let target = profile.target_at(elapsed).min(max_vus);
            peak_active_vus = peak_active_vus.max(target);
            gate_tx.send_if_modified(|g| {
                if g.active != target {
                    debug!(active_vus = target, "VU population changed");
                    g.active = target;
                    true
                } else {
                    false
                }
            });
        }

        gate_tx.send_modify(|g| {
            g.active = 0;
            g.stopped = true;
        });

        // ── Graceful stop ──
        let grace = if cancelled { Duration::ZERO } else { options.graceful_stop };
        let mut pending = handles;
        let _ = tokio::time::timeout(grace, async {
            while let Some(handle) = pending.last_mut() {
                let _ = handle.await;
                pending.pop();
            }
        })
        .await;

        let abandoned_vus = pending.iter().filter(|h| !h.is_finished()).count();
        if abandoned_vus > 0 {
            info!(abandoned_vus, "abandoning in-flight iterations");
        }
        for handle in &pending {
            handle.abort();
        }
        for handle in pending {
            let _ = handle.await;
        }

        let outcomes = Self::collected(collector.await);
        let total_duration_ms = start.elapsed().as_millis() as i64;

        RunResult {
            outcomes,
            cancelled,
            total_duration_ms,
            peak_active_vus,
            abandoned_vus,
        }
    }

    async fn collect_outcomes(
        mut rx: mpsc::UnboundedReceiver<RequestOutcome>,
        gate: watch::Receiver<Gate>,
        run_id: String,
        start: Instant,
        progress_every: usize,
    ) -> Vec<RequestOutcome> {
        let mut outcomes = Vec::new();
        let mut failure_count = 0usize;

        while let Some(outcome) = rx.recv().await {
            if outcome.category.is_failure() {
                failure_count += 1;
            }
            outcomes.push(outcome);

            let completed = outcomes.len();
            if progress_every > 0 && completed % progress_every == 0 {
                let elapsed_secs = start.elapsed().as_secs_f64();
                Self::emit_progress(&LoadTestProgress {
                    run_id: run_id.clone(),
                    completed,
                    active_vus: gate.borrow().active,
                    current_rps: if elapsed_secs > 0.0 { completed as f64 / elapsed_secs } else { 0.0 },
                    failure_count,
                });
            }
        }

        outcomes
    }

    fn collected(joined: std::result::Result<Vec<RequestOutcome>, JoinError>) -> Vec<RequestOutcome> {
        match joined {
            Ok(outcomes) => outcomes,
            Err(e) => {
                error!(error = %e, "outcome collector failed, outcomes for this run are lost");
                Vec::new()
            }
        }
    }

    fn emit_progress(progress: &LoadTestProgress) {
        info!(
            run_id = %progress.run_id,
            completed = progress.completed,
            active_vus = progress.active_vus,
            rps = format_args!("{:.1}", progress.current_rps),
            failures = progress.failure_count,
            "progress"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_collector_yields_no_outcomes() {
        let collector = tokio::spawn(async { panic!("collector crashed") });
        let joined: std::result::Result<Vec<RequestOutcome>, JoinError> = collector.await;
        assert!(joined.is_err());
        assert!(LoadTestEngine::collected(joined).is_empty());
    }
}
