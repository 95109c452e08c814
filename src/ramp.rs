use regex_lite::Regex;
use std::sync::LazyLock;
use std::time::Duration;

use crate::error::{HarnessError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Stage { duration, target }
    }
}

/// Gates how many VUs are alive and when the run ends. The scenario loop
/// never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RampProfile {
    /// The active VU count moves linearly from the previous target (starting
    /// at 0) to each stage's target over the stage duration.
    Staged { stages: Vec<Stage> },
    /// `vus` VUs each run exactly `iterations` iterations.
    FixedIterations { vus: usize, iterations: u64, max_duration: Duration },
}

impl RampProfile {
    pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(5 * 60);

    /// ramp-up, sustain, peak, sustain, ramp-down
    pub fn default_staged(ramp_up_vus: usize, peak_vus: usize) -> Self {
        RampProfile::Staged {
            stages: vec![
                Stage::new(Duration::from_secs(10), ramp_up_vus),
                Stage::new(Duration::from_secs(60), ramp_up_vus),
                Stage::new(Duration::from_secs(10), peak_vus),
                Stage::new(Duration::from_secs(60), peak_vus),
                Stage::new(Duration::from_secs(60), 0),
            ],
        }
    }

    pub fn once(vus: usize) -> Self {
        RampProfile::FixedIterations {
            vus,
            iterations: 1,
            max_duration: Self::DEFAULT_MAX_DURATION,
        }
    }

    /// Parses `10s:50,1m:50,10s:100` into stages.
    pub fn parse_stages(list: &str) -> Result<Vec<Stage>> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|part| {
                let (duration, target) = part
                    .split_once(':')
                    .ok_or_else(|| HarnessError::config(format!("stage '{}' must be <duration>:<target>", part)))?;
                let target = target
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| HarnessError::config(format!("invalid stage target in '{}'", part)))?;
                Ok(Stage::new(parse_duration(duration)?, target))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            RampProfile::Staged { stages } => {
                if stages.is_empty() {
                    return Err(HarnessError::config("staged profile needs at least one stage"));
                }
                if self.max_vus() == 0 {
                    return Err(HarnessError::config("staged profile never activates a VU"));
                }
            }
            RampProfile::FixedIterations { vus, iterations, .. } => {
                if *vus == 0 {
                    return Err(HarnessError::config("VU count must be at least 1"));
                }
                if *iterations == 0 {
                    return Err(HarnessError::config("iterations per VU must be at least 1"));
                }
            }
        }
        Ok(())
    }

    pub fn max_vus(&self) -> usize {
        match self {
            RampProfile::Staged { stages } => stages.iter().map(|s| s.target).max().unwrap_or(0),
            RampProfile::FixedIterations { vus, .. } => *vus,
        }
    }

    /// Upper bound on the run's length, before the graceful stop window.
    pub fn total_duration(&self) -> Duration {
        match self {
            RampProfile::Staged { stages } => stages.iter().map(|s| s.duration).sum(),
            RampProfile::FixedIterations { max_duration, .. } => *max_duration,
        }
    }

    pub fn iterations_per_vu(&self) -> Option<u64> {
        match self {
            RampProfile::Staged { .. } => None,
            RampProfile::FixedIterations { iterations, .. } => Some(*iterations),
        }
    }

    /// Number of VUs that should be active `elapsed` into the run.
    pub fn target_at(&self, elapsed: Duration) -> usize {
        let stages = match self {
            RampProfile::FixedIterations { vus, .. } => return *vus,
            RampProfile::Staged { stages } => stages,
        };

        let mut from = 0usize;
        let mut stage_start = Duration::ZERO;
        for stage in stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let span = stage.target as f64 - from as f64;
                return (from as f64 + span * progress).round().max(0.0) as usize;
            }
            from = stage.target;
            stage_start = stage_end;
        }
        from
    }

    pub fn describe(&self) -> String {
        match self {
            RampProfile::Staged { stages } => stages
                .iter()
                .map(|s| format!("{}s→{}", s.duration.as_secs_f64(), s.target))
                .collect::<Vec<_>>()
                .join(", "),
            RampProfile::FixedIterations { vus, iterations, max_duration } => format!(
                "{} VUs x {} iteration(s), max {}s",
                vus,
                iterations,
                max_duration.as_secs()
            ),
        }
    }
}

static DURATION_PATTERN: LazyLock<std::result::Result<Regex, String>> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)?)(ms|s|m|h)?$").map_err(|e| e.to_string()));

/// Accepts `500ms`, `10s`, `1m`, `2h`; a bare number means seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let re = DURATION_PATTERN.as_ref().map_err(|e| HarnessError::config(e.clone()))?;
    let s = s.trim();
    let caps = re
        .captures(s)
        .ok_or_else(|| HarnessError::config(format!("invalid duration '{}'", s)))?;
    let value: f64 = caps[1]
        .parse()
        .map_err(|_| HarnessError::config(format!("invalid duration '{}'", s)))?;
    let secs = match caps.get(2).map(|m| m.as_str()) {
        Some("ms") => value / 1000.0,
        Some("m") => value * 60.0,
        Some("h") => value * 3600.0,
        _ => value,
    };
    Duration::try_from_secs_f64(secs).map_err(|e| HarnessError::config(format!("invalid duration '{}': {}", s, e)))
}
