use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::models::{RunParameters, SeatGrade};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AllocationKind {
    /// Always the configured event
    Fixed,
    /// Uniform random over the full resource range
    UniformRandom,
    /// Uniform random over the hot set
    HotSetRandom,
    /// One resource per VU, no contention
    FixedPerVu,
    /// Rotates through the hot set as iterations advance
    RotatingHotSet,
}

/// Maps `(vu_index, iteration)` to a resource id. Ids are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AllocationStrategy {
    Fixed { resource_id: u64 },
    UniformRandom { range: u64 },
    HotSetRandom { hot_set_size: u64 },
    FixedPerVu { total_resources: u64 },
    RotatingHotSet { hot_set_size: u64 },
}

impl AllocationStrategy {
    pub fn from_kind(kind: AllocationKind, params: &RunParameters) -> Result<Self> {
        let hot_set = || {
            params
                .hot_set_size
                .ok_or_else(|| HarnessError::config(format!("{:?} allocation needs a hot set size", kind)))
        };
        let strategy = match kind {
            AllocationKind::Fixed => AllocationStrategy::Fixed { resource_id: params.event_id },
            AllocationKind::UniformRandom => AllocationStrategy::UniformRandom { range: params.resource_range },
            AllocationKind::HotSetRandom => AllocationStrategy::HotSetRandom { hot_set_size: hot_set()? },
            AllocationKind::FixedPerVu => AllocationStrategy::FixedPerVu { total_resources: params.resource_range },
            AllocationKind::RotatingHotSet => AllocationStrategy::RotatingHotSet { hot_set_size: hot_set()? },
        };
        strategy.validate()?;
        Ok(strategy)
    }

    pub fn validate(&self) -> Result<()> {
        let (name, size) = match *self {
            AllocationStrategy::Fixed { resource_id } => ("resource id", resource_id),
            AllocationStrategy::UniformRandom { range } => ("resource range", range),
            AllocationStrategy::HotSetRandom { hot_set_size }
            | AllocationStrategy::RotatingHotSet { hot_set_size } => ("hot set size", hot_set_size),
            AllocationStrategy::FixedPerVu { total_resources } => ("total resources", total_resources),
        };
        if size == 0 {
            return Err(HarnessError::config(format!("{} must be at least 1", name)));
        }
        Ok(())
    }

    pub fn assign<R: Rng + ?Sized>(&self, vu_index: u64, iteration: u64, rng: &mut R) -> u64 {
        let vu = vu_index.saturating_sub(1);
        match *self {
            AllocationStrategy::Fixed { resource_id } => resource_id,
            AllocationStrategy::UniformRandom { range } => rng.gen_range(1..=range),
            AllocationStrategy::HotSetRandom { hot_set_size } => rng.gen_range(1..=hot_set_size),
            AllocationStrategy::FixedPerVu { total_resources } => (vu % total_resources) + 1,
            AllocationStrategy::RotatingHotSet { hot_set_size } => {
                (vu.wrapping_add(iteration) % hot_set_size) + 1
            }
        }
    }

    /// Largest id this strategy can ever return.
    pub fn upper_bound(&self) -> u64 {
        match *self {
            AllocationStrategy::Fixed { resource_id } => resource_id,
            AllocationStrategy::UniformRandom { range } => range,
            AllocationStrategy::HotSetRandom { hot_set_size }
            | AllocationStrategy::RotatingHotSet { hot_set_size } => hot_set_size,
            AllocationStrategy::FixedPerVu { total_resources } => total_resources,
        }
    }
}

// ── Grade selection ──

pub const FOLLOW_UP_GRADES: [SeatGrade; 3] = [SeatGrade::R, SeatGrade::S, SeatGrade::A];

/// How a seat-list read picks its grade tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeSelection {
    Fixed(SeatGrade),
    UniformOf(&'static [SeatGrade]),
}

impl GradeSelection {
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> SeatGrade {
        match self {
            GradeSelection::Fixed(grade) => *grade,
            GradeSelection::UniformOf(grades) => *grades.choose(rng).unwrap_or(&SeatGrade::Vip),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::{HashMap, HashSet};

    fn params(range: u64, hot: Option<u64>) -> RunParameters {
        RunParameters {
            run_id: "run".into(),
            scenario: "test".into(),
            pool_size: 10,
            event_id: 3,
            resource_range: range,
            hot_set_size: hot,
        }
    }

    #[test]
    fn baseline_assigns_one_seat_per_vu() {
        let strategy = AllocationStrategy::FixedPerVu { total_resources: 500 };
        let mut rng = StdRng::seed_from_u64(7);
        let seats: HashSet<u64> = (1..=500).map(|vu| strategy.assign(vu, 0, &mut rng)).collect();
        assert_eq!(seats.len(), 500);
        assert_eq!(strategy.assign(501, 0, &mut rng), 1);
        assert_eq!(strategy.assign(17, 0, &mut rng), strategy.assign(17, 99, &mut rng));
    }

    #[test]
    fn rotating_hot_set_contends_at_iteration_zero() {
        let strategy = AllocationStrategy::RotatingHotSet { hot_set_size: 50 };
        let mut rng = StdRng::seed_from_u64(7);
        let mut claimants: HashMap<u64, usize> = HashMap::new();
        for vu in 1..=100 {
            let seat = strategy.assign(vu, 0, &mut rng);
            assert_eq!(seat, (vu - 1) % 50 + 1);
            *claimants.entry(seat).or_default() += 1;
        }
        assert!(claimants.values().any(|&n| n >= 2));
        // iteration 1 shifts every VU by one seat
        assert_eq!(strategy.assign(1, 1, &mut rng), 2);
        assert_eq!(strategy.assign(50, 1, &mut rng), 1);
    }

    #[test]
    fn hot_set_strategies_need_a_size() {
        let err = AllocationStrategy::from_kind(AllocationKind::RotatingHotSet, &params(500, None));
        assert!(err.is_err());
        let ok = AllocationStrategy::from_kind(AllocationKind::HotSetRandom, &params(500, Some(50))).unwrap();
        assert_eq!(ok, AllocationStrategy::HotSetRandom { hot_set_size: 50 });
    }

    #[test]
    fn zero_range_is_rejected() {
        assert!(AllocationStrategy::from_kind(AllocationKind::UniformRandom, &params(0, None)).is_err());
        assert!(AllocationStrategy::from_kind(AllocationKind::HotSetRandom, &params(500, Some(0))).is_err());
    }

    #[test]
    fn fixed_returns_event() {
        let strategy = AllocationStrategy::from_kind(AllocationKind::Fixed, &params(500, None)).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(strategy.assign(42, 9, &mut rng), 3);
    }

    #[test]
    fn grade_selection_stays_within_choices() {
        let mut rng = StdRng::seed_from_u64(11);
        let follow_up = GradeSelection::UniformOf(&FOLLOW_UP_GRADES);
        for _ in 0..100 {
            assert!(FOLLOW_UP_GRADES.contains(&follow_up.pick(&mut rng)));
        }
        assert_eq!(GradeSelection::Fixed(SeatGrade::Vip).pick(&mut rng), SeatGrade::Vip);
    }

    proptest! {
        #[test]
        fn baseline_is_injective_within_range(
            (total, a, b) in (2u64..2000).prop_flat_map(|t| (Just(t), 1..=t, 1..=t))
        ) {
            prop_assume!(a != b);
            let strategy = AllocationStrategy::FixedPerVu { total_resources: total };
            let mut rng = StdRng::seed_from_u64(0);
            prop_assert_ne!(strategy.assign(a, 0, &mut rng), strategy.assign(b, 0, &mut rng));
        }

        #[test]
        fn rotating_stays_in_hot_set(hot in 1u64..500, vu in 1u64..100_000, iteration in 0u64..1_000_000) {
            let strategy = AllocationStrategy::RotatingHotSet { hot_set_size: hot };
            let mut rng = StdRng::seed_from_u64(0);
            let seat = strategy.assign(vu, iteration, &mut rng);
            prop_assert!((1..=hot).contains(&seat));
        }

        #[test]
        fn random_strategies_stay_in_bounds(range in 1u64..1000, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            for strategy in [
                AllocationStrategy::UniformRandom { range },
                AllocationStrategy::HotSetRandom { hot_set_size: range },
            ] {
                let seat = strategy.assign(1, 0, &mut rng);
                prop_assert!(seat >= 1 && seat <= strategy.upper_bound());
            }
        }
    }
}
