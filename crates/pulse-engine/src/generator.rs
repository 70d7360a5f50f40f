//! Synthetic observation generation, one profile per scenario.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, json};

use pulse_core::point::DataPoint;
use pulse_core::types::{DataScenario, PointId};

const CATEGORIES: [&str; 5] = ["cpu", "memory", "network", "disk", "latency"];
const SOURCES: [&str; 4] = ["node-a", "node-b", "node-c", "edge-1"];
const REGIONS: [&str; 3] = ["us-east", "eu-west", "ap-south"];

/// Value above which a point is tagged as degraded in its metadata.
const DEGRADED_THRESHOLD: f64 = 85.0;

/// How often the burst scenario erupts, in ticks.
const BURST_PERIOD: u64 = 10;
const BURST_MULTIPLIER: usize = 5;

/// Generates per-tick batches of synthetic observations.
///
/// IDs are unique per generator instance; seeding makes output
/// deterministic for tests.
#[derive(Debug)]
pub struct ScenarioGenerator {
    rng: StdRng,
    sequence: u64,
    ticks: u64,
}

impl Default for ScenarioGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioGenerator {
    /// Creates a generator with an entropy-derived seed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            sequence: 0,
            ticks: 0,
        }
    }

    /// Creates a deterministic generator for tests.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            sequence: 0,
            ticks: 0,
        }
    }

    /// Produces the next batch for the given scenario.
    ///
    /// `points` is the configured per-tick count before scenario shaping;
    /// zero always yields an empty batch.
    pub fn next_batch(
        &mut self,
        scenario: DataScenario,
        points: usize,
        now: DateTime<Utc>,
    ) -> Vec<DataPoint> {
        self.ticks += 1;
        let count = match scenario {
            DataScenario::Steady | DataScenario::Ramp => points,
            DataScenario::Burst => {
                if self.ticks % BURST_PERIOD == 0 {
                    points.saturating_mul(BURST_MULTIPLIER)
                } else {
                    points
                }
            }
            DataScenario::Quiet => points.div_ceil(4).min(points),
        };

        (0..count)
            .map(|_| self.next_point(scenario, now))
            .collect()
    }

    fn next_point(&mut self, scenario: DataScenario, now: DateTime<Utc>) -> DataPoint {
        self.sequence += 1;
        let category = CATEGORIES[self.rng.gen_range(0..CATEGORIES.len())];
        let source = SOURCES[self.rng.gen_range(0..SOURCES.len())];
        let region = REGIONS[self.rng.gen_range(0..REGIONS.len())];

        let base: f64 = self.rng.gen_range(20.0..60.0);
        let value = match scenario {
            DataScenario::Steady => base,
            DataScenario::Burst => {
                if self.ticks % BURST_PERIOD == 0 {
                    base * 1.8
                } else {
                    base
                }
            }
            // Baseline drifts upward roughly half a unit per tick.
            #[expect(
                clippy::cast_precision_loss,
                reason = "tick counts stay far below f64 precision limits"
            )]
            DataScenario::Ramp => base + self.ticks as f64 * 0.5,
            DataScenario::Quiet => base * 0.3,
        };

        let mut metadata = Map::new();
        metadata.insert("region".to_string(), json!(region));
        metadata.insert(
            "status".to_string(),
            json!(if value > DEGRADED_THRESHOLD {
                "degraded"
            } else {
                "healthy"
            }),
        );

        DataPoint {
            // Sequence numbers never repeat within a generator, so the ID
            // is always non-empty and unique.
            id: PointId::new(format!("pt-{:010}", self.sequence))
                .unwrap_or_else(|_| unreachable!()),
            timestamp: now,
            value,
            category: category.to_string(),
            source: source.to_string(),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn batch_size_matches_configured_points() {
        let mut generator = ScenarioGenerator::seeded(7);
        let batch = generator.next_batch(DataScenario::Steady, 10, Utc::now());
        assert_eq!(batch.len(), 10);
    }

    #[test]
    fn zero_points_yields_empty_batch() {
        let mut generator = ScenarioGenerator::seeded(7);
        for scenario in DataScenario::ALL {
            assert!(generator.next_batch(scenario, 0, Utc::now()).is_empty());
        }
    }

    #[test]
    fn ids_are_unique_across_batches() {
        let mut generator = ScenarioGenerator::seeded(7);
        let mut seen = HashSet::new();
        for _ in 0..20 {
            for point in generator.next_batch(DataScenario::Steady, 25, Utc::now()) {
                assert!(seen.insert(point.id));
            }
        }
    }

    #[test]
    fn burst_scenario_erupts_periodically() {
        let mut generator = ScenarioGenerator::seeded(7);
        let mut sizes = Vec::new();
        for _ in 0..BURST_PERIOD {
            sizes.push(generator.next_batch(DataScenario::Burst, 4, Utc::now()).len());
        }
        assert_eq!(sizes.pop(), Some(4 * BURST_MULTIPLIER));
        assert!(sizes.iter().all(|&s| s == 4));
    }

    #[test]
    fn quiet_scenario_thins_traffic() {
        let mut generator = ScenarioGenerator::seeded(7);
        let batch = generator.next_batch(DataScenario::Quiet, 12, Utc::now());
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn points_carry_filterable_metadata() {
        let mut generator = ScenarioGenerator::seeded(7);
        let batch = generator.next_batch(DataScenario::Steady, 5, Utc::now());
        for point in batch {
            assert!(point.field("metadata.region").is_some());
            assert!(point.field("metadata.status").is_some());
        }
    }
}
