// Statistical primitives over a named metric and an arbitrary player cohort.
//
// Every function here is pure. Degenerate inputs (empty cohort, zero
// variance) produce defined neutral values instead of NaN.

use crate::store::entity::Player;
use serde::Serialize;
use std::collections::BTreeMap;

/// Threshold below which standard deviation is treated as zero.
const STDEV_EPSILON: f64 = 1e-9;

/// Percentile reported for a value ranked against an empty cohort.
pub const NEUTRAL_PERCENTILE: u8 = 50;

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// Range and spread of one metric across a cohort.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl Bounds {
    /// Returned for an empty cohort.
    pub const NEUTRAL: Bounds = Bounds {
        min: 0.0,
        max: 1.0,
        mean: 0.0,
        std_dev: 1.0,
    };
}

/// Bounds of a raw value slice. Non-finite values are ignored.
///
/// Uses the population standard deviation (N denominator), since the cohort
/// is the full comparison group rather than a sample. When every value is
/// equal, `max` becomes `min + 1` so normalization never divides by zero.
pub fn bounds_of(values: &[f64]) -> Bounds {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return Bounds::NEUTRAL;
    }
    let n = finite.len() as f64;
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let mut max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = finite.iter().sum::<f64>() / n;
    let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    if max == min {
        max = min + 1.0;
    }
    Bounds {
        min,
        max,
        mean,
        std_dev: variance.sqrt(),
    }
}

/// Bounds of `metric` across `cohort`; absent metrics count as 0.
pub fn bounds(cohort: &[&Player], metric: &str) -> Bounds {
    let values: Vec<f64> = cohort.iter().map(|p| p.metric(metric)).collect();
    bounds_of(&values)
}

/// Position of `value` inside the bounds, clamped to [0, 1].
pub fn normalize(value: f64, b: &Bounds) -> f64 {
    let range = b.max - b.min;
    if !value.is_finite() || range <= 0.0 {
        return 0.0;
    }
    ((value - b.min) / range).clamp(0.0, 1.0)
}

/// Distance from the mean in standard deviations; 0 when there is no spread.
pub fn z_score(value: f64, b: &Bounds) -> f64 {
    if b.std_dev < STDEV_EPSILON || !value.is_finite() {
        return 0.0;
    }
    (value - b.mean) / b.std_dev
}

// ---------------------------------------------------------------------------
// Percentile rank
// ---------------------------------------------------------------------------

/// Mid-rank percentile: `(below + 0.5 * equal) / total * 100`, rounded and
/// clamped to [0, 100]. An empty cohort ranks at the neutral 50.
///
/// This is the single percentile definition shared by role scoring,
/// similarity strengths and cluster labeling.
pub fn percentile_rank(value: f64, all_values: &[f64]) -> u8 {
    if all_values.is_empty() {
        return NEUTRAL_PERCENTILE;
    }
    let mut below = 0usize;
    let mut equal = 0usize;
    for v in all_values {
        if *v < value {
            below += 1;
        } else if *v == value {
            equal += 1;
        }
    }
    let pct = (below as f64 + 0.5 * equal as f64) / all_values.len() as f64 * 100.0;
    pct.round().clamp(0.0, 100.0) as u8
}

/// Percentile of a player's metric within a cohort.
pub fn metric_percentile(player: &Player, cohort: &[&Player], metric: &str) -> u8 {
    let values: Vec<f64> = cohort.iter().map(|p| p.metric(metric)).collect();
    percentile_rank(player.metric(metric), &values)
}

// ---------------------------------------------------------------------------
// Percentile profile
// ---------------------------------------------------------------------------

/// How one metric of one player compares to a cohort.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricProfile {
    pub value: f64,
    pub percentile: u8,
    pub z_score: f64,
    pub cohort_mean: f64,
}

/// Per-metric percentile, z-score and cohort mean for one player.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileProfile {
    pub cohort_size: usize,
    pub metrics: BTreeMap<String, MetricProfile>,
}

/// Build a player's percentile profile over `metrics` against `cohort`.
pub fn percentile_profile(player: &Player, cohort: &[&Player], metrics: &[String]) -> PercentileProfile {
    let mut out = BTreeMap::new();
    for metric in metrics {
        let values: Vec<f64> = cohort.iter().map(|p| p.metric(metric)).collect();
        let b = bounds_of(&values);
        let value = player.metric(metric);
        out.insert(
            metric.clone(),
            MetricProfile {
                value,
                percentile: percentile_rank(value, &values),
                z_score: z_score(value, &b),
                cohort_mean: b.mean,
            },
        );
    }
    PercentileProfile {
        cohort_size: cohort.len(),
        metrics: out,
    }
}

/// The player's strongest `n` metrics among `candidates`: those ranking at or
/// above `min_percentile`, highest first, ties in candidate order. If fewer
/// than `n` qualify, only the qualifying ones are returned.
pub fn top_percentile_metrics(
    player: &Player,
    cohort: &[&Player],
    candidates: &[String],
    n: usize,
    min_percentile: u8,
) -> Vec<String> {
    let mut ranked: Vec<(u8, &String)> = candidates
        .iter()
        .map(|m| (metric_percentile(player, cohort, m), m))
        .filter(|(pct, _)| *pct >= min_percentile)
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));
    ranked.into_iter().take(n).map(|(_, m)| m.clone()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::entity::{PlayerId, PlayerProfile};

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn make_player(name: &str, metrics: &[(&str, f64)]) -> Player {
        Player {
            id: PlayerId(format!("p:{name}")),
            name: name.into(),
            normalized_name: name.to_lowercase(),
            team_name: "Test FC".into(),
            team_id: None,
            position: "CF".into(),
            positions: vec!["CF".into()],
            league: "Test League".into(),
            profile: PlayerProfile::default(),
            metrics: metrics.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn bounds_known_values() {
        // Values: [2, 4, 4, 4, 5, 5, 7, 9], mean 5, population stdev 2.
        let b = bounds_of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!(approx_eq(b.min, 2.0, 1e-10));
        assert!(approx_eq(b.max, 9.0, 1e-10));
        assert!(approx_eq(b.mean, 5.0, 1e-10));
        assert!(approx_eq(b.std_dev, 2.0, 1e-10));
    }

    #[test]
    fn bounds_equal_values_widen_max() {
        let b = bounds_of(&[3.0, 3.0, 3.0]);
        assert_eq!(b.min, 3.0);
        assert_eq!(b.max, 4.0);
        assert_eq!(b.std_dev, 0.0);
    }

    #[test]
    fn bounds_empty_is_neutral() {
        assert_eq!(bounds_of(&[]), Bounds::NEUTRAL);
        assert_eq!(bounds(&[], "Goals"), Bounds::NEUTRAL);
        assert_eq!(bounds_of(&[f64::NAN]), Bounds::NEUTRAL);
    }

    #[test]
    fn bounds_max_never_below_min() {
        let sets: [&[f64]; 4] = [&[1.0], &[-5.0, 2.0], &[0.0, 0.0], &[1e9, -1e9, 3.0]];
        for values in sets {
            let b = bounds_of(values);
            assert!(b.max >= b.min);
            assert!(b.max > b.min);
        }
    }

    #[test]
    fn bounds_over_cohort_treats_absent_as_zero() {
        let a = make_player("A", &[("Goals", 4.0)]);
        let b = make_player("B", &[]);
        let b = bounds(&[&a, &b], "Goals");
        assert_eq!(b.min, 0.0);
        assert_eq!(b.max, 4.0);
        assert_eq!(b.mean, 2.0);
    }

    #[test]
    fn normalize_is_clamped() {
        let b = bounds_of(&[0.0, 10.0]);
        assert_eq!(normalize(5.0, &b), 0.5);
        assert_eq!(normalize(-3.0, &b), 0.0);
        assert_eq!(normalize(30.0, &b), 1.0);
        assert_eq!(normalize(f64::NAN, &b), 0.0);
        for v in [-1e12, -1.0, 0.0, 0.3, 9.99, 1e12] {
            let n = normalize(v, &b);
            assert!((0.0..=1.0).contains(&n));
        }
    }

    #[test]
    fn z_score_known_inputs() {
        let b = Bounds {
            min: 0.0,
            max: 10.0,
            mean: 5.0,
            std_dev: 2.0,
        };
        assert!(approx_eq(z_score(9.0, &b), 2.0, 1e-10));
        assert!(approx_eq(z_score(1.0, &b), -2.0, 1e-10));
        assert!(approx_eq(z_score(5.0, &b), 0.0, 1e-10));
    }

    #[test]
    fn z_score_zero_stdev_returns_zero() {
        let b = bounds_of(&[7.0, 7.0]);
        assert_eq!(z_score(100.0, &b), 0.0);
    }

    #[test]
    fn percentile_mid_rank_example() {
        // (2 below + 0.5 * 1 equal) / 4 * 100 = 62.5 -> 63
        assert_eq!(percentile_rank(3.0, &[1.0, 2.0, 3.0, 4.0]), 63);
        assert_eq!(percentile_rank(0.0, &[1.0, 2.0, 3.0, 4.0]), 0);
        assert_eq!(percentile_rank(9.0, &[1.0, 2.0, 3.0, 4.0]), 100);
        assert_eq!(percentile_rank(5.0, &[5.0, 5.0]), 50);
    }

    #[test]
    fn percentile_empty_is_neutral() {
        assert_eq!(percentile_rank(1.0, &[]), NEUTRAL_PERCENTILE);
    }

    #[test]
    fn percentile_is_monotonic() {
        let cohort = [0.1, 0.4, 0.4, 0.9, 1.3, 2.0, 2.0, 2.0, 5.5];
        let mut last = 0u8;
        let mut v = -1.0;
        while v < 7.0 {
            let p = percentile_rank(v, &cohort);
            assert!(p >= last, "percentile dropped at {v}: {p} < {last}");
            last = p;
            v += 0.05;
        }
    }

    #[test]
    fn profile_reports_percentile_z_and_mean() {
        let players: Vec<Player> = [1.0, 2.0, 3.0, 4.0]
            .iter()
            .enumerate()
            .map(|(i, g)| make_player(&format!("P{i}"), &[("Goals", *g)]))
            .collect();
        let cohort: Vec<&Player> = players.iter().collect();
        let profile = percentile_profile(&players[2], &cohort, &["Goals".to_string()]);
        let goals = profile.metrics["Goals"];
        assert_eq!(profile.cohort_size, 4);
        assert_eq!(goals.percentile, 63);
        assert!(approx_eq(goals.cohort_mean, 2.5, 1e-10));
        assert!(goals.z_score > 0.0);
    }

    #[test]
    fn top_metrics_pick_strengths_in_order() {
        let star = make_player("Star", &[("Goals", 9.0), ("Assists", 5.0), ("Tackles", 0.0)]);
        let a = make_player("A", &[("Goals", 1.0), ("Assists", 6.0), ("Tackles", 3.0)]);
        let b = make_player("B", &[("Goals", 2.0), ("Assists", 1.0), ("Tackles", 4.0)]);
        let cohort = vec![&star, &a, &b];
        let candidates = vec!["Tackles".to_string(), "Assists".to_string(), "Goals".to_string()];
        // Goals: 83rd percentile, Assists: 50th, Tackles: 17th.
        let top = top_percentile_metrics(&star, &cohort, &candidates, 2, 50);
        assert_eq!(top, vec!["Goals".to_string(), "Assists".to_string()]);
        let strict = top_percentile_metrics(&star, &cohort, &candidates, 5, 80);
        assert_eq!(strict, vec!["Goals".to_string()]);
    }
}
