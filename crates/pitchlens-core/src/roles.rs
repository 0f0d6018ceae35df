// Weighted linear role scoring.
//
// A role is a position-scoped set of metric weights. A player's raw score is
// the weighted sum of their metric values; the normalized score and the
// percentile are both relative to whatever cohort the caller passes, and the
// cohort maximum is recomputed on every call.

use crate::metrics::percentile_rank;
use crate::store::entity::{Player, PlayerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Role definition
// ---------------------------------------------------------------------------

/// A named tactical role: eligible position codes plus metric weights.
/// Weights may be negative to penalize a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub positions: Vec<String>,
    pub weights: BTreeMap<String, f64>,
}

impl RoleDefinition {
    /// Whether any of the player's position codes is listed for this role.
    pub fn is_eligible(&self, player: &Player) -> bool {
        player.plays_any(&self.positions)
    }

    /// `sum(value * weight)` over the role's metrics; absent metrics add 0.
    pub fn raw_score(&self, player: &Player) -> f64 {
        self.weights
            .iter()
            .map(|(metric, weight)| player.metric(metric) * weight)
            .sum()
    }

    /// Per-metric contributions, largest absolute contribution first.
    pub fn breakdown(&self, player: &Player) -> Vec<MetricContribution> {
        let mut parts: Vec<MetricContribution> = self
            .weights
            .iter()
            .map(|(metric, &weight)| {
                let value = player.metric(metric);
                MetricContribution {
                    metric: metric.clone(),
                    value,
                    weight,
                    contribution: value * weight,
                }
            })
            .collect();
        parts.sort_by(|a, b| {
            b.contribution
                .abs()
                .partial_cmp(&a.contribution.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        parts
    }
}

/// Case-insensitive role lookup by name.
pub fn find_role<'a>(roles: &'a [RoleDefinition], name: &str) -> Option<&'a RoleDefinition> {
    let wanted = name.trim();
    roles.iter().find(|r| r.name.eq_ignore_ascii_case(wanted))
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricContribution {
    pub metric: String,
    pub value: f64,
    pub weight: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleScore {
    pub role: String,
    pub player_id: PlayerId,
    pub player_name: String,
    pub raw_score: f64,
    /// `round(100 * raw / cohort max)`, clamped to [0, 100].
    pub normalized_score: u8,
    /// Mid-rank percentile among the cohort's eligible players.
    pub percentile: u8,
    pub breakdown: Vec<MetricContribution>,
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Raw scores of the cohort's eligible players for one role.
struct CohortScores {
    raws: Vec<f64>,
    max: f64,
}

impl CohortScores {
    fn compute(role: &RoleDefinition, cohort: &[&Player]) -> Self {
        let raws: Vec<f64> = cohort
            .iter()
            .filter(|p| role.is_eligible(p))
            .map(|p| role.raw_score(p))
            .collect();
        let max = raws.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self { raws, max }
    }

    fn score(&self, role: &RoleDefinition, player: &Player) -> RoleScore {
        let raw = role.raw_score(player);
        RoleScore {
            role: role.name.clone(),
            player_id: player.id.clone(),
            player_name: player.name.clone(),
            raw_score: raw,
            normalized_score: normalized_score(raw, self.max),
            percentile: percentile_rank(raw, &self.raws),
            breakdown: role.breakdown(player),
        }
    }
}

/// `round(100 * raw / max)` clamped to [0, 100]; 0 when the max is not positive.
pub fn normalized_score(raw: f64, cohort_max: f64) -> u8 {
    if !(cohort_max.is_finite() && cohort_max > 0.0) || !raw.is_finite() {
        return 0;
    }
    (100.0 * raw / cohort_max).round().clamp(0.0, 100.0) as u8
}

/// Score one player for one role against `cohort`. `None` when the player's
/// positions do not intersect the role's.
pub fn score_role(player: &Player, role: &RoleDefinition, cohort: &[&Player]) -> Option<RoleScore> {
    if !role.is_eligible(player) {
        return None;
    }
    Some(CohortScores::compute(role, cohort).score(role, player))
}

/// Score every eligible cohort player for `role`, best raw score first.
pub fn rank_role(role: &RoleDefinition, cohort: &[&Player]) -> Vec<RoleScore> {
    let scores = CohortScores::compute(role, cohort);
    let mut ranked: Vec<RoleScore> = cohort
        .iter()
        .filter(|p| role.is_eligible(p))
        .map(|p| scores.score(role, p))
        .collect();
    ranked.sort_by(|a, b| {
        b.raw_score
            .partial_cmp(&a.raw_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}

/// Score a player against every role they are eligible for, best first
/// (normalized score, then percentile).
pub fn best_roles(player: &Player, roles: &[RoleDefinition], cohort: &[&Player]) -> Vec<RoleScore> {
    let mut scored: Vec<RoleScore> = roles
        .iter()
        .filter_map(|role| score_role(player, role, cohort))
        .collect();
    scored.sort_by(|a, b| {
        b.normalized_score
            .cmp(&a.normalized_score)
            .then(b.percentile.cmp(&a.percentile))
    });
    scored
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
