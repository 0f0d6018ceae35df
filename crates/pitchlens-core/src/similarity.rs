// Player similarity: pick comparison metrics, scale them over the candidate
// pool, measure a distance between profiles and map it to a 0-100 score.
//
// Metric selection, distance and weighting are independent knobs. The score
// mapping is `max(0, 100 * (1 - d / (sqrt(n) * spread)))`, where `n` is the
// number of compared metrics and `spread` defaults to 0.6.

use crate::cancel::{self, CancellationToken, Cancelled};
use crate::config::{MetricCatalog, SimilarityConfig};
use crate::metrics::{bounds, normalize, top_percentile_metrics, Bounds};
use crate::roles::RoleDefinition;
use crate::store::entity::{Player, PlayerId};
use crate::store::names::normalize_name;
use serde::Serialize;
use tracing::debug;

/// Norm below which a vector counts as zero for cosine distance.
const COSINE_EPSILON: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Metric selection
// ---------------------------------------------------------------------------

/// Chooses which metrics a comparison runs over.
pub trait MetricSelector {
    fn select(&self, reference: &Player, pool: &[&Player], catalog: &MetricCatalog) -> Vec<String>;
}

/// The configured metric list for the reference player's primary position
/// category. Players with no recognised position use every listed metric.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionMetrics;

impl MetricSelector for PositionMetrics {
    fn select(&self, reference: &Player, _pool: &[&Player], catalog: &MetricCatalog) -> Vec<String> {
        match reference.primary_category() {
            Some(category) => catalog.metrics_for(category).to_vec(),
            None => catalog.all_position_metrics(),
        }
    }
}

/// "Play to strengths": the reference player's highest-percentile metrics
/// within the pool.
#[derive(Debug, Clone, Copy)]
pub struct StrengthMetrics {
    pub top_n: usize,
    pub min_percentile: u8,
}

impl Default for StrengthMetrics {
    fn default() -> Self {
        Self {
            top_n: 8,
            min_percentile: 75,
        }
    }
}

impl StrengthMetrics {
    pub fn from_config(cfg: &SimilarityConfig) -> Self {
        Self {
            top_n: cfg.strengths_top_n,
            min_percentile: cfg.strengths_min_percentile,
        }
    }
}

impl MetricSelector for StrengthMetrics {
    fn select(&self, reference: &Player, pool: &[&Player], _catalog: &MetricCatalog) -> Vec<String> {
        let candidates: Vec<String> = reference.metrics.keys().cloned().collect();
        top_percentile_metrics(reference, pool, &candidates, self.top_n, self.min_percentile)
    }
}

/// A caller-supplied list.
#[derive(Debug, Clone, Default)]
pub struct ExplicitMetrics(pub Vec<String>);

impl MetricSelector for ExplicitMetrics {
    fn select(&self, _reference: &Player, _pool: &[&Player], _catalog: &MetricCatalog) -> Vec<String> {
        self.0.clone()
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    WeightedEuclidean,
    Manhattan,
    Cosine,
}

/// Per-metric weights for the weighted distances.
#[derive(Debug, Clone, Default)]
pub enum Weighting {
    /// Every metric weighs 1.
    Uniform,
    /// Weight of the metric's category from the catalog, else 1.
    #[default]
    Category,
    /// Absolute role weight; metrics the role does not list weigh 1.
    Role(RoleDefinition),
}

impl Weighting {
    pub fn weight_for(&self, metric: &str, catalog: &MetricCatalog) -> f64 {
        match self {
            Weighting::Uniform => 1.0,
            Weighting::Category => catalog.weight_for(metric),
            Weighting::Role(role) => role.weights.get(metric).map(|w| w.abs()).unwrap_or(1.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimilarityOptions {
    pub distance: DistanceMetric,
    pub weighting: Weighting,
    /// Only compare against players sharing the reference's primary category.
    pub same_position_only: bool,
    pub exclude_same_team: bool,
    pub min_minutes: f64,
    pub limit: usize,
    pub spread_factor: f64,
    pub include_breakdown: bool,
}

impl Default for SimilarityOptions {
    fn default() -> Self {
        Self {
            distance: DistanceMetric::Euclidean,
            weighting: Weighting::Category,
            same_position_only: false,
            exclude_same_team: false,
            min_minutes: 450.0,
            limit: 10,
            spread_factor: 0.6,
            include_breakdown: false,
        }
    }
}

impl SimilarityOptions {
    pub fn from_config(cfg: &SimilarityConfig) -> Self {
        Self {
            min_minutes: cfg.min_minutes,
            limit: cfg.default_limit,
            spread_factor: cfg.spread_factor,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDiff {
    pub metric: String,
    pub reference_value: f64,
    pub candidate_value: f64,
    /// Absolute difference of the pool-normalized values, in [0, 1].
    pub difference: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub player_id: PlayerId,
    pub name: String,
    pub team: String,
    pub position: String,
    pub score: u8,
    pub distance: f64,
    pub metric_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Vec<MetricDiff>>,
}

// ---------------------------------------------------------------------------
// Distances
// ---------------------------------------------------------------------------

/// Distance between two equally long normalized vectors. `weights` is only
/// read by the weighted variants.
pub fn distance(kind: DistanceMetric, a: &[f64], b: &[f64], weights: &[f64]) -> f64 {
    match kind {
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::WeightedEuclidean => a
            .iter()
            .zip(b)
            .zip(weights)
            .map(|((x, y), w)| w * (x - y).powi(2))
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::Manhattan => {
            if a.is_empty() {
                return 0.0;
            }
            let total: f64 = a
                .iter()
                .zip(b)
                .zip(weights)
                .map(|((x, y), w)| w * (x - y).abs())
                .sum();
            total / a.len() as f64
        }
        DistanceMetric::Cosine => {
            let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
            let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
            if na < COSINE_EPSILON || nb < COSINE_EPSILON {
                return 1.0;
            }
            1.0 - (dot / (na * nb)).clamp(-1.0, 1.0)
        }
    }
}

/// `max(0, 100 * (1 - d / (sqrt(n) * spread)))`, rounded.
pub fn score_from_distance(distance: f64, metric_count: usize, spread_factor: f64) -> u8 {
    if metric_count == 0 || spread_factor <= 0.0 || !distance.is_finite() {
        return 0;
    }
    let scale = (metric_count as f64).sqrt() * spread_factor;
    (100.0 * (1.0 - distance / scale)).round().clamp(0.0, 100.0) as u8
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Scaling and weights for one comparison run.
struct Frame {
    metrics: Vec<String>,
    bounds: Vec<Bounds>,
    weights: Vec<f64>,
    reference: Vec<f64>,
}

impl Frame {
    fn new(
        reference: &Player,
        pool: &[&Player],
        metrics: Vec<String>,
        catalog: &MetricCatalog,
        weighting: &Weighting,
    ) -> Self {
        let bounds: Vec<Bounds> = metrics.iter().map(|m| bounds(pool, m)).collect();
        let weights = metrics
            .iter()
            .map(|m| weighting.weight_for(m, catalog))
            .collect();
        let reference = vector(reference, &metrics, &bounds);
        Self {
            metrics,
            bounds,
            weights,
            reference,
        }
    }

    fn compare(&self, candidate: &Player, options: &SimilarityOptions) -> SimilarityResult {
        let values = vector(candidate, &self.metrics, &self.bounds);
        let d = distance(options.distance, &self.reference, &values, &self.weights);
        let breakdown = options.include_breakdown.then(|| {
            self.metrics
                .iter()
                .zip(self.reference.iter().zip(&values))
                .map(|(metric, (r, c))| MetricDiff {
                    metric: metric.clone(),
                    reference_value: *r,
                    candidate_value: *c,
                    difference: (r - c).abs(),
                })
                .collect()
        });
        SimilarityResult {
            player_id: candidate.id.clone(),
            name: candidate.name.clone(),
            team: candidate.team_name.clone(),
            position: candidate.position.clone(),
            score: score_from_distance(d, self.metrics.len(), options.spread_factor),
            distance: d,
            metric_count: self.metrics.len(),
            breakdown,
        }
    }
}

fn vector(player: &Player, metrics: &[String], bounds: &[Bounds]) -> Vec<f64> {
    metrics
        .iter()
        .zip(bounds)
        .map(|(m, b)| normalize(player.metric(m), b))
        .collect()
}

fn same_team(a: &Player, b: &Player) -> bool {
    match (&a.team_id, &b.team_id) {
        (Some(x), Some(y)) => x == y,
        _ => normalize_name(&a.team_name) == normalize_name(&b.team_name),
    }
}

/// Whether `candidate` passes the pre-scoring filters for `reference`.
fn admissible(reference: &Player, candidate: &Player, options: &SimilarityOptions) -> bool {
    if candidate.id == reference.id {
        return false;
    }
    if candidate.minutes_played() < options.min_minutes {
        return false;
    }
    if options.same_position_only {
        // A reference without a recognised position has no position peers.
        match reference.primary_category() {
            Some(category) if candidate.primary_category() == Some(category) => {}
            _ => return false,
        }
    }
    if options.exclude_same_team && same_team(reference, candidate) {
        return false;
    }
    true
}

/// Rank `pool` by similarity to `reference`, best first, at most
/// `options.limit` results. Metrics are scaled over the whole pool before
/// any filter applies. Equal scores keep pool order.
pub fn find_similar(
    reference: &Player,
    pool: &[&Player],
    selector: &dyn MetricSelector,
    catalog: &MetricCatalog,
    options: &SimilarityOptions,
    cancel: Option<&CancellationToken>,
) -> Result<Vec<SimilarityResult>, Cancelled> {
    let metrics = selector.select(reference, pool, catalog);
    if metrics.is_empty() || options.limit == 0 {
        debug!("no metrics selected for '{}'", reference.name);
        return Ok(Vec::new());
    }
    let frame = Frame::new(reference, pool, metrics, catalog, &options.weighting);

    let mut results = Vec::new();
    for candidate in pool {
        cancel::check(cancel)?;
        if !admissible(reference, candidate, options) {
            continue;
        }
        results.push(frame.compare(candidate, options));
    }
    results.sort_by(|a, b| b.score.cmp(&a.score));
    results.truncate(options.limit);
    debug!(
        "similarity for '{}': {} metrics, {} results",
        reference.name,
        frame.metrics.len(),
        results.len()
    );
    Ok(results)
}

/// Score a single pair over the given metrics, scaled against `pool`. No
/// filters apply.
pub fn compare_players(
    reference: &Player,
    candidate: &Player,
    pool: &[&Player],
    metrics: Vec<String>,
    catalog: &MetricCatalog,
    options: &SimilarityOptions,
) -> SimilarityResult {
    Frame::new(reference, pool, metrics, catalog, &options.weighting).compare(candidate, options)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::entity::{PlayerProfile, TeamId};
    use crate::store::position::parse_position_codes;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn make_player(name: &str, team: &str, position: &str, minutes: f64, metrics: &[(&str, f64)]) -> Player {
        Player {
            id: PlayerId(format!("p:{}", name.to_lowercase())),
            name: name.into(),
            normalized_name: name.to_lowercase(),
            team_name: team.into(),
            team_id: Some(TeamId(format!("t:{}", team.to_lowercase()))),
            position: position.into(),
            positions: parse_position_codes(position),
            league: "Test League".into(),
            profile: PlayerProfile {
                minutes_played: minutes,
                ..PlayerProfile::default()
            },
            metrics: metrics.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    fn catalog() -> MetricCatalog {
        Config::builtin().unwrap().catalog
    }

    fn explicit(names: &[&str]) -> ExplicitMetrics {
        ExplicitMetrics(names.iter().map(|s| s.to_string()).collect())
    }

    fn striker_pool() -> Vec<Player> {
        vec![
            make_player("Ref", "A", "CF", 2000.0, &[("Goals per 90", 0.6), ("xG per 90", 0.5)]),
            make_player("Twin", "B", "CF", 1800.0, &[("Goals per 90", 0.58), ("xG per 90", 0.52)]),
            make_player("Keeper", "C", "GK", 3000.0, &[("Goals per 90", 0.6), ("xG per 90", 0.5)]),
            make_player("Far", "D", "CF", 1500.0, &[("Goals per 90", 0.1), ("xG per 90", 0.05)]),
            make_player("Bench", "E", "CF", 200.0, &[("Goals per 90", 0.6), ("xG per 90", 0.5)]),
        ]
    }

    #[test]
    fn identical_profiles_score_100() {
        let pool = striker_pool();
        let refs: Vec<&Player> = pool.iter().collect();
        let metrics = vec!["Goals per 90".to_string(), "xG per 90".to_string()];
        let opts = SimilarityOptions::default();
        let same = compare_players(&pool[0], &pool[0], &refs, metrics.clone(), &catalog(), &opts);
        assert_eq!(same.score, 100);
        assert!(approx_eq(same.distance, 0.0, 1e-12));

        let other = compare_players(&pool[0], &pool[3], &refs, metrics, &catalog(), &opts);
        assert!(same.score >= other.score);
    }

    #[test]
    fn same_position_filter_excludes_goalkeeper() {
        let pool = striker_pool();
        let refs: Vec<&Player> = pool.iter().collect();
        let opts = SimilarityOptions {
            same_position_only: true,
            ..SimilarityOptions::default()
        };
        let results = find_similar(
            &pool[0],
            &refs,
            &explicit(&["Goals per 90", "xG per 90"]),
            &catalog(),
            &opts,
            None,
        )
        .unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert!(!names.contains(&"Keeper"));
        assert!(!names.contains(&"Ref"));
        assert_eq!(names, vec!["Twin", "Far"]);
    }

    #[test]
    fn unrecognised_positions_are_not_position_peers() {
        let pool = vec![
            make_player("Ref", "A", "Utility", 2000.0, &[("Goals per 90", 0.6)]),
            make_player("Other", "B", "Sweeper", 2000.0, &[("Goals per 90", 0.5)]),
            make_player("Striker", "C", "CF", 2000.0, &[("Goals per 90", 0.4)]),
        ];
        let refs: Vec<&Player> = pool.iter().collect();
        let opts = SimilarityOptions {
            same_position_only: true,
            ..SimilarityOptions::default()
        };
        let results =
            find_similar(&pool[0], &refs, &explicit(&["Goals per 90"]), &catalog(), &opts, None).unwrap();
        assert!(results.is_empty());

        let opts = SimilarityOptions::default();
        let results =
            find_similar(&pool[0], &refs, &explicit(&["Goals per 90"]), &catalog(), &opts, None).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn minutes_filter_and_team_exclusion() {
        let mut pool = striker_pool();
        pool[1].team_id = pool[0].team_id.clone();
        let refs: Vec<&Player> = pool.iter().collect();
        let opts = SimilarityOptions {
            exclude_same_team: true,
            ..SimilarityOptions::default()
        };
        let results = find_similar(&pool[0], &refs, &explicit(&["Goals per 90"]), &catalog(), &opts, None).unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Keeper", "Far"]);
    }

    #[test]
    fn scores_stay_in_range_and_ties_keep_pool_order() {
        let pool = vec![
            make_player("Ref", "A", "CF", 900.0, &[("Goals per 90", 0.5)]),
            make_player("First", "B", "CF", 900.0, &[("Goals per 90", 0.5)]),
            make_player("Second", "C", "CF", 900.0, &[("Goals per 90", 0.5)]),
            make_player("Low", "D", "CF", 900.0, &[("Goals per 90", 0.0)]),
        ];
        let refs: Vec<&Player> = pool.iter().collect();
        let results = find_similar(
            &pool[0],
            &refs,
            &explicit(&["Goals per 90"]),
            &catalog(),
            &SimilarityOptions::default(),
            None,
        )
        .unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Second", "Low"]);
        assert_eq!(results[0].score, 100);
        assert_eq!(results[2].score, 0);
    }

    #[test]
    fn limit_truncates() {
        let pool = striker_pool();
        let refs: Vec<&Player> = pool.iter().collect();
        let opts = SimilarityOptions {
            limit: 1,
            ..SimilarityOptions::default()
        };
        let results = find_similar(&pool[0], &refs, &explicit(&["Goals per 90"]), &catalog(), &opts, None).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn empty_selection_yields_no_results() {
        let pool = striker_pool();
        let refs: Vec<&Player> = pool.iter().collect();
        let results = find_similar(&pool[0], &refs, &explicit(&[]), &catalog(), &SimilarityOptions::default(), None).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn cancelled_token_aborts_scan() {
        let pool = striker_pool();
        let refs: Vec<&Player> = pool.iter().collect();
        let token = CancellationToken::new();
        token.cancel();
        let outcome = find_similar(
            &pool[0],
            &refs,
            &explicit(&["Goals per 90"]),
            &catalog(),
            &SimilarityOptions::default(),
            Some(&token),
        );
        assert_eq!(outcome, Err(Cancelled));
    }

    #[test]
    fn breakdown_reports_normalized_differences() {
        let pool = striker_pool();
        let refs: Vec<&Player> = pool.iter().collect();
        let opts = SimilarityOptions {
            include_breakdown: true,
            ..SimilarityOptions::default()
        };
        let r = compare_players(&pool[0], &pool[3], &refs, vec!["Goals per 90".into()], &catalog(), &opts);
        let parts = r.breakdown.unwrap();
        assert_eq!(parts.len(), 1);
        assert!(approx_eq(parts[0].reference_value, 1.0, 1e-12));
        assert!(approx_eq(parts[0].candidate_value, 0.0, 1e-12));
        assert!(approx_eq(parts[0].difference, 1.0, 1e-12));
    }

    #[test]
    fn distance_variants() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        let w = [4.0, 1.0];
        assert!(approx_eq(distance(DistanceMetric::Euclidean, &a, &b, &w), 2f64.sqrt(), 1e-12));
        assert!(approx_eq(distance(DistanceMetric::WeightedEuclidean, &a, &b, &w), 5f64.sqrt(), 1e-12));
        assert!(approx_eq(distance(DistanceMetric::Manhattan, &a, &b, &w), 2.5, 1e-12));
        assert!(approx_eq(distance(DistanceMetric::Cosine, &a, &b, &w), 1.0, 1e-12));
        assert!(approx_eq(distance(DistanceMetric::Cosine, &a, &a, &w), 0.0, 1e-12));
        assert!(approx_eq(distance(DistanceMetric::Cosine, &[0.0, 0.0], &a, &w), 1.0, 1e-12));
    }

    #[test]
    fn score_mapping_uses_spread_factor() {
        assert_eq!(score_from_distance(0.0, 4, 0.6), 100);
        // d = 0.6 over 4 metrics: 1 - 0.6 / 1.2 = 0.5
        assert_eq!(score_from_distance(0.6, 4, 0.6), 50);
        assert_eq!(score_from_distance(5.0, 4, 0.6), 0);
        assert_eq!(score_from_distance(0.0, 0, 0.6), 0);
    }

    #[test]
    fn role_weighting_uses_absolute_weights() {
        let role = RoleDefinition {
            name: "R".into(),
            description: String::new(),
            positions: vec!["CF".into()],
            weights: [("Passes per 90".to_string(), -2.0)].into_iter().collect(),
        };
        let cat = catalog();
        let w = Weighting::Role(role);
        assert_eq!(w.weight_for("Passes per 90", &cat), 2.0);
        assert_eq!(w.weight_for("Anything", &cat), 1.0);
        assert_eq!(Weighting::Uniform.weight_for("Goals per 90", &cat), 1.0);
        assert!(approx_eq(Weighting::Category.weight_for("Goals per 90", &cat), 1.2, 1e-12));
    }

    #[test]
    fn strengths_selector_picks_top_percentiles() {
        let pool = vec![
            make_player("Ref", "A", "CF", 900.0, &[("Goals per 90", 0.9), ("Passes per 90", 10.0)]),
            make_player("B", "B", "CF", 900.0, &[("Goals per 90", 0.1), ("Passes per 90", 40.0)]),
            make_player("C", "C", "CF", 900.0, &[("Goals per 90", 0.2), ("Passes per 90", 50.0)]),
        ];
        let refs: Vec<&Player> = pool.iter().collect();
        let selector = StrengthMetrics {
            top_n: 3,
            min_percentile: 75,
        };
        assert_eq!(selector.select(&pool[0], &refs, &catalog()), vec!["Goals per 90".to_string()]);
    }

    #[test]
    fn position_selector_follows_primary_category() {
        let gk = make_player("GK", "A", "GK", 900.0, &[]);
        let cat = catalog();
        let selected = PositionMetrics.select(&gk, &[], &cat);
        assert_eq!(selected, cat.metrics_for(crate::store::position::PositionCategory::Goalkeeper).to_vec());
        assert!(!selected.is_empty());
    }
}
