// K-means grouping of players into statistical archetypes.
//
// Each metric is bounded over the whole pool and scaled into [0, 1]. Initial
// centroids are the first k vectors of a seeded shuffle, so a given pool and
// seed always produce the same clustering. Clusters are labeled from the
// metrics their centroid stands out on.

use crate::cancel::{self, CancellationToken, Cancelled};
use crate::config::ClusteringConfig;
use crate::metrics::{bounds, normalize, percentile_rank};
use crate::store::entity::{Player, PlayerId};
use crate::store::position::PositionCategory;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    pub k: usize,
    pub max_iterations: usize,
    pub seed: u64,
    /// A centroid value must rank above this percentile to count as a
    /// standout for the label.
    pub label_percentile: u8,
    pub max_label_metrics: usize,
    pub metrics: Vec<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            k: 6,
            max_iterations: 100,
            seed: 42,
            label_percentile: 70,
            max_label_metrics: 3,
            metrics: Vec::new(),
        }
    }
}

impl From<&ClusteringConfig> for ClusterConfig {
    fn from(cfg: &ClusteringConfig) -> Self {
        Self {
            k: cfg.k,
            max_iterations: cfg.max_iterations,
            seed: cfg.seed,
            label_percentile: cfg.label_percentile,
            max_label_metrics: cfg.max_label_metrics,
            metrics: cfg.metrics.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterMember {
    pub player_id: PlayerId,
    pub name: String,
    pub team: String,
    pub position: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterResult {
    pub id: usize,
    pub label: String,
    /// Mean normalized value per metric.
    pub centroid: BTreeMap<String, f64>,
    pub members: Vec<ClusterMember>,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ClusteringOutcome {
    pub clusters: Vec<ClusterResult>,
    pub iterations: usize,
    pub converged: bool,
    /// Within-cluster sum of squared distances to the centroids.
    pub wcss: f64,
}

/// Raw k-means output over plain vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    pub centroids: Vec<Vec<f64>>,
    /// Centroid index per input vector.
    pub assignments: Vec<usize>,
    pub iterations: usize,
    pub converged: bool,
}

// ---------------------------------------------------------------------------
// K-means
// ---------------------------------------------------------------------------

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Index of the closest centroid; ties go to the lower index.
fn nearest(vector: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_distance(vector, c);
        if d < best_d {
            best = i;
            best_d = d;
        }
    }
    best
}

/// Lloyd's algorithm with seeded-shuffle initialization. Returns `None` when
/// `k` is 0, exceeds the number of vectors, or the vectors have no
/// dimensions.
pub fn kmeans(
    vectors: &[Vec<f64>],
    k: usize,
    max_iterations: usize,
    seed: u64,
    cancel: Option<&CancellationToken>,
) -> Result<Option<KMeansFit>, Cancelled> {
    let n = vectors.len();
    let dims = vectors.first().map(Vec::len).unwrap_or(0);
    if k == 0 || k > n || dims == 0 {
        return Ok(None);
    }

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    let mut centroids: Vec<Vec<f64>> = order[..k].iter().map(|&i| vectors[i].clone()).collect();

    let mut assignments = vec![usize::MAX; n];
    let mut iterations = 0;
    let mut converged = false;

    for _ in 0..max_iterations.max(1) {
        cancel::check(cancel)?;
        iterations += 1;

        let mut changed = false;
        for (i, v) in vectors.iter().enumerate() {
            let c = nearest(v, &centroids);
            if assignments[i] != c {
                assignments[i] = c;
                changed = true;
            }
        }
        if !changed {
            converged = true;
            break;
        }

        let mut sums = vec![vec![0.0; dims]; k];
        let mut counts = vec![0usize; k];
        for (v, &c) in vectors.iter().zip(&assignments) {
            counts[c] += 1;
            for (s, x) in sums[c].iter_mut().zip(v) {
                *s += x;
            }
        }
        for (c, (sum, count)) in sums.into_iter().zip(counts).enumerate() {
            // An empty cluster keeps its previous centroid.
            if count > 0 {
                centroids[c] = sum.into_iter().map(|s| s / count as f64).collect();
            }
        }
    }

    debug!(
        "k-means k={} over {} vectors: {} iterations, converged={}",
        k, n, iterations, converged
    );
    Ok(Some(KMeansFit {
        centroids,
        assignments,
        iterations,
        converged,
    }))
}

// ---------------------------------------------------------------------------
// Player clustering
// ---------------------------------------------------------------------------

/// Normalized metric vectors for every player, bounded over `players`.
pub fn player_vectors(players: &[&Player], metrics: &[String]) -> Vec<Vec<f64>> {
    let b: Vec<_> = metrics.iter().map(|m| bounds(players, m)).collect();
    players
        .iter()
        .map(|p| {
            metrics
                .iter()
                .zip(&b)
                .map(|(m, bound)| normalize(p.metric(m), bound))
                .collect()
        })
        .collect()
}

/// Cluster `players` on `config.metrics`. Only non-empty clusters are
/// returned, numbered from 0 in centroid order.
pub fn cluster_players(
    players: &[&Player],
    config: &ClusterConfig,
    cancel: Option<&CancellationToken>,
) -> Result<ClusteringOutcome, Cancelled> {
    if config.metrics.is_empty() {
        return Ok(ClusteringOutcome::default());
    }
    let vectors = player_vectors(players, &config.metrics);
    let Some(fit) = kmeans(&vectors, config.k, config.max_iterations, config.seed, cancel)? else {
        debug!("clustering skipped: k={} for {} players", config.k, players.len());
        return Ok(ClusteringOutcome::default());
    };

    let columns: Vec<Vec<f64>> = (0..config.metrics.len())
        .map(|d| vectors.iter().map(|v| v[d]).collect())
        .collect();

    let mut wcss = 0.0;
    let mut clusters = Vec::new();
    for (c, centroid) in fit.centroids.iter().enumerate() {
        let member_idx: Vec<usize> = fit
            .assignments
            .iter()
            .enumerate()
            .filter(|&(_, &a)| a == c)
            .map(|(i, _)| i)
            .collect();
        if member_idx.is_empty() {
            continue;
        }
        wcss += member_idx
            .iter()
            .map(|&i| squared_distance(&vectors[i], centroid))
            .sum::<f64>();

        let members: Vec<&Player> = member_idx.iter().map(|&i| players[i]).collect();
        clusters.push(ClusterResult {
            id: clusters.len(),
            label: cluster_label(centroid, &columns, &members, config),
            centroid: config
                .metrics
                .iter()
                .cloned()
                .zip(centroid.iter().copied())
                .collect(),
            size: members.len(),
            members: members
                .iter()
                .map(|p| ClusterMember {
                    player_id: p.id.clone(),
                    name: p.name.clone(),
                    team: p.team_name.clone(),
                    position: p.position.clone(),
                })
                .collect(),
        });
    }

    Ok(ClusteringOutcome {
        clusters,
        iterations: fit.iterations,
        converged: fit.converged,
        wcss,
    })
}

/// `"High m1 / m2"` from the metrics whose centroid value ranks above the
/// label percentile among the pool's values, strongest first. Falls back
/// to the members' most common primary position.
fn cluster_label(
    centroid: &[f64],
    columns: &[Vec<f64>],
    members: &[&Player],
    config: &ClusterConfig,
) -> String {
    let mut standouts: Vec<(u8, &str)> = centroid
        .iter()
        .zip(columns)
        .zip(&config.metrics)
        .map(|((&value, column), metric)| (percentile_rank(value, column), metric.as_str()))
        .filter(|(pct, _)| *pct > config.label_percentile)
        .collect();
    standouts.sort_by(|a, b| b.0.cmp(&a.0));
    let names: Vec<&str> = standouts
        .into_iter()
        .take(config.max_label_metrics)
        .map(|(_, m)| m)
        .collect();
    if !names.is_empty() {
        return format!("High {}", names.join(" / "));
    }

    let mut counts: BTreeMap<PositionCategory, usize> = BTreeMap::new();
    for category in members.iter().filter_map(|p| p.primary_category()) {
        *counts.entry(category).or_default() += 1;
    }
    // Highest count; on a tie the earlier category wins.
    let dominant = counts
        .into_iter()
        .fold(None, |best: Option<(PositionCategory, usize)>, (cat, n)| match best {
            Some((_, top)) if top >= n => best,
            _ => Some((cat, n)),
        });
    match dominant {
        Some((category, _)) => format!("{} profile", category.label()),
        None => "Mixed profile".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
