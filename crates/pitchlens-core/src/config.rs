// Configuration loading and parsing (engine.toml, roles.toml).

use crate::roles::RoleDefinition;
use crate::store::position::PositionCategory;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config files compiled into the crate. `ensure_config_files`
/// writes these into `config/` when missing; `Config::builtin` parses them.
const DEFAULT_FILES: &[(&str, &str)] = &[
    ("engine.toml", include_str!("../defaults/engine.toml")),
    ("roles.toml", include_str!("../defaults/roles.toml")),
];

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub ingest: IngestConfig,
    pub cache: CacheConfig,
    pub similarity: SimilarityConfig,
    pub clustering: ClusteringConfig,
    pub data_paths: DataPaths,
    pub catalog: MetricCatalog,
    pub roles: Vec<RoleDefinition>,
}

// ---------------------------------------------------------------------------
// engine.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire engine.toml file.
#[derive(Debug, Clone, Deserialize)]
struct EngineFile {
    ingest: IngestConfig,
    cache: CacheConfig,
    similarity: SimilarityConfig,
    clustering: ClusteringConfig,
    data_paths: DataPaths,
    /// category -> metric names
    metric_categories: BTreeMap<String, Vec<String>>,
    category_weights: BTreeMap<String, f64>,
    /// position category name -> metric names
    position_metrics: BTreeMap<String, Vec<String>>,
}

/// How cross-source names are matched at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameResolution {
    Exact,
    Substring,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    pub name_resolution: NameResolution,
    pub min_substring_len: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimilarityConfig {
    pub min_minutes: f64,
    /// Empirical scaling constant in the distance -> score conversion.
    pub spread_factor: f64,
    pub default_limit: usize,
    pub strengths_top_n: usize,
    pub strengths_min_percentile: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusteringConfig {
    pub k: usize,
    pub max_iterations: usize,
    pub seed: u64,
    pub label_percentile: u8,
    pub max_label_metrics: usize,
    pub metrics: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    pub players: String,
    #[serde(default)]
    pub teams: Option<String>,
    #[serde(default)]
    pub shots: Option<String>,
}

/// Metric metadata: category membership, category weights, and the metric
/// list compared for each position category.
#[derive(Debug, Clone, Default)]
pub struct MetricCatalog {
    metric_category: BTreeMap<String, String>,
    category_weights: BTreeMap<String, f64>,
    position_metrics: BTreeMap<PositionCategory, Vec<String>>,
}

impl MetricCatalog {
    pub fn category_of(&self, metric: &str) -> Option<&str> {
        self.metric_category.get(metric).map(String::as_str)
    }

    /// Weight of the metric's category, or 1 when uncategorized.
    pub fn weight_for(&self, metric: &str) -> f64 {
        self.category_of(metric)
            .and_then(|c| self.category_weights.get(c))
            .copied()
            .unwrap_or(1.0)
    }

    /// Metrics compared for a position category; empty when unconfigured.
    pub fn metrics_for(&self, category: PositionCategory) -> &[String] {
        self.position_metrics
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Union of every position list, sorted.
    pub fn all_position_metrics(&self) -> Vec<String> {
        self.position_metrics
            .values()
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// roles.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct RolesFile {
    #[serde(default)]
    role: Vec<RoleDefinition>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

impl Config {
    /// Parse the default files compiled into the crate.
    pub fn builtin() -> Result<Config, ConfigError> {
        let engine = DEFAULT_FILES[0].1;
        let roles = DEFAULT_FILES[1].1;
        assemble(
            parse(engine, Path::new("<builtin>/engine.toml"))?,
            parse(roles, Path::new("<builtin>/roles.toml"))?,
        )
    }
}

/// Load and validate configuration from `config/engine.toml` and
/// `config/roles.toml`, relative to `base_dir`.
///
/// This is the lower-level loading primitive that does not write defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    let engine_path = config_dir.join("engine.toml");
    let engine: EngineFile = parse(&read_file(&engine_path)?, &engine_path)?;

    let roles_path = config_dir.join("roles.toml");
    let roles: RolesFile = parse(&read_file(&roles_path)?, &roles_path)?;

    assemble(engine, roles)
}

/// Ensure all config files exist by writing missing ones from the compiled
/// defaults. Returns the list of files that were created.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let config_dir = base_dir.join("config");
    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut created = Vec::new();
    for (file_name, content) in DEFAULT_FILES {
        let target = config_dir.join(file_name);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                std::io::Write::write_all(&mut dest, content.as_bytes()).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                created.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // Keep the user's edited copy.
            }
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(created)
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are written before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn parse<T: serde::de::DeserializeOwned>(text: &str, path: &Path) -> Result<T, ConfigError> {
    toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn assemble(engine: EngineFile, roles: RolesFile) -> Result<Config, ConfigError> {
    let mut metric_category = BTreeMap::new();
    for (category, metrics) in &engine.metric_categories {
        for metric in metrics {
            if let Some(prev) = metric_category.insert(metric.clone(), category.clone()) {
                return Err(ConfigError::ValidationError {
                    field: format!("metric_categories.{category}"),
                    message: format!("metric `{metric}` already belongs to `{prev}`"),
                });
            }
        }
    }

    let mut position_metrics = BTreeMap::new();
    for (name, metrics) in engine.position_metrics {
        let category = PositionCategory::from_name(&name).ok_or_else(|| {
            ConfigError::ValidationError {
                field: format!("position_metrics.{name}"),
                message: "unknown position category".into(),
            }
        })?;
        position_metrics.insert(category, metrics);
    }

    let config = Config {
        ingest: engine.ingest,
        cache: engine.cache,
        similarity: engine.similarity,
        clustering: engine.clustering,
        data_paths: engine.data_paths,
        catalog: MetricCatalog {
            metric_category,
            category_weights: engine.category_weights,
            position_metrics,
        },
        roles: roles.role,
    };

    validate(&config)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.ingest.min_substring_len == 0 {
        return Err(invalid("ingest.min_substring_len", "must be > 0"));
    }

    if config.cache.ttl_secs == 0 {
        return Err(invalid("cache.ttl_secs", "must be > 0"));
    }

    let sim = &config.similarity;
    if !(sim.spread_factor.is_finite() && sim.spread_factor > 0.0) {
        return Err(invalid(
            "similarity.spread_factor",
            format!("must be a positive number, got {}", sim.spread_factor),
        ));
    }
    if !(sim.min_minutes.is_finite() && sim.min_minutes >= 0.0) {
        return Err(invalid(
            "similarity.min_minutes",
            format!("must be >= 0, got {}", sim.min_minutes),
        ));
    }
    if sim.default_limit == 0 {
        return Err(invalid("similarity.default_limit", "must be > 0"));
    }
    if sim.strengths_top_n == 0 {
        return Err(invalid("similarity.strengths_top_n", "must be > 0"));
    }
    if sim.strengths_min_percentile > 100 {
        return Err(invalid("similarity.strengths_min_percentile", "must be <= 100"));
    }

    let cl = &config.clustering;
    if cl.k == 0 {
        return Err(invalid("clustering.k", "must be > 0"));
    }
    if cl.max_iterations == 0 {
        return Err(invalid("clustering.max_iterations", "must be > 0"));
    }
    if cl.label_percentile > 100 {
        return Err(invalid("clustering.label_percentile", "must be <= 100"));
    }

    for (category, weight) in &config.catalog.category_weights {
        if !(weight.is_finite() && *weight >= 0.0) {
            return Err(invalid(
                &format!("category_weights.{category}"),
                format!("must be >= 0, got {weight}"),
            ));
        }
    }

    let mut names = HashSet::new();
    for role in &config.roles {
        let field = format!("role.{}", role.name);
        if role.name.trim().is_empty() {
            return Err(invalid("role.name", "must not be empty"));
        }
        if !names.insert(role.name.to_lowercase()) {
            return Err(invalid(&field, "duplicate role name"));
        }
        if role.positions.is_empty() {
            return Err(invalid(&field, "must list at least one position"));
        }
        if role.weights.is_empty() {
            return Err(invalid(&field, "must weight at least one metric"));
        }
        if let Some((metric, w)) = role.weights.iter().find(|(_, w)| !w.is_finite()) {
            return Err(invalid(&field, format!("weight for `{metric}` is not finite: {w}")));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
