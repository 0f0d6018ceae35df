// Engine context: one immutable snapshot of store, index and config.
//
// An `Engine` is built from a full dataset and never mutated afterwards.
// Reloading builds a new engine and swaps it into the `Session`; readers
// holding the previous `Arc<Engine>` finish against the old snapshot.

use crate::cancel::{CancellationToken, Cancelled};
use crate::clustering::{cluster_players, ClusterConfig, ClusteringOutcome};
use crate::config::{Config, NameResolution};
use crate::index::cache::{Clock, SystemClock};
use crate::index::QueryIndex;
use crate::ingest::Dataset;
use crate::metrics::{percentile_profile, PercentileProfile};
use crate::roles::{best_roles, find_role, rank_role, RoleScore};
use crate::similarity::{
    find_similar, MetricSelector, PositionMetrics, SimilarityOptions, SimilarityResult, StrengthMetrics,
};
use crate::store::entity::{Player, Shot, Team};
use crate::store::names::{ExactResolver, NameIndex, NameResolver, SubstringResolver};
use crate::store::position::PositionCategory;
use crate::store::{EntityStore, LoadReport};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::info;

// ---------------------------------------------------------------------------
// Name resolution chosen by config
// ---------------------------------------------------------------------------

/// The resolver selected by `[ingest] name_resolution`.
#[derive(Debug, Clone, Copy)]
pub enum ConfiguredResolver {
    Exact(ExactResolver),
    Substring(SubstringResolver),
}

impl ConfiguredResolver {
    pub fn from_config(config: &Config) -> Self {
        match config.ingest.name_resolution {
            NameResolution::Exact => ConfiguredResolver::Exact(ExactResolver),
            NameResolution::Substring => ConfiguredResolver::Substring(SubstringResolver {
                min_len: config.ingest.min_substring_len,
            }),
        }
    }
}

impl NameResolver for ConfiguredResolver {
    fn resolve<'a, I>(&self, query: &str, index: &'a NameIndex<I>) -> Option<&'a I> {
        match self {
            ConfiguredResolver::Exact(r) => r.resolve(query, index),
            ConfiguredResolver::Substring(r) => r.resolve(query, index),
        }
    }
}

// ---------------------------------------------------------------------------
// Output payloads
// ---------------------------------------------------------------------------

/// Shot totals for one player or team.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ShotSummary {
    pub shots: usize,
    pub goals: usize,
    pub on_target: usize,
    pub xg_total: f64,
    pub xg_per_shot: f64,
}

impl ShotSummary {
    pub fn from_shots(shots: &[&Shot]) -> Self {
        let xg_total: f64 = shots.iter().map(|s| s.xg).sum();
        ShotSummary {
            shots: shots.len(),
            goals: shots.iter().filter(|s| s.outcome.is_goal()).count(),
            on_target: shots.iter().filter(|s| s.outcome.is_on_target()).count(),
            xg_total,
            xg_per_shot: if shots.is_empty() {
                0.0
            } else {
                xg_total / shots.len() as f64
            },
        }
    }
}

/// Everything the report generator needs about one player.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerSnapshot {
    pub generated_at: DateTime<Utc>,
    pub player: Player,
    pub category: Option<PositionCategory>,
    pub percentiles: PercentileProfile,
    pub best_roles: Vec<RoleScore>,
    pub shots: ShotSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamReport {
    pub team: Team,
    pub players: Vec<String>,
    pub shots: ShotSummary,
    pub per_90_averages: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineSummary {
    pub loaded_at: DateTime<Utc>,
    pub players: usize,
    pub teams: usize,
    pub shots: usize,
    pub leagues: Vec<String>,
    pub rows_skipped: usize,
    pub ungrouped_players: usize,
    pub ungrouped_shots: usize,
    pub roles: usize,
    pub cached_aggregates: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Engine {
    config: Config,
    store: EntityStore,
    index: QueryIndex,
    report: LoadReport,
    resolver: ConfiguredResolver,
    loaded_at: DateTime<Utc>,
}

impl Engine {
    /// Build store and index from `dataset`, reading time from `clock`.
    pub fn build(dataset: &Dataset, config: Config, clock: Arc<dyn Clock>) -> Self {
        let resolver = ConfiguredResolver::from_config(&config);
        let (store, report) = EntityStore::load_with(&dataset.players, &dataset.teams, &dataset.shots, &resolver);
        let index = QueryIndex::build(&store, config.cache.ttl_secs, clock.clone());
        let loaded_at = clock.now();
        info!(
            "Engine ready: {} players, {} teams, {} shots",
            store.players().len(),
            store.teams().len(),
            store.shots().len()
        );
        Engine {
            config,
            store,
            index,
            report,
            resolver,
            loaded_at,
        }
    }

    /// Build with the wall clock.
    pub fn from_dataset(dataset: &Dataset, config: Config) -> Self {
        Self::build(dataset, config, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn index(&self) -> &QueryIndex {
        &self.index
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn summary(&self) -> EngineSummary {
        EngineSummary {
            loaded_at: self.loaded_at,
            players: self.store.players().len(),
            teams: self.store.teams().len(),
            shots: self.store.shots().len(),
            leagues: self.store.leagues(),
            rows_skipped: self.report.skipped.len(),
            ungrouped_players: self.index.ungrouped_players(&self.store).len(),
            ungrouped_shots: self.index.ungrouped_shots(&self.store).len(),
            roles: self.config.roles.len(),
            cached_aggregates: self.index.cached_aggregates(),
        }
    }

    // --- lookup ---

    /// Resolve a player by name with the configured strategy.
    pub fn find_player(&self, name: &str) -> Option<&Player> {
        self.store.find_player(name, &self.resolver)
    }

    pub fn find_team(&self, name: &str) -> Option<&Team> {
        self.store.find_team(name, &self.resolver)
    }

    pub fn search_players(&self, query: &str, limit: usize) -> Vec<&Player> {
        self.index.search_players(&self.store, query, limit)
    }

    pub fn search_teams(&self, query: &str, limit: usize) -> Vec<&Team> {
        self.index.search_teams(&self.store, query, limit)
    }

    pub fn search_leagues(&self, query: &str, limit: usize) -> Vec<&str> {
        self.index.search_leagues(query, limit)
    }

    // --- cohorts ---

    pub fn all_players(&self) -> Vec<&Player> {
        self.store.players().iter().collect()
    }

    /// Players with any position in the player's primary category; everyone when
    /// the player has no recognised position.
    pub fn position_cohort(&self, player: &Player) -> Vec<&Player> {
        match player.primary_category() {
            Some(category) => self.index.category_players(&self.store, category),
            None => self.all_players(),
        }
    }

    /// Metrics profiled for a player: the category list, or every metric.
    fn profile_metrics(&self, player: &Player) -> Vec<String> {
        let listed = player
            .primary_category()
            .map(|c| self.config.catalog.metrics_for(c).to_vec())
            .unwrap_or_default();
        if listed.is_empty() {
            self.store.metric_names()
        } else {
            listed
        }
    }

    // --- analyses ---

    pub fn percentile_profile(&self, player: &Player) -> PercentileProfile {
        percentile_profile(player, &self.position_cohort(player), &self.profile_metrics(player))
    }

    /// Every role the player is eligible for, scored against all players.
    pub fn best_roles(&self, player: &Player) -> Vec<RoleScore> {
        best_roles(player, &self.config.roles, &self.all_players())
    }

    /// All eligible players ranked for a named role; `None` for an unknown role.
    pub fn rank_role(&self, role_name: &str) -> Option<Vec<RoleScore>> {
        let role = find_role(&self.config.roles, role_name)?;
        Some(rank_role(role, &self.all_players()))
    }

    /// Default similarity options from config.
    pub fn similarity_options(&self) -> SimilarityOptions {
        SimilarityOptions::from_config(&self.config.similarity)
    }

    /// Players most like `player` over the whole store. `strengths` switches
    /// metric selection from the position list to the player's strongest
    /// metrics.
    pub fn similar(
        &self,
        player: &Player,
        options: &SimilarityOptions,
        strengths: bool,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<SimilarityResult>, Cancelled> {
        let pool = self.all_players();
        let by_strengths = StrengthMetrics::from_config(&self.config.similarity);
        let selector: &dyn MetricSelector = if strengths { &by_strengths } else { &PositionMetrics };
        find_similar(player, &pool, selector, &self.config.catalog, options, cancel)
    }

    /// Cluster players with at least the configured minimum minutes. With a
    /// category, only that category is clustered, on its own metric list.
    pub fn clusters(
        &self,
        category: Option<PositionCategory>,
        cancel: Option<&CancellationToken>,
    ) -> Result<ClusteringOutcome, Cancelled> {
        let min_minutes = self.config.similarity.min_minutes;
        let mut config = ClusterConfig::from(&self.config.clustering);
        let pool: Vec<&Player> = match category {
            Some(c) => {
                let listed = self.config.catalog.metrics_for(c);
                if !listed.is_empty() {
                    config.metrics = listed.to_vec();
                }
                self.index.category_players(&self.store, c)
            }
            None => self.all_players(),
        }
        .into_iter()
        .filter(|p| p.minutes_played() >= min_minutes)
        .collect();
        cluster_players(&pool, &config, cancel)
    }

    pub fn player_snapshot(&self, player: &Player) -> PlayerSnapshot {
        let shots = self.index.player_shots(&self.store, &player.id);
        PlayerSnapshot {
            generated_at: Utc::now(),
            player: player.clone(),
            category: player.primary_category(),
            percentiles: self.percentile_profile(player),
            best_roles: self.best_roles(player),
            shots: ShotSummary::from_shots(&shots),
        }
    }

    pub fn team_report(&self, team: &Team) -> TeamReport {
        let players = self.index.team_players(&self.store, &team.id);
        let shots = self.index.team_shots(&self.store, &team.id);
        TeamReport {
            team: team.clone(),
            players: players.iter().map(|p| p.name.clone()).collect(),
            shots: ShotSummary::from_shots(&shots),
            per_90_averages: self.index.team_averages(&self.store, &team.id).as_ref().clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Holder for the current engine snapshot. Loading swaps a new engine in
/// whole; there is no partial update.
#[derive(Debug, Default)]
pub struct Session {
    current: RwLock<Option<Arc<Engine>>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an engine from `dataset` and make it current.
    pub fn load(&self, dataset: &Dataset, config: Config, clock: Arc<dyn Clock>) -> Arc<Engine> {
        self.install(Engine::build(dataset, config, clock))
    }

    /// Make an already built engine current.
    pub fn install(&self, engine: Engine) -> Arc<Engine> {
        let engine = Arc::new(engine);
        let mut slot = self.current.write().unwrap_or_else(|p| p.into_inner());
        *slot = Some(engine.clone());
        engine
    }

    /// Drop the current engine. Readers already holding it are unaffected.
    pub fn reset(&self) {
        let mut slot = self.current.write().unwrap_or_else(|p| p.into_inner());
        *slot = None;
    }

    pub fn current(&self) -> Option<Arc<Engine>> {
        self.current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
