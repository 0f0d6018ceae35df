// Secondary lookup tables over an entity store.
//
// A `QueryIndex` is built in full from one `EntityStore` and is only valid
// for that store: every table holds positions into the store's vectors. It
// is rebuilt whenever the store is, never patched.

pub mod cache;

use crate::store::entity::{Player, PlayerId, Shot, Team, TeamId};
use crate::store::names::normalize_name;
use crate::store::position::PositionCategory;
use crate::store::EntityStore;
use cache::{Clock, TtlCache};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Averaged per-90 metrics, shared between cache and callers.
pub type Averages = Arc<BTreeMap<String, f64>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum AggregateKey {
    Team(TeamId),
    League(String),
}

#[derive(Debug, Clone, Default)]
struct TeamEntry {
    players: Vec<usize>,
    shots: Vec<usize>,
}

/// Everything indexed under one team.
#[derive(Debug, Clone)]
pub struct TeamView<'s> {
    pub team: &'s Team,
    pub players: Vec<&'s Player>,
    pub shots: Vec<&'s Shot>,
}

#[derive(Debug)]
pub struct QueryIndex {
    by_team: HashMap<TeamId, TeamEntry>,
    /// league -> team names, from both team rows and player rows.
    by_league: BTreeMap<String, BTreeSet<String>>,
    league_players: HashMap<String, Vec<usize>>,
    by_position: HashMap<String, Vec<usize>>,
    by_category: HashMap<PositionCategory, Vec<usize>>,
    player_shots: HashMap<PlayerId, Vec<usize>>,
    ungrouped_players: Vec<usize>,
    ungrouped_shots: Vec<usize>,
    // Sorted (normalized name, position) lists for search.
    player_names: Vec<(String, usize)>,
    team_names: Vec<(String, usize)>,
    league_names: Vec<(String, String)>,
    aggregates: TtlCache<AggregateKey, Averages>,
}

impl QueryIndex {
    pub fn build(store: &EntityStore, ttl_secs: u64, clock: Arc<dyn Clock>) -> Self {
        let mut by_team: HashMap<TeamId, TeamEntry> = store
            .teams()
            .iter()
            .map(|t| (t.id.clone(), TeamEntry::default()))
            .collect();
        let mut by_league: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut league_players: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_position: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_category: HashMap<PositionCategory, Vec<usize>> = HashMap::new();
        let mut player_shots: HashMap<PlayerId, Vec<usize>> = HashMap::new();
        let mut ungrouped_players = Vec::new();
        let mut ungrouped_shots = Vec::new();

        for team in store.teams() {
            if !team.league.is_empty() {
                by_league
                    .entry(team.league.clone())
                    .or_default()
                    .insert(team.name.clone());
            }
        }

        for (i, player) in store.players().iter().enumerate() {
            match &player.team_id {
                Some(team) => by_team.entry(team.clone()).or_default().players.push(i),
                None => ungrouped_players.push(i),
            }
            if !player.league.is_empty() {
                by_league
                    .entry(player.league.clone())
                    .or_default()
                    .insert(player.team_name.clone());
                league_players.entry(player.league.clone()).or_default().push(i);
            }
            for code in &player.positions {
                let bucket = by_position.entry(code.clone()).or_default();
                if !bucket.contains(&i) {
                    bucket.push(i);
                }
            }
            for category in player.categories() {
                by_category.entry(category).or_default().push(i);
            }
        }

        for (i, shot) in store.shots().iter().enumerate() {
            match &shot.team_id {
                Some(team) => by_team.entry(team.clone()).or_default().shots.push(i),
                None => ungrouped_shots.push(i),
            }
            if let Some(player) = &shot.player_id {
                player_shots.entry(player.clone()).or_default().push(i);
            }
        }

        let mut player_names: Vec<(String, usize)> = store
            .players()
            .iter()
            .enumerate()
            .map(|(i, p)| (p.normalized_name.clone(), i))
            .collect();
        player_names.sort();
        let mut team_names: Vec<(String, usize)> = store
            .teams()
            .iter()
            .enumerate()
            .map(|(i, t)| (t.normalized_name.clone(), i))
            .collect();
        team_names.sort();
        let mut league_names: Vec<(String, String)> = by_league
            .keys()
            .map(|l| (normalize_name(l), l.clone()))
            .collect();
        league_names.sort();

        debug!(
            "Query index built: {} teams, {} leagues, {} position codes, {} ungrouped players",
            by_team.len(),
            by_league.len(),
            by_position.len(),
            ungrouped_players.len()
        );

        QueryIndex {
            by_team,
            by_league,
            league_players,
            by_position,
            by_category,
            player_shots,
            ungrouped_players,
            ungrouped_shots,
            player_names,
            team_names,
            league_names,
            aggregates: TtlCache::with_ttl_secs(ttl_secs, clock),
        }
    }

    // --- team ---

    pub fn team_view<'s>(&self, store: &'s EntityStore, team: &TeamId) -> Option<TeamView<'s>> {
        let team_ref = store.team(team)?;
        let entry = self.by_team.get(team);
        Some(TeamView {
            team: team_ref,
            players: entry.map(|e| players_at(store, &e.players)).unwrap_or_default(),
            shots: entry.map(|e| shots_at(store, &e.shots)).unwrap_or_default(),
        })
    }

    pub fn team_players<'s>(&self, store: &'s EntityStore, team: &TeamId) -> Vec<&'s Player> {
        self.by_team
            .get(team)
            .map(|e| players_at(store, &e.players))
            .unwrap_or_default()
    }

    pub fn team_shots<'s>(&self, store: &'s EntityStore, team: &TeamId) -> Vec<&'s Shot> {
        self.by_team
            .get(team)
            .map(|e| shots_at(store, &e.shots))
            .unwrap_or_default()
    }

    // --- league ---

    /// Team names seen in a league, sorted.
    pub fn league_teams(&self, league: &str) -> Vec<&str> {
        self.by_league
            .get(league)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn leagues(&self) -> impl Iterator<Item = &str> {
        self.by_league.keys().map(String::as_str)
    }

    pub fn league_players<'s>(&self, store: &'s EntityStore, league: &str) -> Vec<&'s Player> {
        self.league_players
            .get(league)
            .map(|v| players_at(store, v))
            .unwrap_or_default()
    }

    // --- position ---

    /// Players listing `code` among their positions (case-insensitive).
    pub fn position_players<'s>(&self, store: &'s EntityStore, code: &str) -> Vec<&'s Player> {
        self.by_position
            .get(&code.trim().to_ascii_uppercase())
            .map(|v| players_at(store, v))
            .unwrap_or_default()
    }

    /// Players with any listed code in `category`.
    pub fn category_players<'s>(
        &self,
        store: &'s EntityStore,
        category: PositionCategory,
    ) -> Vec<&'s Player> {
        self.by_category
            .get(&category)
            .map(|v| players_at(store, v))
            .unwrap_or_default()
    }

    // --- player ---

    pub fn player_shots<'s>(&self, store: &'s EntityStore, player: &PlayerId) -> Vec<&'s Shot> {
        self.player_shots
            .get(player)
            .map(|v| shots_at(store, v))
            .unwrap_or_default()
    }

    // --- ungrouped ---

    /// Players whose team could not be resolved.
    pub fn ungrouped_players<'s>(&self, store: &'s EntityStore) -> Vec<&'s Player> {
        players_at(store, &self.ungrouped_players)
    }

    /// Shots with no resolved team.
    pub fn ungrouped_shots<'s>(&self, store: &'s EntityStore) -> Vec<&'s Shot> {
        shots_at(store, &self.ungrouped_shots)
    }

    // --- search ---

    /// Players whose normalized name starts with, then contains, the
    /// normalized query. Alphabetical within each group; at most `limit`.
    pub fn search_players<'s>(&self, store: &'s EntityStore, query: &str, limit: usize) -> Vec<&'s Player> {
        let players = store.players();
        search_sorted(&self.player_names, query, limit)
            .into_iter()
            .filter_map(|&i| players.get(i))
            .collect()
    }

    pub fn search_teams<'s>(&self, store: &'s EntityStore, query: &str, limit: usize) -> Vec<&'s Team> {
        let teams = store.teams();
        search_sorted(&self.team_names, query, limit)
            .into_iter()
            .filter_map(|&i| teams.get(i))
            .collect()
    }

    pub fn search_leagues(&self, query: &str, limit: usize) -> Vec<&str> {
        search_sorted(&self.league_names, query, limit)
            .into_iter()
            .map(String::as_str)
            .collect()
    }

    // --- cached aggregates ---

    /// Mean of every per-90 metric over a team's players. Cached for the
    /// configured TTL.
    pub fn team_averages(&self, store: &EntityStore, team: &TeamId) -> Averages {
        self.aggregates
            .get_or_compute(AggregateKey::Team(team.clone()), || {
                Arc::new(per_90_averages(&self.team_players(store, team)))
            })
    }

    /// Mean of every per-90 metric over a league's players. Cached for the
    /// configured TTL.
    pub fn league_averages(&self, store: &EntityStore, league: &str) -> Averages {
        self.aggregates
            .get_or_compute(AggregateKey::League(league.to_string()), || {
                Arc::new(per_90_averages(&self.league_players(store, league)))
            })
    }

    /// Aggregates currently held by the cache, fresh or not.
    pub fn cached_aggregates(&self) -> usize {
        self.aggregates.len()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn players_at<'s>(store: &'s EntityStore, positions: &[usize]) -> Vec<&'s Player> {
    let players = store.players();
    positions.iter().filter_map(|&i| players.get(i)).collect()
}

fn shots_at<'s>(store: &'s EntityStore, positions: &[usize]) -> Vec<&'s Shot> {
    let shots = store.shots();
    positions.iter().filter_map(|&i| shots.get(i)).collect()
}

/// Prefix matches first, then substring matches, each in list order.
fn search_sorted<'a, T>(names: &'a [(String, T)], query: &str, limit: usize) -> Vec<&'a T> {
    let q = normalize_name(query);
    if q.is_empty() || limit == 0 {
        return Vec::new();
    }
    let prefix = names.iter().filter(|(n, _)| n.starts_with(&q));
    let inner = names
        .iter()
        .filter(|(n, _)| !n.starts_with(&q) && n.contains(&q));
    prefix.chain(inner).take(limit).map(|(_, v)| v).collect()
}

/// Whether a metric column is a per-90 rate, e.g. `"xG per 90"`.
pub fn is_per_90(metric: &str) -> bool {
    let m = metric.to_ascii_lowercase();
    m.contains("per 90") || m.ends_with("/90") || m.ends_with("p90")
}

fn per_90_averages(players: &[&Player]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, f64> = BTreeMap::new();
    if players.is_empty() {
        return sums;
    }
    for player in players {
        for (metric, value) in player.metrics.iter().filter(|(k, _)| is_per_90(k)) {
            *sums.entry(metric.clone()).or_default() += value;
        }
    }
    let n = players.len() as f64;
    for value in sums.values_mut() {
        *value /= n;
    }
    sums
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cache::ManualClock;
    use crate::ingest::{Cell, RawRow};
    use chrono::Duration;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn row(cells: &[(&str, Cell)]) -> RawRow {
        cells.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn text(s: &str) -> Cell {
        Cell::Text(s.into())
    }

    fn player_row(name: &str, team: &str, pos: &str, league: &str, goals: f64) -> RawRow {
        row(&[
            ("Player", text(name)),
            ("Team", text(team)),
            ("Position", text(pos)),
            ("League", text(league)),
            ("Minutes played", Cell::Number(900.0)),
            ("Goals per 90", Cell::Number(goals)),
            ("Duels won, %", Cell::Number(50.0)),
        ])
    }

    fn fixture() -> EntityStore {
        let players = vec![
            player_row("Alan Smith", "Leeds", "CF", "Championship", 0.4),
            player_row("Alex Smithers", "Leeds", "LWF, CF", "Championship", 0.2),
            player_row("Bo Kasmith", "Hull", "GK", "Championship", 0.0),
            player_row("Smithy Jones", "Wanderers", "CB", "League Two", 0.1),
        ];
        let teams = vec![
            row(&[("team", text("Leeds")), ("league", text("Championship")), ("season", text("2024"))]),
            row(&[("team", text("Hull")), ("league", text("Championship")), ("season", text("2024"))]),
        ];
        let shots = vec![
            row(&[("player", text("Alan Smith")), ("team", text("Leeds")), ("xG", Cell::Number(0.3)), ("minute", Cell::Number(12.0))]),
            row(&[("player", text("Nobody")), ("team", text("Nowhere")), ("xG", Cell::Number(0.1)), ("minute", Cell::Number(80.0))]),
        ];
        let (store, _) = EntityStore::load(&players, &teams, &shots);
        store
    }

    fn index(store: &EntityStore) -> (QueryIndex, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (QueryIndex::build(store, 300, clock.clone()), clock)
    }

    fn names(players: &[&Player]) -> Vec<String> {
        players.iter().map(|p| p.name.clone()).collect()
    }

    #[test]
    fn team_index_groups_players_and_shots() {
        let store = fixture();
        let (idx, _) = index(&store);
        let leeds = store.team_by_name("Leeds").unwrap();
        let view = idx.team_view(&store, &leeds.id).unwrap();
        assert_eq!(names(&view.players), vec!["Alan Smith", "Alex Smithers"]);
        assert_eq!(view.shots.len(), 1);
        assert_eq!(idx.team_players(&store, &leeds.id).len(), 2);
    }

    #[test]
    fn unresolved_references_land_in_ungrouped() {
        let store = fixture();
        let (idx, _) = index(&store);
        assert_eq!(names(&idx.ungrouped_players(&store)), vec!["Smithy Jones"]);
        assert_eq!(idx.ungrouped_shots(&store).len(), 1);
    }

    #[test]
    fn league_index_collects_team_names() {
        let store = fixture();
        let (idx, _) = index(&store);
        assert_eq!(idx.league_teams("Championship"), vec!["Hull", "Leeds"]);
        assert_eq!(idx.league_teams("League Two"), vec!["Wanderers"]);
        assert!(idx.league_teams("Serie A").is_empty());
        assert_eq!(idx.leagues().collect::<Vec<_>>(), vec!["Championship", "League Two"]);
    }

    #[test]
    fn position_index_keys_every_listed_code() {
        let store = fixture();
        let (idx, _) = index(&store);
        assert_eq!(names(&idx.position_players(&store, "cf")), vec!["Alan Smith", "Alex Smithers"]);
        assert_eq!(names(&idx.position_players(&store, "LWF")), vec!["Alex Smithers"]);
        assert_eq!(
            names(&idx.category_players(&store, PositionCategory::Goalkeeper)),
            vec!["Bo Kasmith"]
        );
    }

    #[test]
    fn search_ranks_prefix_before_substring() {
        let store = fixture();
        let (idx, _) = index(&store);
        let hits = idx.search_players(&store, "smith", 10);
        assert_eq!(
            names(&hits),
            vec!["Smithy Jones", "Alan Smith", "Alex Smithers", "Bo Kasmith"]
        );

        let hits = idx.search_players(&store, "SMITH", 2);
        assert_eq!(names(&hits), vec!["Smithy Jones", "Alan Smith"]);
    }

    #[test]
    fn search_honours_limit_and_empty_query() {
        let store = fixture();
        let (idx, _) = index(&store);
        assert_eq!(idx.search_players(&store, "a", 2).len(), 2);
        assert!(idx.search_players(&store, "   ", 10).is_empty());
        assert_eq!(idx.search_teams(&store, "ee", 5)[0].name, "Leeds");
        assert_eq!(idx.search_leagues("league", 5), vec!["League Two"]);
    }

    #[test]
    fn team_averages_cover_per_90_metrics_only() {
        let store = fixture();
        let (idx, _) = index(&store);
        let leeds = store.team_by_name("Leeds").unwrap();
        let avg = idx.team_averages(&store, &leeds.id);
        assert!(approx_eq(avg["Goals per 90"], 0.3, 1e-12));
        assert!(!avg.contains_key("Duels won, %"));
        assert!(!avg.contains_key("Minutes played"));
    }

    #[test]
    fn aggregates_are_cached_until_ttl() {
        let store = fixture();
        let (idx, clock) = index(&store);
        let first = idx.league_averages(&store, "Championship");
        let second = idx.league_averages(&store, "Championship");
        assert!(Arc::ptr_eq(&first, &second));

        assert_eq!(idx.cached_aggregates(), 1);

        clock.advance(Duration::seconds(301));
        let third = idx.league_averages(&store, "Championship");
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(*first, *third);

        // A later miss drops the expired entry for another key.
        let leeds = store.team_by_name("Leeds").unwrap();
        idx.team_averages(&store, &leeds.id);
        clock.advance(Duration::seconds(301));
        idx.league_averages(&store, "League Two");
        assert_eq!(idx.cached_aggregates(), 1);
    }

    #[test]
    fn per_90_detection() {
        assert!(is_per_90("xG per 90"));
        assert!(is_per_90("npxG/90"));
        assert!(!is_per_90("Accurate passes, %"));
    }
}
