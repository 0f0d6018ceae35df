// Entity store: normalizes raw player, team and shot rows into canonical
// entities and resolves the cross-references between them.
//
// Load order matters: teams are indexed first so player rows can resolve
// their team, then players so shot rows can resolve their shooter.

pub mod entity;
pub mod names;
pub mod position;

use crate::ingest::{field, number_field, text_field, Cell, RawRow};
use entity::{
    BodyPart, Player, PlayerId, PlayerProfile, Shot, ShotId, ShotOutcome, ShotSituation, Team,
    TeamId,
};
use names::{normalize_name, slug, ExactResolver, NameIndex, NameResolver, SubstringResolver};
use position::parse_position_codes;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Column vocabulary
// ---------------------------------------------------------------------------

const PLAYER_NAME: &[&str] = &["Player", "player", "Name", "player_name"];
const PLAYER_TEAM: &[&str] = &["Team", "team", "Squad", "Club"];
const PLAYER_POSITION: &[&str] = &["Position", "Pos", "position"];
const PLAYER_LEAGUE: &[&str] = &["League", "league", "Competition", "Comp"];

/// Player columns that are never metrics: identity, text and profile fields.
const PLAYER_NON_METRIC: &[&str] = &[
    "player",
    "name",
    "player_name",
    "team",
    "squad",
    "club",
    "team within selected timeframe",
    "position",
    "pos",
    "league",
    "competition",
    "comp",
    "age",
    "height",
    "weight",
    "foot",
    "market value",
    "contract expires",
    "on loan",
    "birth country",
    "passport country",
    "minutes played",
    "matches played",
];

const TEAM_NAME: &[&str] = &["team", "Team", "Squad", "title"];
const TEAM_LEAGUE: &[&str] = &["league", "League", "Competition"];
const TEAM_SEASON: &[&str] = &["season", "Season", "year"];
const TEAM_NON_METRIC: &[&str] = &["team", "squad", "title", "league", "competition", "season", "year", "id"];

const SHOT_ID: &[&str] = &["id", "ID", "shot_id"];
const SHOT_PLAYER: &[&str] = &["player", "Player", "player_name"];
const SHOT_TEAM: &[&str] = &["team", "Team", "squad"];

// ---------------------------------------------------------------------------
// Load report
// ---------------------------------------------------------------------------

/// Which input collection a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowSource {
    Player,
    Team,
    Shot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    MissingField(String),
    Duplicate(String),
}

/// A dropped input row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    pub source: RowSource,
    /// Zero-based position in the input slice.
    pub row: usize,
    pub reason: SkipReason,
}

/// Outcome of a load: what was built, what was dropped, what did not resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub players_loaded: usize,
    pub teams_loaded: usize,
    pub shots_loaded: usize,
    pub skipped: Vec<SkippedRow>,
    pub unresolved_player_teams: usize,
    pub unresolved_shot_players: usize,
    pub unresolved_shot_teams: usize,
}

impl LoadReport {
    fn skip(&mut self, source: RowSource, row: usize, reason: SkipReason) {
        warn!("skipping {:?} row {}: {:?}", source, row, reason);
        self.skipped.push(SkippedRow { source, row, reason });
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Immutable snapshot of every entity from one data load.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    players: Vec<Player>,
    teams: Vec<Team>,
    shots: Vec<Shot>,
    player_pos: HashMap<PlayerId, usize>,
    team_pos: HashMap<TeamId, usize>,
    shot_pos: HashMap<ShotId, usize>,
    player_names: NameIndex<usize>,
    team_names: NameIndex<usize>,
}

impl EntityStore {
    /// Build a store using substring-fallback name resolution.
    pub fn load(players: &[RawRow], teams: &[RawRow], shots: &[RawRow]) -> (Self, LoadReport) {
        Self::load_with(players, teams, shots, &SubstringResolver::default())
    }

    /// Build a store, resolving cross-references with `resolver`.
    pub fn load_with<R: NameResolver>(
        player_rows: &[RawRow],
        team_rows: &[RawRow],
        shot_rows: &[RawRow],
        resolver: &R,
    ) -> (Self, LoadReport) {
        let mut report = LoadReport::default();

        // --- teams ---
        let teams = build_teams(team_rows, &mut report);
        let team_names = NameIndex::build(
            teams
                .iter()
                .enumerate()
                .map(|(i, t)| (t.normalized_name.clone(), i)),
        );

        // --- players ---
        // Team references are exact on the normalized name; only shooters
        // get the fuzzy fallback.
        let mut players = build_players(player_rows, &mut report);
        for player in &mut players {
            let key = normalize_name(&player.team_name);
            match ExactResolver.resolve(&key, &team_names) {
                Some(&i) => player.team_id = Some(teams[i].id.clone()),
                None => {
                    debug!("no team row for '{}' ({})", player.team_name, player.name);
                    report.unresolved_player_teams += 1;
                }
            }
        }
        fill_missing_metrics(&mut players);

        let player_names = NameIndex::build(
            players
                .iter()
                .enumerate()
                .map(|(i, p)| (p.normalized_name.clone(), i)),
        );

        // --- shots ---
        let shots = build_shots(
            shot_rows,
            &players,
            &teams,
            &player_names,
            &team_names,
            resolver,
            &mut report,
        );

        report.players_loaded = players.len();
        report.teams_loaded = teams.len();
        report.shots_loaded = shots.len();
        info!(
            "Entity store built: {} players, {} teams, {} shots ({} rows skipped)",
            report.players_loaded,
            report.teams_loaded,
            report.shots_loaded,
            report.skipped.len()
        );
        if report.unresolved_player_teams > 0 || report.unresolved_shot_players > 0 {
            warn!(
                "{} players without a team row, {} shots without a player, {} shots without a team",
                report.unresolved_player_teams,
                report.unresolved_shot_players,
                report.unresolved_shot_teams
            );
        }

        let player_pos = players.iter().enumerate().map(|(i, p)| (p.id.clone(), i)).collect();
        let team_pos = teams.iter().enumerate().map(|(i, t)| (t.id.clone(), i)).collect();
        let shot_pos = shots.iter().enumerate().map(|(i, s)| (s.id.clone(), i)).collect();

        let store = EntityStore {
            players,
            teams,
            shots,
            player_pos,
            team_pos,
            shot_pos,
            player_names,
            team_names,
        };
        (store, report)
    }

    // --- by id ---

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.player_pos.get(id).map(|&i| &self.players[i])
    }

    pub fn team(&self, id: &TeamId) -> Option<&Team> {
        self.team_pos.get(id).map(|&i| &self.teams[i])
    }

    pub fn shot(&self, id: &ShotId) -> Option<&Shot> {
        self.shot_pos.get(id).map(|&i| &self.shots[i])
    }

    // --- by name ---

    /// Exact lookup on the normalized form of `name`.
    pub fn player_by_name(&self, name: &str) -> Option<&Player> {
        self.player_names
            .get(&normalize_name(name))
            .map(|&i| &self.players[i])
    }

    pub fn team_by_name(&self, name: &str) -> Option<&Team> {
        self.team_names
            .get(&normalize_name(name))
            .map(|&i| &self.teams[i])
    }

    /// Lookup through a resolution strategy, e.g. substring fallback.
    pub fn find_player<R: NameResolver>(&self, name: &str, resolver: &R) -> Option<&Player> {
        resolver
            .resolve(&normalize_name(name), &self.player_names)
            .map(|&i| &self.players[i])
    }

    pub fn find_team<R: NameResolver>(&self, name: &str, resolver: &R) -> Option<&Team> {
        resolver
            .resolve(&normalize_name(name), &self.team_names)
            .map(|&i| &self.teams[i])
    }

    // --- collections ---

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn shots(&self) -> &[Shot] {
        &self.shots
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty() && self.teams.is_empty() && self.shots.is_empty()
    }

    // --- cross-references (linear scans; the query index has O(1) versions) ---

    pub fn team_players(&self, team: &TeamId) -> Vec<&Player> {
        self.players
            .iter()
            .filter(|p| p.team_id.as_ref() == Some(team))
            .collect()
    }

    pub fn team_shots(&self, team: &TeamId) -> Vec<&Shot> {
        self.shots
            .iter()
            .filter(|s| s.team_id.as_ref() == Some(team))
            .collect()
    }

    pub fn player_shots(&self, player: &PlayerId) -> Vec<&Shot> {
        self.shots
            .iter()
            .filter(|s| s.player_id.as_ref() == Some(player))
            .collect()
    }

    /// Distinct non-blank leagues across players and teams, sorted.
    pub fn leagues(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self
            .players
            .iter()
            .map(|p| p.league.as_str())
            .chain(self.teams.iter().map(|t| t.league.as_str()))
            .filter(|l| !l.is_empty())
            .collect();
        set.into_iter().map(str::to_string).collect()
    }

    /// Every player metric name, sorted.
    pub fn metric_names(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self.players.iter().flat_map(|p| p.metrics.keys()).collect();
        set.into_iter().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Row builders
// ---------------------------------------------------------------------------

fn build_teams(rows: &[RawRow], report: &mut LoadReport) -> Vec<Team> {
    let mut teams = Vec::with_capacity(rows.len());
    let mut seen: HashSet<TeamId> = HashSet::new();

    for (i, row) in rows.iter().enumerate() {
        let Some(name) = text_field(row, TEAM_NAME) else {
            report.skip(RowSource::Team, i, SkipReason::MissingField("team".into()));
            continue;
        };
        let league = text_field(row, TEAM_LEAGUE).unwrap_or_default();
        let season = text_field(row, TEAM_SEASON).unwrap_or_default();
        let id = TeamId(format!("t:{}:{}:{}", slug(&name), slug(&league), slug(&season)));
        if !seen.insert(id.clone()) {
            report.skip(RowSource::Team, i, SkipReason::Duplicate(id.0));
            continue;
        }

        teams.push(Team {
            id,
            normalized_name: normalize_name(&name),
            name,
            league,
            season,
            stats: numeric_columns(row, TEAM_NON_METRIC),
        });
    }
    teams
}

fn build_players(rows: &[RawRow], report: &mut LoadReport) -> Vec<Player> {
    let mut players = Vec::with_capacity(rows.len());
    let mut seen: HashSet<PlayerId> = HashSet::new();

    for (i, row) in rows.iter().enumerate() {
        let Some(name) = text_field(row, PLAYER_NAME) else {
            report.skip(RowSource::Player, i, SkipReason::MissingField("Player".into()));
            continue;
        };
        let Some(team_name) = text_field(row, PLAYER_TEAM) else {
            report.skip(RowSource::Player, i, SkipReason::MissingField("Team".into()));
            continue;
        };
        let league = text_field(row, PLAYER_LEAGUE).unwrap_or_default();
        let id = PlayerId(format!("p:{}:{}:{}", slug(&name), slug(&team_name), slug(&league)));
        if !seen.insert(id.clone()) {
            report.skip(RowSource::Player, i, SkipReason::Duplicate(id.0));
            continue;
        }

        let position = text_field(row, PLAYER_POSITION).unwrap_or_default();
        players.push(Player {
            id,
            normalized_name: normalize_name(&name),
            name,
            team_name,
            team_id: None,
            positions: parse_position_codes(&position),
            position,
            league,
            profile: parse_profile(row),
            metrics: numeric_columns(row, PLAYER_NON_METRIC),
        });
    }
    players
}

fn parse_profile(row: &RawRow) -> PlayerProfile {
    PlayerProfile {
        age: number_field(row, &["Age"]),
        height_cm: number_field(row, &["Height"]),
        weight_kg: number_field(row, &["Weight"]),
        foot: text_field(row, &["Foot"]),
        market_value: number_field(row, &["Market value"]),
        contract_expires: text_field(row, &["Contract expires"]),
        on_loan: field(row, &["On loan"]).and_then(Cell::as_bool),
        birth_country: text_field(row, &["Birth country"]),
        passport_country: text_field(row, &["Passport country"]),
        minutes_played: number_field(row, &["Minutes played", "Minutes"]).unwrap_or(0.0),
        matches_played: number_field(row, &["Matches played", "Matches"]).unwrap_or(0.0),
    }
}

/// Every cell with a numeric reading whose column is not in `excluded`
/// (case-insensitive). Formatted text such as `"1,250"` or `"45%"` counts.
fn numeric_columns(row: &RawRow, excluded: &[&str]) -> BTreeMap<String, f64> {
    row.iter()
        .filter(|(k, _)| {
            let key = k.trim().to_ascii_lowercase();
            !excluded.contains(&key.as_str())
        })
        .filter_map(|(k, cell)| cell.as_f64().map(|v| (k.trim().to_string(), v)))
        .collect()
}

/// Give every player the union of metric keys so absent metrics are an
/// explicit 0 rather than a missing entry.
fn fill_missing_metrics(players: &mut [Player]) {
    let all: BTreeSet<String> = players
        .iter()
        .flat_map(|p| p.metrics.keys().cloned())
        .collect();
    for player in players.iter_mut() {
        for name in &all {
            player.metrics.entry(name.clone()).or_insert(0.0);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_shots<R: NameResolver>(
    rows: &[RawRow],
    players: &[Player],
    teams: &[Team],
    player_names: &NameIndex<usize>,
    team_names: &NameIndex<usize>,
    resolver: &R,
    report: &mut LoadReport,
) -> Vec<Shot> {
    // Names shared by several players need the team to disambiguate.
    let mut name_counts: HashMap<&str, usize> = HashMap::new();
    for p in players {
        *name_counts.entry(p.normalized_name.as_str()).or_default() += 1;
    }
    let name_team_index = NameIndex::build(
        players
            .iter()
            .enumerate()
            .map(|(i, p)| (name_team_key(&p.normalized_name, &normalize_name(&p.team_name)), i)),
    );

    let mut shots = Vec::with_capacity(rows.len());
    let mut seen: HashSet<ShotId> = HashSet::new();

    for (i, row) in rows.iter().enumerate() {
        let player_name = text_field(row, SHOT_PLAYER).unwrap_or_default();
        let team_name = text_field(row, SHOT_TEAM).unwrap_or_default();
        let minute = number_field(row, &["minute", "Minute"])
            .map(|m| m.max(0.0).round() as u32)
            .unwrap_or(0);

        let id = match text_field(row, SHOT_ID) {
            Some(source_id) => ShotId(format!("s:{source_id}")),
            None => ShotId(format!("s:{}:{}:{}", i, slug(&player_name), minute)),
        };
        if !seen.insert(id.clone()) {
            report.skip(RowSource::Shot, i, SkipReason::Duplicate(id.0));
            continue;
        }

        let name_norm = normalize_name(&player_name);
        let team_norm = normalize_name(&team_name);

        let player_idx = resolve_shooter(
            &name_norm,
            &team_norm,
            &name_counts,
            player_names,
            &name_team_index,
            resolver,
        );
        if player_idx.is_none() {
            debug!("shot {} has no matching player for '{}'", id, player_name);
            report.unresolved_shot_players += 1;
        }

        let team_id = ExactResolver
            .resolve(&team_norm, team_names)
            .map(|&t| teams[t].id.clone())
            .or_else(|| player_idx.and_then(|p| players[p].team_id.clone()));
        if team_id.is_none() {
            report.unresolved_shot_teams += 1;
        }

        shots.push(Shot {
            id,
            player_id: player_idx.map(|p| players[p].id.clone()),
            team_id,
            player_name,
            team_name,
            x: coordinate(number_field(row, &["X", "x"])),
            y: coordinate(number_field(row, &["Y", "y"])),
            xg: number_field(row, &["xG", "xg"]).unwrap_or(0.0).max(0.0),
            outcome: ShotOutcome::parse(&text_field(row, &["result", "outcome"]).unwrap_or_default()),
            situation: ShotSituation::parse(&text_field(row, &["situation"]).unwrap_or_default()),
            body_part: BodyPart::parse(
                &text_field(row, &["shotType", "body_part", "bodyPart"]).unwrap_or_default(),
            ),
            minute,
        });
    }
    shots
}

/// Exact normalized name; a name+team key when the name is shared by
/// several players; finally the configured resolver's fallback.
fn resolve_shooter<R: NameResolver>(
    name_norm: &str,
    team_norm: &str,
    name_counts: &HashMap<&str, usize>,
    player_names: &NameIndex<usize>,
    name_team_index: &NameIndex<usize>,
    resolver: &R,
) -> Option<usize> {
    if name_norm.is_empty() {
        return None;
    }
    if let Some(&i) = ExactResolver.resolve(name_norm, player_names) {
        if name_counts.get(name_norm).copied().unwrap_or(0) > 1 && !team_norm.is_empty() {
            let key = name_team_key(name_norm, team_norm);
            if let Some(&j) = ExactResolver.resolve(&key, name_team_index) {
                return Some(j);
            }
        }
        return Some(i);
    }
    let key = name_team_key(name_norm, team_norm);
    if let Some(&j) = ExactResolver.resolve(&key, name_team_index) {
        return Some(j);
    }
    resolver.resolve(name_norm, player_names).copied()
}

fn name_team_key(name_norm: &str, team_norm: &str) -> String {
    format!("{name_norm}|{team_norm}")
}

/// Coordinates above 1 are percentages; everything is clamped into [0, 1].
fn coordinate(raw: Option<f64>) -> f64 {
    let v = raw.unwrap_or(0.0);
    let v = if v > 1.0 { v / 100.0 } else { v };
    v.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
