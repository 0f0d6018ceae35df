// Canonical entities: players, teams and shots.

use crate::store::position::PositionCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

entity_id!(PlayerId);
entity_id!(TeamId);
entity_id!(ShotId);

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// Descriptive attributes used as filters, never as performance signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub age: Option<f64>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub foot: Option<String>,
    pub market_value: Option<f64>,
    pub contract_expires: Option<String>,
    pub on_loan: Option<bool>,
    pub birth_country: Option<String>,
    pub passport_country: Option<String>,
    pub minutes_played: f64,
    pub matches_played: f64,
}

/// One player-season.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub normalized_name: String,
    /// Team name as written in the source row.
    pub team_name: String,
    pub team_id: Option<TeamId>,
    /// Raw position field, e.g. `"CF, LWF"`.
    pub position: String,
    /// Upper-case codes parsed from `position`, in source order.
    pub positions: Vec<String>,
    pub league: String,
    pub profile: PlayerProfile,
    pub metrics: BTreeMap<String, f64>,
}

impl Player {
    /// Value of a named metric; absent metrics read as 0.
    pub fn metric(&self, name: &str) -> f64 {
        self.metrics.get(name).copied().unwrap_or(0.0)
    }

    pub fn minutes_played(&self) -> f64 {
        self.profile.minutes_played
    }

    /// Category of the first listed position code.
    pub fn primary_category(&self) -> Option<PositionCategory> {
        self.positions
            .first()
            .and_then(|code| PositionCategory::from_code(code))
    }

    /// Every category any listed code falls into.
    pub fn categories(&self) -> Vec<PositionCategory> {
        let mut out: Vec<PositionCategory> = Vec::new();
        for c in self.positions.iter().filter_map(|p| PositionCategory::from_code(p)) {
            if !out.contains(&c) {
                out.push(c);
            }
        }
        out
    }

    /// Whether any of the player's codes appears in `codes` (case-insensitive).
    pub fn plays_any(&self, codes: &[String]) -> bool {
        self.positions
            .iter()
            .any(|p| codes.iter().any(|c| c.eq_ignore_ascii_case(p)))
    }
}

// ---------------------------------------------------------------------------
// Team
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub normalized_name: String,
    pub league: String,
    pub season: String,
    pub stats: BTreeMap<String, f64>,
}

impl Team {
    /// Aggregate statistic; absent statistics read as 0.
    pub fn stat(&self, name: &str) -> f64 {
        self.stats.get(name).copied().unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Shot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShotOutcome {
    Goal,
    SavedShot,
    MissedShot,
    BlockedShot,
    ShotOnPost,
    OwnGoal,
    Other(String),
}

impl ShotOutcome {
    pub fn parse(raw: &str) -> Self {
        match compact(raw).as_str() {
            "goal" => ShotOutcome::Goal,
            "savedshot" | "saved" => ShotOutcome::SavedShot,
            "missedshots" | "missedshot" | "missed" | "offtarget" => ShotOutcome::MissedShot,
            "blockedshot" | "blocked" => ShotOutcome::BlockedShot,
            "shotonpost" | "post" => ShotOutcome::ShotOnPost,
            "owngoal" => ShotOutcome::OwnGoal,
            _ => ShotOutcome::Other(raw.trim().to_string()),
        }
    }

    pub fn is_goal(&self) -> bool {
        matches!(self, ShotOutcome::Goal)
    }

    /// Saved shots and goals count as on target.
    pub fn is_on_target(&self) -> bool {
        matches!(self, ShotOutcome::Goal | ShotOutcome::SavedShot)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShotSituation {
    OpenPlay,
    FromCorner,
    SetPiece,
    DirectFreekick,
    Penalty,
    Other(String),
}

impl ShotSituation {
    pub fn parse(raw: &str) -> Self {
        match compact(raw).as_str() {
            "openplay" => ShotSituation::OpenPlay,
            "fromcorner" | "corner" => ShotSituation::FromCorner,
            "setpiece" => ShotSituation::SetPiece,
            "directfreekick" | "freekick" => ShotSituation::DirectFreekick,
            "penalty" => ShotSituation::Penalty,
            _ => ShotSituation::Other(raw.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyPart {
    RightFoot,
    LeftFoot,
    Head,
    OtherBodyPart,
    Other(String),
}

impl BodyPart {
    pub fn parse(raw: &str) -> Self {
        match compact(raw).as_str() {
            "rightfoot" => BodyPart::RightFoot,
            "leftfoot" => BodyPart::LeftFoot,
            "head" | "header" => BodyPart::Head,
            "otherbodypart" => BodyPart::OtherBodyPart,
            _ => BodyPart::Other(raw.trim().to_string()),
        }
    }
}

/// Lower-case alphanumerics only: `"Saved Shot"` and `"SavedShot"` agree.
fn compact(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    pub id: ShotId,
    pub player_name: String,
    pub team_name: String,
    pub player_id: Option<PlayerId>,
    pub team_id: Option<TeamId>,
    /// Pitch coordinates normalized to [0, 1].
    pub x: f64,
    pub y: f64,
    pub xg: f64,
    pub outcome: ShotOutcome,
    pub situation: ShotSituation,
    pub body_part: BodyPart,
    pub minute: u32,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn player(positions: &[&str]) -> Player {
        Player {
            id: PlayerId("p:test".into()),
            name: "Test".into(),
            normalized_name: "test".into(),
            team_name: "Team".into(),
            team_id: None,
            position: positions.join(", "),
            positions: positions.iter().map(|s| s.to_string()).collect(),
            league: "League".into(),
            profile: PlayerProfile::default(),
            metrics: BTreeMap::from([("Goals per 90".to_string(), 0.5)]),
        }
    }

    #[test]
    fn absent_metric_reads_as_zero() {
        let p = player(&["CF"]);
        assert_eq!(p.metric("Goals per 90"), 0.5);
        assert_eq!(p.metric("Does not exist"), 0.0);
    }

    #[test]
    fn primary_category_uses_first_code() {
        let p = player(&["LWF", "CF"]);
        assert_eq!(p.primary_category(), Some(PositionCategory::Winger));
        assert_eq!(
            p.categories(),
            vec![PositionCategory::Winger, PositionCategory::Forward]
        );
    }

    #[test]
    fn plays_any_is_case_insensitive() {
        let p = player(&["DMF", "CMF"]);
        assert!(p.plays_any(&["cmf".to_string()]));
        assert!(!p.plays_any(&["CB".to_string()]));
    }

    #[test]
    fn shot_categories_parse_understat_values() {
        assert_eq!(ShotOutcome::parse("MissedShots"), ShotOutcome::MissedShot);
        assert_eq!(ShotOutcome::parse("Goal"), ShotOutcome::Goal);
        assert!(ShotOutcome::parse("SavedShot").is_on_target());
        assert_eq!(ShotSituation::parse("DirectFreekick"), ShotSituation::DirectFreekick);
        assert_eq!(BodyPart::parse("LeftFoot"), BodyPart::LeftFoot);
        assert_eq!(BodyPart::parse("Knee"), BodyPart::Other("Knee".into()));
    }
}
