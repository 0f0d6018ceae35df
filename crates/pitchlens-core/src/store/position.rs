// Position codes and the coarse position categories built on top of them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse positional family used for cohorts, metric lists and labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PositionCategory {
    Goalkeeper,
    CentreBack,
    FullBack,
    Midfielder,
    AttackingMidfielder,
    Winger,
    Forward,
}

impl PositionCategory {
    pub const ALL: [PositionCategory; 7] = [
        PositionCategory::Goalkeeper,
        PositionCategory::CentreBack,
        PositionCategory::FullBack,
        PositionCategory::Midfielder,
        PositionCategory::AttackingMidfielder,
        PositionCategory::Winger,
        PositionCategory::Forward,
    ];

    /// Category for a single position code. Handles Wyscout codes plus the
    /// common ST/SS/CM/DM/AM aliases. Unknown codes map to `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "GK" | "G" => Some(PositionCategory::Goalkeeper),
            "CB" | "LCB" | "RCB" | "LCB3" | "RCB3" => Some(PositionCategory::CentreBack),
            "LB" | "RB" | "LWB" | "RWB" | "LB5" | "RB5" | "FB" | "WB" => {
                Some(PositionCategory::FullBack)
            }
            "DMF" | "LDMF" | "RDMF" | "CMF" | "LCMF" | "RCMF" | "DM" | "CM" | "MF" => {
                Some(PositionCategory::Midfielder)
            }
            "AMF" | "LAMF" | "RAMF" | "AM" | "CAM" => Some(PositionCategory::AttackingMidfielder),
            "LW" | "RW" | "LWF" | "RWF" | "LM" | "RM" | "W" => Some(PositionCategory::Winger),
            "CF" | "ST" | "SS" | "FW" | "F" => Some(PositionCategory::Forward),
            _ => None,
        }
    }

    /// Parse a category name as written in config files
    /// (`"Forward"`, `"centre_back"`, `"Centre Back"`).
    pub fn from_name(name: &str) -> Option<Self> {
        let key: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "goalkeeper" => Some(PositionCategory::Goalkeeper),
            "centreback" | "centerback" => Some(PositionCategory::CentreBack),
            "fullback" => Some(PositionCategory::FullBack),
            "midfielder" => Some(PositionCategory::Midfielder),
            "attackingmidfielder" => Some(PositionCategory::AttackingMidfielder),
            "winger" => Some(PositionCategory::Winger),
            "forward" => Some(PositionCategory::Forward),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PositionCategory::Goalkeeper => "Goalkeeper",
            PositionCategory::CentreBack => "Centre Back",
            PositionCategory::FullBack => "Full Back",
            PositionCategory::Midfielder => "Midfielder",
            PositionCategory::AttackingMidfielder => "Attacking Midfielder",
            PositionCategory::Winger => "Winger",
            PositionCategory::Forward => "Forward",
        }
    }
}

impl fmt::Display for PositionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Split a raw position field (`"CF, LWF"`, `"RB/RWB"`) into upper-case codes,
/// preserving order and dropping duplicates.
pub fn parse_position_codes(raw: &str) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    for part in raw.split([',', '/', ';', '|']) {
        let code = part.trim().to_uppercase();
        if !code.is_empty() && !codes.contains(&code) {
            codes.push(code);
        }
    }
    codes
}
