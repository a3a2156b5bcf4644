// Players in the pool and the picks that assign them to teams.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type PlayerId = u32;
pub type TeamId = u32;

/// A player in an event's pool. Every pool player must be drafted exactly once
/// for the event to complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Optional grouping tag (origin team, region, ...).
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// One actual assignment of a player to a team.
///
/// Picks are immutable: they are appended by a pick and removed only when the
/// latest one is undone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftPick {
    /// 1-based overall pick number.
    pub pick_number: u32,
    /// 1-based round the pick was made in.
    pub round: u32,
    pub team_id: TeamId,
    pub player_id: PlayerId,
    pub made_at: DateTime<Utc>,
}

impl DraftPick {
    /// 0-based slot of this pick in the overall sequence.
    pub fn slot(&self) -> usize {
        (self.pick_number as usize).saturating_sub(1)
    }
}

impl fmt::Display for DraftPick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} (round {}): team {} takes player {}",
            self.pick_number, self.round, self.team_id, self.player_id
        )
    }
}
