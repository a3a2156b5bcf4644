// Draft events: lifecycle status, teams, and the player pool.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::pick::{DraftPick, Player, PlayerId, TeamId};
use super::state::DraftOrder;
use crate::error::{DraftError, DraftResult};

/// Lifecycle of an event.
///
/// `Planned -> Open -> Drafting <-> Paused -> Completed`, with `Closed` as a
/// terminal archival state reachable from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Planned,
    Open,
    Drafting,
    Paused,
    Completed,
    Closed,
}

impl EventStatus {
    /// Whether the live draft has begun (or finished).
    pub fn draft_started(&self) -> bool {
        !matches!(self, EventStatus::Planned | EventStatus::Open)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Planned => "PLANNED",
            EventStatus::Open => "OPEN",
            EventStatus::Drafting => "DRAFTING",
            EventStatus::Paused => "PAUSED",
            EventStatus::Completed => "COMPLETED",
            EventStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A team taking part in an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    /// External handles allowed to pick for this team, in the order they were
    /// added.
    #[serde(default)]
    pub captains: Vec<String>,
}

impl Team {
    pub fn is_captain(&self, handle: &str) -> bool {
        self.captains.iter().any(|c| c.eq_ignore_ascii_case(handle))
    }
}

/// The complete state of one draft event: roster, pool, progression, and the
/// pick log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftEvent {
    pub id: String,
    pub name: String,
    pub status: EventStatus,
    pub teams: Vec<Team>,
    pub players: Vec<Player>,
    /// Present once the draft has been initialized.
    pub order: Option<DraftOrder>,
    /// All recorded picks, ordered by pick number.
    pub picks: Vec<DraftPick>,
    /// Predictions lock at this time even if the draft has not started.
    #[serde(default)]
    pub prediction_deadline: Option<DateTime<Utc>>,
}

impl DraftEvent {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        DraftEvent {
            id: id.into(),
            name: name.into(),
            status: EventStatus::Planned,
            teams: Vec::new(),
            players: Vec::new(),
            order: None,
            picks: Vec::new(),
            prediction_deadline: None,
        }
    }

    // ------------------------------------------------------------------
    // Roster management
    // ------------------------------------------------------------------

    /// Register a team. Only allowed before the draft order exists.
    pub fn add_team(&mut self, name: &str, captains: &[String]) -> DraftResult<TeamId> {
        self.ensure_roster_editable()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(DraftError::validation("team.name", "must not be empty"));
        }
        if self.team_by_name(name).is_some() {
            return Err(DraftError::Conflict(format!("team '{name}' already exists")));
        }

        let mut handles: Vec<String> = Vec::with_capacity(captains.len());
        for handle in captains {
            let handle = handle.trim();
            if handle.is_empty() {
                return Err(DraftError::validation("team.captains", "handle must not be empty"));
            }
            if !handles.iter().any(|h| h.eq_ignore_ascii_case(handle)) {
                handles.push(handle.to_string());
            }
        }

        let id = self.teams.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        self.teams.push(Team {
            id,
            name: name.to_string(),
            captains: handles,
        });
        info!("Event {}: added team {} '{}'", self.id, id, name);
        Ok(id)
    }

    /// Add a player to the pool. Only allowed before the draft order exists.
    pub fn add_player(
        &mut self,
        name: &str,
        group: Option<String>,
        note: Option<String>,
    ) -> DraftResult<PlayerId> {
        self.ensure_roster_editable()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(DraftError::validation("player.name", "must not be empty"));
        }
        if self.player_by_name(name).is_some() {
            return Err(DraftError::Conflict(format!("player '{name}' already exists")));
        }

        let id = self.players.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        self.players.push(Player {
            id,
            name: name.to_string(),
            group: group.filter(|g| !g.trim().is_empty()),
            note: note.filter(|n| !n.trim().is_empty()),
        });
        Ok(id)
    }

    fn ensure_roster_editable(&self) -> DraftResult<()> {
        if self.order.is_some() || self.status.draft_started() {
            return Err(DraftError::InvalidState(format!(
                "teams and players are frozen once the draft order exists (status {})",
                self.status
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Open the event for predictions.
    pub fn open(&mut self) -> DraftResult<()> {
        if self.status != EventStatus::Planned {
            return Err(DraftError::InvalidState(format!(
                "only a PLANNED event can be opened (status {})",
                self.status
            )));
        }
        self.status = EventStatus::Open;
        info!("Event {} opened for predictions", self.id);
        Ok(())
    }

    /// Archive the event. Terminal.
    pub fn close(&mut self) -> DraftResult<()> {
        if self.status == EventStatus::Closed {
            return Err(DraftError::InvalidState("event is already CLOSED".into()));
        }
        self.status = EventStatus::Closed;
        info!("Event {} closed", self.id);
        Ok(())
    }

    /// Tear down the draft: drop the order and every pick and return to
    /// `Open`, so the draft can be initialized again.
    pub fn reset_draft(&mut self) -> DraftResult<()> {
        if self.status == EventStatus::Closed {
            return Err(DraftError::InvalidState("cannot reset a CLOSED event".into()));
        }
        if self.order.is_none() {
            return Err(DraftError::InvalidState("draft has not been initialized".into()));
        }
        let removed = self.picks.len();
        self.order = None;
        self.picks.clear();
        self.status = EventStatus::Open;
        info!("Event {}: draft reset, {} picks removed", self.id, removed);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn team(&self, id: TeamId) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == id)
    }

    pub fn team_by_name(&self, name: &str) -> Option<&Team> {
        let name = name.trim();
        self.teams.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_by_name(&self, name: &str) -> Option<&Player> {
        let name = name.trim();
        self.players.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// The recorded pick for `player_id`, if the player has been drafted.
    pub fn pick_for(&self, player_id: PlayerId) -> Option<&DraftPick> {
        self.picks.iter().find(|p| p.player_id == player_id)
    }

    /// Players not yet drafted, in pool order.
    pub fn available_players(&self) -> impl Iterator<Item = &Player> {
        self.players
            .iter()
            .filter(move |p| self.pick_for(p.id).is_none())
    }

    pub fn total_picks(&self) -> usize {
        self.players.len()
    }

    /// Base team ordering actually used for the draft (round 1), if initialized.
    pub fn actual_team_order(&self) -> Option<&[TeamId]> {
        self.order
            .as_ref()
            .map(|o| &o.team_order[..self.teams.len().min(o.team_order.len())])
    }

    /// Check that `order` lists every team of this event exactly once.
    pub fn validate_team_order(&self, order: &[TeamId], field: &str) -> DraftResult<()> {
        if order.len() != self.teams.len() {
            return Err(DraftError::validation(
                field,
                format!(
                    "expected {} teams, got {}",
                    self.teams.len(),
                    order.len()
                ),
            ));
        }
        let mut seen = HashSet::with_capacity(order.len());
        for &team_id in order {
            if self.team(team_id).is_none() {
                return Err(DraftError::not_found("team", team_id));
            }
            if !seen.insert(team_id) {
                return Err(DraftError::validation(
                    field,
                    format!("team {team_id} listed more than once"),
                ));
            }
        }
        Ok(())
    }
}
