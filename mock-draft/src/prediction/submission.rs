// Participant predictions: sparse player placements plus a predicted team order.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::draft::event::DraftEvent;
use crate::draft::pick::{PlayerId, TeamId};
use crate::draft::snake;
use crate::error::{DraftError, DraftResult};

/// One participant's saved prediction for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub event_id: String,
    /// External handle of the participant.
    pub participant: String,
    /// Predicted round-1 team order.
    #[serde(default)]
    pub team_order: Vec<TeamId>,
    /// Player -> predicted 1-based overall pick number. Players without an
    /// entry are simply unplaced.
    #[serde(default)]
    pub placements: BTreeMap<PlayerId, u32>,
    #[serde(default)]
    pub locked: bool,
    pub updated_at: DateTime<Utc>,
}

/// A partial save. Only what is present changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionUpdate {
    /// Replacement team order, if the participant changed it.
    #[serde(default)]
    pub team_order: Option<Vec<TeamId>>,
    /// `Some(slot)` places a player, `None` clears the placement.
    #[serde(default)]
    pub placements: BTreeMap<PlayerId, Option<u32>>,
}

impl Submission {
    pub fn new(event_id: impl Into<String>, participant: impl Into<String>) -> Self {
        Submission {
            event_id: event_id.into(),
            participant: participant.into(),
            team_order: Vec::new(),
            placements: BTreeMap::new(),
            locked: false,
            updated_at: Utc::now(),
        }
    }

    /// Whether this submission can no longer change: explicitly locked, the
    /// draft has started, or the prediction deadline has passed.
    pub fn is_locked(&self, event: &DraftEvent, now: DateTime<Utc>) -> bool {
        self.locked
            || event.status.draft_started()
            || event.prediction_deadline.is_some_and(|deadline| now >= deadline)
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Merge `update` into the saved prediction. Nothing changes unless the
    /// merged result is valid.
    pub fn apply(
        &mut self,
        update: SubmissionUpdate,
        event: &DraftEvent,
        now: DateTime<Utc>,
    ) -> DraftResult<()> {
        if self.participant.trim().is_empty() {
            return Err(DraftError::validation("participant", "must not be empty"));
        }
        if self.event_id != event.id {
            return Err(DraftError::validation(
                "event_id",
                format!("submission belongs to event {}, not {}", self.event_id, event.id),
            ));
        }
        if self.is_locked(event, now) {
            return Err(DraftError::InvalidState(format!(
                "predictions for event {} are locked",
                event.id
            )));
        }

        let team_order = update.team_order.unwrap_or_else(|| self.team_order.clone());
        if !event.teams.is_empty() {
            event.validate_team_order(&team_order, "team_order")?;
        } else if !team_order.is_empty() {
            return Err(DraftError::validation("team_order", "event has no teams"));
        }

        let total_slots = event.total_picks() as u32;
        let mut placements = self.placements.clone();
        for (player_id, slot) in update.placements {
            if event.player(player_id).is_none() {
                return Err(DraftError::not_found("player", player_id));
            }
            match slot {
                Some(slot) if slot == 0 || slot > total_slots => {
                    return Err(DraftError::validation(
                        "placements",
                        format!("slot {slot} for player {player_id} is outside 1..={total_slots}"),
                    ));
                }
                Some(slot) => {
                    placements.insert(player_id, slot);
                }
                None => {
                    placements.remove(&player_id);
                }
            }
        }

        let mut by_slot: HashMap<u32, PlayerId> = HashMap::with_capacity(placements.len());
        for (&player_id, &slot) in &placements {
            if let Some(other) = by_slot.insert(slot, player_id) {
                return Err(DraftError::validation(
                    "placements",
                    format!("players {other} and {player_id} both placed at slot {slot}"),
                ));
            }
        }

        self.team_order = team_order;
        self.placements = placements;
        self.updated_at = now;
        debug!(
            "Submission {}/{} saved with {} placements",
            self.event_id,
            self.participant,
            self.placements.len()
        );
        Ok(())
    }

    /// Whether the predicted team order lists every team exactly once.
    pub fn has_complete_team_order(&self, event: &DraftEvent) -> bool {
        !event.teams.is_empty() && event.validate_team_order(&self.team_order, "team_order").is_ok()
    }

    /// The team and round this prediction implies for a 1-based slot, using
    /// the predicted team order. `None` without a complete team order.
    pub fn predicted_cell(&self, slot: u32, event: &DraftEvent) -> Option<(TeamId, u32)> {
        if !self.has_complete_team_order(event) {
            return None;
        }
        let slot = (slot as usize).checked_sub(1)?;
        let (round, team_index) = snake::slot_to_round_and_team_index(slot, self.team_order.len());
        Some((self.team_order[team_index], round as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::event::EventStatus;
    use chrono::Duration;

    fn event() -> DraftEvent {
        let mut event = DraftEvent::new("ev", "Event");
        for name in ["T1", "T2", "T3"] {
            event.add_team(name, &[]).unwrap();
        }
        for i in 1..=6 {
            event.add_player(&format!("P{i}"), None, None).unwrap();
        }
        event.open().unwrap();
        event
    }

    fn update(order: Option<Vec<TeamId>>, placements: &[(PlayerId, Option<u32>)]) -> SubmissionUpdate {
        SubmissionUpdate {
            team_order: order,
            placements: placements.iter().copied().collect(),
        }
    }

    #[test]
    fn apply_saves_partial_prediction() {
        let event = event();
        let mut sub = Submission::new("ev", "sam");
        sub.apply(update(Some(vec![2, 1, 3]), &[(1, Some(1)), (4, Some(3))]), &event, Utc::now())
            .unwrap();
        assert_eq!(sub.team_order, vec![2, 1, 3]);
        assert_eq!(sub.placements.len(), 2);
        assert_eq!(sub.placements[&4], 3);
    }

    #[test]
    fn placements_persist_across_saves() {
        let event = event();
        let mut sub = Submission::new("ev", "sam");
        sub.apply(update(Some(vec![1, 2, 3]), &[(1, Some(1))]), &event, Utc::now())
            .unwrap();
        sub.apply(update(None, &[(2, Some(2))]), &event, Utc::now()).unwrap();
        assert_eq!(sub.placements.get(&1), Some(&1));
        assert_eq!(sub.placements.get(&2), Some(&2));
        assert_eq!(sub.team_order, vec![1, 2, 3]);

        sub.apply(update(None, &[(1, None)]), &event, Utc::now()).unwrap();
        assert!(!sub.placements.contains_key(&1));
    }

    #[test]
    fn team_order_required_once_teams_exist() {
        let event = event();
        let mut sub = Submission::new("ev", "sam");
        let err = sub
            .apply(update(None, &[(1, Some(1))]), &event, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DraftError::Validation { .. }));
        assert!(sub.placements.is_empty());
    }

    #[test]
    fn duplicate_slot_rejected_without_partial_write() {
        let event = event();
        let mut sub = Submission::new("ev", "sam");
        sub.apply(update(Some(vec![1, 2, 3]), &[(1, Some(1))]), &event, Utc::now())
            .unwrap();
        let err = sub
            .apply(update(None, &[(2, Some(1)), (3, Some(3))]), &event, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DraftError::Validation { .. }));
        assert_eq!(sub.placements.len(), 1);
    }

    #[test]
    fn moving_player_into_freed_slot_is_fine() {
        let event = event();
        let mut sub = Submission::new("ev", "sam");
        sub.apply(update(Some(vec![1, 2, 3]), &[(1, Some(1)), (2, Some(2))]), &event, Utc::now())
            .unwrap();
        sub.apply(update(None, &[(1, Some(2)), (2, Some(1))]), &event, Utc::now())
            .unwrap();
        assert_eq!(sub.placements[&1], 2);
        assert_eq!(sub.placements[&2], 1);
    }

    #[test]
    fn slot_out_of_range_rejected() {
        let event = event();
        let mut sub = Submission::new("ev", "sam");
        for slot in [0, 7] {
            let err = sub
                .apply(update(Some(vec![1, 2, 3]), &[(1, Some(slot))]), &event, Utc::now())
                .unwrap_err();
            assert!(matches!(err, DraftError::Validation { .. }), "slot {slot}");
        }
    }

    #[test]
    fn unknown_player_rejected() {
        let event = event();
        let mut sub = Submission::new("ev", "sam");
        let err = sub
            .apply(update(Some(vec![1, 2, 3]), &[(77, Some(1))]), &event, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DraftError::NotFound { .. }));
    }

    #[test]
    fn locked_when_draft_started_or_deadline_passed() {
        let mut event = event();
        let sub = Submission::new("ev", "sam");
        let now = Utc::now();
        assert!(!sub.is_locked(&event, now));

        event.prediction_deadline = Some(now - Duration::minutes(1));
        assert!(sub.is_locked(&event, now));

        event.prediction_deadline = None;
        event.status = EventStatus::Drafting;
        assert!(sub.is_locked(&event, now));
    }

    #[test]
    fn locked_submission_rejects_updates() {
        let event = event();
        let mut sub = Submission::new("ev", "sam");
        sub.lock();
        let err = sub
            .apply(update(Some(vec![1, 2, 3]), &[]), &event, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DraftError::InvalidState(_)));
    }

    #[test]
    fn predicted_cell_uses_snake_mapping() {
        let event = event();
        let mut sub = Submission::new("ev", "sam");
        sub.apply(update(Some(vec![3, 1, 2]), &[]), &event, Utc::now()).unwrap();
        // Round 1 forward: 3, 1, 2. Round 2 reversed: 2, 1, 3.
        assert_eq!(sub.predicted_cell(1, &event), Some((3, 1)));
        assert_eq!(sub.predicted_cell(3, &event), Some((2, 1)));
        assert_eq!(sub.predicted_cell(4, &event), Some((2, 2)));
        assert_eq!(sub.predicted_cell(6, &event), Some((3, 2)));
        assert_eq!(sub.predicted_cell(0, &event), None);
    }

    #[test]
    fn predicted_cell_requires_complete_order() {
        let event = event();
        let mut sub = Submission::new("ev", "sam");
        sub.team_order = vec![1, 2];
        assert_eq!(sub.predicted_cell(1, &event), None);
    }

    #[test]
    fn submission_json_uses_player_keys() {
        let event = event();
        let mut sub = Submission::new("ev", "sam");
        sub.apply(update(Some(vec![1, 2, 3]), &[(5, Some(2))]), &event, Utc::now())
            .unwrap();
        let json = serde_json::to_string(&sub).unwrap();
        let back: Submission = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sub);
    }
}
