// Draft progression: snake order initialization, picks, undo, pause/resume.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::event::{DraftEvent, EventStatus};
use super::pick::{DraftPick, PlayerId, TeamId};
use super::snake;
use crate::error::{DraftError, DraftResult};

/// The generated pick sequence plus progression counters.
///
/// `current_round` and `is_reversed` are always recomputed from
/// `current_pick` via [`snake::progress_after`]; they are stored so that a
/// persisted order carries its full state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftOrder {
    /// Team for every slot, round 1 first, reversing each round.
    pub team_order: Vec<TeamId>,
    /// Number of picks made so far (0-based index of the next slot).
    pub current_pick: usize,
    /// 1-based round of the next pick.
    pub current_round: usize,
    /// Whether the current round runs in reversed order.
    pub is_reversed: bool,
}

impl DraftOrder {
    fn new(team_order: Vec<TeamId>) -> Self {
        DraftOrder {
            team_order,
            current_pick: 0,
            current_round: 1,
            is_reversed: false,
        }
    }

    fn set_progress(&mut self, picks_made: usize, num_teams: usize) {
        let (round, reversed) = snake::progress_after(picks_made, num_teams);
        self.current_pick = picks_made;
        self.current_round = round;
        self.is_reversed = reversed;
    }
}

/// Snapshot of where the draft stands, returned with every change so the
/// caller can broadcast it however it likes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftProgress {
    pub status: EventStatus,
    pub current_pick: usize,
    pub current_round: usize,
    pub is_reversed: bool,
    pub on_the_clock: Option<TeamId>,
    pub picks_made: usize,
    pub total_picks: usize,
}

/// Description of a state change produced by the progression engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DraftUpdate {
    Initialized {
        progress: DraftProgress,
    },
    PickMade {
        pick: DraftPick,
        progress: DraftProgress,
    },
    PickUndone {
        removed: DraftPick,
        progress: DraftProgress,
    },
    StatusChanged {
        from: EventStatus,
        progress: DraftProgress,
    },
}

impl DraftUpdate {
    pub fn progress(&self) -> &DraftProgress {
        match self {
            DraftUpdate::Initialized { progress }
            | DraftUpdate::PickMade { progress, .. }
            | DraftUpdate::PickUndone { progress, .. }
            | DraftUpdate::StatusChanged { progress, .. } => progress,
        }
    }
}

impl DraftEvent {
    /// Generate the snake order from `base_order` and start drafting.
    ///
    /// The sequence covers at least `max_generated_picks` slots (and never
    /// fewer than the pool size); which slots are real is decided by the pool.
    pub fn initialize(
        &mut self,
        base_order: &[TeamId],
        max_generated_picks: usize,
    ) -> DraftResult<DraftUpdate> {
        if self.order.is_some() {
            return Err(DraftError::Conflict(format!(
                "draft order for event {} is already initialized",
                self.id
            )));
        }
        if !matches!(self.status, EventStatus::Planned | EventStatus::Open) {
            return Err(DraftError::InvalidState(format!(
                "cannot initialize a draft in status {}",
                self.status
            )));
        }
        if self.teams.is_empty() {
            return Err(DraftError::InvalidState(
                "cannot initialize a draft without teams".into(),
            ));
        }
        if self.players.is_empty() {
            return Err(DraftError::InvalidState(
                "cannot initialize a draft with an empty player pool".into(),
            ));
        }
        self.validate_team_order(base_order, "base_team_order")?;

        let min_picks = max_generated_picks.max(self.players.len());
        let team_order = snake::generate_order(base_order, min_picks);
        debug!(
            "Event {}: generated {} slots for {} teams",
            self.id,
            team_order.len(),
            base_order.len()
        );

        self.order = Some(DraftOrder::new(team_order));
        self.picks.clear();
        self.status = EventStatus::Drafting;
        info!(
            "Event {}: draft initialized with {} teams and {} players",
            self.id,
            self.teams.len(),
            self.players.len()
        );

        Ok(DraftUpdate::Initialized {
            progress: self.progress(),
        })
    }

    /// Record a pick of `player_id` for the team on the clock, or for
    /// `team_override` when given.
    pub fn make_pick(
        &mut self,
        player_id: PlayerId,
        team_override: Option<TeamId>,
    ) -> DraftResult<DraftUpdate> {
        if !matches!(self.status, EventStatus::Drafting | EventStatus::Paused) {
            return Err(DraftError::InvalidState(format!(
                "picks are not accepted in status {}",
                self.status
            )));
        }
        let order = self
            .order
            .as_ref()
            .ok_or_else(|| DraftError::InvalidState("draft has not been initialized".into()))?;

        if self.player(player_id).is_none() {
            return Err(DraftError::not_found("player", player_id));
        }
        if let Some(existing) = self.pick_for(player_id) {
            return Err(DraftError::Conflict(format!(
                "player {} was already drafted at pick {}",
                player_id, existing.pick_number
            )));
        }

        let slot = order.current_pick;
        let scheduled = *order.team_order.get(slot).ok_or_else(|| {
            DraftError::InvalidState(format!("pick sequence exhausted at slot {slot}"))
        })?;
        let team_id = team_override.unwrap_or(scheduled);
        if self.team(team_id).is_none() {
            return Err(DraftError::not_found("team", team_id));
        }
        if team_id != scheduled {
            warn!(
                "Event {}: pick {} overridden from team {} to team {}",
                self.id,
                slot + 1,
                scheduled,
                team_id
            );
        }

        let pick = DraftPick {
            pick_number: (slot + 1) as u32,
            round: order.current_round as u32,
            team_id,
            player_id,
            made_at: Utc::now(),
        };
        self.picks.push(pick.clone());
        self.sync_progress();

        info!("Event {}: {}", self.id, pick);

        if self.picks.len() == self.players.len() {
            self.status = EventStatus::Completed;
            info!("Event {}: draft completed after {} picks", self.id, self.picks.len());
        }

        Ok(DraftUpdate::PickMade {
            pick,
            progress: self.progress(),
        })
    }

    /// Remove the most recent pick and step progression back one slot.
    pub fn undo_last_pick(&mut self) -> DraftResult<DraftUpdate> {
        if !matches!(
            self.status,
            EventStatus::Drafting | EventStatus::Paused | EventStatus::Completed
        ) {
            return Err(DraftError::InvalidState(format!(
                "cannot undo in status {}",
                self.status
            )));
        }
        if self.order.is_none() {
            return Err(DraftError::InvalidState("draft has not been initialized".into()));
        }
        let latest = self
            .picks
            .iter()
            .enumerate()
            .max_by_key(|(_, p)| p.pick_number)
            .map(|(idx, _)| idx)
            .ok_or_else(|| DraftError::InvalidState("no picks to undo".into()))?;

        let removed = self.picks.remove(latest);
        self.sync_progress();

        if self.status == EventStatus::Completed {
            self.status = EventStatus::Drafting;
        }
        info!("Event {}: undid pick {}", self.id, removed);

        Ok(DraftUpdate::PickUndone {
            removed,
            progress: self.progress(),
        })
    }

    pub fn pause(&mut self) -> DraftResult<DraftUpdate> {
        self.transition(EventStatus::Drafting, EventStatus::Paused)
    }

    pub fn resume(&mut self) -> DraftResult<DraftUpdate> {
        self.transition(EventStatus::Paused, EventStatus::Drafting)
    }

    fn transition(&mut self, from: EventStatus, to: EventStatus) -> DraftResult<DraftUpdate> {
        if self.status != from {
            return Err(DraftError::InvalidState(format!(
                "expected status {from} to move to {to}, found {}",
                self.status
            )));
        }
        self.status = to;
        info!("Event {}: {} -> {}", self.id, from, to);
        Ok(DraftUpdate::StatusChanged {
            from,
            progress: self.progress(),
        })
    }

    fn sync_progress(&mut self) {
        let picks_made = self.picks.len();
        let num_teams = self.teams.len();
        if let Some(order) = self.order.as_mut() {
            order.set_progress(picks_made, num_teams);
        }
    }

    /// The team whose turn it is, if the draft is live and picks remain.
    pub fn on_the_clock(&self) -> Option<TeamId> {
        if !matches!(self.status, EventStatus::Drafting | EventStatus::Paused) {
            return None;
        }
        let order = self.order.as_ref()?;
        if order.current_pick >= self.total_picks() {
            return None;
        }
        order.team_order.get(order.current_pick).copied()
    }

    /// Whether every pool player has been drafted. Stays true after the event
    /// is closed, unlike `status == Completed`.
    pub fn is_draft_complete(&self) -> bool {
        self.order.is_some() && !self.players.is_empty() && self.picks.len() == self.players.len()
    }

    pub fn progress(&self) -> DraftProgress {
        let (current_pick, current_round, is_reversed) = match &self.order {
            Some(o) => (o.current_pick, o.current_round, o.is_reversed),
            None => (0, 1, false),
        };
        DraftProgress {
            status: self.status,
            current_pick,
            current_round,
            is_reversed,
            on_the_clock: self.on_the_clock(),
            picks_made: self.picks.len(),
            total_picks: self.total_picks(),
        }
    }

    /// Verify that stored progression agrees with the pick log and with the
    /// snake derivation.
    pub fn check_invariants(&self) -> DraftResult<()> {
        let Some(order) = &self.order else {
            if !self.picks.is_empty() {
                return Err(DraftError::Invariant(format!(
                    "event {} has {} picks but no draft order",
                    self.id,
                    self.picks.len()
                )));
            }
            return Ok(());
        };

        if order.current_pick != self.picks.len() {
            return Err(DraftError::Invariant(format!(
                "current_pick {} but {} picks recorded",
                order.current_pick,
                self.picks.len()
            )));
        }
        if self.teams.is_empty() {
            return Err(DraftError::Invariant("draft order exists without teams".into()));
        }
        let (round, reversed) = snake::progress_after(order.current_pick, self.teams.len());
        if order.current_round != round || order.is_reversed != reversed {
            return Err(DraftError::Invariant(format!(
                "round {} / reversed {} stored, derivation from pick {} gives round {} / reversed {}",
                order.current_round, order.is_reversed, order.current_pick, round, reversed
            )));
        }
        for (idx, pick) in self.picks.iter().enumerate() {
            if pick.pick_number as usize != idx + 1 {
                return Err(DraftError::Invariant(format!(
                    "pick at position {} has number {}",
                    idx, pick.pick_number
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Event with `teams` teams (T1..Tn) and `players` players (P1..Pn), open.
    fn event(teams: usize, players: usize) -> DraftEvent {
        let mut event = DraftEvent::new("test", "Test Draft");
        for i in 1..=teams {
            event.add_team(&format!("T{i}"), &[]).unwrap();
        }
        for i in 1..=players {
            event.add_player(&format!("P{i}"), None, None).unwrap();
        }
        event.open().unwrap();
        event
    }

    fn started(teams: usize, players: usize) -> DraftEvent {
        let mut event = event(teams, players);
        let base: Vec<TeamId> = event.teams.iter().map(|t| t.id).collect();
        event.initialize(&base, 200).unwrap();
        event
    }

    fn order(event: &DraftEvent) -> &DraftOrder {
        event.order.as_ref().unwrap()
    }

    #[test]
    fn initialize_generates_snake() {
        let event = started(4, 8);
        let order = order(&event);
        assert_eq!(&order.team_order[..8], &[1, 2, 3, 4, 4, 3, 2, 1]);
        assert!(order.team_order.len() >= 200);
        assert_eq!(order.current_pick, 0);
        assert_eq!(order.current_round, 1);
        assert!(!order.is_reversed);
        assert_eq!(event.status, EventStatus::Drafting);
        assert_eq!(event.on_the_clock(), Some(1));
    }

    #[test]
    fn initialize_covers_large_pool() {
        let event = started(3, 250);
        assert!(order(&event).team_order.len() >= 250);
    }

    #[test]
    fn initialize_twice_conflicts() {
        let mut event = started(2, 2);
        let err = event.initialize(&[1, 2], 200).unwrap_err();
        assert!(matches!(err, DraftError::Conflict(_)));
    }

    #[test]
    fn initialize_without_teams_fails() {
        let mut event = event(0, 3);
        let err = event.initialize(&[], 200).unwrap_err();
        assert!(matches!(err, DraftError::InvalidState(_)));
    }

    #[test]
    fn initialize_rejects_bad_base_order() {
        let mut event = event(3, 3);
        let err = event.initialize(&[1, 1, 2], 200).unwrap_err();
        assert!(matches!(err, DraftError::Validation { .. }));
        assert!(event.order.is_none());
        assert_eq!(event.status, EventStatus::Open);
    }

    #[test]
    fn picks_follow_on_the_clock_team() {
        let mut event = started(4, 8);
        let expected = [1, 2, 3, 4, 4, 3, 2, 1];
        for (k, player) in (1..=8).enumerate() {
            assert_eq!(event.on_the_clock(), Some(expected[k]));
            let update = event.make_pick(player, None).unwrap();
            let DraftUpdate::PickMade { pick, .. } = update else {
                panic!("expected PickMade");
            };
            assert_eq!(pick.team_id, expected[k]);
            assert_eq!(pick.pick_number as usize, k + 1);
            assert_eq!(order(&event).current_pick, k + 1);
        }
        assert_eq!(event.status, EventStatus::Completed);
        assert!(event.is_draft_complete());
        assert_eq!(event.on_the_clock(), None);

        event.close().unwrap();
        assert!(event.is_draft_complete());
    }

    #[test]
    fn rounds_recorded_on_picks() {
        let mut event = started(3, 7);
        for player in 1..=7 {
            event.make_pick(player, None).unwrap();
        }
        let rounds: Vec<u32> = event.picks.iter().map(|p| p.round).collect();
        assert_eq!(rounds, vec![1, 1, 1, 2, 2, 2, 3]);
    }

    #[test]
    fn round_boundary_flips_direction() {
        let mut event = started(3, 9);
        for player in 1..=2 {
            event.make_pick(player, None).unwrap();
        }
        assert_eq!(order(&event).current_round, 1);
        assert!(!order(&event).is_reversed);
        event.make_pick(3, None).unwrap();
        assert_eq!(order(&event).current_round, 2);
        assert!(order(&event).is_reversed);
        event.check_invariants().unwrap();
    }

    #[test]
    fn pick_override_allowed_for_existing_team() {
        let mut event = started(3, 3);
        let update = event.make_pick(1, Some(3)).unwrap();
        let DraftUpdate::PickMade { pick, progress } = update else {
            panic!("expected PickMade");
        };
        assert_eq!(pick.team_id, 3);
        // The sequence still advances to slot 1, which belongs to T2.
        assert_eq!(progress.on_the_clock, Some(2));
    }

    #[test]
    fn pick_override_unknown_team_not_found() {
        let mut event = started(3, 3);
        let err = event.make_pick(1, Some(42)).unwrap_err();
        assert!(matches!(err, DraftError::NotFound { .. }));
        assert!(event.picks.is_empty());
    }

    #[test]
    fn duplicate_pick_conflicts() {
        let mut event = started(2, 4);
        event.make_pick(1, None).unwrap();
        let err = event.make_pick(1, None).unwrap_err();
        assert!(matches!(err, DraftError::Conflict(_)));
        assert_eq!(event.picks.len(), 1);
    }

    #[test]
    fn unknown_player_not_found() {
        let mut event = started(2, 4);
        let err = event.make_pick(99, None).unwrap_err();
        assert!(matches!(err, DraftError::NotFound { .. }));
    }

    #[test]
    fn pick_rejected_outside_live_states() {
        let mut planned = DraftEvent::new("p", "P");
        planned.add_team("T1", &[]).unwrap();
        planned.add_player("P1", None, None).unwrap();
        assert!(matches!(planned.make_pick(1, None), Err(DraftError::InvalidState(_))));

        let mut open = event(2, 2);
        assert!(matches!(open.make_pick(1, None), Err(DraftError::InvalidState(_))));

        let mut completed = started(2, 1);
        completed.make_pick(1, None).unwrap();
        assert_eq!(completed.status, EventStatus::Completed);
        assert!(matches!(completed.make_pick(1, None), Err(DraftError::InvalidState(_))));

        let mut closed = started(2, 2);
        closed.close().unwrap();
        assert!(matches!(closed.make_pick(1, None), Err(DraftError::InvalidState(_))));
    }

    #[test]
    fn picks_allowed_while_paused() {
        let mut event = started(2, 3);
        event.pause().unwrap();
        event.make_pick(1, None).unwrap();
        assert_eq!(event.status, EventStatus::Paused);
    }

    #[test]
    fn undo_without_picks_is_invalid_state() {
        let mut event = started(2, 3);
        let err = event.undo_last_pick().unwrap_err();
        assert!(matches!(err, DraftError::InvalidState(_)));
    }

    #[test]
    fn pick_then_undo_restores_state_at_every_position() {
        let teams = 3;
        let players = 10;
        for before in 0..players {
            let mut event = started(teams, players);
            for player in 1..=before as PlayerId {
                event.make_pick(player, None).unwrap();
            }
            let snapshot_order = event.order.clone();
            let snapshot_picks = event.picks.clone();
            let snapshot_status = event.status;

            event.make_pick(before as PlayerId + 1, None).unwrap();
            event.undo_last_pick().unwrap();

            assert_eq!(event.order, snapshot_order, "after {before} picks");
            assert_eq!(event.picks, snapshot_picks);
            assert_eq!(event.status, snapshot_status);
            event.check_invariants().unwrap();
        }
    }

    #[test]
    fn repeated_undo_back_to_start() {
        let mut event = started(4, 9);
        for player in 1..=9 {
            event.make_pick(player, None).unwrap();
        }
        assert_eq!(event.status, EventStatus::Completed);
        for remaining in (0..9).rev() {
            event.undo_last_pick().unwrap();
            assert_eq!(event.picks.len(), remaining);
            assert_eq!(event.status, EventStatus::Drafting);
            event.check_invariants().unwrap();
        }
        let order = order(&event);
        assert_eq!(
            (order.current_pick, order.current_round, order.is_reversed),
            (0, 1, false)
        );
        assert!(event.undo_last_pick().is_err());
    }

    #[test]
    fn undo_removes_latest_pick_only() {
        let mut event = started(2, 4);
        event.make_pick(3, None).unwrap();
        event.make_pick(1, None).unwrap();
        let DraftUpdate::PickUndone { removed, .. } = event.undo_last_pick().unwrap() else {
            panic!("expected PickUndone");
        };
        assert_eq!(removed.player_id, 1);
        assert_eq!(event.picks.len(), 1);
        assert_eq!(event.picks[0].player_id, 3);
    }

    #[test]
    fn pause_and_resume_transitions() {
        let mut event = started(2, 2);
        event.pause().unwrap();
        assert_eq!(event.status, EventStatus::Paused);
        assert!(event.pause().is_err());
        event.resume().unwrap();
        assert_eq!(event.status, EventStatus::Drafting);
        assert!(matches!(event.resume(), Err(DraftError::InvalidState(_))));
    }

    #[test]
    fn pause_leaves_progress_untouched() {
        let mut event = started(3, 6);
        event.make_pick(1, None).unwrap();
        let before = event.order.clone();
        event.pause().unwrap();
        event.resume().unwrap();
        assert_eq!(event.order, before);
    }

    #[test]
    fn reset_allows_reinitialization() {
        let mut event = started(2, 3);
        event.make_pick(1, None).unwrap();
        event.reset_draft().unwrap();
        assert_eq!(event.status, EventStatus::Open);
        assert!(event.picks.is_empty());
        event.initialize(&[2, 1], 200).unwrap();
        assert_eq!(event.on_the_clock(), Some(2));
    }

    #[test]
    fn invariant_violation_detected() {
        let mut event = started(3, 6);
        event.make_pick(1, None).unwrap();
        event.order.as_mut().unwrap().is_reversed = true;
        assert!(matches!(event.check_invariants(), Err(DraftError::Invariant(_))));

        let mut event = started(3, 6);
        event.order.as_mut().unwrap().current_pick = 2;
        assert!(matches!(event.check_invariants(), Err(DraftError::Invariant(_))));
    }

    #[test]
    fn update_serializes_with_type_tag() {
        let mut event = started(2, 2);
        let update = event.pause().unwrap();
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["from"], "DRAFTING");
        assert_eq!(json["progress"]["status"], "PAUSED");
    }
}
