// Per-event serialized access to the draft engine over an EventStore.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::draft::event::DraftEvent;
use crate::draft::pick::{PlayerId, TeamId};
use crate::draft::state::{DraftProgress, DraftUpdate};
use crate::error::{DraftError, DraftResult};
use crate::prediction::aggregate::{aggregate_stats, AggregateReport};
use crate::prediction::score::{leaderboard, score_submission, LeaderboardEntry, ScoringRules, SubmissionScore};
use crate::prediction::submission::{Submission, SubmissionUpdate};
use crate::store::EventStore;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request broke a draft rule; safe to report back to the caller.
    #[error(transparent)]
    Draft(#[from] DraftError),

    #[error("storage failure: {0:#}")]
    Store(anyhow::Error),
}

impl From<anyhow::Error> for ServiceError {
    fn from(e: anyhow::Error) -> Self {
        ServiceError::Store(e)
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Runs draft operations with at most one write in flight per event.
///
/// Every operation on an event holds that event's lock across
/// load -> mutate -> save, so concurrent picks can never observe the same
/// `current_pick`. Different events proceed independently.
pub struct DraftService<S> {
    store: S,
    max_generated_picks: usize,
    rules: ScoringRules,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: EventStore> DraftService<S> {
    pub fn new(store: S, max_generated_picks: usize, rules: ScoringRules) -> Self {
        DraftService {
            store,
            max_generated_picks,
            rules,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(store: S, config: &Config) -> Self {
        Self::new(store, config.draft.max_generated_picks, config.scoring.clone())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetch the lock for an event. A lock is only registered for an event
    /// the store knows about (or one being created), so lookups of unknown
    /// ids leave the registry untouched.
    fn event_lock(&self, event_id: &str, create: bool) -> ServiceResult<Arc<Mutex<()>>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(event_id) {
            return Ok(Arc::clone(lock));
        }
        if !create && self.store.load_event(event_id)?.is_none() {
            return Err(DraftError::not_found("event", event_id).into());
        }
        let lock = Arc::new(Mutex::new(()));
        locks.insert(event_id.to_string(), Arc::clone(&lock));
        Ok(lock)
    }

    /// Run `f` with the event's lock held. The lock guards no data of its
    /// own, so a poisoned lock is still usable.
    fn locked<T>(&self, event_id: &str, f: impl FnOnce() -> ServiceResult<T>) -> ServiceResult<T> {
        self.with_lock(event_id, false, f)
    }

    fn with_lock<T>(
        &self,
        event_id: &str,
        create: bool,
        f: impl FnOnce() -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        let lock = self.event_lock(event_id, create)?;
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    fn load(&self, event_id: &str) -> ServiceResult<DraftEvent> {
        let event = self
            .store
            .load_event(event_id)?
            .ok_or_else(|| DraftError::not_found("event", event_id))?;
        event.check_invariants()?;
        Ok(event)
    }

    /// Load, mutate, and save an event under its lock. Nothing is saved
    /// when `f` fails.
    fn mutate<T>(
        &self,
        event_id: &str,
        f: impl FnOnce(&mut DraftEvent) -> DraftResult<T>,
    ) -> ServiceResult<T> {
        self.locked(event_id, || {
            let mut event = self.load(event_id)?;
            let out = f(&mut event)?;
            self.store.save_event(&event)?;
            Ok(out)
        })
    }

    fn read<T>(&self, event_id: &str, f: impl FnOnce(&DraftEvent) -> ServiceResult<T>) -> ServiceResult<T> {
        self.locked(event_id, || {
            let event = self.load(event_id)?;
            f(&event)
        })
    }

    // ------------------------------------------------------------------
    // Event setup
    // ------------------------------------------------------------------

    /// Store a new event. Fails with a conflict if the id is taken.
    pub fn create_event(&self, event: DraftEvent) -> ServiceResult<()> {
        let id = event.id.clone();
        self.with_lock(&id, true, || {
            if self.store.load_event(&id)?.is_some() {
                return Err(DraftError::Conflict(format!("event {id} already exists")).into());
            }
            self.store.save_event(&event)?;
            info!("Created event {} '{}'", event.id, event.name);
            Ok(())
        })
    }

    pub fn event(&self, event_id: &str) -> ServiceResult<DraftEvent> {
        self.read(event_id, |event| Ok(event.clone()))
    }

    pub fn add_team(&self, event_id: &str, name: &str, captains: &[String]) -> ServiceResult<TeamId> {
        self.mutate(event_id, |event| event.add_team(name, captains))
    }

    pub fn add_player(
        &self,
        event_id: &str,
        name: &str,
        group: Option<String>,
        note: Option<String>,
    ) -> ServiceResult<PlayerId> {
        self.mutate(event_id, |event| event.add_player(name, group, note))
    }

    pub fn open(&self, event_id: &str) -> ServiceResult<()> {
        self.mutate(event_id, |event| event.open())
    }

    pub fn close(&self, event_id: &str) -> ServiceResult<()> {
        self.mutate(event_id, |event| event.close())
    }

    /// Tear the draft down and reopen predictions.
    pub fn reset_draft(&self, event_id: &str) -> ServiceResult<()> {
        self.locked(event_id, || {
            let mut event = self.load(event_id)?;
            event.reset_draft()?;

            let mut submissions = self.store.load_submissions(event_id)?;
            for submission in &mut submissions {
                submission.locked = false;
            }
            self.store.save_event_with_submissions(&event, &submissions)?;
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Draft progression
    // ------------------------------------------------------------------

    /// Generate the snake order, start drafting, and lock every saved
    /// prediction.
    pub fn initialize_draft(&self, event_id: &str, base_order: &[TeamId]) -> ServiceResult<DraftUpdate> {
        self.locked(event_id, || {
            let mut event = self.load(event_id)?;
            let update = event.initialize(base_order, self.max_generated_picks)?;

            let mut submissions = self.store.load_submissions(event_id)?;
            for submission in &mut submissions {
                submission.lock();
            }
            self.store.save_event_with_submissions(&event, &submissions)?;
            info!(
                "Event {}: locked {} submissions at draft start",
                event_id,
                submissions.len()
            );
            Ok(update)
        })
    }

    pub fn make_pick(
        &self,
        event_id: &str,
        player_id: PlayerId,
        team_override: Option<TeamId>,
    ) -> ServiceResult<DraftUpdate> {
        self.mutate(event_id, |event| event.make_pick(player_id, team_override))
    }

    pub fn undo_last_pick(&self, event_id: &str) -> ServiceResult<DraftUpdate> {
        self.mutate(event_id, |event| event.undo_last_pick())
    }

    pub fn pause(&self, event_id: &str) -> ServiceResult<DraftUpdate> {
        self.mutate(event_id, |event| event.pause())
    }

    pub fn resume(&self, event_id: &str) -> ServiceResult<DraftUpdate> {
        self.mutate(event_id, |event| event.resume())
    }

    pub fn progress(&self, event_id: &str) -> ServiceResult<DraftProgress> {
        self.read(event_id, |event| Ok(event.progress()))
    }

    // ------------------------------------------------------------------
    // Predictions
    // ------------------------------------------------------------------

    /// Merge `update` into the participant's saved prediction, creating it on
    /// first save.
    pub fn save_submission(
        &self,
        event_id: &str,
        participant: &str,
        update: SubmissionUpdate,
    ) -> ServiceResult<Submission> {
        self.read(event_id, |event| {
            let mut submission = self
                .store
                .load_submission(event_id, participant)?
                .unwrap_or_else(|| Submission::new(event_id, participant));
            submission.apply(update, event, Utc::now())?;
            self.store.save_submission(&submission)?;
            debug!("Saved submission {}/{}", event_id, participant);
            Ok(submission)
        })
    }

    pub fn submission(&self, event_id: &str, participant: &str) -> ServiceResult<Submission> {
        self.store
            .load_submission(event_id, participant)?
            .ok_or_else(|| DraftError::not_found("submission", format!("{event_id}/{participant}")).into())
    }

    pub fn score_submission(&self, event_id: &str, participant: &str) -> ServiceResult<SubmissionScore> {
        self.read(event_id, |event| {
            ensure_complete(event)?;
            let submission = self.submission(event_id, participant)?;
            Ok(score_submission(event, &submission, &self.rules))
        })
    }

    pub fn leaderboard(&self, event_id: &str) -> ServiceResult<Vec<LeaderboardEntry>> {
        self.read(event_id, |event| {
            ensure_complete(event)?;
            let submissions = self.store.load_submissions(event_id)?;
            info!("Event {}: scoring {} submissions", event_id, submissions.len());
            Ok(leaderboard(event, &submissions, &self.rules))
        })
    }

    pub fn aggregate_stats(&self, event_id: &str) -> ServiceResult<AggregateReport> {
        self.read(event_id, |event| {
            let submissions = self.store.load_submissions(event_id)?;
            Ok(aggregate_stats(event, &submissions)?)
        })
    }
}

fn ensure_complete(event: &DraftEvent) -> DraftResult<()> {
    if event.is_draft_complete() {
        Ok(())
    } else {
        Err(DraftError::InvalidState(format!(
            "scores are available once the draft completes (status {})",
            event.status
        )))
    }
}
