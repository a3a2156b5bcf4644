// Storage contract for events and submissions, plus an in-memory store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;

use crate::draft::event::DraftEvent;
use crate::prediction::submission::Submission;

/// Persistence collaborator for the draft service.
///
/// The service serializes writes per event, so an implementation only needs
/// each call to be atomic on its own: `save_event` must persist the event and
/// its whole pick log together or not at all.
pub trait EventStore: Send + Sync {
    fn load_event(&self, event_id: &str) -> Result<Option<DraftEvent>>;

    fn save_event(&self, event: &DraftEvent) -> Result<()>;

    fn load_submission(&self, event_id: &str, participant: &str) -> Result<Option<Submission>>;

    fn save_submission(&self, submission: &Submission) -> Result<()>;

    /// All submissions for an event, ordered by participant.
    fn load_submissions(&self, event_id: &str) -> Result<Vec<Submission>>;

    fn save_submissions(&self, submissions: &[Submission]) -> Result<()> {
        for submission in submissions {
            self.save_submission(submission)?;
        }
        Ok(())
    }

    /// Persist an event together with a batch of its submissions. Either
    /// everything is written or nothing is.
    fn save_event_with_submissions(&self, event: &DraftEvent, submissions: &[Submission]) -> Result<()>;
}

/// Process-local store. Useful for tests and for embedding the engine where
/// the caller handles durability.
#[derive(Default)]
pub struct MemoryStore {
    events: Mutex<HashMap<String, DraftEvent>>,
    submissions: Mutex<BTreeMap<(String, String), Submission>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // The maps are only replaced wholesale per entry, so a panic elsewhere
    // cannot leave a half-written value behind.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EventStore for MemoryStore {
    fn load_event(&self, event_id: &str) -> Result<Option<DraftEvent>> {
        Ok(guard(&self.events).get(event_id).cloned())
    }

    fn save_event(&self, event: &DraftEvent) -> Result<()> {
        guard(&self.events).insert(event.id.clone(), event.clone());
        Ok(())
    }

    fn load_submission(&self, event_id: &str, participant: &str) -> Result<Option<Submission>> {
        let key = (event_id.to_string(), participant.to_string());
        Ok(guard(&self.submissions).get(&key).cloned())
    }

    fn save_submission(&self, submission: &Submission) -> Result<()> {
        let key = (submission.event_id.clone(), submission.participant.clone());
        guard(&self.submissions).insert(key, submission.clone());
        Ok(())
    }

    fn load_submissions(&self, event_id: &str) -> Result<Vec<Submission>> {
        Ok(guard(&self.submissions)
            .iter()
            .filter(|((event, _), _)| event == event_id)
            .map(|(_, submission)| submission.clone())
            .collect())
    }

    fn save_event_with_submissions(&self, event: &DraftEvent, submissions: &[Submission]) -> Result<()> {
        // Both maps stay locked until every entry is in place.
        let mut events = guard(&self.events);
        let mut stored = guard(&self.submissions);
        events.insert(event.id.clone(), event.clone());
        for submission in submissions {
            let key = (submission.event_id.clone(), submission.participant.clone());
            stored.insert(key, submission.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_round_trip() {
        let store = MemoryStore::new();
        assert!(store.load_event("e1").unwrap().is_none());

        let mut event = DraftEvent::new("e1", "Event One");
        event.add_team("T1", &[]).unwrap();
        store.save_event(&event).unwrap();

        let loaded = store.load_event("e1").unwrap().unwrap();
        assert_eq!(loaded, event);
    }

    #[test]
    fn submissions_scoped_and_ordered() {
        let store = MemoryStore::new();
        store.save_submission(&Submission::new("e1", "zoe")).unwrap();
        store.save_submission(&Submission::new("e1", "al")).unwrap();
        store.save_submission(&Submission::new("e2", "mo")).unwrap();

        let subs = store.load_submissions("e1").unwrap();
        let names: Vec<&str> = subs.iter().map(|s| s.participant.as_str()).collect();
        assert_eq!(names, vec!["al", "zoe"]);
        assert!(store.load_submission("e2", "al").unwrap().is_none());
        assert!(store.load_submission("e2", "mo").unwrap().is_some());
    }

    #[test]
    fn event_saved_with_submissions() {
        let store = MemoryStore::new();
        let event = DraftEvent::new("e1", "Event One");
        let mut sub = Submission::new("e1", "al");
        sub.lock();
        store.save_event_with_submissions(&event, &[sub]).unwrap();

        assert_eq!(store.load_event("e1").unwrap(), Some(event));
        assert!(store.load_submission("e1", "al").unwrap().unwrap().locked);
    }
}
