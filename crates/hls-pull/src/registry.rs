use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::HlsPullError;
use crate::info::HlsInfo;
use crate::session::StreamSession;

/// Live sessions keyed by stream path.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<StreamSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session. Fails if its stream path is already publishing.
    pub fn insert(&self, session: Arc<StreamSession>) -> Result<(), HlsPullError> {
        match self.sessions.entry(session.stream_path().to_string()) {
            Entry::Occupied(entry) => Err(HlsPullError::AlreadyPublishing(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(session);
                Ok(())
            }
        }
    }

    pub fn get(&self, stream_path: &str) -> Option<Arc<StreamSession>> {
        self.sessions
            .get(stream_path)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Removes `session`, leaving a newer session on the same path untouched.
    pub fn remove(&self, session: &Arc<StreamSession>) -> bool {
        self.sessions
            .remove_if(session.stream_path(), |_, current| {
                Arc::ptr_eq(current, session)
            })
            .is_some()
    }

    pub fn contains(&self, stream_path: &str) -> bool {
        self.sessions.contains_key(stream_path)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn sessions(&self) -> Vec<Arc<StreamSession>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Status of every live session, ordered by stream path.
    pub fn snapshot(&self) -> Vec<HlsInfo> {
        let mut infos: Vec<_> = self.sessions().iter().map(|s| s.snapshot()).collect();
        infos.sort_by(|a, b| a.stream_path.cmp(&b.stream_path));
        infos
    }
}
