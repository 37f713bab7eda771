use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::data::Session;
use crate::error::DataError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub year: u16,
    pub event: String,
    /// FP1, FP2, FP3, Q, S or R.
    pub session: String,
}

impl SessionKey {
    pub fn new(year: u16, event: impl Into<String>, session: impl Into<String>) -> Self {
        Self { year, event: event.into(), session: session.into() }
    }

    fn dir(&self, root: &Path) -> PathBuf {
        root.join(self.year.to_string()).join(&self.event).join(&self.session)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.year, self.event, self.session)
    }
}

/// Loaded sessions under a data root. A session is read from disk once per
/// key until it is invalidated.
#[derive(Debug)]
pub struct SessionCache {
    root: PathBuf,
    sessions: HashMap<SessionKey, Arc<Session>>,
}

impl SessionCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), sessions: HashMap::new() }
    }

    pub fn get_or_load(&mut self, key: &SessionKey) -> Result<Arc<Session>, DataError> {
        if let Some(session) = self.sessions.get(key) {
            debug!(%key, "session cache hit");
            return Ok(Arc::clone(session));
        }
        let session = Arc::new(Session::load(key.dir(&self.root))?);
        info!(%key, drivers = session.laps.driver_laps.len(), "loaded session");
        self.sessions.insert(key.clone(), Arc::clone(&session));
        Ok(session)
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.contains_key(key)
    }

    pub fn invalidate(&mut self, key: &SessionKey) -> bool {
        self.sessions.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
