use std::sync::{Arc, Mutex};

use crate::clock::{Clock, SystemClock};
use crate::token::TokenPayload;

/// Live-session registry the broker maintains and the grants cache consults.
///
/// `list_live` has snapshot semantics: one element per live session at the
/// time of the call.
pub trait SessionRegistry: Send + Sync {
    fn list_live(&self) -> Vec<Arc<TokenPayload>>;

    /// Evict every session whose raw token equals `raw_token`. Used when the
    /// authorization server reports the token invalid (401) during refresh.
    fn remove_all_with_matching_access_token(&self, raw_token: &str);
}

/// In-memory session registry.
///
/// The host registers a session when authentication completes and removes it
/// when the connection goes away; removal is by handle identity, so two
/// sessions created from the same raw token stay independent.
#[derive(Default)]
pub struct Sessions {
    active: Mutex<Vec<Arc<TokenPayload>>>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, token: Arc<TokenPayload>) {
        self.active.lock().expect("sessions lock").push(token);
    }

    pub fn remove(&self, token: &Arc<TokenPayload>) {
        self.active
            .lock()
            .expect("sessions lock")
            .retain(|session| !Arc::ptr_eq(session, token));
    }

    pub fn len(&self) -> usize {
        self.active.lock().expect("sessions lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionRegistry for Sessions {
    fn list_live(&self) -> Vec<Arc<TokenPayload>> {
        self.active.lock().expect("sessions lock").clone()
    }

    fn remove_all_with_matching_access_token(&self, raw_token: &str) {
        self.active
            .lock()
            .expect("sessions lock")
            .retain(|session| session.value() != raw_token);
    }
}

/// Shared services threaded through the authorization components.
///
/// Constructed once at broker startup and passed into constructors.
#[derive(Clone)]
pub struct AuthzContext {
    pub sessions: Arc<dyn SessionRegistry>,
    pub clock: Arc<dyn Clock>,
}

impl AuthzContext {
    pub fn new(sessions: Arc<dyn SessionRegistry>) -> Self {
        Self {
            sessions,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
