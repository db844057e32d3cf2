//! Process-wide operator session.
//!
//! Outer layers (the CLI today) call [`initialize`] once the operator is
//! known and read [`current_actor`] when building requests. Pipeline code
//! never reads the session; the actor travels on each request.

use std::sync::RwLock;

use stockwatch_core::UserId;

static SESSION: RwLock<Option<UserId>> = RwLock::new(None);

/// Start a session for `actor`, replacing any previous one.
pub fn initialize(actor: UserId) {
    let mut slot = SESSION.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(previous) = slot.replace(actor) {
        tracing::debug!(%previous, %actor, "replacing active session");
    }
}

pub fn current_actor() -> Option<UserId> {
    *SESSION.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// End the session. Returns the actor that was signed in, if any.
pub fn teardown() -> Option<UserId> {
    SESSION
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let actor = UserId::new();
        initialize(actor);
        assert_eq!(current_actor(), Some(actor));
        assert_eq!(teardown(), Some(actor));
        assert_eq!(current_actor(), None);
        assert_eq!(teardown(), None);
    }
}
