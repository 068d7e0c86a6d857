/// Conversation identity for the lifetime of one process.
///
/// The id is issued by the assistant service and never persisted locally;
/// a restart always begins a fresh conversation.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::client::Backend;
use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── SessionManager ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SessionManager {
    current: Option<SessionId>,
}

impl SessionManager {
    pub fn current(&self) -> Option<&SessionId> {
        self.current.as_ref()
    }

    /// Return the bound id, creating one on first use.
    /// Only the first call (or the first after a failed creation) hits the network.
    pub async fn ensure(&mut self, backend: &dyn Backend) -> Result<SessionId, TransportError> {
        if let Some(id) = &self.current {
            return Ok(id.clone());
        }
        let id = backend.new_chat().await?;
        tracing::info!(session = %id, "session created");
        self.current = Some(id.clone());
        Ok(id)
    }

    /// Drop the current id and request a new one.
    /// On failure the manager is left unbound so the next send retries lazily.
    pub async fn reset(&mut self, backend: &dyn Backend) -> Result<SessionId, TransportError> {
        if let Some(old) = self.current.take() {
            tracing::info!(session = %old, "session discarded");
        }
        self.ensure(backend).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ChatReply, StepRequest};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Issues `sess_1`, `sess_2`, ... and fails every call listed in `fail_on`.
    struct Counter {
        calls: AtomicUsize,
        fail_on: Vec<usize>,
    }

    impl Counter {
        fn new(fail_on: Vec<usize>) -> Self {
            Self { calls: AtomicUsize::new(0), fail_on }
        }
    }

    #[async_trait]
    impl Backend for Counter {
        async fn new_chat(&self) -> Result<SessionId, TransportError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.contains(&n) {
                return Err(TransportError::MissingSession);
            }
            Ok(SessionId::new(format!("sess_{n}")))
        }

        async fn chat(&self, _: &SessionId, _: &str) -> Result<ChatReply, TransportError> {
            Ok(ChatReply::default())
        }

        async fn run_step(&self, _: &StepRequest) -> Result<Value, TransportError> {
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn test_ensure_creates_once() {
        let backend = Counter::new(vec![]);
        let mut mgr = SessionManager::default();
        assert!(mgr.current().is_none());
        let a = mgr.ensure(&backend).await.unwrap();
        let b = mgr.ensure(&backend).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_creation_retries_on_next_ensure() {
        let backend = Counter::new(vec![1]);
        let mut mgr = SessionManager::default();
        assert!(mgr.ensure(&backend).await.is_err());
        assert!(mgr.current().is_none());
        assert_eq!(mgr.ensure(&backend).await.unwrap().as_str(), "sess_2");
    }

    #[tokio::test]
    async fn test_reset_replaces_id() {
        let backend = Counter::new(vec![]);
        let mut mgr = SessionManager::default();
        mgr.ensure(&backend).await.unwrap();
        let id = mgr.reset(&backend).await.unwrap();
        assert_eq!(id.as_str(), "sess_2");
        assert_eq!(mgr.current().map(SessionId::as_str), Some("sess_2"));
    }

    #[tokio::test]
    async fn test_failed_reset_leaves_unbound() {
        let backend = Counter::new(vec![2]);
        let mut mgr = SessionManager::default();
        mgr.ensure(&backend).await.unwrap();
        assert!(mgr.reset(&backend).await.is_err());
        assert!(mgr.current().is_none());
    }

    #[test]
    fn test_session_id_is_transparent_on_the_wire() {
        let id = SessionId::new("sess_1700000000");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"sess_1700000000\"");
        assert_eq!(id.to_string(), "sess_1700000000");
    }
}
