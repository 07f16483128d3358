use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    errors::Error,
    provider::{MessageProvider, ProviderErrorKind},
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Connected,
    Failed(String),
}

/// Provider handle plus its connection lifecycle.
///
/// `ensure_connected` is idempotent: the first caller connects, concurrent
/// callers wait on the same lock and observe `Connected`. A failed attempt is
/// retried on the next call.
pub struct Connection {
    provider: Arc<dyn MessageProvider>,
    state: Mutex<ConnectionState>,
}

impl Connection {
    pub fn new(provider: Arc<dyn MessageProvider>) -> Self {
        Self {
            provider,
            state: Mutex::new(ConnectionState::Uninitialized),
        }
    }

    pub fn provider(&self) -> &Arc<dyn MessageProvider> {
        &self.provider
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.lock().await.clone()
    }

    pub async fn ensure_connected(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if *state == ConnectionState::Connected {
            return Ok(());
        }

        tracing::debug!("connecting to provider");
        match self.provider.connect().await {
            Ok(()) => {
                // Release any stale session-store lock left by a previous run.
                self.recover_session().await;
                *state = ConnectionState::Connected;
                tracing::info!("provider connected");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "provider connection failed");
                *state = ConnectionState::Failed(e.message.clone());
                if e.kind == ProviderErrorKind::AuthRequired {
                    return Err(Error::AuthRequired(e.message));
                }
                Err(Error::Provider(e))
            }
        }
    }

    /// Run the provider's session recovery; failures are logged, never raised.
    pub async fn recover_session(&self) {
        if let Err(e) = self.provider.recover_session().await {
            tracing::warn!(error = %e, "session recovery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{provider::ProviderError, testing::FakeProvider};

    #[tokio::test]
    async fn connect_is_idempotent() {
        let fake = Arc::new(FakeProvider::new());
        let conn = Connection::new(fake.clone());
        assert_eq!(conn.state().await, ConnectionState::Uninitialized);

        conn.ensure_connected().await.unwrap();
        conn.ensure_connected().await.unwrap();
        assert_eq!(conn.state().await, ConnectionState::Connected);
        assert_eq!(fake.calls().connect, 1);
    }

    #[tokio::test]
    async fn unauthorized_session_is_auth_required() {
        let fake = Arc::new(FakeProvider::new());
        fake.set_authorized(false);
        let conn = Connection::new(fake.clone());

        let err = conn.ensure_connected().await.unwrap_err();
        assert!(matches!(err, Error::AuthRequired(_)));
        assert!(matches!(conn.state().await, ConnectionState::Failed(_)));

        // A later call tries again.
        fake.set_authorized(true);
        conn.ensure_connected().await.unwrap();
        assert_eq!(fake.calls().connect, 2);
    }

    #[tokio::test]
    async fn failed_recovery_still_connects() {
        let fake = Arc::new(FakeProvider::new());
        fake.fail_recovery([ProviderError::session_locked("busy")]);
        let conn = Connection::new(fake.clone());

        conn.ensure_connected().await.unwrap();
        assert_eq!(conn.state().await, ConnectionState::Connected);
        assert_eq!(fake.calls().recover_session, 1);

        conn.recover_session().await;
        assert_eq!(fake.calls().recover_session, 2);
    }

    #[tokio::test]
    async fn concurrent_callers_connect_once() {
        let fake = Arc::new(FakeProvider::new());
        let conn = Arc::new(Connection::new(fake.clone()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = conn.clone();
            handles.push(tokio::spawn(async move { c.ensure_connected().await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(fake.calls().connect, 1);
    }
}
