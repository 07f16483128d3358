//! Entity / message resolution with bounded retry and session recovery.

use std::sync::Arc;

use crate::{
    connection::Connection,
    domain::{ChatRef, MessageId, MessageRef},
    errors::Error,
    provider::{Entity, Message, MessageProvider, MessageWindow, ProviderError, ProviderErrorKind},
    retry::RetryPolicy,
    Result,
};

pub struct Resolver {
    conn: Arc<Connection>,
    entity_policy: RetryPolicy,
    message_policy: RetryPolicy,
}

impl Resolver {
    pub fn new(conn: Arc<Connection>, entity_policy: RetryPolicy, message_policy: RetryPolicy) -> Self {
        Self {
            conn,
            entity_policy,
            message_policy,
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn provider(&self) -> &Arc<dyn MessageProvider> {
        self.conn.provider()
    }

    async fn before_retry(&self, locked: bool) {
        if locked {
            tracing::warn!("session store locked, running recovery before retry");
            self.conn.recover_session().await;
        }
    }

    /// Resolve a chat reference. The final error propagates: nothing downstream
    /// works without the entity.
    pub async fn resolve_entity(&self, chat: &ChatRef) -> Result<Entity> {
        self.conn.ensure_connected().await?;
        let provider = self.provider();

        let entity = self
            .entity_policy
            .run(
                "resolve_entity",
                move |attempt| {
                    tracing::debug!(%chat, attempt, "resolving entity");
                    provider.get_entity(chat)
                },
                |e: &ProviderError| self.before_retry(e.is_session_locked()),
            )
            .await
            .map_err(|e| entity_error(chat, e))?;

        tracing::debug!(%chat, entity_id = entity.id, title = ?entity.title, "entity resolved");
        Ok(entity)
    }

    /// Resolve one message. Exhausted retries yield `Ok(None)`.
    pub async fn resolve_message(&self, msg: &MessageRef) -> Result<Option<Message>> {
        let entity = self.resolve_entity(&msg.chat).await?;
        self.find_message(&entity, msg).await
    }

    /// Message lookup against an already resolved entity.
    pub async fn find_message(&self, entity: &Entity, msg: &MessageRef) -> Result<Option<Message>> {
        let provider = self.provider();
        let id = msg.message_id;

        let outcome = self
            .message_policy
            .run(
                "resolve_message",
                move |attempt| async move {
                    tracing::debug!(%msg, attempt, "fetching message");
                    match provider.get_message(entity, id).await {
                        Err(e) if e.is_shape() => {
                            tracing::warn!(%msg, error = %e, "direct lookup rejected, trying window fallback");
                            lookup_via_window(provider.as_ref(), entity, id).await
                        }
                        other => other,
                    }
                },
                |e: &ProviderError| self.before_retry(e.is_session_locked()),
            )
            .await;

        match outcome {
            Ok(Some(m)) => Ok(Some(m)),
            Ok(None) => {
                tracing::warn!(%msg, "message not found");
                Ok(None)
            }
            Err(e) if e.kind == ProviderErrorKind::AuthRequired => Err(Error::AuthRequired(e.message)),
            Err(e) => {
                tracing::error!(%msg, error = %e, "message unavailable after retries");
                Ok(None)
            }
        }
    }
}

/// Fetch the one-message window ending at `id` and keep it only if it is the
/// requested message.
async fn lookup_via_window(
    provider: &dyn MessageProvider,
    entity: &Entity,
    id: MessageId,
) -> std::result::Result<Option<Message>, ProviderError> {
    let found = provider
        .get_messages(entity, MessageWindow::ending_at(id))
        .await?
        .into_iter()
        .next();
    Ok(found.filter(|m| m.id == id))
}

fn entity_error(chat: &ChatRef, e: ProviderError) -> Error {
    match e.kind {
        ProviderErrorKind::AuthRequired => Error::AuthRequired(e.message),
        ProviderErrorKind::NotFound => Error::NotFound(format!("chat {chat}: {}", e.message)),
        ProviderErrorKind::SessionLocked | ProviderErrorKind::Network => {
            Error::Transient(format!("chat {chat}: {e}"))
        }
        ProviderErrorKind::Shape | ProviderErrorKind::Other => Error::Provider(e),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::FakeProvider;

    fn resolver(fake: Arc<FakeProvider>) -> Resolver {
        let conn = Arc::new(Connection::new(fake));
        let fast = RetryPolicy::fixed(3, Duration::ZERO);
        Resolver::new(conn, fast, fast)
    }

    fn news(id: i64) -> MessageRef {
        MessageRef::new(ChatRef::parse("news"), MessageId(id))
    }

    #[tokio::test]
    async fn entity_succeeds_on_third_attempt() {
        let fake = Arc::new(FakeProvider::with_news());
        fake.fail_entity([
            ProviderError::network("timeout"),
            ProviderError::network("timeout"),
        ]);
        let r = resolver(fake.clone());

        let e = r.resolve_entity(&ChatRef::parse("news")).await.unwrap();
        assert_eq!(e.id, 1);
        assert_eq!(fake.calls().get_entity, 3);
    }

    #[tokio::test]
    async fn entity_failure_propagates_after_three_attempts() {
        let fake = Arc::new(FakeProvider::with_news());
        fake.fail_entity((0..3).map(|_| ProviderError::network("down")));
        let r = resolver(fake.clone());

        let err = r.resolve_entity(&ChatRef::parse("news")).await.unwrap_err();
        assert!(matches!(err, Error::Transient(_)));
        assert_eq!(fake.calls().get_entity, 3);
    }

    #[tokio::test]
    async fn unknown_chat_is_not_found_without_retry() {
        let fake = Arc::new(FakeProvider::with_news());
        let r = resolver(fake.clone());

        let err = r.resolve_entity(&ChatRef::parse("nope")).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(fake.calls().get_entity, 1);
    }

    #[tokio::test]
    async fn session_locked_triggers_recovery() {
        let fake = Arc::new(FakeProvider::with_news());
        fake.add_photo(1, 10, None, b"img");
        fake.fail_message([ProviderError::session_locked("database is locked")]);
        let r = resolver(fake.clone());

        let before = fake.calls().recover_session;
        let m = r.resolve_message(&news(10)).await.unwrap();
        assert_eq!(m.map(|m| m.id), Some(MessageId(10)));
        // One recovery after connecting, one before the retry.
        assert_eq!(fake.calls().recover_session, before + 2);
    }

    #[tokio::test]
    async fn failed_recovery_does_not_abort_the_retry() {
        let fake = Arc::new(FakeProvider::with_news());
        fake.add_photo(1, 10, None, b"img");
        let r = resolver(fake.clone());
        r.connection().ensure_connected().await.unwrap();

        fake.fail_recovery([ProviderError::session_locked("still locked")]);
        fake.fail_message([ProviderError::session_locked("database is locked")]);
        let m = r.resolve_message(&news(10)).await.unwrap();
        assert_eq!(m.map(|m| m.id), Some(MessageId(10)));
        assert_eq!(fake.calls().get_message, 2);
        assert_eq!(fake.calls().recover_session, 2);
    }

    #[tokio::test]
    async fn message_exhaustion_is_not_found() {
        let fake = Arc::new(FakeProvider::with_news());
        fake.add_photo(1, 10, None, b"img");
        fake.fail_message((0..3).map(|_| ProviderError::network("reset")));
        let r = resolver(fake.clone());

        assert!(r.resolve_message(&news(10)).await.unwrap().is_none());
        assert_eq!(fake.calls().get_message, 3);
    }

    #[tokio::test]
    async fn shape_error_falls_back_to_window() {
        let fake = Arc::new(FakeProvider::with_news());
        fake.add_photo(1, 10, None, b"img");
        fake.add_photo(1, 11, None, b"img2");
        fake.fail_message([ProviderError::shape("expected int")]);
        let r = resolver(fake.clone());

        let m = r.resolve_message(&news(10)).await.unwrap().unwrap();
        assert_eq!(m.id, MessageId(10));
        assert_eq!(fake.calls().get_message, 1);
        assert_eq!(fake.calls().get_messages, 1);
    }

    #[tokio::test]
    async fn window_fallback_rejects_neighbour() {
        let fake = Arc::new(FakeProvider::with_news());
        fake.add_photo(1, 9, None, b"older");
        fake.fail_message([ProviderError::shape("expected int")]);
        let r = resolver(fake.clone());

        // Message 10 does not exist; the window returns 9 which must not be used.
        assert!(r.resolve_message(&news(10)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_message_is_none() {
        let fake = Arc::new(FakeProvider::with_news());
        let r = resolver(fake.clone());
        assert!(r.resolve_message(&news(404)).await.unwrap().is_none());
        assert_eq!(fake.calls().get_message, 1);
    }
}
