//! Remote message provider port.
//!
//! The core never speaks the remote wire protocol. Adapter crates (MTProto
//! today) implement [`MessageProvider`] and hand back provider-neutral
//! [`Entity`] / [`Message`] records with the attachment already classified
//! into a closed [`MediaKind`].

use std::{any::Any, fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{AlbumKey, ChatRef, MessageId};

// ============== Records ==============

/// Resolved chat / channel / user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entity {
    pub id: i64,
    pub title: Option<String>,
    pub username: Option<String>,
    pub has_photo: bool,
}

/// Attachment classification, produced once by the adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Document {
        mime: Option<String>,
        file_name: Option<String>,
    },
    WebPagePhoto,
    None,
}

impl MediaKind {
    pub fn is_some(&self) -> bool {
        !matches!(self, MediaKind::None)
    }
}

/// Opaque handle the provider uses to download an attachment.
///
/// Adapters may stash their native media object in `native`; the core only
/// clones the handle around.
#[derive(Clone)]
pub struct MediaHandle {
    pub chat_id: i64,
    pub message_id: MessageId,
    native: Option<Arc<dyn Any + Send + Sync>>,
}

impl MediaHandle {
    pub fn new(chat_id: i64, message_id: MessageId) -> Self {
        Self {
            chat_id,
            message_id,
            native: None,
        }
    }

    pub fn with_native<T: Any + Send + Sync>(mut self, native: T) -> Self {
        self.native = Some(Arc::new(native));
        self
    }

    pub fn native<T: Any>(&self) -> Option<&T> {
        self.native.as_deref().and_then(|n| n.downcast_ref::<T>())
    }
}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaHandle")
            .field("chat_id", &self.chat_id)
            .field("message_id", &self.message_id)
            .field("native", &self.native.is_some())
            .finish()
    }
}

/// Provider-neutral message.
#[derive(Clone, Debug)]
pub struct Message {
    pub id: MessageId,
    pub album: Option<AlbumKey>,
    pub text: String,
    pub date: Option<DateTime<Utc>>,
    pub media: MediaKind,
    pub handle: MediaHandle,
}

impl Message {
    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }
}

/// Message id window; both bounds are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageWindow {
    pub min_id: i64,
    pub max_id: i64,
    pub limit: Option<usize>,
}

impl MessageWindow {
    /// Every id within `radius` of `center` (inclusive on both sides).
    /// Bounds saturate at the ends of the id range.
    pub fn around(center: MessageId, radius: i64) -> Self {
        let reach = radius.max(0).saturating_add(1);
        Self {
            min_id: center.0.saturating_sub(reach),
            max_id: center.0.saturating_add(reach),
            limit: None,
        }
    }

    /// The single newest message at or below `id`. At `i64::MAX` the bound
    /// saturates and the window no longer reaches `id` itself.
    pub fn ending_at(id: MessageId) -> Self {
        Self {
            min_id: 0,
            max_id: id.0.saturating_add(1),
            limit: Some(1),
        }
    }

    pub fn contains(&self, id: MessageId) -> bool {
        id.0 > self.min_id && id.0 < self.max_id
    }

    /// Number of ids strictly inside the window.
    pub fn span(&self) -> u64 {
        (self.max_id as i128 - self.min_id as i128 - 1).clamp(0, u64::MAX as i128) as u64
    }
}

// ============== Errors ==============

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The local session store is busy; a recovery action may help.
    SessionLocked,
    /// The provider rejected the request shape (wrong id type, etc).
    Shape,
    Network,
    NotFound,
    AuthRequired,
    Other,
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn session_locked(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::SessionLocked, message)
    }

    pub fn shape(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Shape, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::NotFound, message)
    }

    pub fn auth_required(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::AuthRequired, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Other, message)
    }

    pub fn is_session_locked(&self) -> bool {
        self.kind == ProviderErrorKind::SessionLocked
    }

    pub fn is_shape(&self) -> bool {
        self.kind == ProviderErrorKind::Shape
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

// ============== Port ==============

#[async_trait]
pub trait MessageProvider: Send + Sync {
    /// Connect and verify the session is authorized.
    async fn connect(&self) -> ProviderResult<()>;

    async fn get_entity(&self, chat: &ChatRef) -> ProviderResult<Entity>;

    async fn get_message(&self, entity: &Entity, id: MessageId) -> ProviderResult<Option<Message>>;

    async fn get_messages(
        &self,
        entity: &Entity,
        window: MessageWindow,
    ) -> ProviderResult<Vec<Message>>;

    async fn download_media(&self, handle: &MediaHandle) -> ProviderResult<Vec<u8>>;

    async fn get_profile_photo(&self, entity: &Entity) -> ProviderResult<Option<Vec<u8>>>;

    /// Best-effort session store recovery. Must be idempotent.
    async fn recover_session(&self) -> ProviderResult<()> {
        Ok(())
    }
}
