//! Album reconstruction.
//!
//! The remote service stores an album as several sibling messages sharing an
//! [`AlbumKey`]. Membership is rebuilt by scanning a window of ids around a
//! known member and keeping the siblings that carry media, ordered by id.

use std::sync::Arc;

use crate::{
    domain::{AlbumKey, ChatRef, MessageId, MessageRef},
    errors::Error,
    provider::{Entity, Message, MessageProvider, MessageWindow},
    Result,
};

/// Ordered members of one logical post (ascending message id).
#[derive(Clone, Debug)]
pub struct AlbumMembership {
    pub chat: ChatRef,
    pub key: Option<AlbumKey>,
    members: Vec<Message>,
}

impl AlbumMembership {
    pub fn single(chat: ChatRef, msg: Message) -> Self {
        Self {
            chat,
            key: None,
            members: vec![msg],
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.members.get(index)
    }

    pub fn into_members(self) -> Vec<Message> {
        self.members
    }

    pub fn ids(&self) -> Vec<MessageId> {
        self.members.iter().map(|m| m.id).collect()
    }
}

/// Widest window radius the reconstructor will scan.
pub const MAX_RADIUS: i64 = 10_000;

/// Bound a configured radius to `0..=MAX_RADIUS`.
pub fn clamp_radius(radius: i64) -> i64 {
    radius.clamp(0, MAX_RADIUS)
}

pub struct AlbumReconstructor {
    provider: Arc<dyn MessageProvider>,
    /// Window radius for "all attachments" reconstruction.
    pub search_radius: i64,
    /// Window radius when only one attachment index is needed.
    pub lookup_radius: i64,
}

impl AlbumReconstructor {
    pub fn new(provider: Arc<dyn MessageProvider>, search_radius: i64, lookup_radius: i64) -> Self {
        Self {
            provider,
            search_radius: clamp_radius(search_radius),
            lookup_radius: clamp_radius(lookup_radius),
        }
    }

    /// Rebuild the membership `known` belongs to, scanning `radius` ids on
    /// each side. Provider errors propagate; an album with no media-bearing
    /// members in the window is `NotFound`.
    pub async fn reconstruct(
        &self,
        entity: &Entity,
        msg: &MessageRef,
        known: &Message,
        radius: i64,
    ) -> Result<AlbumMembership> {
        let Some(key) = known.album else {
            return Ok(AlbumMembership::single(msg.chat.clone(), known.clone()));
        };

        let window = MessageWindow::around(msg.message_id, clamp_radius(radius));
        let mut members: Vec<Message> = self
            .provider
            .get_messages(entity, window)
            .await?
            .into_iter()
            .filter(|m| m.album == Some(key) && m.has_media())
            .collect();
        members.sort_by_key(|m| m.id);
        members.dedup_by_key(|m| m.id);

        if members.is_empty() {
            return Err(Error::NotFound(format!(
                "album {} around {msg} has no media",
                key.0
            )));
        }

        tracing::debug!(
            %msg,
            album = key.0,
            radius,
            members = ?members.iter().map(|m| m.id.0).collect::<Vec<_>>(),
            "album reconstructed"
        );

        Ok(AlbumMembership {
            chat: msg.chat.clone(),
            key: Some(key),
            members,
        })
    }
}
