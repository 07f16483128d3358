//! Media fetch orchestration: resolve, reconstruct, download, describe.

use crate::{
    album::AlbumReconstructor,
    domain::{ChatRef, MessageRef},
    errors::Error,
    media::{describe, MediaBlob},
    provider::{Entity, Message},
    resolver::Resolver,
    Result,
};

pub struct MediaFetcher {
    resolver: Resolver,
    albums: AlbumReconstructor,
}

impl MediaFetcher {
    pub fn new(resolver: Resolver, albums: AlbumReconstructor) -> Self {
        Self { resolver, albums }
    }

    /// Resolve the chat and its primary message; an absent message is `NotFound`.
    pub async fn resolve_post(&self, msg: &MessageRef) -> Result<(Entity, Message)> {
        let entity = self.resolver.resolve_entity(&msg.chat).await?;
        let primary = self
            .resolver
            .find_message(&entity, msg)
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {msg}")))?;
        Ok((entity, primary))
    }

    /// Attachment `index` of the post at `msg`. Index 0 is the referenced
    /// message itself; higher indices address the reconstructed album.
    pub async fn fetch_one(&self, msg: &MessageRef, index: usize) -> Result<MediaBlob> {
        let (entity, primary) = self.resolve_post(msg).await?;

        let target = if index == 0 {
            primary
        } else {
            let album = self
                .albums
                .reconstruct(&entity, msg, &primary, self.albums.lookup_radius)
                .await?;
            match album.get(index) {
                Some(m) => m.clone(),
                None => {
                    return Err(Error::IndexOutOfRange {
                        index,
                        len: album.len(),
                    })
                }
            }
        };

        tracing::debug!(%msg, index, target = %target.id, "fetching attachment");
        self.download(&target).await
    }

    /// Every attachment of the post, ascending by message id. Members that
    /// fail to download are skipped.
    pub async fn fetch_all(&self, msg: &MessageRef) -> Result<Vec<MediaBlob>> {
        let entity = self.resolver.resolve_entity(&msg.chat).await?;
        let Some(primary) = self.resolver.find_message(&entity, msg).await? else {
            return Ok(Vec::new());
        };
        Ok(self.fetch_album(&entity, msg, &primary).await)
    }

    /// Download all members of the album `primary` belongs to.
    pub async fn fetch_album(&self, entity: &Entity, msg: &MessageRef, primary: &Message) -> Vec<MediaBlob> {
        let members = if primary.album.is_none() {
            if primary.has_media() {
                vec![primary.clone()]
            } else {
                Vec::new()
            }
        } else {
            match self
                .albums
                .reconstruct(entity, msg, primary, self.albums.search_radius)
                .await
            {
                Ok(album) => album.into_members(),
                Err(e) => {
                    tracing::warn!(%msg, error = %e, "album reconstruction failed");
                    Vec::new()
                }
            }
        };

        let mut blobs = Vec::with_capacity(members.len());
        for (i, member) in members.iter().enumerate() {
            match self.download(member).await {
                Ok(blob) => blobs.push(blob),
                Err(e) => {
                    tracing::warn!(%msg, member = %member.id, position = i, error = %e, "skipping album member");
                }
            }
        }
        tracing::info!(%msg, fetched = blobs.len(), members = members.len(), "album fetched");
        blobs
    }

    /// The chat's profile photo, if it has one.
    pub async fn channel_photo(&self, chat: &ChatRef) -> Result<Option<MediaBlob>> {
        let entity = self.resolver.resolve_entity(chat).await?;
        if !entity.has_photo {
            return Ok(None);
        }
        let bytes = self
            .resolver
            .provider()
            .get_profile_photo(&entity)
            .await
            .map_err(|e| Error::DownloadFailed(format!("profile photo of {chat}: {e}")))?;
        Ok(bytes.filter(|b| !b.is_empty()).map(|bytes| MediaBlob {
            bytes,
            mime_type: "image/jpeg".to_string(),
            filename: "channel_photo.jpg".to_string(),
        }))
    }

    /// Whether the message exists and carries media. Failures read as `false`.
    pub async fn check_availability(&self, msg: &MessageRef) -> bool {
        match self.resolver.resolve_message(msg).await {
            Ok(found) => found.is_some_and(|m| m.has_media()),
            Err(e) => {
                tracing::warn!(%msg, error = %e, "availability check failed");
                false
            }
        }
    }

    async fn download(&self, msg: &Message) -> Result<MediaBlob> {
        let desc = describe(msg)
            .ok_or_else(|| Error::NotFound(format!("message {} has no media", msg.id)))?;
        let bytes = self
            .resolver
            .provider()
            .download_media(&msg.handle)
            .await
            .map_err(|e| Error::DownloadFailed(format!("message {}: {e}", msg.id)))?;
        if bytes.is_empty() {
            return Err(Error::DownloadFailed(format!(
                "message {}: empty payload",
                msg.id
            )));
        }
        tracing::debug!(message = %msg.id, size = bytes.len(), mime = %desc.mime_type, "media downloaded");
        Ok(desc.into_blob(bytes))
    }
}
