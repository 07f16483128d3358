//! Cache-aware media service: the surface the HTTP layer and CLI talk to.
//!
//! Reads go through the disk cache first. A miss fetches from the provider,
//! answers immediately and publishes the cache entry from a background task
//! the caller never waits on.

use std::sync::Arc;

use tokio_util::task::TaskTracker;

use crate::{
    archive,
    cache::{CacheKey, DiskCache},
    domain::{ChatRef, MessageRef},
    fetch::MediaFetcher,
    media::MediaBlob,
    post::PostSummary,
    Result,
};

pub struct MediaService {
    fetcher: Arc<MediaFetcher>,
    cache: Arc<DiskCache>,
    writes: TaskTracker,
}

/// A built archive and the name it should be saved under.
#[derive(Debug, Clone)]
pub struct PostArchive {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl MediaService {
    pub fn new(fetcher: Arc<MediaFetcher>, cache: Arc<DiskCache>) -> Self {
        Self {
            fetcher,
            cache,
            writes: TaskTracker::new(),
        }
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    /// Attachment `index` of the post at `msg`.
    pub async fn get_media(&self, msg: &MessageRef, index: usize) -> Result<MediaBlob> {
        let key = CacheKey::media(msg.chat.clone(), msg.message_id, index);
        if let Some(hit) = self.cached(&key).await {
            return Ok(hit);
        }

        let blob = self.fetcher.fetch_one(msg, index).await?;
        self.write_behind(key, &blob);
        Ok(blob)
    }

    pub async fn get_channel_photo(&self, chat: &ChatRef) -> Result<Option<MediaBlob>> {
        let key = CacheKey::channel_photo(chat.clone());
        if let Some(hit) = self.cached(&key).await {
            return Ok(Some(hit));
        }

        let photo = self.fetcher.channel_photo(chat).await?;
        if let Some(blob) = &photo {
            self.write_behind(key, blob);
        }
        Ok(photo)
    }

    /// Every attachment of the post, ascending by message id. Not cached:
    /// list positions do not line up with `get_media` indices.
    pub async fn get_all_media(&self, msg: &MessageRef) -> Result<Vec<MediaBlob>> {
        self.fetcher.fetch_all(msg).await
    }

    pub async fn check_availability(&self, msg: &MessageRef) -> bool {
        self.fetcher.check_availability(msg).await
    }

    pub async fn post_summary(&self, msg: &MessageRef) -> Result<PostSummary> {
        let (entity, primary) = self.fetcher.resolve_post(msg).await?;
        let blobs = self.fetcher.fetch_album(&entity, msg, &primary).await;
        Ok(PostSummary::new(msg, &entity, &primary, &blobs))
    }

    pub async fn build_archive(&self, msg: &MessageRef) -> Result<PostArchive> {
        let (entity, primary) = self.fetcher.resolve_post(msg).await?;
        let blobs = self.fetcher.fetch_album(&entity, msg, &primary).await;
        let summary = PostSummary::new(msg, &entity, &primary, &blobs);

        let logo = match self.get_channel_photo(&msg.chat).await {
            Ok(logo) => logo,
            Err(e) => {
                tracing::warn!(%msg, error = %e, "channel logo unavailable, archiving without it");
                None
            }
        };

        let bytes = archive::build_archive(&summary, &blobs, logo.as_ref())?;
        Ok(PostArchive {
            filename: archive::archive_filename(msg),
            bytes,
        })
    }

    /// Wait for every pending cache write. Request paths never call this.
    pub async fn flush(&self) {
        self.writes.close();
        self.writes.wait().await;
        self.writes.reopen();
    }

    /// Cache writes spawned but not yet finished.
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    async fn cached(&self, key: &CacheKey) -> Option<MediaBlob> {
        match self.cache.read(key).await {
            Ok(Some(blob)) => {
                tracing::debug!(%key, size = blob.len(), "cache hit");
                Some(blob)
            }
            Ok(None) => {
                tracing::debug!(%key, "cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "unusable cache entry, refetching");
                None
            }
        }
    }

    fn write_behind(&self, key: CacheKey, blob: &MediaBlob) {
        if !self.cache.is_enabled() {
            return;
        }
        let cache = Arc::clone(&self.cache);
        let blob = blob.clone();
        self.writes.spawn(async move {
            if let Err(e) = cache.write(&key, &blob).await {
                tracing::warn!(%key, error = %e, "cache write failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use super::*;
    use crate::{
        domain::MessageId,
        fetch::tests::{fetcher, news_album},
        testing::FakeProvider,
    };

    fn service(fake: Arc<FakeProvider>, cache: DiskCache) -> MediaService {
        MediaService::new(Arc::new(fetcher(fake)), Arc::new(cache))
    }

    fn news(id: i64) -> MessageRef {
        MessageRef::new(ChatRef::parse("news"), MessageId(id))
    }

    #[tokio::test]
    async fn second_get_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let fake = news_album();
        let svc = service(fake.clone(), DiskCache::open(dir.path()));

        let first = svc.get_media(&news(100), 2).await.unwrap();
        svc.flush().await;
        let before = fake.calls();

        let second = svc.get_media(&news(100), 2).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fake.calls(), before);
    }

    #[tokio::test]
    async fn cache_write_runs_after_the_response() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(news_album(), DiskCache::open(dir.path()));
        let key = CacheKey::media(ChatRef::parse("news"), MessageId(100), 2);

        // The test runtime is single-threaded: the write has not been polled yet.
        let blob = svc.get_media(&news(100), 2).await.unwrap();
        assert_eq!(svc.pending_writes(), 1);
        assert!(!svc.cache().paths(&key).data.exists());

        svc.flush().await;
        assert_eq!(svc.pending_writes(), 0);
        assert_eq!(svc.cache().read(&key).await.unwrap(), Some(blob));
    }

    #[tokio::test]
    async fn corrupt_meta_heals_on_next_get() {
        let dir = tempfile::tempdir().unwrap();
        let fake = news_album();
        let svc = service(fake.clone(), DiskCache::open(dir.path()));

        svc.get_media(&news(100), 1).await.unwrap();
        svc.flush().await;
        let key = CacheKey::media(ChatRef::parse("news"), MessageId(100), 1);
        std::fs::write(svc.cache().paths(&key).meta, b"not json").unwrap();

        let downloads = fake.calls().download_media;
        let blob = svc.get_media(&news(100), 1).await.unwrap();
        assert_eq!(blob.bytes, b"p100");
        assert_eq!(fake.calls().download_media, downloads + 1);

        svc.flush().await;
        assert_eq!(svc.cache().read(&key).await.unwrap(), Some(blob));
    }

    #[tokio::test]
    async fn disabled_cache_always_fetches() {
        let fake = news_album();
        let svc = service(fake.clone(), DiskCache::disabled());

        svc.get_media(&news(200), 0).await.unwrap();
        svc.get_media(&news(200), 0).await.unwrap();
        svc.flush().await;
        assert_eq!(fake.calls().download_media, 2);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let fake = news_album();
        let svc = service(fake.clone(), DiskCache::open(dir.path()));

        assert!(svc.get_media(&news(200), 1).await.unwrap_err().is_not_found());
        svc.flush().await;
        let key = CacheKey::media(ChatRef::parse("news"), MessageId(200), 1);
        assert!(!svc.cache().paths(&key).data.exists());
    }

    #[tokio::test]
    async fn channel_photo_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let fake = news_album();
        fake.set_profile_photo(1, b"logo");
        let svc = service(fake.clone(), DiskCache::open(dir.path()));
        let chat = ChatRef::parse("news");

        assert_eq!(svc.get_channel_photo(&chat).await.unwrap().unwrap().bytes, b"logo");
        svc.flush().await;
        assert_eq!(svc.get_channel_photo(&chat).await.unwrap().unwrap().bytes, b"logo");
        assert_eq!(fake.calls().get_profile_photo, 1);
    }

    #[tokio::test]
    async fn summary_and_availability() {
        let fake = news_album();
        let svc = service(fake, DiskCache::disabled());

        let summary = svc.post_summary(&news(100)).await.unwrap();
        assert_eq!(summary.text, "message 100");
        let names: Vec<_> = summary.media.iter().map(|m| m.filename.as_str()).collect();
        assert_eq!(
            names,
            ["photo_99.jpg", "photo_100.jpg", "photo_101.jpg", "photo_103.jpg"]
        );
        assert!(svc.check_availability(&news(100)).await);
        assert!(svc.post_summary(&news(4040)).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn archive_includes_album_and_logo() {
        let fake = news_album();
        fake.set_profile_photo(1, b"logo");
        let svc = service(fake, DiskCache::disabled());

        let out = svc.build_archive(&news(100)).await.unwrap();
        assert_eq!(out.filename, "telegram_post_news_100.zip");

        let mut zip = zip::ZipArchive::new(Cursor::new(out.bytes)).unwrap();
        assert!(zip.by_name("media/photo_103.jpg").is_ok());
        let mut logo = Vec::new();
        zip.by_name("channel_logo.jpg")
            .unwrap()
            .read_to_end(&mut logo)
            .unwrap();
        assert_eq!(logo, b"logo");
    }
}
