//! Telegram post and media resolution engine.
//!
//! The crate is provider-agnostic: the remote messaging service lives behind
//! the [`provider::MessageProvider`] port, implemented in adapter crates.
//! [`service::MediaService`] is the entry point: cache-aware media lookup,
//! album reconstruction, post summaries and archives.

pub mod album;
pub mod archive;
pub mod cache;
pub mod config;
pub mod connection;
pub mod domain;
pub mod errors;
pub mod fetch;
pub mod logging;
pub mod media;
pub mod post;
pub mod provider;
pub mod resolver;
pub mod retry;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};

use std::sync::Arc;

/// Wire the engine around `provider` using `config`.
pub fn build_service(
    config: &config::Config,
    provider: Arc<dyn provider::MessageProvider>,
) -> service::MediaService {
    let conn = Arc::new(connection::Connection::new(Arc::clone(&provider)));
    let resolver = resolver::Resolver::new(conn, config.entity_retry(), config.message_retry());
    let albums = album::AlbumReconstructor::new(
        provider,
        config.album_search_radius,
        config.album_lookup_radius,
    );
    let fetcher = fetch::MediaFetcher::new(resolver, albums);
    let cache = cache::DiskCache::open(&config.cache_dir);
    service::MediaService::new(Arc::new(fetcher), Arc::new(cache))
}
