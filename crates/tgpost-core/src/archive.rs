//! ZIP packaging of a post: media files, channel logo, text, metadata.

use std::{
    collections::HashSet,
    io::{Cursor, Write},
};

use serde::Serialize;
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::{
    cache::sanitize_component,
    domain::MessageRef,
    errors::Error,
    media::MediaBlob,
    post::PostSummary,
    Result,
};

pub const LOGO_ENTRY: &str = "channel_logo.jpg";
pub const TEXT_ENTRY: &str = "post.txt";
pub const METADATA_ENTRY: &str = "metadata.json";
pub const MEDIA_DIR: &str = "media";

#[derive(Debug, Serialize)]
struct ArchiveMetadata<'a> {
    chat: &'a str,
    message_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    channel_logo: bool,
    media_files: Vec<ArchivedMedia<'a>>,
}

#[derive(Debug, Serialize)]
struct ArchivedMedia<'a> {
    filename: String,
    original_filename: &'a str,
    mime_type: &'a str,
    size: usize,
}

/// Suggested download name for the archive of `msg`.
pub fn archive_filename(msg: &MessageRef) -> String {
    format!(
        "telegram_post_{}_{}.zip",
        sanitize_component(&msg.chat.to_string()),
        msg.message_id
    )
}

/// Build the archive in memory.
pub fn build_archive(
    summary: &PostSummary,
    media: &[MediaBlob],
    channel_logo: Option<&MediaBlob>,
) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    if let Some(logo) = channel_logo {
        add_entry(&mut zip, LOGO_ENTRY, &logo.bytes, options)?;
    }

    let names = entry_names(media);
    let mut media_files = Vec::with_capacity(media.len());
    for (blob, name) in media.iter().zip(names) {
        add_entry(&mut zip, &format!("{MEDIA_DIR}/{name}"), &blob.bytes, options)?;
        media_files.push(ArchivedMedia {
            filename: name,
            original_filename: &blob.filename,
            mime_type: &blob.mime_type,
            size: blob.len(),
        });
    }

    add_entry(&mut zip, TEXT_ENTRY, summary.text.as_bytes(), options)?;

    let metadata = ArchiveMetadata {
        chat: &summary.chat,
        message_id: summary.message_id,
        text: &summary.text,
        date: summary.date.map(|d| d.to_rfc3339()),
        channel_logo: channel_logo.is_some(),
        media_files,
    };
    let json = serde_json::to_vec_pretty(&metadata)?;
    add_entry(&mut zip, METADATA_ENTRY, &json, options)?;

    let out = zip.finish().map_err(|e| Error::Archive(e.to_string()))?;
    let bytes = out.into_inner();
    tracing::info!(
        chat = %summary.chat,
        message_id = summary.message_id,
        media = media.len(),
        size = bytes.len(),
        "archive built"
    );
    Ok(bytes)
}

fn add_entry(
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    name: &str,
    bytes: &[u8],
    options: FileOptions,
) -> Result<()> {
    zip.start_file(name, options)
        .map_err(|e| Error::Archive(format!("{name}: {e}")))?;
    zip.write_all(bytes)?;
    Ok(())
}

/// Unique, filesystem-friendly names for the media entries.
fn entry_names(media: &[MediaBlob]) -> Vec<String> {
    let mut used = HashSet::new();
    media
        .iter()
        .enumerate()
        .map(|(i, blob)| {
            let (stem, ext) = split_name(&blob.filename);
            let mut stem: String = stem
                .chars()
                .filter(|c| c.is_alphanumeric() || "._- ".contains(*c))
                .collect();
            if stem.is_empty() {
                stem = format!("media_{i}");
            }
            let ext = match ext {
                Some(e) => format!(".{e}"),
                None => format!(".{}", subtype_ext(&blob.mime_type)),
            };

            let mut name = format!("{stem}{ext}");
            let mut n = 1;
            while !used.insert(name.clone()) {
                name = format!("{stem}_{n}{ext}");
                n += 1;
            }
            name
        })
        .collect()
}

/// `"clip.tar.mp4"` -> `("clip.tar", Some("mp4"))`; a leading dot is part of the stem.
fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => (&name[..pos], Some(&name[pos + 1..])),
        _ => (name, None),
    }
}

fn subtype_ext(mime: &str) -> &str {
    mime.split_once('/')
        .map(|(_, sub)| sub)
        .filter(|s| !s.is_empty())
        .unwrap_or("bin")
}
