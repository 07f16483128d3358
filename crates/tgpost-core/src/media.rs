//! Attachment description: mime type + suggested filename.

use crate::provider::{MediaKind, Message};

const OCTET_STREAM: &str = "application/octet-stream";

/// Downloaded attachment bytes plus how to present them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub filename: String,
}

impl MediaBlob {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Mime type and filename a message's attachment should be served with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaDescription {
    pub mime_type: String,
    pub filename: String,
}

impl MediaDescription {
    pub fn into_blob(self, bytes: Vec<u8>) -> MediaBlob {
        MediaBlob {
            bytes,
            mime_type: self.mime_type,
            filename: self.filename,
        }
    }
}

/// Describe the attachment of `msg`, or `None` for a message without media.
pub fn describe(msg: &Message) -> Option<MediaDescription> {
    let id = msg.id;
    let (mime_type, filename) = match &msg.media {
        MediaKind::None => return None,
        MediaKind::Photo => ("image/jpeg".to_string(), format!("photo_{id}.jpg")),
        MediaKind::WebPagePhoto => ("image/jpeg".to_string(), format!("webpage_photo_{id}.jpg")),
        MediaKind::Document { mime, file_name } => {
            let file_name = file_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty());
            let mime = mime
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_ascii_lowercase)
                .or_else(|| file_name.and_then(guess_mime))
                .unwrap_or_else(|| OCTET_STREAM.to_string());
            let name = match file_name {
                Some(n) => n.to_string(),
                None => synthesize_name(&mime, id.0),
            };
            (mime, name)
        }
    };

    Some(MediaDescription {
        filename: fix_extension(&mime_type, filename),
        mime_type,
    })
}

fn guess_mime(name: &str) -> Option<String> {
    mime_guess::from_path(name).first_raw().map(str::to_string)
}

fn synthesize_name(mime: &str, id: i64) -> String {
    if mime.starts_with("video/") {
        format!("video_{id}.mp4")
    } else if mime.starts_with("audio/") {
        format!("audio_{id}.mp3")
    } else if let Some(subtype) = mime.strip_prefix("image/") {
        format!("image_{id}.{subtype}")
    } else {
        format!("file_{id}")
    }
}

/// Append the canonical extension when the name does not already carry an
/// accepted one for `mime`.
fn fix_extension(mime: &str, mut name: String) -> String {
    let (canonical, accepted): (&str, &[&str]) = match mime {
        "image/jpeg" => (".jpg", &[".jpg", ".jpeg"]),
        "image/png" => (".png", &[".png"]),
        "image/gif" => (".gif", &[".gif"]),
        "video/mp4" => (".mp4", &[".mp4", ".avi", ".mov"]),
        "audio/mpeg" => (".mp3", &[".mp3", ".mpeg"]),
        _ => return name,
    };
    let lower = name.to_ascii_lowercase();
    if !accepted.iter().any(|ext| lower.ends_with(ext)) {
        name.push_str(canonical);
    }
    name
}

/// Coarse media class used by summaries.
pub fn kind_of(mime: &str) -> &'static str {
    if mime.starts_with("image/") {
        "photo"
    } else if mime.starts_with("video/") {
        "video"
    } else if mime.starts_with("audio/") {
        "audio"
    } else {
        "document"
    }
}
