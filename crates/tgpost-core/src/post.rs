//! Post summaries: text, channel, and per-attachment metadata (no bytes).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::MessageRef,
    media::{kind_of, MediaBlob},
    provider::{Entity, Message},
};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: i64,
    pub title: Option<String>,
    pub username: Option<String>,
    pub has_photo: bool,
}

impl From<&Entity> for ChannelInfo {
    fn from(e: &Entity) -> Self {
        Self {
            id: e.id,
            title: e.title.clone(),
            username: e.username.clone(),
            has_photo: e.has_photo,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaInfo {
    pub index: usize,
    pub kind: String,
    pub mime_type: String,
    pub size: usize,
    pub filename: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Media beside the text.
    Left,
    /// Text only.
    Top,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostSummary {
    pub chat: String,
    pub message_id: i64,
    pub text: String,
    pub date: Option<DateTime<Utc>>,
    pub layout: Layout,
    pub channel: ChannelInfo,
    pub media: Vec<MediaInfo>,
}

impl PostSummary {
    pub fn new(msg: &MessageRef, entity: &Entity, primary: &Message, blobs: &[MediaBlob]) -> Self {
        let media: Vec<MediaInfo> = blobs
            .iter()
            .enumerate()
            .map(|(index, b)| MediaInfo {
                index,
                kind: kind_of(&b.mime_type).to_string(),
                mime_type: b.mime_type.clone(),
                size: b.len(),
                filename: b.filename.clone(),
            })
            .collect();

        Self {
            chat: msg.chat.to_string(),
            message_id: msg.message_id.0,
            text: primary.text.clone(),
            date: primary.date,
            layout: if primary.has_media() || !media.is_empty() {
                Layout::Left
            } else {
                Layout::Top
            },
            channel: ChannelInfo::from(entity),
            media,
        }
    }
}
