//! Translation between grammers types and the core's provider records.

use grammers_client::{
    types::{Chat, Media, Message as TgMessage},
    InvocationError,
};

use tgpost_core::{
    domain::{AlbumKey, MessageId},
    provider::{Entity, MediaHandle, MediaKind, Message, ProviderError, ProviderErrorKind},
};

/// Classify an attachment. This is the only place that inspects grammers media.
pub fn classify_media(media: &Media) -> MediaKind {
    match media {
        Media::Photo(_) => MediaKind::Photo,
        Media::Document(doc) => MediaKind::Document {
            mime: doc.mime_type().map(str::to_string),
            file_name: Some(doc.name().to_string()).filter(|n| !n.is_empty()),
        },
        Media::WebPage(_) => MediaKind::WebPagePhoto,
        _ => MediaKind::None,
    }
}

pub fn to_entity(chat: &Chat) -> Entity {
    Entity {
        id: chat.id(),
        title: Some(chat.name().to_string()).filter(|t| !t.is_empty()),
        username: chat.username().map(str::to_string),
        has_photo: chat.photo_downloadable(false).is_some(),
    }
}

pub fn to_message(chat_id: i64, msg: &TgMessage) -> Message {
    let id = MessageId(i64::from(msg.id()));
    let media = msg.media();
    let kind = media.as_ref().map(classify_media).unwrap_or(MediaKind::None);

    let mut handle = MediaHandle::new(chat_id, id);
    if let Some(m) = media {
        handle = handle.with_native(m);
    }

    Message {
        id,
        album: msg.grouped_id().map(AlbumKey),
        text: msg.text().to_string(),
        date: Some(msg.date()),
        media: kind,
        handle,
    }
}

/// Whether a numeric chat reference (bare, `-id` or `-100id`) names `chat`.
pub fn chat_matches_id(chat: &Chat, wanted: i64) -> bool {
    let id = chat.id();
    wanted == id || wanted == -id || wanted == -1_000_000_000_000 - id
}

pub fn message_id_i32(id: MessageId) -> Result<i32, ProviderError> {
    i32::try_from(id.0).map_err(|_| ProviderError::shape(format!("message id {id} out of range")))
}

pub fn map_invocation(e: InvocationError) -> ProviderError {
    let text = e.to_string();
    let kind = match &e {
        InvocationError::Rpc(rpc) => rpc_kind(&rpc.name),
        InvocationError::Read(grammers_mtsender::ReadError::Io(_)) => ProviderErrorKind::Network,
        _ if text.to_ascii_lowercase().contains("locked") => ProviderErrorKind::SessionLocked,
        _ => ProviderErrorKind::Other,
    };
    ProviderError::new(kind, text)
}

fn rpc_kind(name: &str) -> ProviderErrorKind {
    match name {
        "USERNAME_NOT_OCCUPIED" | "USERNAME_INVALID" | "CHANNEL_INVALID" | "CHANNEL_PRIVATE"
        | "CHAT_ID_INVALID" | "PEER_ID_INVALID" | "MSG_ID_INVALID" | "MESSAGE_IDS_EMPTY" => {
            ProviderErrorKind::NotFound
        }
        "AUTH_KEY_UNREGISTERED" | "AUTH_KEY_INVALID" | "SESSION_REVOKED" | "SESSION_EXPIRED"
        | "USER_DEACTIVATED" => ProviderErrorKind::AuthRequired,
        "INPUT_CONSTRUCTOR_INVALID" | "INPUT_FETCH_ERROR" | "INPUT_REQUEST_INVALID" => {
            ProviderErrorKind::Shape
        }
        _ => ProviderErrorKind::Other,
    }
}
