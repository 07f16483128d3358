//! Telegram user-API adapter (MTProto, grammers).
//!
//! Implements the `tgpost-core` [`MessageProvider`] port. Unlike the Bot API,
//! a user session can read any public channel's history by message id.

use std::{collections::HashMap, path::PathBuf, sync::Mutex};

use async_trait::async_trait;
use grammers_client::{
    types::{Chat, Downloadable, Media, PackedChat},
    Client, Config, InitParams,
};
use grammers_session::Session;
use tokio::sync::OnceCell;

pub mod convert;

use tgpost_core::{
    domain::{ChatRef, MessageId},
    provider::{
        Entity, MediaHandle, Message, MessageProvider, MessageWindow, ProviderError,
        ProviderResult,
    },
};

use crate::convert::{chat_matches_id, map_invocation, message_id_i32, to_entity, to_message};

#[derive(Clone, Debug)]
pub struct MtprotoSettings {
    pub api_id: i32,
    pub api_hash: String,
    pub session_path: PathBuf,
}

impl From<&tgpost_core::config::Config> for MtprotoSettings {
    fn from(cfg: &tgpost_core::config::Config) -> Self {
        Self {
            api_id: cfg.api_id,
            api_hash: cfg.api_hash.clone(),
            session_path: cfg.session_path.clone(),
        }
    }
}

pub struct MtprotoProvider {
    settings: MtprotoSettings,
    client: OnceCell<Client>,
    /// Resolved chats by id; grammers needs the full chat (access hash) for
    /// every later request.
    chats: Mutex<HashMap<i64, Chat>>,
}

impl MtprotoProvider {
    pub fn new(settings: MtprotoSettings) -> Self {
        Self {
            settings,
            client: OnceCell::new(),
            chats: Mutex::new(HashMap::new()),
        }
    }

    fn client(&self) -> ProviderResult<&Client> {
        self.client
            .get()
            .ok_or_else(|| ProviderError::other("client is not connected"))
    }

    fn remember(&self, chat: &Chat) {
        if let Ok(mut chats) = self.chats.lock() {
            chats.insert(chat.id(), chat.clone());
        }
    }

    fn packed(&self, entity: &Entity) -> ProviderResult<PackedChat> {
        self.chats
            .lock()
            .ok()
            .and_then(|chats| chats.get(&entity.id).map(Chat::pack))
            .ok_or_else(|| ProviderError::not_found(format!("chat {} was not resolved", entity.id)))
    }

    fn chat(&self, entity: &Entity) -> ProviderResult<Chat> {
        self.chats
            .lock()
            .ok()
            .and_then(|chats| chats.get(&entity.id).cloned())
            .ok_or_else(|| ProviderError::not_found(format!("chat {} was not resolved", entity.id)))
    }

    async fn open_client(&self) -> ProviderResult<Client> {
        let session = Session::load_file_or_create(&self.settings.session_path).map_err(|e| {
            let kind = if e.to_string().to_ascii_lowercase().contains("locked") {
                tgpost_core::provider::ProviderErrorKind::SessionLocked
            } else {
                tgpost_core::provider::ProviderErrorKind::Other
            };
            ProviderError::new(
                kind,
                format!("session file {}: {e}", self.settings.session_path.display()),
            )
        })?;

        tracing::info!(session = %self.settings.session_path.display(), "connecting to telegram");
        Client::connect(Config {
            session,
            api_id: self.settings.api_id,
            api_hash: self.settings.api_hash.clone(),
            params: InitParams::default(),
        })
        .await
        .map_err(|e| ProviderError::network(format!("connect failed: {e}")))
    }

    async fn find_in_dialogs(&self, client: &Client, wanted: i64) -> ProviderResult<Chat> {
        let mut dialogs = client.iter_dialogs();
        while let Some(dialog) = dialogs.next().await.map_err(map_invocation)? {
            let chat = dialog.chat();
            if chat_matches_id(chat, wanted) {
                return Ok(chat.clone());
            }
        }
        Err(ProviderError::not_found(format!(
            "chat {wanted} is not among this account's dialogs"
        )))
    }

    async fn download(&self, downloadable: &Downloadable) -> ProviderResult<Vec<u8>> {
        let client = self.client()?;
        let mut out = Vec::new();
        let mut chunks = client.iter_download(downloadable);
        while let Some(chunk) = chunks.next().await.map_err(map_invocation)? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

#[async_trait]
impl MessageProvider for MtprotoProvider {
    async fn connect(&self) -> ProviderResult<()> {
        let client = self.client.get_or_try_init(|| self.open_client()).await?;
        let authorized = client.is_authorized().await.map_err(map_invocation)?;
        if !authorized {
            return Err(ProviderError::auth_required(
                "session is not signed in; run the login flow first",
            ));
        }
        Ok(())
    }

    async fn get_entity(&self, chat: &ChatRef) -> ProviderResult<Entity> {
        let client = self.client()?;
        let resolved = match chat {
            ChatRef::Handle(name) => client
                .resolve_username(name)
                .await
                .map_err(map_invocation)?
                .ok_or_else(|| ProviderError::not_found(format!("no chat named @{name}")))?,
            ChatRef::Id(id) => self.find_in_dialogs(client, *id).await?,
        };
        self.remember(&resolved);
        Ok(to_entity(&resolved))
    }

    async fn get_message(&self, entity: &Entity, id: MessageId) -> ProviderResult<Option<Message>> {
        let client = self.client()?;
        let packed = self.packed(entity)?;
        let raw_id = message_id_i32(id)?;

        let found = client
            .get_messages_by_id(packed, &[raw_id])
            .await
            .map_err(map_invocation)?;
        Ok(found
            .into_iter()
            .flatten()
            .find(|m| m.id() == raw_id)
            .map(|m| to_message(entity.id, &m)))
    }

    async fn get_messages(
        &self,
        entity: &Entity,
        window: MessageWindow,
    ) -> ProviderResult<Vec<Message>> {
        let client = self.client()?;
        let packed = self.packed(entity)?;
        // Telegram ids fit in i32; a wider upper bound covers the whole history.
        let offset = i32::try_from(window.max_id.max(0)).unwrap_or(i32::MAX);
        let span = usize::try_from(window.span()).unwrap_or(usize::MAX);
        let limit = window.limit.map_or(span, |l| l.min(span));
        if limit == 0 {
            return Ok(Vec::new());
        }

        // Newest first, strictly below `offset`.
        let mut iter = client.iter_messages(packed).offset_id(offset).limit(limit);
        let mut out = Vec::new();
        while let Some(m) = iter.next().await.map_err(map_invocation)? {
            let msg = to_message(entity.id, &m);
            if !window.contains(msg.id) {
                break;
            }
            out.push(msg);
        }
        tracing::debug!(chat = entity.id, min = window.min_id, max = window.max_id, found = out.len(), "message window fetched");
        Ok(out)
    }

    async fn download_media(&self, handle: &MediaHandle) -> ProviderResult<Vec<u8>> {
        let media = handle.native::<Media>().ok_or_else(|| {
            ProviderError::not_found(format!("message {} carries no downloadable media", handle.message_id))
        })?;
        self.download(&Downloadable::Media(media.clone())).await
    }

    async fn get_profile_photo(&self, entity: &Entity) -> ProviderResult<Option<Vec<u8>>> {
        let chat = self.chat(entity)?;
        let Some(photo) = chat.photo_downloadable(true) else {
            return Ok(None);
        };
        let bytes = self.download(&photo).await?;
        Ok(Some(bytes).filter(|b| !b.is_empty()))
    }

    /// Persist the in-memory session so auth keys survive a crash.
    async fn recover_session(&self) -> ProviderResult<()> {
        let client = self.client()?;
        client
            .session()
            .save_to_file(&self.settings.session_path)
            .map_err(|e| ProviderError::session_locked(format!("saving session: {e}")))
    }
}
