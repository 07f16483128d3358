//! In-memory provider used by the unit tests.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{
    domain::{AlbumKey, ChatRef, MessageId},
    provider::{
        Entity, MediaHandle, MediaKind, Message, MessageProvider, MessageWindow, ProviderError,
        ProviderResult,
    },
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub connect: usize,
    pub get_entity: usize,
    pub get_message: usize,
    pub get_messages: usize,
    pub download_media: usize,
    pub get_profile_photo: usize,
    pub recover_session: usize,
}

#[derive(Default)]
struct State {
    authorized: bool,
    entities: Vec<Entity>,
    messages: HashMap<i64, BTreeMap<i64, Message>>,
    payloads: HashMap<(i64, i64), Vec<u8>>,
    photos: HashMap<i64, Vec<u8>>,
    entity_failures: VecDeque<ProviderError>,
    message_failures: VecDeque<ProviderError>,
    window_failures: VecDeque<ProviderError>,
    recovery_failures: VecDeque<ProviderError>,
    broken_downloads: HashSet<(i64, i64)>,
    calls: CallCounts,
}

pub struct FakeProvider {
    state: Mutex<State>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                authorized: true,
                ..State::default()
            }),
        }
    }

    /// A fake with chat `news` (id 1) already registered.
    pub fn with_news() -> Self {
        let fake = Self::new();
        fake.add_chat("news", 1);
        fake
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls
    }

    pub fn set_authorized(&self, authorized: bool) {
        self.state.lock().unwrap().authorized = authorized;
    }

    pub fn add_chat(&self, username: &str, id: i64) {
        self.state.lock().unwrap().entities.push(Entity {
            id,
            title: Some(format!("Channel {username}")),
            username: Some(username.to_string()),
            has_photo: false,
        });
    }

    pub fn set_profile_photo(&self, chat_id: i64, bytes: &[u8]) {
        let mut st = self.state.lock().unwrap();
        if let Some(e) = st.entities.iter_mut().find(|e| e.id == chat_id) {
            e.has_photo = true;
        }
        st.photos.insert(chat_id, bytes.to_vec());
    }

    pub fn add_message(
        &self,
        chat_id: i64,
        id: i64,
        album: Option<i64>,
        media: MediaKind,
        payload: Option<&[u8]>,
    ) {
        let msg = Message {
            id: MessageId(id),
            album: album.map(AlbumKey),
            text: format!("message {id}"),
            date: None,
            media,
            handle: MediaHandle::new(chat_id, MessageId(id)),
        };
        let mut st = self.state.lock().unwrap();
        st.messages.entry(chat_id).or_default().insert(id, msg);
        if let Some(p) = payload {
            st.payloads.insert((chat_id, id), p.to_vec());
        }
    }

    pub fn add_photo(&self, chat_id: i64, id: i64, album: Option<i64>, payload: &[u8]) {
        self.add_message(chat_id, id, album, MediaKind::Photo, Some(payload));
    }

    pub fn add_document(
        &self,
        chat_id: i64,
        id: i64,
        album: Option<i64>,
        mime: Option<&str>,
        file_name: Option<&str>,
        payload: &[u8],
    ) {
        let media = MediaKind::Document {
            mime: mime.map(str::to_string),
            file_name: file_name.map(str::to_string),
        };
        self.add_message(chat_id, id, album, media, Some(payload));
    }

    pub fn add_text(&self, chat_id: i64, id: i64, album: Option<i64>) {
        self.add_message(chat_id, id, album, MediaKind::None, None);
    }

    /// Queue errors returned by the next `get_entity` calls.
    pub fn fail_entity(&self, errors: impl IntoIterator<Item = ProviderError>) {
        self.state.lock().unwrap().entity_failures.extend(errors);
    }

    /// Queue errors returned by the next `get_message` calls.
    pub fn fail_message(&self, errors: impl IntoIterator<Item = ProviderError>) {
        self.state.lock().unwrap().message_failures.extend(errors);
    }

    /// Queue errors returned by the next `get_messages` calls.
    pub fn fail_window(&self, errors: impl IntoIterator<Item = ProviderError>) {
        self.state.lock().unwrap().window_failures.extend(errors);
    }

    /// Queue errors returned by the next `recover_session` calls.
    pub fn fail_recovery(&self, errors: impl IntoIterator<Item = ProviderError>) {
        self.state.lock().unwrap().recovery_failures.extend(errors);
    }

    pub fn break_download(&self, chat_id: i64, id: i64) {
        self.state
            .lock()
            .unwrap()
            .broken_downloads
            .insert((chat_id, id));
    }
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageProvider for FakeProvider {
    async fn connect(&self) -> ProviderResult<()> {
        let mut st = self.state.lock().unwrap();
        st.calls.connect += 1;
        if st.authorized {
            Ok(())
        } else {
            Err(ProviderError::auth_required("session is not authorized"))
        }
    }

    async fn get_entity(&self, chat: &ChatRef) -> ProviderResult<Entity> {
        let mut st = self.state.lock().unwrap();
        st.calls.get_entity += 1;
        if let Some(e) = st.entity_failures.pop_front() {
            return Err(e);
        }
        st.entities
            .iter()
            .find(|e| match chat {
                ChatRef::Id(id) => e.id == *id,
                ChatRef::Handle(h) => e.username.as_deref() == Some(h.as_str()),
            })
            .cloned()
            .ok_or_else(|| ProviderError::not_found(format!("no chat {chat}")))
    }

    async fn get_message(&self, entity: &Entity, id: MessageId) -> ProviderResult<Option<Message>> {
        let mut st = self.state.lock().unwrap();
        st.calls.get_message += 1;
        if let Some(e) = st.message_failures.pop_front() {
            return Err(e);
        }
        Ok(st
            .messages
            .get(&entity.id)
            .and_then(|m| m.get(&id.0))
            .cloned())
    }

    async fn get_messages(
        &self,
        entity: &Entity,
        window: MessageWindow,
    ) -> ProviderResult<Vec<Message>> {
        let mut st = self.state.lock().unwrap();
        st.calls.get_messages += 1;
        if let Some(e) = st.window_failures.pop_front() {
            return Err(e);
        }
        // Newest first, like the real service.
        let mut out: Vec<Message> = st
            .messages
            .get(&entity.id)
            .map(|m| {
                m.values()
                    .rev()
                    .filter(|msg| window.contains(msg.id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(limit) = window.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn download_media(&self, handle: &MediaHandle) -> ProviderResult<Vec<u8>> {
        let mut st = self.state.lock().unwrap();
        st.calls.download_media += 1;
        let key = (handle.chat_id, handle.message_id.0);
        if st.broken_downloads.contains(&key) {
            return Err(ProviderError::network("connection reset during download"));
        }
        st.payloads
            .get(&key)
            .cloned()
            .ok_or_else(|| ProviderError::not_found("no media payload"))
    }

    async fn get_profile_photo(&self, entity: &Entity) -> ProviderResult<Option<Vec<u8>>> {
        let mut st = self.state.lock().unwrap();
        st.calls.get_profile_photo += 1;
        Ok(st.photos.get(&entity.id).cloned())
    }

    async fn recover_session(&self) -> ProviderResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.recover_session += 1;
        match state.recovery_failures.pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
