use std::fmt;

/// Chat / channel reference as supplied by a caller.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatRef {
    Id(i64),
    Handle(String),
}

impl ChatRef {
    /// Digits (optionally signed) become a numeric id, anything else a handle.
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        let digits = s.strip_prefix('-').unwrap_or(s);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(id) = s.parse::<i64>() {
                return ChatRef::Id(id);
            }
        }
        ChatRef::Handle(s.trim_start_matches('@').to_string())
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRef::Id(id) => write!(f, "{id}"),
            ChatRef::Handle(h) => f.write_str(h),
        }
    }
}

impl From<&str> for ChatRef {
    fn from(s: &str) -> Self {
        ChatRef::parse(s)
    }
}

/// Remote message id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stable reference to one remote message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat: ChatRef,
    pub message_id: MessageId,
}

impl MessageRef {
    pub fn new(chat: ChatRef, message_id: MessageId) -> Self {
        Self { chat, message_id }
    }

    /// Parse a post link (`https://t.me/<chat>/<id>`, `t.me/c/<internal>/<id>`)
    /// or the short `<chat>/<id>` form.
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim();
        let s = s
            .strip_prefix("https://")
            .or_else(|| s.strip_prefix("http://"))
            .unwrap_or(s);
        let s = s
            .strip_prefix("t.me/")
            .or_else(|| s.strip_prefix("telegram.me/"))
            .unwrap_or(s);
        let s = s.split(['?', '#']).next().unwrap_or(s).trim_end_matches('/');

        let parts: Vec<&str> = s.split('/').collect();
        let (chat, id) = match parts.as_slice() {
            // Private channel links carry the bare channel id.
            ["c", internal, id] => {
                let internal: i64 = internal.parse().ok()?;
                (ChatRef::Id((-1_000_000_000_000i64).checked_sub(internal)?), *id)
            }
            [chat, id] if !chat.is_empty() => (ChatRef::parse(chat), *id),
            _ => return None,
        };
        let id: i64 = id.parse().ok()?;
        (id > 0).then(|| Self::new(chat, MessageId(id)))
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat, self.message_id)
    }
}

/// Grouping id shared by the sibling messages of one album.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AlbumKey(pub i64);
