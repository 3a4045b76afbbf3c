//! Transport-neutral view of an inbound update.
//!
//! Handlers consume this slice of a Telegram message instead of the concrete
//! transport type, which keeps the flows testable without a live bot.
use teloxide::types::{ChatId, MediaKind, Message, MessageId, MessageKind};

/// What the user actually sent, reduced to the cases the flows care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    /// Photo file ids as delivered by Telegram: ascending by image size, so
    /// the first is the smallest rendition and the last the largest.
    Photo(Vec<String>),
    Unsupported,
}

/// An inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub chat: ChatId,
    pub user_id: i64,
    pub message_id: MessageId,
    pub content: Content,
}

impl Incoming {
    /// Returns None for updates without a sender (e.g. channel posts).
    pub fn from_message(msg: &Message) -> Option<Incoming> {
        let user = msg.from()?;
        let content = match &msg.kind {
            MessageKind::Common(common) => match &common.media_kind {
                MediaKind::Text(text) => Content::Text(text.text.clone()),
                MediaKind::Photo(photo) => Content::Photo(
                    photo
                        .photo
                        .iter()
                        .map(|size| size.file.id.clone())
                        .collect(),
                ),
                _ => Content::Unsupported,
            },
            _ => Content::Unsupported,
        };
        Some(Incoming {
            chat: msg.chat.id,
            user_id: user.id.0 as i64,
            message_id: msg.id,
            content,
        })
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Content::Text(text) => Some(text),
            _ => None,
        }
    }
}
