//! Telegram Bot API update shapes.

use serde::{Deserialize, Serialize};

use herald_channels::model::MessageKind;

/// One webhook call carries exactly one update.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub date: Option<i64>,
    pub text: Option<String>,
    #[serde(default)]
    pub photo: Vec<PhotoSize>,
    pub video: Option<serde_json::Value>,
    pub voice: Option<serde_json::Value>,
    pub audio: Option<serde_json::Value>,
    pub document: Option<serde_json::Value>,
    pub sticker: Option<serde_json::Value>,
    pub location: Option<serde_json::Value>,
    pub contact: Option<serde_json::Value>,
    pub poll: Option<serde_json::Value>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl User {
    /// Best-effort human-readable name.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.last_name {
            Some(ref last) => format!("{} {last}", self.first_name),
            None => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub data: Option<String>,
    pub message: Option<Message>,
}

impl Message {
    /// Map the populated payload field onto the canonical kind.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        if self.text.is_some() {
            MessageKind::Text
        } else if !self.photo.is_empty() {
            MessageKind::Image
        } else if self.video.is_some() {
            MessageKind::Video
        } else if self.voice.is_some() || self.audio.is_some() {
            MessageKind::Audio
        } else if self.document.is_some() {
            MessageKind::Document
        } else if self.sticker.is_some() {
            MessageKind::Sticker
        } else if self.location.is_some() {
            MessageKind::Location
        } else if self.contact.is_some() {
            MessageKind::ContactCard
        } else if self.poll.is_some() {
            MessageKind::Poll
        } else {
            MessageKind::Unknown
        }
    }

    /// Canonical content: plain text for text messages, a self-describing
    /// JSON document (kind tag + provider object) otherwise.
    #[must_use]
    pub fn content(&self) -> String {
        if let Some(ref text) = self.text {
            return text.clone();
        }
        let kind = self.kind();
        let payload = if !self.photo.is_empty() {
            // Sizes arrive smallest first; keep the largest rendition.
            self.photo
                .last()
                .and_then(|p| serde_json::to_value(p).ok())
                .unwrap_or(serde_json::Value::Null)
        } else {
            self.video
                .clone()
                .or_else(|| self.voice.clone())
                .or_else(|| self.audio.clone())
                .or_else(|| self.document.clone())
                .or_else(|| self.sticker.clone())
                .or_else(|| self.location.clone())
                .or_else(|| self.contact.clone())
                .or_else(|| self.poll.clone())
                .unwrap_or(serde_json::Value::Null)
        };
        serde_json::json!({
            "kind": kind.as_str(),
            kind.as_str(): payload,
            "caption": self.caption,
        })
        .to_string()
    }
}
