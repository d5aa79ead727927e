//! Channel trait and message types shared by every transport.

use std::pin::Pin;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use regex::Regex;
use uuid::Uuid;

use crate::error::ChannelError;

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"']+"#).unwrap());

/// Something the sender attached to a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Attachment {
    /// An uploaded file.
    Document {
        file_name: String,
        mime_type: Option<String>,
        bytes: Vec<u8>,
    },
    /// A URL shared in the message.
    Link { url: String },
}

impl Attachment {
    /// Media type recorded on the message log.
    pub fn media_type(&self) -> String {
        match self {
            Self::Document { mime_type, .. } => mime_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            Self::Link { .. } => "text/uri-list".to_string(),
        }
    }
}

/// Find the first URL in free text.
pub fn detect_link(text: &str) -> Option<String> {
    URL.find(text).map(|m| {
        m.as_str()
            .trim_end_matches(['.', ',', ')', ';', '!', '?'])
            .to_string()
    })
}

/// An inbound message from any channel.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Name of the channel it arrived on.
    pub channel: String,
    /// Sender identifier on that channel; used as the jid.
    pub user_id: String,
    pub user_name: Option<String>,
    pub content: String,
    pub attachment: Option<Attachment>,
    /// Channel-specific routing data.
    pub metadata: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(
        channel: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            user_id: user_id.into(),
            user_name: None,
            content: content.into(),
            attachment: None,
            metadata: serde_json::Value::Null,
            received_at: Utc::now(),
        }
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Treat the first URL in the text as a link attachment when nothing
    /// else is attached.
    pub fn with_detected_link(mut self) -> Self {
        if self.attachment.is_none()
            && let Some(url) = detect_link(&self.content)
        {
            self.attachment = Some(Attachment::Link { url });
        }
        self
    }
}

pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// Presence indicator shown to the recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Typing,
    Paused,
}

/// A message transport.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start receiving. The stream ends when the transport closes.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), ChannelError>;

    /// Best-effort presence update.
    async fn send_presence(&self, recipient: &str, presence: Presence)
    -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Outbound primitives the coordinator depends on.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send_text(&self, jid: &str, text: &str) -> Result<(), ChannelError>;

    async fn start_typing(&self, jid: &str) -> Result<(), ChannelError>;

    async fn stop_typing(&self, jid: &str) -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_first_link_and_trims_punctuation() {
        assert_eq!(
            detect_link("see https://www.linkedin.com/in/ada-lovelace. thanks").as_deref(),
            Some("https://www.linkedin.com/in/ada-lovelace")
        );
        assert!(detect_link("no links here").is_none());
    }

    #[test]
    fn detected_link_does_not_replace_document() {
        let doc = Attachment::Document {
            file_name: "cv.txt".into(),
            mime_type: Some("text/plain".into()),
            bytes: b"hi".to_vec(),
        };
        let msg = IncomingMessage::new("cli", "1", "my cv and https://example.com")
            .with_attachment(doc.clone())
            .with_detected_link();
        assert_eq!(msg.attachment, Some(doc));

        let msg = IncomingMessage::new("cli", "1", "portfolio: https://dribbble.com/ada")
            .with_detected_link();
        assert!(matches!(msg.attachment, Some(Attachment::Link { ref url }) if url == "https://dribbble.com/ada"));
    }

    #[test]
    fn media_types() {
        let link = Attachment::Link { url: "https://x.y".into() };
        assert_eq!(link.media_type(), "text/uri-list");
        let doc = Attachment::Document {
            file_name: "a".into(),
            mime_type: None,
            bytes: vec![],
        };
        assert_eq!(doc.media_type(), "application/octet-stream");
    }
}
