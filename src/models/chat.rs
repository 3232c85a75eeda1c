use serde::{Deserialize, Serialize};

/// Chars kept when deriving a title or preview from message text.
pub const TITLE_MAX_CHARS: usize = 50;

/// Client-generated ids carry this prefix until the server has assigned a
/// real identity.
pub const PLACEHOLDER_PREFIX: &str = "optimistic-";

pub fn is_placeholder_id(id: &str) -> bool {
    id.starts_with(PLACEHOLDER_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        Self {
            role: MessageRole::User,
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.to_string(),
        }
    }
}

/// A full chat as the server returns it. The backend names the id field
/// `_id`; `title` and `messages` may be omitted on freshly created chats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl Chat {
    pub fn is_placeholder(&self) -> bool {
        is_placeholder_id(&self.id)
    }
}

/// List-item view of a chat: no message history, just enough for the
/// chat list (title plus a preview of the last message).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub last_message_preview: Option<String>,
}

impl From<&Chat> for ChatSummary {
    fn from(chat: &Chat) -> Self {
        Self {
            id: chat.id.clone(),
            title: chat.title.clone(),
            last_message_preview: chat
                .messages
                .last()
                .map(|message| ellipsize(&message.content, TITLE_MAX_CHARS)),
        }
    }
}

/// Partial update body for PUT /chat/{id}; omitted fields are untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
}

impl ChatUpdate {
    pub fn with_title(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            ..Self::default()
        }
    }

    pub fn with_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages: Some(messages),
            ..Self::default()
        }
    }
}

/// Derive a chat title from the first user message, truncated with an
/// ellipsis marker when it runs long.
pub fn derive_title(first_message: &str) -> String {
    ellipsize(first_message, TITLE_MAX_CHARS)
}

fn ellipsize(text: &str, max_chars: usize) -> String {
    let truncated: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_title_truncates_long_messages() {
        let message =
            "Hello world, this is a test of truncation behavior that exceeds fifty characters total";
        assert_eq!(
            derive_title(message),
            "Hello world, this is a test of truncation behavior..."
        );
    }

    #[test]
    fn derive_title_keeps_short_messages_verbatim() {
        assert_eq!(derive_title("What is Rust?"), "What is Rust?");
    }

    #[test]
    fn derive_title_counts_chars_not_bytes() {
        let message = "é".repeat(60);
        let title = derive_title(&message);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn summary_previews_the_last_message() {
        let chat = Chat {
            id: "c1".to_string(),
            title: "Chat".to_string(),
            messages: vec![
                ChatMessage::user("first"),
                ChatMessage::assistant("the final reply"),
            ],
        };
        let summary = ChatSummary::from(&chat);
        assert_eq!(summary.last_message_preview.as_deref(), Some("the final reply"));
    }

    #[test]
    fn placeholder_ids_are_recognized() {
        assert!(is_placeholder_id("optimistic-123"));
        assert!(!is_placeholder_id("650f1b2a"));
    }

    #[test]
    fn roles_use_the_wire_spelling() {
        assert_eq!(serde_json::to_string(&MessageRole::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn chat_deserializes_the_mongo_id_field() {
        let chat: Chat = serde_json::from_str(r#"{"_id":"abc","title":"T","messages":[]}"#).unwrap();
        assert_eq!(chat.id, "abc");

        // freshly created chats may come back without title or messages
        let bare: Chat = serde_json::from_str(r#"{"_id":"abc"}"#).unwrap();
        assert!(bare.title.is_empty());
        assert!(bare.messages.is_empty());
    }
}
