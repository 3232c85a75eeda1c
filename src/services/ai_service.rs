use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::seq::SliceRandom;
use uuid::Uuid;

use super::api_client::{ApiError, ChatApi};
use crate::models::{Chat, ChatMessage, ChatUpdate};

// ============================================================================
// CANNED RESPONSES
// ============================================================================

/// Keyword-triggered replies, checked in order against the lowercased
/// input. First match wins.
const CONTEXT_REPLIES: &[(&str, &str)] = &[
    ("hello", "Hello! I'm Sora, your AI assistant. How can I help you today?"),
    ("hi", "Hi there! What can I do for you?"),
    ("hey", "Hey! Ready to assist you. What's on your mind?"),
    ("help", "I'm here to help! I can answer questions, provide information, have conversations, help with writing, coding, analysis, and much more. What would you like to know?"),
    ("who are you", "I'm Sora, an AI assistant designed to help you with a wide range of tasks. I can answer questions, provide information, assist with problem-solving, and engage in meaningful conversations."),
    ("what can you do", "I can help with many things: answering questions, providing explanations, helping with writing and editing, assisting with code, analyzing information, brainstorming ideas, and much more! What do you need help with?"),
    ("code", "I'd be happy to help with coding! What programming language or problem are you working on?"),
    ("write", "I can help you write! What kind of content do you need - an article, essay, story, email, or something else?"),
    ("thanks", "You're welcome! Is there anything else I can help you with?"),
    ("thank you", "My pleasure! Feel free to ask if you need anything else."),
    ("bye", "Goodbye! Feel free to come back anytime you need assistance."),
    ("explain", "I'd be glad to explain that! What topic would you like me to break down for you?"),
];

const FALLBACK_REPLIES: &[&str] = &[
    "I'm Sora, an AI assistant. I can help you with various tasks, answer questions, and have conversations!",
    "That's an interesting question! Let me think about that...",
    "I'd be happy to help you with that. What specific aspect would you like to know more about?",
    "Great question! Here's what I can tell you about that topic...",
    "I understand what you're asking. Let me provide some insights on that.",
    "That's a fascinating topic! From my perspective...",
    "I can definitely assist you with that. Here's my take...",
    "Good question! Based on what I know...",
    "Let me break that down for you in a helpful way.",
    "I appreciate you asking! Here's how I'd approach this...",
];

/// Compose an assistant reply for the given user message.
pub fn generate_reply(user_message: &str) -> String {
    let lower = user_message.trim().to_lowercase();

    for (keyword, reply) in CONTEXT_REPLIES {
        if lower.contains(keyword) {
            return (*reply).to_string();
        }
    }

    let fallback = FALLBACK_REPLIES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(FALLBACK_REPLIES[0]);

    if lower.contains('?') {
        format!(
            "That's a great question about \"{}\". {} While I'm a demo version, I can tell you that this is an interesting topic worth exploring further.",
            user_message, fallback
        )
    } else if lower.split_whitespace().count() > 10 {
        format!(
            "I see you've shared quite a bit there. {} In a full version, I would provide detailed analysis and insights on what you've mentioned.",
            fallback
        )
    } else {
        fallback.to_string()
    }
}

// ============================================================================
// LOCAL CHAT SERVICE
// ============================================================================

/// In-process stand-in for the remote chat service: the same contract,
/// chats held in memory, assistant replies generated locally. Useful for
/// demos without a backend and for exercising the session logic in tests.
#[derive(Debug, Clone, Default)]
pub struct LocalChatService {
    chats: Arc<Mutex<Vec<Chat>>>,
    latency: Option<Duration>,
}

impl LocalChatService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation, approximating a slow network.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            chats: Arc::new(Mutex::new(Vec::new())),
            latency: Some(latency),
        }
    }

    /// Insert a chat directly, bypassing the API surface.
    pub fn seed(&self, chat: Chat) {
        self.lock().push(chat);
    }

    /// Remove a chat directly, bypassing the API surface.
    pub fn remove(&self, id: &str) {
        self.lock().retain(|chat| chat.id != id);
    }

    pub fn chat_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Chat>> {
        self.chats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl ChatApi for LocalChatService {
    fn set_credential(&self, _token: Option<&str>) {}

    async fn list_chats(&self) -> Result<Vec<Chat>, ApiError> {
        self.simulate_latency().await;
        Ok(self.lock().clone())
    }

    async fn get_chat(&self, id: &str) -> Result<Chat, ApiError> {
        self.simulate_latency().await;
        self.lock()
            .iter()
            .find(|chat| chat.id == id)
            .cloned()
            .ok_or(ApiError::NotFound)
    }

    async fn create_chat(&self, title: &str, messages: &[ChatMessage]) -> Result<Chat, ApiError> {
        self.simulate_latency().await;
        let chat = Chat {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            messages: messages.to_vec(),
        };
        self.lock().push(chat.clone());
        Ok(chat)
    }

    async fn update_chat(&self, id: &str, update: ChatUpdate) -> Result<Chat, ApiError> {
        self.simulate_latency().await;
        let mut chats = self.lock();
        let chat = chats
            .iter_mut()
            .find(|chat| chat.id == id)
            .ok_or(ApiError::NotFound)?;

        if let Some(title) = update.title {
            chat.title = title;
        }
        if let Some(messages) = update.messages {
            chat.messages = messages;
        }

        Ok(chat.clone())
    }

    async fn delete_chat(&self, id: &str) -> Result<(), ApiError> {
        self.simulate_latency().await;
        let mut chats = self.lock();
        let before = chats.len();
        chats.retain(|chat| chat.id != id);
        if chats.len() == before {
            return Err(ApiError::NotFound);
        }
        Ok(())
    }

    async fn send_message(&self, id: &str, content: &str) -> Result<Chat, ApiError> {
        self.simulate_latency().await;
        let reply = generate_reply(content);

        let mut chats = self.lock();
        let chat = chats
            .iter_mut()
            .find(|chat| chat.id == id)
            .ok_or(ApiError::NotFound)?;

        chat.messages.push(ChatMessage::user(content));
        chat.messages.push(ChatMessage::assistant(&reply));

        Ok(chat.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRole;

    #[test]
    fn greeting_gets_the_canned_greeting() {
        let reply = generate_reply("hello");
        assert!(reply.starts_with("Hello! I'm Sora"));
    }

    #[test]
    fn questions_quote_the_user_message() {
        let reply = generate_reply("What is 2+2?");
        assert!(reply.contains("\"What is 2+2?\""));
    }

    #[test]
    fn long_input_gets_the_long_input_framing() {
        let reply =
            generate_reply("one two three four five six seven eight nine ten eleven twelve");
        assert!(reply.starts_with("I see you've shared quite a bit there."));
    }

    #[tokio::test]
    async fn send_appends_user_then_assistant() {
        let service = LocalChatService::new();
        let chat = service.create_chat("", &[]).await.unwrap();

        let updated = service.send_message(&chat.id, "thanks").await.unwrap();
        assert_eq!(updated.messages.len(), 2);
        assert_eq!(updated.messages[0].role, MessageRole::User);
        assert_eq!(updated.messages[0].content, "thanks");
        assert_eq!(updated.messages[1].role, MessageRole::Assistant);
        assert!(updated.messages[1].content.starts_with("You're welcome!"));
    }

    #[tokio::test]
    async fn deleting_an_absent_chat_is_not_found() {
        let service = LocalChatService::new();
        assert!(matches!(
            service.delete_chat("ghost").await,
            Err(ApiError::NotFound)
        ));
    }
}
