//! Client-side core of the Sora chat app: the session cache, the
//! optimistic mutation coordinator, and the session controller that keeps
//! a local view of chats consistent with the remote service.

pub mod models;
pub mod services;

pub use models::{Chat, ChatMessage, ChatSummary, MessageRole, User};
pub use services::ai_service::LocalChatService;
pub use services::api_client::{ApiError, ChatApi, HttpChatApi, DEFAULT_API_BASE};
pub use services::auth_service::{AuthClient, AuthState};
pub use services::notifier::{Notice, NoticeKind, NOTICE_TTL};
pub use services::session_controller::{SessionController, SessionError, SessionPhase};
pub use services::settings::{Accent, Language, Settings, SettingsStore, Theme};
