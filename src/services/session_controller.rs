use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::api_client::{ApiError, ChatApi};
use super::auth_service::{AuthClient, AuthResponse, AuthState, AuthStore};
use super::coordinator::MutationCoordinator;
use super::notifier::{Notice, Notifier};
use super::session_cache::SessionCache;
use super::settings::SettingsStore;
use super::storage::{default_data_dir, StoreError};
use crate::models::{derive_title, is_placeholder_id, Chat, ChatSummary, MessageRole, User};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Please log in first")]
    NotAuthenticated,
    #[error("Please fill in all fields")]
    MissingFields,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Password must be at least 6 characters")]
    PasswordTooShort,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("A response is still pending")]
    ResponseInFlight,
    #[error("A chat is already being created")]
    CreationInFlight,
    #[error("No active chat")]
    NoActiveChat,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Screen-level state the session is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unauthenticated,
    AuthenticatedNoChat,
    AuthenticatedWithChat,
    SettingsView,
}

#[derive(Debug, Default)]
struct SessionState {
    active_chat_id: Option<String>,
    /// The chat whose messages are on screen. Only a fetch for the chat
    /// that is *still* active may overwrite this (stale-response guard).
    current_chat: Option<Chat>,
    pending_input: String,
    awaiting_response: bool,
    /// Latched once per authenticated session, success or not.
    auto_created: bool,
    settings_open: bool,
    /// (chat id, title buffer) while a rename edit is underway.
    editing: Option<(String, String)>,
    pending_delete: Option<String>,
}

/// Top-level orchestration: owns the auth session, routes user intents to
/// the mutation coordinator, and keeps the active-chat view consistent.
pub struct SessionController<A: ChatApi> {
    api: Arc<A>,
    coordinator: MutationCoordinator<A>,
    auth_client: AuthClient,
    auth_store: AuthStore,
    auth: Mutex<AuthState>,
    settings: SettingsStore,
    notifier: Notifier,
    state: Mutex<SessionState>,
}

impl<A: ChatApi> SessionController<A> {
    /// Build a controller rooted at the platform data directory.
    pub fn new(api: A, auth_client: AuthClient) -> Result<Self, SessionError> {
        let dir = default_data_dir()?;
        Self::with_data_dir(api, auth_client, dir)
    }

    /// Build a controller with an explicit state directory (tests use a
    /// temporary one).
    pub fn with_data_dir(
        api: A,
        auth_client: AuthClient,
        dir: PathBuf,
    ) -> Result<Self, SessionError> {
        let api = Arc::new(api);
        let auth_store = AuthStore::open(&dir);
        let auth = auth_store.load()?;
        if let Some(token) = auth.token.as_deref() {
            api.set_credential(Some(token));
        }

        Ok(Self {
            coordinator: MutationCoordinator::new(api.clone()),
            api,
            auth_client,
            auth_store,
            auth: Mutex::new(auth),
            settings: SettingsStore::open(&dir)?,
            notifier: Notifier::new(),
            state: Mutex::new(SessionState::default()),
        })
    }

    // ------------------------------------------------------------------
    // accessors
    // ------------------------------------------------------------------

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notifier.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth().token.is_some()
    }

    pub fn current_user(&self) -> Option<User> {
        self.auth().user.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        if self.auth().token.is_none() {
            return SessionPhase::Unauthenticated;
        }
        let state = self.state();
        if state.settings_open {
            SessionPhase::SettingsView
        } else if state.active_chat_id.is_some() {
            SessionPhase::AuthenticatedWithChat
        } else {
            SessionPhase::AuthenticatedNoChat
        }
    }

    pub fn active_chat_id(&self) -> Option<String> {
        self.state().active_chat_id.clone()
    }

    pub fn current_chat(&self) -> Option<Chat> {
        self.state().current_chat.clone()
    }

    pub fn pending_input(&self) -> String {
        self.state().pending_input.clone()
    }

    pub fn set_pending_input(&self, text: &str) {
        self.state().pending_input = text.to_string();
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.state().awaiting_response
    }

    /// Cached chat summaries, regardless of freshness.
    pub fn chats(&self) -> Vec<ChatSummary> {
        self.lock_cache().cached_chats().unwrap_or_default()
    }

    /// Case-insensitive filter over titles and previews.
    pub fn search_chats(&self, query: &str) -> Vec<ChatSummary> {
        let chats = self.chats();
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return chats;
        }
        chats
            .into_iter()
            .filter(|chat| {
                chat.title.to_lowercase().contains(&query)
                    || chat
                        .last_message_preview
                        .as_ref()
                        .map(|preview| preview.to_lowercase().contains(&query))
                        .unwrap_or(false)
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // auth
    // ------------------------------------------------------------------

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, SessionError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(self.reject(SessionError::MissingFields));
        }

        match self.auth_client.login(email, password).await {
            Ok(response) => self.complete_auth(response, "Logged in successfully").await,
            Err(err) => {
                self.notifier.error(auth_failure_message(&err));
                Err(err.into())
            }
        }
    }

    pub async fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<User, SessionError> {
        if name.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
            return Err(self.reject(SessionError::MissingFields));
        }
        if password != confirm_password {
            return Err(self.reject(SessionError::PasswordMismatch));
        }
        if password.chars().count() < 6 {
            return Err(self.reject(SessionError::PasswordTooShort));
        }

        match self.auth_client.signup(name, email, password).await {
            Ok(response) => {
                self.complete_auth(response, "Account created successfully! Welcome to Sora.")
                    .await
            }
            Err(err) => {
                self.notifier.error(auth_failure_message(&err));
                Err(err.into())
            }
        }
    }

    async fn complete_auth(
        &self,
        response: AuthResponse,
        notice: &str,
    ) -> Result<User, SessionError> {
        let auth = AuthState {
            token: Some(response.token.clone()),
            user: Some(response.user.clone()),
        };
        self.auth_store.save(&auth)?;
        self.api.set_credential(Some(&response.token));
        *self.auth() = auth;
        self.notifier.success(notice);

        if let Err(err) = self.bootstrap().await {
            debug!(error = %err, "bootstrap after auth failed");
        }
        Ok(response.user)
    }

    /// Re-enter a previously persisted session, if one exists. Returns
    /// whether a credential was found.
    pub async fn restore_session(&self) -> Result<bool, SessionError> {
        if self.auth().token.is_none() {
            return Ok(false);
        }
        if let Err(err) = self.bootstrap().await {
            debug!(error = %err, "bootstrap on session restore failed");
        }
        Ok(true)
    }

    /// Drop the credential and all session state, returning to the
    /// unauthenticated screen.
    pub fn log_out(&self) {
        if let Err(err) = self.auth_store.clear() {
            debug!(error = %err, "failed to clear persisted auth state");
        }
        self.api.set_credential(None);
        *self.auth() = AuthState::default();
        self.lock_cache().clear();
        *self.state() = SessionState::default();
        if let Err(err) = self.settings.set_last_chat_id(None) {
            debug!(error = %err, "failed to clear last chat id");
        }
        self.notifier.info("Logged out");
    }

    // ------------------------------------------------------------------
    // session lifecycle
    // ------------------------------------------------------------------

    /// Load the chat list, reopen the last active chat when it still
    /// exists, and make sure a fresh account lands in a usable state by
    /// silently creating its first chat.
    pub async fn bootstrap(&self) -> Result<(), SessionError> {
        let chats = self.load_chats().await?;

        if let Some(last_id) = self.settings.get().last_chat_id {
            let restorable =
                self.state().active_chat_id.is_none() && chats.iter().any(|c| c.id == last_id);
            if restorable {
                if let Err(err) = self.open_chat(&last_id).await {
                    debug!(error = %err, "could not reopen the last active chat");
                }
            }
        }

        self.ensure_initial_chat(&chats).await;
        Ok(())
    }

    /// Chat list served from cache while fresh, refetched otherwise.
    pub async fn load_chats(&self) -> Result<Vec<ChatSummary>, SessionError> {
        if self.auth().token.is_none() {
            return Err(SessionError::NotAuthenticated);
        }

        if let Some(chats) = self.lock_cache().fresh_chats() {
            debug!("serving chat list from cache");
            return Ok(chats);
        }

        match self.api.list_chats().await {
            Ok(chats) => {
                let summaries: Vec<ChatSummary> = chats.iter().map(ChatSummary::from).collect();
                self.lock_cache().set_chats(summaries.clone());
                Ok(summaries)
            }
            Err(err) => Err(self.handle_api_error(err, "Error loading chats")),
        }
    }

    /// Auto-create the very first chat, at most once per authenticated
    /// session, and only when the loaded list is empty.
    async fn ensure_initial_chat(&self, chats: &[ChatSummary]) {
        {
            let mut state = self.state();
            if state.auto_created || !chats.is_empty() || state.active_chat_id.is_some() {
                return;
            }
            state.auto_created = true;
        }
        debug!("empty chat list, creating the initial chat");
        if let Err(err) = self.create_chat_internal(true).await {
            debug!(error = %err, "initial chat creation failed");
        }
    }

    // ------------------------------------------------------------------
    // chat intents
    // ------------------------------------------------------------------

    /// Clear the active selection; the next send creates a chat lazily.
    pub fn new_chat(&self) {
        let mut state = self.state();
        state.active_chat_id = None;
        state.current_chat = None;
        state.pending_input.clear();
    }

    /// Make a chat the active one and load its messages, from cache when
    /// fresh. A slow fetch that resolves after the user has moved on must
    /// not overwrite the newer chat's view.
    pub async fn open_chat(&self, id: &str) -> Result<Chat, SessionError> {
        if self.auth().token.is_none() {
            return Err(SessionError::NotAuthenticated);
        }

        if is_placeholder_id(id) {
            // still waiting for the server identity; show it empty
            let chat = Chat {
                id: id.to_string(),
                title: String::new(),
                messages: Vec::new(),
            };
            let mut state = self.state();
            state.active_chat_id = Some(id.to_string());
            state.current_chat = Some(chat.clone());
            return Ok(chat);
        }

        self.state().active_chat_id = Some(id.to_string());
        if let Err(err) = self.settings.set_last_chat_id(Some(id.to_string())) {
            debug!(error = %err, "failed to persist last chat id");
        }

        let cached = self.lock_cache().fresh_chat(id);
        let chat = match cached {
            Some(chat) => chat,
            None => match self.api.get_chat(id).await {
                Ok(chat) => {
                    self.lock_cache().set_chat(chat.clone());
                    chat
                }
                Err(err) => return Err(self.handle_api_error(err, "Error loading chat")),
            },
        };

        let displayed = {
            let mut state = self.state();
            if state.active_chat_id.as_deref() == Some(id) {
                state.current_chat = Some(chat.clone());
                true
            } else {
                debug!(chat = id, "discarding stale fetch result");
                false
            }
        };
        if displayed {
            self.maybe_auto_title(&chat).await;
        }
        Ok(chat)
    }

    /// Send the pending draft. With no active chat this first creates one
    /// and chains the send onto the confirmed id. The draft survives until
    /// the send itself succeeds, so a failure leaves it recoverable.
    pub async fn send_message(&self) -> Result<Chat, SessionError> {
        if self.auth().token.is_none() {
            return Err(self.reject(SessionError::NotAuthenticated));
        }
        let text = {
            let state = self.state();
            if state.awaiting_response {
                return Err(self.reject(SessionError::ResponseInFlight));
            }
            state.pending_input.trim().to_string()
        };
        if text.is_empty() {
            return Err(self.reject(SessionError::EmptyMessage));
        }

        let chat_id = self.ensure_active_chat().await?;

        self.state().awaiting_response = true;
        match self.coordinator.send_message(&chat_id, &text).await {
            Ok(chat) => {
                {
                    let mut state = self.state();
                    state.awaiting_response = false;
                    state.pending_input.clear();
                    if state.active_chat_id.as_deref() == Some(chat_id.as_str()) {
                        state.current_chat = Some(chat.clone());
                    }
                }
                self.maybe_auto_title(&chat).await;
                Ok(chat)
            }
            Err(err) => {
                self.state().awaiting_response = false;
                Err(self.handle_api_error(err, "Send failed"))
            }
        }
    }

    /// Resolve the chat a send should target, creating one when nothing
    /// real is active yet.
    async fn ensure_active_chat(&self) -> Result<String, SessionError> {
        if let Some(id) = self.state().active_chat_id.clone() {
            if !is_placeholder_id(&id) {
                return Ok(id);
            }
        }
        let chat = self.create_chat_internal(false).await?;
        Ok(chat.id)
    }

    async fn create_chat_internal(&self, initial: bool) -> Result<Chat, SessionError> {
        let result = self
            .coordinator
            .create_chat(|placeholder| {
                let mut state = self.state();
                state.active_chat_id = Some(placeholder.to_string());
                state.current_chat = Some(Chat {
                    id: placeholder.to_string(),
                    title: String::new(),
                    messages: Vec::new(),
                });
            })
            .await;

        match result {
            Ok(Some(chat)) => {
                {
                    let mut state = self.state();
                    state.active_chat_id = Some(chat.id.clone());
                    state.current_chat = Some(chat.clone());
                }
                if let Err(err) = self.settings.set_last_chat_id(Some(chat.id.clone())) {
                    debug!(error = %err, "failed to persist last chat id");
                }
                if !initial {
                    self.notifier.info("New chat started");
                }
                Ok(chat)
            }
            Ok(None) => Err(SessionError::CreationInFlight),
            Err(err) => {
                {
                    let mut state = self.state();
                    state.active_chat_id = None;
                    state.current_chat = None;
                }
                Err(self.handle_api_error(err, "Create chat failed"))
            }
        }
    }

    /// Auto-generate a title the first time a chat reaches two messages
    /// with a user-authored opener. A non-empty title never re-triggers.
    async fn maybe_auto_title(&self, chat: &Chat) {
        if !chat.title.is_empty() || chat.messages.len() < 2 {
            return;
        }
        let first = &chat.messages[0];
        if first.role != MessageRole::User {
            return;
        }

        let title = derive_title(&first.content);
        debug!(chat = %chat.id, "auto-generating title");
        match self.coordinator.rename_chat(&chat.id, &title).await {
            Ok(renamed) => {
                self.display_if_active(renamed);
                self.notifier.success("Title updated");
            }
            Err(err) => {
                let _ = self.handle_api_error(err, "Update failed");
            }
        }
    }

    // ------------------------------------------------------------------
    // rename editing
    // ------------------------------------------------------------------

    /// Enter the editable-title state, seeded with the known title.
    pub fn start_rename(&self, id: &str) {
        let title = self
            .chats()
            .iter()
            .find(|chat| chat.id == id)
            .map(|chat| chat.title.clone())
            .unwrap_or_default();
        self.state().editing = Some((id.to_string(), title));
    }

    pub fn set_rename_text(&self, text: &str) {
        if let Some((_, buffer)) = self.state().editing.as_mut() {
            *buffer = text.to_string();
        }
    }

    pub fn renaming(&self) -> Option<(String, String)> {
        self.state().editing.clone()
    }

    /// Commit the edit (focus loss or Enter): trim and dispatch. The
    /// server decides whether identical text is a no-op.
    pub async fn commit_rename(&self) -> Result<(), SessionError> {
        let Some((id, buffer)) = self.state().editing.take() else {
            return Ok(());
        };
        let title = buffer.trim().to_string();
        match self.coordinator.rename_chat(&id, &title).await {
            Ok(chat) => {
                self.display_if_active(chat);
                self.notifier.success("Title updated");
                Ok(())
            }
            Err(err) => Err(self.handle_api_error(err, "Update failed")),
        }
    }

    /// Abandon the edit without any network call (Escape).
    pub fn cancel_rename(&self) {
        self.state().editing = None;
    }

    // ------------------------------------------------------------------
    // delete
    // ------------------------------------------------------------------

    /// Arm the confirmation step for a destructive delete.
    pub fn request_delete(&self, id: &str) {
        self.state().pending_delete = Some(id.to_string());
    }

    pub fn pending_delete(&self) -> Option<String> {
        self.state().pending_delete.clone()
    }

    pub fn cancel_delete(&self) {
        self.state().pending_delete = None;
    }

    /// Dispatch the armed deletion. Deleting the active chat clears the
    /// selection; a chat that was already gone is not an error.
    pub async fn confirm_delete(&self) -> Result<(), SessionError> {
        let Some(id) = self.state().pending_delete.take() else {
            return Ok(());
        };

        match self.coordinator.delete_chat(&id).await {
            Ok(existed) => {
                {
                    let mut state = self.state();
                    if state.active_chat_id.as_deref() == Some(id.as_str()) {
                        state.active_chat_id = None;
                        state.current_chat = None;
                        state.pending_input.clear();
                    }
                }
                if existed {
                    self.notifier.info("Chat deleted");
                }
                Ok(())
            }
            Err(err) => Err(self.handle_api_error(err, "Delete failed")),
        }
    }

    // ------------------------------------------------------------------
    // clear conversation / settings view
    // ------------------------------------------------------------------

    pub async fn clear_conversation(&self) -> Result<(), SessionError> {
        let Some(id) = self.state().active_chat_id.clone() else {
            return Err(self.reject(SessionError::NoActiveChat));
        };

        match self.coordinator.clear_chat(&id).await {
            Ok(chat) => {
                self.state().pending_input.clear();
                self.display_if_active(chat);
                self.notifier.info("Conversation cleared");
                Ok(())
            }
            Err(err) => Err(self.handle_api_error(err, "Update failed")),
        }
    }

    pub fn open_settings(&self) {
        self.state().settings_open = true;
    }

    pub fn close_settings(&self) {
        self.state().settings_open = false;
    }

    // ------------------------------------------------------------------
    // plumbing
    // ------------------------------------------------------------------

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn auth(&self) -> MutexGuard<'_, AuthState> {
        self.auth.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_cache(&self) -> MutexGuard<'_, SessionCache> {
        self.coordinator
            .cache()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn display_if_active(&self, chat: Chat) {
        let mut state = self.state();
        if state.active_chat_id.as_deref() == Some(chat.id.as_str()) {
            state.current_chat = Some(chat);
        }
    }

    /// Validation failures are rejected before any network call and
    /// surfaced once.
    fn reject(&self, err: SessionError) -> SessionError {
        self.notifier.error(err.to_string());
        err
    }

    /// Failure policy at the mutation boundary: a 401 forces logout, every
    /// other failure surfaces one transient notice. Nothing retries.
    fn handle_api_error(&self, err: ApiError, context: &str) -> SessionError {
        match err {
            ApiError::Unauthorized => {
                warn!("chat service returned 401, forcing logout");
                self.log_out();
                SessionError::Api(ApiError::Unauthorized)
            }
            other => {
                self.notifier.error(format!("{}: {}", context, other));
                SessionError::Api(other)
            }
        }
    }
}

/// User-facing message for a failed login/signup, mirroring how the
/// backend reports these.
fn auth_failure_message(err: &ApiError) -> String {
    match err {
        ApiError::Api { status: 400, message } => serde_json::from_str::<serde_json::Value>(message)
            .ok()
            .and_then(|body| body.get("message").and_then(|m| m.as_str().map(String::from)))
            .unwrap_or_else(|| "Invalid credentials".to_string()),
        ApiError::Unauthorized => "Invalid credentials".to_string(),
        ApiError::Api { status, .. } if *status >= 500 => "Server error".to_string(),
        _ => "Network error. Please try again.".to_string(),
    }
}
