use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};
use uuid::Uuid;

use super::api_client::{ApiError, ChatApi};
use super::session_cache::{CacheKey, SessionCache};
use crate::models::{Chat, ChatMessage, ChatSummary, ChatUpdate, PLACEHOLDER_PREFIX};

/// Runs every chat mutation as the same optimistic transaction: snapshot
/// the affected cache keys, apply a speculative local change, dispatch the
/// network call, then merge the authoritative result or restore the
/// snapshot. The affected keys are invalidated either way, so the view
/// reconverges with the server on the next access.
pub struct MutationCoordinator<A> {
    api: Arc<A>,
    cache: Arc<Mutex<SessionCache>>,
    creating: AtomicBool,
}

impl<A: ChatApi> MutationCoordinator<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            cache: Arc::new(Mutex::new(SessionCache::new())),
            creating: AtomicBool::new(false),
        }
    }

    pub(crate) fn cache(&self) -> &Arc<Mutex<SessionCache>> {
        &self.cache
    }

    fn lock_cache(&self) -> MutexGuard<'_, SessionCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn transact<T, Fut>(
        &self,
        keys: Vec<CacheKey>,
        apply: impl FnOnce(&mut SessionCache),
        call: Fut,
        merge: impl FnOnce(&mut SessionCache, &T),
    ) -> Result<T, ApiError>
    where
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let snapshot = self.lock_cache().snapshot(&keys);
        apply(&mut self.lock_cache());

        match call.await {
            Ok(value) => {
                let mut cache = self.lock_cache();
                merge(&mut cache, &value);
                cache.invalidate(&keys);
                Ok(value)
            }
            Err(err) => {
                warn!(error = %err, "mutation failed, rolling back");
                let mut cache = self.lock_cache();
                cache.restore(snapshot);
                cache.invalidate(&keys);
                Err(err)
            }
        }
    }

    /// POST a new, empty chat. A placeholder summary lands in the list
    /// before dispatch and `on_applied` receives its id, so the caller can
    /// move its selection there while the call is in flight. Returns
    /// `Ok(None)` when another creation is already pending: the request is
    /// suppressed, not queued.
    pub async fn create_chat(
        &self,
        on_applied: impl FnOnce(&str),
    ) -> Result<Option<Chat>, ApiError> {
        if self.creating.swap(true, Ordering::SeqCst) {
            debug!("chat creation already in flight, suppressing");
            return Ok(None);
        }

        let placeholder = format!("{}{}", PLACEHOLDER_PREFIX, Uuid::new_v4());
        let keys = vec![CacheKey::ChatList];
        let snapshot = self.lock_cache().snapshot(&keys);
        self.lock_cache().push_summary(ChatSummary {
            id: placeholder.clone(),
            title: String::new(),
            last_message_preview: None,
        });
        on_applied(&placeholder);

        let result = self.api.create_chat("", &[]).await;
        let outcome = {
            let mut cache = self.lock_cache();
            match result {
                Ok(chat) => {
                    cache.replace_summary(&placeholder, &chat);
                    cache.set_chat(chat.clone());
                    cache.invalidate(&keys);
                    Ok(Some(chat))
                }
                Err(err) => {
                    warn!(error = %err, "chat creation failed, rolling back");
                    cache.restore(snapshot);
                    cache.invalidate(&keys);
                    Err(err)
                }
            }
        };
        self.creating.store(false, Ordering::SeqCst);
        outcome
    }

    pub async fn rename_chat(&self, id: &str, title: &str) -> Result<Chat, ApiError> {
        let keys = vec![CacheKey::ChatList, CacheKey::Chat(id.to_string())];
        self.transact(
            keys,
            |cache| cache.set_title(id, title),
            self.api.update_chat(id, ChatUpdate::with_title(title)),
            |cache, chat: &Chat| {
                cache.replace_summary(&chat.id, chat);
                cache.set_chat(chat.clone());
            },
        )
        .await
    }

    pub async fn clear_chat(&self, id: &str) -> Result<Chat, ApiError> {
        let keys = vec![CacheKey::ChatList, CacheKey::Chat(id.to_string())];
        self.transact(
            keys,
            |cache| cache.clear_messages(id),
            self.api.update_chat(id, ChatUpdate::with_messages(Vec::new())),
            |cache, chat: &Chat| {
                cache.replace_summary(&chat.id, chat);
                cache.set_chat(chat.clone());
            },
        )
        .await
    }

    pub async fn send_message(&self, id: &str, content: &str) -> Result<Chat, ApiError> {
        let keys = vec![CacheKey::Chat(id.to_string())];
        self.transact(
            keys,
            |cache| cache.append_message(id, ChatMessage::user(content)),
            self.api.send_message(id, content),
            |cache, chat: &Chat| cache.set_chat(chat.clone()),
        )
        .await
    }

    /// DELETE a chat. Returns `Ok(true)` when the server deleted it and
    /// `Ok(false)` when it was already gone (404): the desired end state
    /// holds either way, so neither is an error.
    pub async fn delete_chat(&self, id: &str) -> Result<bool, ApiError> {
        let keys = vec![CacheKey::ChatList, CacheKey::Chat(id.to_string())];
        let snapshot = self.lock_cache().snapshot(&keys);
        self.lock_cache().remove_chat(id);

        match self.api.delete_chat(id).await {
            Ok(()) => {
                self.lock_cache().invalidate(&keys);
                Ok(true)
            }
            Err(ApiError::NotFound) => {
                debug!(chat = id, "chat already deleted");
                self.lock_cache().invalidate(&keys);
                Ok(false)
            }
            Err(err) => {
                warn!(error = %err, "delete failed, rolling back");
                let mut cache = self.lock_cache();
                cache.restore(snapshot);
                cache.invalidate(&keys);
                Err(err)
            }
        }
    }
}
