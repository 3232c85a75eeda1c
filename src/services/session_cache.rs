use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::models::{Chat, ChatMessage, ChatSummary};

/// How long a fetched entry is served without revalidation.
const STALE_AFTER_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, PartialEq)]
struct Slot<T> {
    value: T,
    /// `None` means stale: the value is still servable but the next
    /// access should refetch.
    fetched_at: Option<DateTime<Utc>>,
}

impl<T> Slot<T> {
    fn fresh(value: T) -> Self {
        Self {
            value,
            fetched_at: Some(Utc::now()),
        }
    }

    fn speculative(value: T) -> Self {
        Self {
            value,
            fetched_at: None,
        }
    }

    fn is_fresh(&self, window: Duration) -> bool {
        self.fetched_at
            .map(|at| Utc::now() - at < window)
            .unwrap_or(false)
    }
}

/// Cache keys a mutation can touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey {
    ChatList,
    Chat(String),
}

/// Exact capture of the entries behind a set of keys, for rollback.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
    list: Option<Option<Slot<Vec<ChatSummary>>>>,
    chats: Vec<(String, Option<Slot<Chat>>)>,
}

/// The session's only shared mutable resource: chat summaries plus
/// per-id full chats, each entry stamped with its fetch time. Reads are
/// served instantly; staleness is the caller's cue to revalidate.
/// Speculative mutations go through the snapshot/restore pair.
#[derive(Debug, Default)]
pub struct SessionCache {
    staleness: Option<Duration>,
    list: Option<Slot<Vec<ChatSummary>>>,
    chats: HashMap<String, Slot<Chat>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the freshness window (tests shrink it to force refetches).
    pub fn with_staleness(window: Duration) -> Self {
        Self {
            staleness: Some(window),
            ..Self::default()
        }
    }

    fn window(&self) -> Duration {
        self.staleness
            .unwrap_or_else(|| Duration::seconds(STALE_AFTER_SECS))
    }

    // ------------------------------------------------------------------
    // reads
    // ------------------------------------------------------------------

    pub fn fresh_chats(&self) -> Option<Vec<ChatSummary>> {
        let window = self.window();
        self.list
            .as_ref()
            .filter(|slot| slot.is_fresh(window))
            .map(|slot| slot.value.clone())
    }

    /// Cached list regardless of freshness.
    pub fn cached_chats(&self) -> Option<Vec<ChatSummary>> {
        self.list.as_ref().map(|slot| slot.value.clone())
    }

    pub fn fresh_chat(&self, id: &str) -> Option<Chat> {
        let window = self.window();
        self.chats
            .get(id)
            .filter(|slot| slot.is_fresh(window))
            .map(|slot| slot.value.clone())
    }

    pub fn cached_chat(&self, id: &str) -> Option<Chat> {
        self.chats.get(id).map(|slot| slot.value.clone())
    }

    // ------------------------------------------------------------------
    // authoritative writes (stamp freshness)
    // ------------------------------------------------------------------

    pub fn set_chats(&mut self, chats: Vec<ChatSummary>) {
        self.list = Some(Slot::fresh(chats));
    }

    pub fn set_chat(&mut self, chat: Chat) {
        self.chats.insert(chat.id.clone(), Slot::fresh(chat));
    }

    // ------------------------------------------------------------------
    // speculative writes (no freshness stamp; no-op on absent entries)
    // ------------------------------------------------------------------

    pub fn push_summary(&mut self, summary: ChatSummary) {
        match self.list.as_mut() {
            Some(slot) => slot.value.push(summary),
            None => self.list = Some(Slot::speculative(vec![summary])),
        }
    }

    pub fn replace_summary(&mut self, old_id: &str, chat: &Chat) {
        if let Some(slot) = self.list.as_mut() {
            if let Some(summary) = slot.value.iter_mut().find(|s| s.id == old_id) {
                *summary = ChatSummary::from(chat);
            }
        }
    }

    pub fn remove_chat(&mut self, id: &str) {
        if let Some(slot) = self.list.as_mut() {
            slot.value.retain(|summary| summary.id != id);
        }
        self.chats.remove(id);
    }

    pub fn set_title(&mut self, id: &str, title: &str) {
        if let Some(slot) = self.list.as_mut() {
            if let Some(summary) = slot.value.iter_mut().find(|s| s.id == id) {
                summary.title = title.to_string();
            }
        }
        if let Some(slot) = self.chats.get_mut(id) {
            slot.value.title = title.to_string();
        }
    }

    pub fn append_message(&mut self, id: &str, message: ChatMessage) {
        if let Some(slot) = self.chats.get_mut(id) {
            slot.value.messages.push(message);
        }
    }

    pub fn clear_messages(&mut self, id: &str) {
        if let Some(slot) = self.chats.get_mut(id) {
            slot.value.messages.clear();
        }
        if let Some(slot) = self.list.as_mut() {
            if let Some(summary) = slot.value.iter_mut().find(|s| s.id == id) {
                summary.last_message_preview = None;
            }
        }
    }

    // ------------------------------------------------------------------
    // freshness + transactions
    // ------------------------------------------------------------------

    /// Mark entries stale so the next access refetches. Values stay
    /// untouched and servable in the meantime.
    pub fn invalidate(&mut self, keys: &[CacheKey]) {
        for key in keys {
            match key {
                CacheKey::ChatList => {
                    if let Some(slot) = self.list.as_mut() {
                        slot.fetched_at = None;
                    }
                }
                CacheKey::Chat(id) => {
                    if let Some(slot) = self.chats.get_mut(id) {
                        slot.fetched_at = None;
                    }
                }
            }
        }
    }

    pub fn snapshot(&self, keys: &[CacheKey]) -> CacheSnapshot {
        let mut snapshot = CacheSnapshot {
            list: None,
            chats: Vec::new(),
        };
        for key in keys {
            match key {
                CacheKey::ChatList => snapshot.list = Some(self.list.clone()),
                CacheKey::Chat(id) => snapshot.chats.push((id.clone(), self.chats.get(id).cloned())),
            }
        }
        snapshot
    }

    /// Put captured entries back exactly as they were, absent ones
    /// included.
    pub fn restore(&mut self, snapshot: CacheSnapshot) {
        if let Some(list) = snapshot.list {
            self.list = list;
        }
        for (id, slot) in snapshot.chats {
            match slot {
                Some(slot) => {
                    self.chats.insert(id, slot);
                }
                None => {
                    self.chats.remove(&id);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.list = None;
        self.chats.clear();
    }
}
