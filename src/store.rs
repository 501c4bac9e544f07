//! In-memory conversation state
//!
//! [`ConversationStore`] is the client-side cache of conversations and
//! their messages. It is loaded from the REST API at session start, read by
//! the display surfaces (REPL transcript, history tables), and mutated
//! during a live exchange only through the commit path
//! ([`append_message`](ConversationStore::append_message) /
//! [`update_message`](ConversationStore::update_message)).
//!
//! The store is an explicitly constructed object with a defined lifecycle:
//! created at session start, cleared at logout. It is shared behind an
//! `Arc<Mutex<...>>` so a commit is a single atomic mutation with respect to
//! concurrent readers.

use crate::error::{KintsugiError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Assistant role string used on the wire
pub const ROLE_ASSISTANT: &str = "assistant";
/// User role string used on the wire
pub const ROLE_USER: &str = "user";

/// One message in a conversation
///
/// Field names match the backend message DTO. User messages are created
/// client-side optimistically when a send begins; assistant messages are
/// materialized only when an exchange commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique identifier (server-assigned, or client-generated v4 UUID for
    /// optimistic messages)
    pub id: String,
    /// Identifier of the owning conversation
    pub chat_id: String,
    /// Role of the sender ("user" or "assistant")
    pub role: String,
    /// Message text
    pub content: String,
    /// Token count reported by the server (0 for optimistic messages)
    #[serde(default)]
    pub tokens: usize,
    /// Model that produced the message, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Creates an optimistic user message for `chat_id`
    ///
    /// # Examples
    ///
    /// ```
    /// use kintsugi::store::ChatMessage;
    ///
    /// let msg = ChatMessage::user("chat-1", "Hello!");
    /// assert_eq!(msg.role, "user");
    /// assert_eq!(msg.content, "Hello!");
    /// ```
    pub fn user(chat_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.into(),
            role: ROLE_USER.to_string(),
            content: content.into(),
            tokens: 0,
            model: None,
            created_at: Utc::now(),
        }
    }

    /// Creates an assistant message for `chat_id`
    ///
    /// # Examples
    ///
    /// ```
    /// use kintsugi::store::ChatMessage;
    ///
    /// let msg = ChatMessage::assistant("chat-1", "Hi there", Some("gpt-4o".to_string()));
    /// assert_eq!(msg.role, "assistant");
    /// assert_eq!(msg.model.as_deref(), Some("gpt-4o"));
    /// ```
    pub fn assistant(
        chat_id: impl Into<String>,
        content: impl Into<String>,
        model: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.into(),
            role: ROLE_ASSISTANT.to_string(),
            content: content.into(),
            tokens: 0,
            model,
            created_at: Utc::now(),
        }
    }
}

/// One conversation and its message list
///
/// Field names match the backend chat DTO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier
    pub id: String,
    /// User-facing title
    pub title: String,
    /// Model used for this conversation
    pub model: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp (bumped on every committed message)
    pub updated_at: DateTime<Utc>,
    /// Messages in chronological order
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    /// Returns the last assistant message, if any
    pub fn last_assistant_message(&self) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.role == ROLE_ASSISTANT)
    }
}

/// In-memory cache of the user's conversations
///
/// Ordered most-recently-updated first, matching the sidebar ordering of
/// the product UI. All mutation of message lists during a live exchange
/// goes through [`append_message`](Self::append_message) or
/// [`update_message`](Self::update_message).
///
/// # Examples
///
/// ```
/// use kintsugi::store::{ChatMessage, Conversation, ConversationStore};
/// use chrono::Utc;
///
/// let mut store = ConversationStore::new();
/// store.upsert(Conversation {
///     id: "c1".to_string(),
///     title: "New Chat".to_string(),
///     model: "gpt-4o".to_string(),
///     created_at: Utc::now(),
///     updated_at: Utc::now(),
///     messages: Vec::new(),
/// });
/// store.append_message("c1", ChatMessage::user("c1", "hi")).unwrap();
/// assert_eq!(store.get("c1").unwrap().messages.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    current: Option<String>,
}

impl ConversationStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the full conversation list (initial load from the API)
    ///
    /// The list is re-sorted most-recently-updated first. The current
    /// selection is kept if the conversation still exists, cleared
    /// otherwise.
    pub fn replace_all(&mut self, mut conversations: Vec<Conversation>) {
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        self.conversations = conversations;
        if let Some(id) = self.current.clone() {
            if self.get(&id).is_none() {
                self.current = None;
            }
        }
    }

    /// Inserts a conversation, or replaces it if the id already exists
    ///
    /// New conversations go to the front of the list.
    pub fn upsert(&mut self, conversation: Conversation) {
        if let Some(existing) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation.id)
        {
            *existing = conversation;
        } else {
            self.conversations.insert(0, conversation);
        }
    }

    /// Returns the conversation with the given id
    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Finds a conversation by full id or unique id prefix
    ///
    /// Supports the short 8-char ids shown in list views.
    pub fn find_by_prefix(&self, prefix: &str) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|c| c.id == prefix)
            .or_else(|| self.conversations.iter().find(|c| c.id.starts_with(prefix)))
    }

    /// Removes a conversation; returns true if it existed
    ///
    /// Clears the current selection if it pointed at the removed
    /// conversation.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        let removed = self.conversations.len() != before;
        if removed && self.current.as_deref() == Some(id) {
            self.current = None;
        }
        removed
    }

    /// Sets the currently selected conversation
    ///
    /// # Errors
    ///
    /// Returns a store error if the id is unknown.
    pub fn set_current(&mut self, id: &str) -> Result<()> {
        if self.get(id).is_none() {
            return Err(KintsugiError::Store(format!("unknown conversation: {}", id)).into());
        }
        self.current = Some(id.to_string());
        Ok(())
    }

    /// Returns the currently selected conversation
    pub fn current(&self) -> Option<&Conversation> {
        self.current.as_deref().and_then(|id| self.get(id))
    }

    /// Returns the currently selected conversation id
    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Appends a message to a conversation and bumps its recency
    ///
    /// This is the commit path: during a live exchange it is the only way
    /// assistant output enters the durable message list. The conversation
    /// moves to the front of the ordering.
    ///
    /// # Errors
    ///
    /// Returns a store error if the conversation id is unknown.
    pub fn append_message(&mut self, chat_id: &str, message: ChatMessage) -> Result<()> {
        let position = self
            .conversations
            .iter()
            .position(|c| c.id == chat_id)
            .ok_or_else(|| KintsugiError::Store(format!("unknown conversation: {}", chat_id)))?;

        let mut conversation = self.conversations.remove(position);
        conversation.updated_at = message.created_at;
        conversation.messages.push(message);
        self.conversations.insert(0, conversation);
        Ok(())
    }

    /// Replaces the content of an existing message (regeneration commit)
    ///
    /// # Errors
    ///
    /// Returns a store error if the conversation or message id is unknown.
    pub fn update_message(&mut self, chat_id: &str, message_id: &str, content: &str) -> Result<()> {
        let conversation = self
            .conversations
            .iter_mut()
            .find(|c| c.id == chat_id)
            .ok_or_else(|| KintsugiError::Store(format!("unknown conversation: {}", chat_id)))?;

        let message = conversation
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| KintsugiError::Store(format!("unknown message: {}", message_id)))?;

        message.content = content.to_string();
        conversation.updated_at = Utc::now();
        Ok(())
    }

    /// Returns all conversations, most recently updated first
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Returns the number of conversations
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Returns true if the store holds no conversations
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Clears everything (logout lifecycle)
    pub fn clear(&mut self) {
        self.conversations.clear();
        self.current = None;
    }
}
