//! Render/commit sinks for the exchange pipeline
//!
//! [`RenderSink`] is the abstract UI surface the exchange driver pushes
//! into. It deliberately knows nothing about the rendering technology: the
//! REPL wraps it around terminal output, tests wrap it around plain
//! buffers, and every implementation shares the same commit semantics.
//!
//! [`StoreCommitSink`] implements the commit half of the contract: when an
//! exchange completes it performs exactly one mutation of the conversation
//! store -- appending a new assistant message, or replacing the content of
//! an existing one when regenerating.

use std::sync::{Arc, Mutex};

use crate::error::{KintsugiError, Result};
use crate::store::{ChatMessage, ConversationStore};

/// The live surface an in-progress exchange renders into
///
/// Contract:
///
/// - `on_delta` receives the *full* snapshot after each applied delta. It
///   must be idempotent with respect to growing snapshots: repeated calls
///   update what is displayed, they never duplicate it.
/// - `on_complete` fires at most once per exchange, with the final text.
///   This is where the durable assistant message is materialized.
/// - `on_error` fires when the exchange fails; already-committed messages
///   are untouched, and any partial rendering should be marked interrupted
///   rather than silently discarded.
pub trait RenderSink {
    /// Called after each delta with the full accumulated snapshot
    fn on_delta(&mut self, snapshot: &str);

    /// Called exactly once when a terminal frame arrives
    ///
    /// # Errors
    ///
    /// Returns an error if the commit itself fails (e.g. the target
    /// conversation no longer exists).
    fn on_complete(&mut self, final_text: &str) -> Result<()>;

    /// Called when the exchange fails after streaming began
    fn on_error(&mut self, error: &KintsugiError);
}

/// Where a completed exchange lands in the store
#[derive(Debug, Clone)]
pub enum CommitTarget {
    /// Append a new assistant message to the conversation
    Append,
    /// Replace the content of an existing assistant message (regeneration)
    Replace {
        /// Identifier of the message being regenerated
        message_id: String,
    },
}

/// Sink that commits completed exchanges into the conversation store
///
/// Carries no rendering of its own; UI surfaces wrap it and delegate
/// `on_complete` here. Usable directly where no live rendering is wanted
/// (tests, scripted runs).
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use kintsugi::store::ConversationStore;
/// use kintsugi::stream::{CommitTarget, StoreCommitSink};
///
/// let store = Arc::new(Mutex::new(ConversationStore::new()));
/// let sink = StoreCommitSink::new(
///     Arc::clone(&store),
///     "chat-1",
///     Some("gpt-4o".to_string()),
///     CommitTarget::Append,
/// );
/// ```
pub struct StoreCommitSink {
    store: Arc<Mutex<ConversationStore>>,
    chat_id: String,
    model: Option<String>,
    target: CommitTarget,
}

impl StoreCommitSink {
    /// Creates a sink committing into `chat_id` of the given store
    pub fn new(
        store: Arc<Mutex<ConversationStore>>,
        chat_id: impl Into<String>,
        model: Option<String>,
        target: CommitTarget,
    ) -> Self {
        Self {
            store,
            chat_id: chat_id.into(),
            model,
            target,
        }
    }

    /// The conversation this sink commits into
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }
}

impl RenderSink for StoreCommitSink {
    fn on_delta(&mut self, _snapshot: &str) {
        // Partial output never touches the store.
    }

    fn on_complete(&mut self, final_text: &str) -> Result<()> {
        // Single atomic store mutation; readers never observe a partial
        // append.
        let mut store = self.store.lock().expect("conversation store lock poisoned");
        match &self.target {
            CommitTarget::Append => {
                let message =
                    ChatMessage::assistant(&self.chat_id, final_text, self.model.clone());
                store.append_message(&self.chat_id, message)
            }
            CommitTarget::Replace { message_id } => {
                store.update_message(&self.chat_id, message_id, final_text)
            }
        }
    }

    fn on_error(&mut self, error: &KintsugiError) {
        tracing::debug!(chat_id = %self.chat_id, "exchange failed before commit: {}", error);
    }
}
