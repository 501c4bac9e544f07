/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes the top-level command modules:

- `chat`    -- Interactive chat session (the streaming pipeline's call site)
- `login`   -- Authentication helpers
- `history` -- Conversation listing and inspection
- `models`  -- Model catalog
- `special` -- Special-command parser for the chat session

These handlers are intentionally small and use the library components:
the API client, the conversation store, and the exchange pipeline.
*/

pub mod history;
pub mod login;
pub mod models;
pub mod special;

use colored::Colorize;

use crate::api::ChatApi;
use crate::auth::TokenStore;
use crate::config::Config;
use crate::error::Result;

/// Builds an authenticated API client from config and the token store
///
/// # Errors
///
/// Returns a missing-credentials error when no token is stored; the
/// caller surfaces it as a prompt to run `kintsugi login`.
pub fn make_api(config: &Config) -> Result<ChatApi> {
    let token = TokenStore::new().access_token()?;
    ChatApi::new(config.base_url()?, token, config.request_timeout())
}

/// Show token quota usage (`kintsugi usage` and the `/usage` command)
pub async fn run_usage(api: &ChatApi) -> Result<()> {
    let usage = api.token_usage().await?;

    if usage.is_unlimited || usage.tokens_limit < 0 {
        println!(
            "Token usage: {} used ({})",
            usage.tokens_used,
            "unlimited plan".green()
        );
        return Ok(());
    }

    let status = if usage.has_capacity {
        "ok".green()
    } else {
        "limit reached".red()
    };
    println!(
        "Token usage: {} / {} ({})",
        usage.tokens_used, usage.tokens_limit, status
    );
    Ok(())
}

/// Chat command handler
pub mod chat {
    //! Interactive chat session.
    //!
    //! Builds the API client and conversation store, selects or creates a
    //! conversation, and runs a readline loop. Plain input is sent through
    //! the streaming exchange pipeline; `/`-prefixed input is dispatched to
    //! session commands. Ctrl-C during a streaming response cancels the
    //! exchange and discards the partial output.

    use std::io::Write as _;
    use std::sync::{Arc, Mutex, MutexGuard};

    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use tokio_util::sync::CancellationToken;

    use crate::api::ChatApi;
    use crate::commands::special::{parse_special_command, print_help, SpecialCommand};
    use crate::commands::{history, models, run_usage};
    use crate::config::Config;
    use crate::error::{KintsugiError, Result};
    use crate::store::{ChatMessage, Conversation, ConversationStore};
    use crate::stream::{
        run_exchange, CommitTarget, ExchangeOptions, ExchangeOutcome, RenderSink, StoreCommitSink,
        StreamState,
    };

    /// Start an interactive chat session
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `model` - Optional override for the configured model
    /// * `resume` - Optional conversation id (or prefix) to resume
    /// * `system_prompt` - Optional system prompt for every message
    pub async fn run_chat(
        config: Config,
        model: Option<String>,
        resume: Option<String>,
        system_prompt: Option<String>,
    ) -> Result<()> {
        tracing::info!("Starting interactive chat session");

        let api = super::make_api(&config)?;

        let model = model.unwrap_or_else(|| config.chat.model.clone());
        if !models::is_known_model(&model) {
            println!(
                "{}",
                format!("Warning: '{}' is not in the known model catalog", model).yellow()
            );
        }
        let system_prompt = system_prompt.or_else(|| config.chat.system_prompt.clone());

        let mut session = ChatSession {
            api,
            store: Arc::new(Mutex::new(ConversationStore::new())),
            state: StreamState::new(),
            options: ExchangeOptions {
                chunk_timeout: config.chunk_timeout(),
            },
            model,
            system_prompt,
        };

        session.bootstrap(resume.as_deref()).await?;
        session.print_banner(&config);
        session.run_repl().await
    }

    /// One interactive chat session: API client, store, and stream state
    struct ChatSession {
        api: ChatApi,
        store: Arc<Mutex<ConversationStore>>,
        state: StreamState,
        options: ExchangeOptions,
        model: String,
        system_prompt: Option<String>,
    }

    impl ChatSession {
        fn store(&self) -> MutexGuard<'_, ConversationStore> {
            self.store.lock().expect("conversation store lock poisoned")
        }

        /// Loads the conversation list and selects (or creates) the active
        /// conversation
        async fn bootstrap(&mut self, resume: Option<&str>) -> Result<()> {
            let chats = self.api.list_chats().await?;
            self.store().replace_all(chats);

            match resume {
                Some(prefix) => {
                    let id = self
                        .store()
                        .find_by_prefix(prefix)
                        .map(|c| c.id.clone())
                        .ok_or_else(|| {
                            KintsugiError::Store(format!("no conversation matching '{}'", prefix))
                        })?;
                    self.activate(&id).await?;
                    if let Some(conversation) = self.store().current() {
                        history::print_transcript(conversation);
                    }
                }
                None => {
                    let created = self.api.create_chat(None, &self.model).await?;
                    let id = created.id.clone();
                    let mut store = self.store();
                    store.upsert(created);
                    store.set_current(&id)?;
                }
            }
            Ok(())
        }

        /// Fetches a conversation's full transcript and makes it current
        async fn activate(&mut self, id: &str) -> Result<()> {
            let full = self.api.get_chat(id).await?;
            let mut store = self.store();
            store.upsert(full);
            store.set_current(id)?;
            Ok(())
        }

        fn print_banner(&self, config: &Config) {
            println!();
            println!("{}", "Kintsugi AI".yellow().bold());
            println!("Server: {}", config.server.base_url);
            println!("Model:  {}", self.model);
            if let Some(conversation) = self.store().current() {
                println!(
                    "Chat:   {} ({})",
                    conversation.title,
                    &conversation.id[..conversation.id.len().min(8)]
                );
            }
            println!("Type /help for commands, /exit to leave.");
            println!();
        }

        /// The readline loop
        async fn run_repl(&mut self) -> Result<()> {
            let mut rl = DefaultEditor::new()?;

            loop {
                match rl.readline("you> ") {
                    Ok(line) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        rl.add_history_entry(trimmed)?;

                        match parse_special_command(trimmed) {
                            Ok(SpecialCommand::None) => {
                                if let Err(e) = self.send(trimmed).await {
                                    print_exchange_error(&e);
                                }
                            }
                            Ok(SpecialCommand::Exit) => break,
                            Ok(command) => {
                                if let Err(e) = self.handle_command(command).await {
                                    println!("{}", format!("Error: {}", e).red());
                                }
                            }
                            Err(e) => {
                                println!("{}", e.to_string().yellow());
                            }
                        }
                    }
                    Err(ReadlineError::Interrupted) => continue,
                    Err(ReadlineError::Eof) => break,
                    Err(e) => return Err(e.into()),
                }
            }

            Ok(())
        }

        /// Sends a user message and streams the response
        async fn send(&mut self, content: &str) -> Result<()> {
            let chat_id = self.store().current_id().map(str::to_string).ok_or_else(|| {
                KintsugiError::Store("no active conversation; use /new".to_string())
            })?;

            // Optimistic append: the user's message is durable immediately.
            self.store()
                .append_message(&chat_id, ChatMessage::user(&chat_id, content))?;

            let byte_stream = self
                .api
                .send_message(&chat_id, content, self.system_prompt.as_deref())
                .await?;

            let commit = StoreCommitSink::new(
                Arc::clone(&self.store),
                &chat_id,
                Some(self.model.clone()),
                CommitTarget::Append,
            );
            self.stream_through(byte_stream, commit).await
        }

        /// Re-streams the last assistant response
        async fn regenerate(&mut self) -> Result<()> {
            let (chat_id, message_id) = {
                let store = self.store();
                let conversation = store.current().ok_or_else(|| {
                    KintsugiError::Store("no active conversation; use /new".to_string())
                })?;
                match conversation.last_assistant_message() {
                    Some(message) => (conversation.id.clone(), message.id.clone()),
                    None => {
                        println!("{}", "Nothing to regenerate yet.".yellow());
                        return Ok(());
                    }
                }
            };

            let byte_stream = self.api.regenerate_message(&chat_id, &message_id).await?;
            let commit = StoreCommitSink::new(
                Arc::clone(&self.store),
                &chat_id,
                Some(self.model.clone()),
                CommitTarget::Replace { message_id },
            );
            self.stream_through(byte_stream, commit).await
        }

        /// Runs one exchange with terminal rendering and Ctrl-C cancellation
        async fn stream_through(
            &mut self,
            byte_stream: impl futures::Stream<Item = reqwest::Result<bytes::Bytes>>,
            commit: StoreCommitSink,
        ) -> Result<()> {
            let mut sink = TerminalSink::new(commit);

            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            let watcher = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    trigger.cancel();
                }
            });

            let outcome = run_exchange(
                byte_stream,
                &mut self.state,
                &mut sink,
                &cancel,
                &self.options,
            )
            .await;
            watcher.abort();

            match outcome? {
                ExchangeOutcome::Committed { .. } => Ok(()),
                ExchangeOutcome::Cancelled => {
                    println!("\n{}", "Stopped; partial response discarded.".yellow());
                    Ok(())
                }
            }
        }

        /// Dispatches a session command
        async fn handle_command(&mut self, command: SpecialCommand) -> Result<()> {
            match command {
                SpecialCommand::New { title } => {
                    let created = self
                        .api
                        .create_chat(title.as_deref(), &self.model)
                        .await?;
                    let id = created.id.clone();
                    let title = created.title.clone();
                    {
                        let mut store = self.store();
                        store.upsert(created);
                        store.set_current(&id)?;
                    }
                    println!(
                        "{}",
                        format!("Started '{}' ({})", title, &id[..id.len().min(8)]).green()
                    );
                }
                SpecialCommand::List => {
                    let conversations: Vec<Conversation> =
                        self.store().conversations().to_vec();
                    history::print_conversation_list(&conversations);
                }
                SpecialCommand::Switch { id } => {
                    let full_id = self
                        .store()
                        .find_by_prefix(&id)
                        .map(|c| c.id.clone())
                        .ok_or_else(|| {
                            KintsugiError::Store(format!("no conversation matching '{}'", id))
                        })?;
                    self.activate(&full_id).await?;
                    if let Some(conversation) = self.store().current() {
                        history::print_transcript(conversation);
                    }
                }
                SpecialCommand::Title { title } => {
                    let chat_id = self.store().current_id().map(str::to_string).ok_or_else(
                        || KintsugiError::Store("no active conversation".to_string()),
                    )?;
                    self.api
                        .update_chat(&chat_id, Some(title.as_str()), None)
                        .await?;
                    self.activate(&chat_id).await?;
                    println!("{}", format!("Renamed to '{}'", title).green());
                }
                SpecialCommand::Delete { id } => {
                    let target = match id {
                        Some(prefix) => self
                            .store()
                            .find_by_prefix(&prefix)
                            .map(|c| c.id.clone())
                            .ok_or_else(|| {
                                KintsugiError::Store(format!(
                                    "no conversation matching '{}'",
                                    prefix
                                ))
                            })?,
                        None => self.store().current_id().map(str::to_string).ok_or_else(
                            || KintsugiError::Store("no active conversation".to_string()),
                        )?,
                    };
                    let was_current = self.store().current_id() == Some(target.as_str());
                    self.api.delete_chat(&target).await?;
                    self.store().remove(&target);
                    println!(
                        "{}",
                        format!("Deleted conversation {}", &target[..target.len().min(8)])
                            .green()
                    );
                    if was_current {
                        println!("Use /new or /switch to continue.");
                    }
                }
                SpecialCommand::Retry => self.regenerate().await?,
                SpecialCommand::Usage => run_usage(&self.api).await?,
                SpecialCommand::System { prompt } => match prompt {
                    Some(prompt) => {
                        println!("{}", "System prompt set.".green());
                        self.system_prompt = Some(prompt);
                    }
                    None => {
                        println!("{}", "System prompt cleared.".green());
                        self.system_prompt = None;
                    }
                },
                SpecialCommand::Model { name } => match name {
                    Some(name) => {
                        if !models::is_known_model(&name) {
                            println!(
                                "{}",
                                format!("Warning: '{}' is not in the known model catalog", name)
                                    .yellow()
                            );
                        }
                        self.model = name;
                        println!(
                            "Model set to {} (applies to new conversations).",
                            self.model.cyan()
                        );
                    }
                    None => println!("Current model: {}", self.model.cyan()),
                },
                SpecialCommand::Help => print_help(),
                // Exit and None are handled by the REPL loop.
                SpecialCommand::Exit | SpecialCommand::None => {}
            }
            Ok(())
        }
    }

    /// Prints a failed exchange, with a re-login hint for auth failures
    fn print_exchange_error(error: &anyhow::Error) {
        println!("{}", format!("Error: {}", error).red());
        if matches!(
            error.downcast_ref::<KintsugiError>(),
            Some(KintsugiError::Authentication(_))
        ) {
            println!("Run {} to re-authenticate.", "kintsugi login".cyan());
        }
    }

    /// Terminal rendering around a committing sink
    ///
    /// Receives full snapshots from the pipeline and prints only the unseen
    /// suffix of each, so growing snapshots render as a continuous stream.
    /// On failure the partial output stays on screen with an interrupted
    /// marker; the wrapped sink guarantees it never reaches the store.
    struct TerminalSink<S: RenderSink> {
        inner: S,
        /// Byte offset of the snapshot already written to the terminal.
        printed: usize,
        started: bool,
    }

    impl<S: RenderSink> TerminalSink<S> {
        fn new(inner: S) -> Self {
            Self {
                inner,
                printed: 0,
                started: false,
            }
        }

        fn print_label(&mut self) {
            if !self.started {
                print!("{} ", "assistant:".cyan().bold());
                self.started = true;
            }
        }
    }

    impl<S: RenderSink> RenderSink for TerminalSink<S> {
        fn on_delta(&mut self, snapshot: &str) {
            self.print_label();
            // Snapshots only grow; print what the terminal hasn't seen.
            print!("{}", &snapshot[self.printed..]);
            let _ = std::io::stdout().flush();
            self.printed = snapshot.len();
            self.inner.on_delta(snapshot);
        }

        fn on_complete(&mut self, final_text: &str) -> Result<()> {
            self.print_label();
            if final_text.len() > self.printed {
                print!("{}", &final_text[self.printed..]);
                self.printed = final_text.len();
            }
            println!();
            println!();
            self.inner.on_complete(final_text)
        }

        fn on_error(&mut self, error: &KintsugiError) {
            if self.started {
                println!();
            }
            println!("{}", "[interrupted]".red().bold());
            self.inner.on_error(error);
        }
    }

}
