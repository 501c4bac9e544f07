//! Conversation history commands
//!
//! Non-interactive access to the conversation list: list, show one
//! transcript, or delete. These read the same REST API the chat session
//! does; there is no separate local database to fall out of sync.

use colored::Colorize;
use prettytable::{format, Table};

use crate::api::ChatApi;
use crate::cli::HistoryCommand;
use crate::error::{KintsugiError, Result};
use crate::store::{Conversation, ConversationStore, ROLE_USER};

/// Handle history commands
///
/// # Arguments
///
/// * `api` - Authenticated API client
/// * `command` - Which history operation to run
pub async fn handle_history(api: &ChatApi, command: HistoryCommand) -> Result<()> {
    match command {
        HistoryCommand::List => {
            let conversations = api.list_chats().await?;
            print_conversation_list(&conversations);
        }
        HistoryCommand::Show { id } => {
            let conversation = resolve(api, &id).await?;
            print_transcript(&conversation);
        }
        HistoryCommand::Delete { id } => {
            let conversation = resolve(api, &id).await?;
            api.delete_chat(&conversation.id).await?;
            println!(
                "{}",
                format!("Deleted conversation {}", short_id(&conversation.id)).green()
            );
        }
    }
    Ok(())
}

/// Resolves a full id or unique prefix against the server-side list
async fn resolve(api: &ChatApi, id: &str) -> Result<Conversation> {
    // Reuse the store's prefix matching instead of reimplementing it here.
    let mut store = ConversationStore::new();
    store.replace_all(api.list_chats().await?);
    store
        .find_by_prefix(id)
        .cloned()
        .ok_or_else(|| KintsugiError::Store(format!("no conversation matching '{}'", id)).into())
}

/// Prints the conversation list as a table
pub fn print_conversation_list(conversations: &[Conversation]) {
    if conversations.is_empty() {
        println!("{}", "No conversations found.".yellow());
        return;
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "ID".bold(),
        "Title".bold(),
        "Model".bold(),
        "Messages".bold(),
        "Last Updated".bold()
    ]);

    for conversation in conversations {
        let title = if conversation.title.chars().count() > 40 {
            let truncated: String = conversation.title.chars().take(37).collect();
            format!("{}...", truncated)
        } else {
            conversation.title.clone()
        };
        let updated = conversation.updated_at.format("%Y-%m-%d %H:%M").to_string();

        table.add_row(prettytable::row![
            short_id(&conversation.id).cyan(),
            title,
            conversation.model,
            conversation.messages.len(),
            updated
        ]);
    }

    println!("\nConversations:");
    table.printstd();
    println!();
    println!(
        "Use {} to resume a conversation.",
        "kintsugi chat --resume <ID>".cyan()
    );
    println!();
}

/// Prints one conversation's transcript
pub fn print_transcript(conversation: &Conversation) {
    println!(
        "\n{} {} ({})",
        conversation.title.bold(),
        short_id(&conversation.id).cyan(),
        conversation.model
    );

    if conversation.messages.is_empty() {
        println!("{}", "  (no messages)".yellow());
        return;
    }

    for message in &conversation.messages {
        let label = if message.role == ROLE_USER {
            "you".yellow().bold()
        } else {
            "assistant".cyan().bold()
        };
        let time = message.created_at.format("%H:%M").to_string();
        println!("\n[{}] {}:", time, label);
        println!("{}", message.content);
    }
    println!();
}

/// First 8 characters of a conversation id
fn short_id(id: &str) -> &str {
    if id.len() >= 8 {
        &id[..8]
    } else {
        id
    }
}
