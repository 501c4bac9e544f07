//! Special commands parser for interactive chat mode
//!
//! This module parses special commands entered during interactive chat
//! sessions. Special commands manage conversations and session state
//! rather than being sent to the assistant:
//! - Create, list, switch, rename, and delete conversations
//! - Regenerate the last assistant response
//! - Set the session system prompt or model
//! - Show token quota usage
//!
//! Commands are prefixed with `/`; everything else is a chat message.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument {
        /// The command that was entered
        command: String,
        /// Correct usage string
        usage: String,
    },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Create a new conversation, optionally titled
    New {
        /// Title for the new conversation
        title: Option<String>,
    },

    /// List conversations
    List,

    /// Switch to another conversation by id or unique prefix
    Switch {
        /// Target conversation id
        id: String,
    },

    /// Rename the current conversation
    Title {
        /// New title
        title: String,
    },

    /// Delete a conversation (the current one when no id is given)
    Delete {
        /// Target conversation id
        id: Option<String>,
    },

    /// Regenerate the last assistant response in the current conversation
    Retry,

    /// Show token quota usage
    Usage,

    /// Set the session system prompt; bare `/system` clears it
    System {
        /// The prompt text, or None to clear
        prompt: Option<String>,
    },

    /// Set the model for new conversations; bare `/model` shows the
    /// current one
    Model {
        /// Model name, or None to display
        name: Option<String>,
    },

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command; send the input as a chat message
    None,
}

/// Parses user input into a special command
///
/// Inputs not starting with `/` are [`SpecialCommand::None`], except the
/// bare words `exit`/`quit` which are accepted for convenience.
///
/// # Examples
///
/// ```
/// use kintsugi::commands::special::{parse_special_command, SpecialCommand};
///
/// assert_eq!(
///     parse_special_command("/retry").unwrap(),
///     SpecialCommand::Retry
/// );
/// assert_eq!(
///     parse_special_command("hello there").unwrap(),
///     SpecialCommand::None
/// );
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    // If input doesn't start with "/", it's not a command (except exit/quit)
    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    let (command, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd.to_lowercase(), rest.trim()),
        None => (lower.clone(), ""),
    };

    match command.as_str() {
        "/new" => Ok(SpecialCommand::New {
            title: non_empty(rest),
        }),

        "/list" | "/chats" => Ok(SpecialCommand::List),

        "/switch" | "/resume" => {
            if rest.is_empty() {
                Err(CommandError::MissingArgument {
                    command: "/switch".to_string(),
                    usage: "/switch <conversation-id>".to_string(),
                })
            } else {
                Ok(SpecialCommand::Switch {
                    id: rest.to_string(),
                })
            }
        }

        "/title" | "/rename" => {
            if rest.is_empty() {
                Err(CommandError::MissingArgument {
                    command: "/title".to_string(),
                    usage: "/title <new title>".to_string(),
                })
            } else {
                Ok(SpecialCommand::Title {
                    title: rest.to_string(),
                })
            }
        }

        "/delete" => Ok(SpecialCommand::Delete {
            id: non_empty(rest),
        }),

        "/retry" | "/regenerate" => Ok(SpecialCommand::Retry),

        "/usage" | "/tokens" => Ok(SpecialCommand::Usage),

        "/system" => Ok(SpecialCommand::System {
            prompt: non_empty(rest),
        }),

        "/model" => Ok(SpecialCommand::Model {
            name: non_empty(rest),
        }),

        "/help" | "/?" => Ok(SpecialCommand::Help),

        "/exit" | "/quit" | "exit" | "quit" => Ok(SpecialCommand::Exit),

        other => Err(CommandError::UnknownCommand(other.to_string())),
    }
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Prints help for all special commands
pub fn print_help() {
    println!("\nAvailable commands:");
    println!("  /new [title]        Start a new conversation");
    println!("  /list               List conversations");
    println!("  /switch <id>        Switch to a conversation (id or prefix)");
    println!("  /title <text>       Rename the current conversation");
    println!("  /delete [id]        Delete a conversation (default: current)");
    println!("  /retry              Regenerate the last assistant response");
    println!("  /system [text]      Set the system prompt (bare /system clears it)");
    println!("  /model [name]       Set the model for new conversations");
    println!("  /usage              Show token quota usage");
    println!("  /help               Show this help");
    println!("  /exit               Leave the session");
    println!("\nDuring a streaming response, Ctrl-C stops the stream.");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_none() {
        assert_eq!(
            parse_special_command("tell me about rust").unwrap(),
            SpecialCommand::None
        );
    }

    #[test]
    fn test_bare_exit_words() {
        assert_eq!(parse_special_command("exit").unwrap(), SpecialCommand::Exit);
        assert_eq!(parse_special_command("quit").unwrap(), SpecialCommand::Exit);
        assert_eq!(parse_special_command("QUIT").unwrap(), SpecialCommand::Exit);
        assert_eq!(
            parse_special_command("/exit").unwrap(),
            SpecialCommand::Exit
        );
    }

    #[test]
    fn test_new_with_and_without_title() {
        assert_eq!(
            parse_special_command("/new").unwrap(),
            SpecialCommand::New { title: None }
        );
        assert_eq!(
            parse_special_command("/new Rust questions").unwrap(),
            SpecialCommand::New {
                title: Some("Rust questions".to_string())
            }
        );
    }

    #[test]
    fn test_switch_requires_argument() {
        assert!(matches!(
            parse_special_command("/switch"),
            Err(CommandError::MissingArgument { .. })
        ));
        assert_eq!(
            parse_special_command("/switch abcd1234").unwrap(),
            SpecialCommand::Switch {
                id: "abcd1234".to_string()
            }
        );
    }

    #[test]
    fn test_title_requires_argument() {
        assert!(matches!(
            parse_special_command("/title"),
            Err(CommandError::MissingArgument { .. })
        ));
        assert_eq!(
            parse_special_command("/title A better name").unwrap(),
            SpecialCommand::Title {
                title: "A better name".to_string()
            }
        );
    }

    #[test]
    fn test_delete_defaults_to_current() {
        assert_eq!(
            parse_special_command("/delete").unwrap(),
            SpecialCommand::Delete { id: None }
        );
        assert_eq!(
            parse_special_command("/delete abcd").unwrap(),
            SpecialCommand::Delete {
                id: Some("abcd".to_string())
            }
        );
    }

    #[test]
    fn test_retry_aliases() {
        assert_eq!(
            parse_special_command("/retry").unwrap(),
            SpecialCommand::Retry
        );
        assert_eq!(
            parse_special_command("/regenerate").unwrap(),
            SpecialCommand::Retry
        );
    }

    #[test]
    fn test_system_prompt_set_and_clear() {
        assert_eq!(
            parse_special_command("/system be terse").unwrap(),
            SpecialCommand::System {
                prompt: Some("be terse".to_string())
            }
        );
        assert_eq!(
            parse_special_command("/system").unwrap(),
            SpecialCommand::System { prompt: None }
        );
    }

    #[test]
    fn test_model_set_and_show() {
        assert_eq!(
            parse_special_command("/model o1").unwrap(),
            SpecialCommand::Model {
                name: Some("o1".to_string())
            }
        );
        assert_eq!(
            parse_special_command("/model").unwrap(),
            SpecialCommand::Model { name: None }
        );
    }

    #[test]
    fn test_command_case_insensitive() {
        assert_eq!(
            parse_special_command("/LIST").unwrap(),
            SpecialCommand::List
        );
        assert_eq!(
            parse_special_command("/Retry").unwrap(),
            SpecialCommand::Retry
        );
    }

    #[test]
    fn test_argument_case_preserved() {
        assert_eq!(
            parse_special_command("/title My Important Chat").unwrap(),
            SpecialCommand::Title {
                title: "My Important Chat".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(
            parse_special_command("/frobnicate"),
            Err(CommandError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_help_aliases() {
        assert_eq!(parse_special_command("/help").unwrap(), SpecialCommand::Help);
        assert_eq!(parse_special_command("/?").unwrap(), SpecialCommand::Help);
    }
}
