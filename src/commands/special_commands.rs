//! Special commands parser for interactive chat
//!
//! Lines starting with `/` are commands for the chat client rather than
//! messages for the model. Command names are case-insensitive; arguments
//! keep their case.

use crate::storage::types::SHORT_ID_LEN;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Session selected by `/load`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadTarget {
    /// 1-based position in the last `/history` listing
    Position(usize),
    /// Session id, or a unique prefix or suffix of one
    Id(String),
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq)]
pub enum SpecialCommand {
    /// Start a new empty session
    NewSession,

    /// List recent sessions
    History,

    /// Switch to a stored session
    Load(LoadTarget),

    /// Ask for the reply to the last user message again
    Retry,

    /// Edit a message; holds the zero-based message index
    Edit(usize),

    /// Export the conversation, optionally to a specific file
    Export(Option<PathBuf>),

    /// Replace the conversation with an imported JSON file
    Import(PathBuf),

    /// List models (`None`) or switch to one
    Model(Option<String>),

    /// Set the sampling temperature
    Temperature(f32),

    /// Show or replace the system instruction
    System(Option<String>),

    /// Show input token usage
    Tokens,

    /// Show session status
    ShowStatus,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command; the input is a chat message
    None,
}

fn missing(command: &str, usage: &str) -> CommandError {
    CommandError::MissingArgument {
        command: command.to_string(),
        usage: usage.to_string(),
    }
}

fn unsupported(command: &str, arg: &str) -> CommandError {
    CommandError::UnsupportedArgument {
        command: command.to_string(),
        arg: arg.to_string(),
    }
}

/// Parse a user input string into a special command
///
/// # Errors
///
/// Returns `CommandError` for unknown commands, missing arguments, and
/// arguments of the wrong shape.
///
/// # Examples
///
/// ```
/// use confab::commands::special_commands::{parse_special_command, LoadTarget, SpecialCommand};
///
/// assert_eq!(parse_special_command("/edit 3").unwrap(), SpecialCommand::Edit(2));
/// assert_eq!(
///     parse_special_command("/load 2").unwrap(),
///     SpecialCommand::Load(LoadTarget::Position(2))
/// );
/// assert_eq!(parse_special_command("hello there").unwrap(), SpecialCommand::None);
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if lower == "exit" || lower == "quit" {
        return Ok(SpecialCommand::Exit);
    }
    if !trimmed.starts_with('/') {
        return Ok(SpecialCommand::None);
    }

    let (name, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((name, rest)) => (name.to_lowercase(), Some(rest.trim()).filter(|a| !a.is_empty())),
        None => (lower, None),
    };

    match (name.as_str(), arg) {
        ("/new", None) => Ok(SpecialCommand::NewSession),
        ("/history", None) => Ok(SpecialCommand::History),
        ("/retry", None) => Ok(SpecialCommand::Retry),

        ("/load", None) => Err(missing("/load", "/load <number|session id>")),
        ("/load", Some(arg)) => Ok(SpecialCommand::Load(match arg.parse::<usize>() {
            // Listed ids are this long, so longer numbers are id fragments.
            _ if arg.len() >= SHORT_ID_LEN => LoadTarget::Id(arg.to_string()),
            Ok(0) => return Err(unsupported("/load", arg)),
            Ok(position) => LoadTarget::Position(position),
            Err(_) => LoadTarget::Id(arg.to_string()),
        })),

        ("/edit", None) => Err(missing("/edit", "/edit <message number>")),
        ("/edit", Some(arg)) => match arg.parse::<usize>() {
            Ok(number) if number > 0 => Ok(SpecialCommand::Edit(number - 1)),
            _ => Err(unsupported("/edit", arg)),
        },

        ("/export", arg) => Ok(SpecialCommand::Export(arg.map(PathBuf::from))),
        ("/import", None) => Err(missing("/import", "/import <file.json>")),
        ("/import", Some(arg)) => Ok(SpecialCommand::Import(PathBuf::from(arg))),

        ("/model" | "/models", arg) => Ok(SpecialCommand::Model(arg.map(str::to_string))),

        ("/temperature" | "/temp", None) => {
            Err(missing("/temperature", "/temperature <0.0-1.0>"))
        }
        ("/temperature" | "/temp", Some(arg)) => arg
            .parse::<f32>()
            .map(SpecialCommand::Temperature)
            .map_err(|_| unsupported("/temperature", arg)),

        ("/system", arg) => Ok(SpecialCommand::System(arg.map(str::to_string))),

        ("/tokens" | "/context", None) => Ok(SpecialCommand::Tokens),
        ("/status", None) => Ok(SpecialCommand::ShowStatus),
        ("/help" | "/?", None) => Ok(SpecialCommand::Help),
        ("/exit" | "/quit", None) => Ok(SpecialCommand::Exit),

        (
            "/new" | "/history" | "/retry" | "/tokens" | "/context" | "/status" | "/help" | "/?"
            | "/exit" | "/quit",
            Some(arg),
        ) => Err(unsupported(&name, arg)),

        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

/// Display help information for special commands
pub fn print_help() {
    println!(
        r#"
Chat Commands
=============

SESSIONS:
  /new              - Start a new empty session
  /history          - List recent sessions
  /load <N|ID>      - Open session N from /history, or by id / id prefix
  /export [FILE]    - Save the conversation as JSON
  /import <FILE>    - Replace the conversation with a JSON export

MESSAGES:
  /edit <N>         - Rewrite message N; later messages are discarded
  /retry            - Ask again after a failed reply

SETTINGS:
  /model [NAME]     - List models, or switch to NAME
  /temperature <V>  - Set sampling temperature (0.0-1.0)
  /system [TEXT]    - Show or replace the system instruction

INFORMATION:
  /tokens           - Show input token usage
  /status           - Show session status
  /help             - Show this help message

SESSION CONTROL:
  /exit, exit, quit - Leave the chat

NOTES:
  - Command names are case-insensitive
  - Anything not starting with / is sent to the model
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_regular_text_returns_none() {
        assert_eq!(
            parse_special_command("what is /dev/null?").unwrap(),
            SpecialCommand::None
        );
        assert_eq!(parse_special_command("").unwrap(), SpecialCommand::None);
    }

    #[test]
    fn test_parse_exit_variants() {
        for input in ["exit", "QUIT", "/exit", "/quit"] {
            assert_eq!(parse_special_command(input).unwrap(), SpecialCommand::Exit);
        }
    }

    #[test]
    fn test_parse_session_commands() {
        assert_eq!(
            parse_special_command("/NEW").unwrap(),
            SpecialCommand::NewSession
        );
        assert_eq!(
            parse_special_command("/history").unwrap(),
            SpecialCommand::History
        );
        assert_eq!(
            parse_special_command("/load 9f2c1A").unwrap(),
            SpecialCommand::Load(LoadTarget::Id("9f2c1A".to_string()))
        );
    }

    #[test]
    fn test_parse_load_long_number_is_an_id() {
        assert_eq!(
            parse_special_command("/load 12").unwrap(),
            SpecialCommand::Load(LoadTarget::Position(12))
        );
        assert_eq!(
            parse_special_command("/load 123456").unwrap(),
            SpecialCommand::Load(LoadTarget::Id("123456".to_string()))
        );
        assert_eq!(
            parse_special_command("/load 0123456789").unwrap(),
            SpecialCommand::Load(LoadTarget::Id("0123456789".to_string()))
        );
    }

    #[test]
    fn test_parse_load_rejects_zero() {
        assert!(matches!(
            parse_special_command("/load 0"),
            Err(CommandError::UnsupportedArgument { .. })
        ));
    }

    #[test]
    fn test_parse_edit_converts_to_index() {
        assert_eq!(
            parse_special_command("/edit 1").unwrap(),
            SpecialCommand::Edit(0)
        );
        assert!(parse_special_command("/edit 0").is_err());
        assert!(parse_special_command("/edit last").is_err());
        assert_eq!(
            parse_special_command("/edit"),
            Err(CommandError::MissingArgument {
                command: "/edit".to_string(),
                usage: "/edit <message number>".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_export_and_import_keep_path_case() {
        assert_eq!(
            parse_special_command("/export").unwrap(),
            SpecialCommand::Export(None)
        );
        assert_eq!(
            parse_special_command("/export Notes/Chat.json").unwrap(),
            SpecialCommand::Export(Some(PathBuf::from("Notes/Chat.json")))
        );
        assert_eq!(
            parse_special_command("/import ./My Chat.json").unwrap(),
            SpecialCommand::Import(PathBuf::from("./My Chat.json"))
        );
        assert!(parse_special_command("/import").is_err());
    }

    #[test]
    fn test_parse_settings() {
        assert_eq!(
            parse_special_command("/model").unwrap(),
            SpecialCommand::Model(None)
        );
        assert_eq!(
            parse_special_command("/model claude-opus-4-20250514").unwrap(),
            SpecialCommand::Model(Some("claude-opus-4-20250514".to_string()))
        );
        assert_eq!(
            parse_special_command("/temperature 0.3").unwrap(),
            SpecialCommand::Temperature(0.3)
        );
        assert!(parse_special_command("/temperature warm").is_err());
        assert_eq!(
            parse_special_command("/system Answer in haiku.").unwrap(),
            SpecialCommand::System(Some("Answer in haiku.".to_string()))
        );
    }

    #[test]
    fn test_parse_info_commands() {
        assert_eq!(
            parse_special_command("/tokens").unwrap(),
            SpecialCommand::Tokens
        );
        assert_eq!(
            parse_special_command("  /status  ").unwrap(),
            SpecialCommand::ShowStatus
        );
        assert_eq!(parse_special_command("/?").unwrap(), SpecialCommand::Help);
        assert_eq!(
            parse_special_command("/Retry").unwrap(),
            SpecialCommand::Retry
        );
    }

    #[test]
    fn test_parse_argument_on_bare_command_is_rejected() {
        assert!(matches!(
            parse_special_command("/status now"),
            Err(CommandError::UnsupportedArgument { .. })
        ));
    }

    #[test]
    fn test_parse_unknown_command() {
        let err = parse_special_command("/frobnicate").unwrap_err();
        assert_eq!(err, CommandError::UnknownCommand("/frobnicate".to_string()));
        assert!(err.to_string().contains("/help"));
    }
}
