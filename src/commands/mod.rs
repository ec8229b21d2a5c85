/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `chat`    - Interactive chat
- `history` - Listing, showing, exporting and importing saved sessions
- `models`  - Configured model listing

The handlers are thin: they wire the provider and the session store into
the library components and format the results for the terminal.
*/

// Special commands parser for the interactive chat
pub mod special_commands;

// Saved session management
pub mod history;

// Model listing
pub mod models;

// Chat command handler
pub mod chat {
    //! Interactive chat handler.
    //!
    //! Builds the provider and the session store, wraps them in a
    //! `ChatSession`, and runs a readline loop that either executes slash
    //! commands or sends the line to the model and streams the reply.

    use crate::chat::{ChatSession, ChatSettings};
    use crate::commands::special_commands::{
        parse_special_command, print_help, LoadTarget, SpecialCommand,
    };
    use crate::config::{normalize_owner, Config, ANONYMOUS_OWNER};
    use crate::conversation::export_filename;
    use crate::error::{is_overloaded, is_retryable_provider_error, ConfabError, Result};
    use crate::history::{group_by_bucket, HistoryEntry};
    use crate::providers::{create_provider, Provider, ROLE_USER};
    use crate::storage::{SessionStore, SqliteStorage};
    use chrono::Local;
    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Arc;

    const OVERLOADED_MESSAGE: &str =
        "The model is overloaded right now. Please try again in a moment.";

    /// What the loop does after a slash command ran
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Action {
        /// Read the next line
        Continue,
        /// A reply is owed; generate it
        Reply,
        /// Prompt for new text for message N
        Edit(usize),
        /// Leave the chat
        Exit,
    }

    /// Start an interactive chat
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `model` - Optional model override; must be a configured model
    /// * `owner` - Optional owner override
    /// * `resume` - Optional session id or prefix to resume
    /// * `temperature` - Optional temperature override
    /// * `system` - Optional system instruction override
    ///
    /// # Examples
    ///
    /// ```
    /// use confab::commands::chat;
    /// use confab::config::Config;
    ///
    /// // In application code:
    /// // chat::run_chat(Config::default(), None, None, None, None, None).await?;
    /// ```
    pub async fn run_chat(
        config: Config,
        model: Option<String>,
        owner: Option<String>,
        resume: Option<String>,
        temperature: Option<f32>,
        system: Option<String>,
    ) -> Result<()> {
        tracing::info!("Starting interactive chat");

        let provider: Arc<dyn Provider> = Arc::from(create_provider(&config.provider)?);
        let store: Arc<dyn SessionStore> = Arc::new(SqliteStorage::from_config(&config.storage)?);

        let requested_owner = owner.unwrap_or_else(|| config.chat.owner.clone());
        let owner = match normalize_owner(&requested_owner) {
            Ok(owner) => owner,
            Err(e) => {
                eprintln!(
                    "{}",
                    format!("{}; continuing as '{}'", e, ANONYMOUS_OWNER).yellow()
                );
                ANONYMOUS_OWNER.to_string()
            }
        };

        let mut chat =
            ChatSession::new(provider, store, ChatSettings::from_config(&config), &owner)?;
        if let Some(model) = model {
            chat.set_model(&model)?;
        }
        if let Some(temperature) = temperature {
            chat.set_temperature(temperature)?;
        }
        if let Some(system) = system {
            chat.set_system_prompt(&system);
        }

        let mut rl = DefaultEditor::new()?;
        print_welcome_banner(&chat);

        if let Some(id) = resume {
            match chat.resume(&id).await {
                Ok(warnings) => {
                    print_warnings(&warnings);
                    print_transcript(&chat);
                }
                Err(e) => eprintln!("{}", format!("Could not resume {}: {}", id, e).red()),
            }
        }

        let mut listing: Vec<HistoryEntry> = Vec::new();

        loop {
            let readline = rl.readline(&format!("{} ", "you>".green().bold()));
            match readline {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(input);

                    let command = match parse_special_command(input) {
                        Ok(command) => command,
                        Err(e) => {
                            eprintln!("{}", e.to_string().red());
                            continue;
                        }
                    };

                    let action = if command == SpecialCommand::None {
                        print_warnings(&chat.submit(input));
                        Action::Reply
                    } else {
                        match handle_special(&mut chat, command, &mut listing).await {
                            Ok(action) => action,
                            Err(e) => {
                                eprintln!("{}", format!("Error: {}", e).red());
                                Action::Continue
                            }
                        }
                    };

                    match action {
                        Action::Continue => {}
                        Action::Reply => reply(&mut chat).await,
                        Action::Edit(index) => {
                            if edit_message(&mut chat, &mut rl, index) {
                                reply(&mut chat).await;
                            }
                        }
                        Action::Exit => break,
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    /// Run one slash command against the session
    pub(crate) async fn handle_special(
        chat: &mut ChatSession,
        command: SpecialCommand,
        listing: &mut Vec<HistoryEntry>,
    ) -> Result<Action> {
        match command {
            SpecialCommand::None => Ok(Action::Continue),
            SpecialCommand::NewSession => {
                chat.start_new();
                listing.clear();
                println!("{}", "Started a new session.".green());
                Ok(Action::Continue)
            }
            SpecialCommand::History => {
                *listing = chat.recent_history(false)?;
                print_history_menu(listing, chat.settings().history.label_chars);
                Ok(Action::Continue)
            }
            SpecialCommand::Retry => {
                if chat.retry() {
                    Ok(Action::Reply)
                } else {
                    println!("{}", "Nothing to retry.".yellow());
                    Ok(Action::Continue)
                }
            }
            SpecialCommand::Load(target) => {
                let id = match target {
                    LoadTarget::Id(id) => id,
                    LoadTarget::Position(position) => listing
                        .get(position - 1)
                        .map(|entry| entry.id.clone())
                        .ok_or_else(|| {
                            ConfabError::SessionNotFound(format!(
                                "#{} (run /history to list sessions)",
                                position
                            ))
                        })?,
                };
                let warnings = chat.resume(&id).await?;
                print_warnings(&warnings);
                print_transcript(chat);
                Ok(Action::Continue)
            }
            SpecialCommand::Edit(index) => {
                let len = chat.conversation().len();
                match chat.conversation().messages().get(index) {
                    None => Err(ConfabError::InvalidEdit { index, len }.into()),
                    Some(message) if message.role != ROLE_USER => {
                        println!("{}", "Only your own messages can be edited.".yellow());
                        Ok(Action::Continue)
                    }
                    Some(_) => Ok(Action::Edit(index)),
                }
            }
            SpecialCommand::Export(file) => {
                if chat.conversation().is_empty() {
                    println!("{}", "Nothing to export yet.".yellow());
                    return Ok(Action::Continue);
                }
                let path =
                    file.unwrap_or_else(|| PathBuf::from(export_filename(&Local::now())));
                std::fs::write(&path, chat.export_json()?)?;
                println!(
                    "{}",
                    format!(
                        "Exported {} messages to {}",
                        chat.conversation().len(),
                        path.display()
                    )
                    .green()
                );
                Ok(Action::Continue)
            }
            SpecialCommand::Import(file) => {
                let text = std::fs::read_to_string(&file)?;
                let warnings = chat.import_json(&text).await?;
                print_warnings(&warnings);
                println!(
                    "{}",
                    format!(
                        "Imported {} messages from {}",
                        chat.conversation().len(),
                        file.display()
                    )
                    .green()
                );
                print_transcript(chat);
                Ok(if chat.needs_reply() {
                    Action::Reply
                } else {
                    Action::Continue
                })
            }
            SpecialCommand::Model(None) => {
                for model in &chat.settings().models {
                    if *model == chat.settings().model {
                        println!("  {} {}", "*".green(), model.green().bold());
                    } else {
                        println!("    {}", model);
                    }
                }
                Ok(Action::Continue)
            }
            SpecialCommand::Model(Some(model)) => {
                chat.set_model(&model)?;
                println!("{}", format!("Switched to {}", model).green());
                Ok(Action::Continue)
            }
            SpecialCommand::Temperature(value) => {
                chat.set_temperature(value)?;
                println!("{}", format!("Temperature set to {:.2}", value).green());
                Ok(Action::Continue)
            }
            SpecialCommand::System(None) => {
                let current = &chat.settings().system_prompt;
                if current.is_empty() {
                    println!("No system instruction set.");
                } else {
                    println!("System: {}", current);
                }
                Ok(Action::Continue)
            }
            SpecialCommand::System(Some(prompt)) => {
                chat.set_system_prompt(&prompt);
                println!("{}", "System instruction updated.".green());
                Ok(Action::Continue)
            }
            SpecialCommand::Tokens => {
                println!("Context: {}", chat.context_info().display());
                Ok(Action::Continue)
            }
            SpecialCommand::ShowStatus => {
                print_status_display(chat);
                Ok(Action::Continue)
            }
            SpecialCommand::Help => {
                print_help();
                Ok(Action::Continue)
            }
            SpecialCommand::Exit => Ok(Action::Exit),
        }
    }

    /// Stream the owed reply to stdout and report what happened
    async fn reply(chat: &mut ChatSession) {
        println!();
        let result = chat
            .generate_reply(|text| {
                print!("{}", text);
                let _ = std::io::stdout().flush();
            })
            .await;
        println!("\n");

        match result {
            Ok(Some(outcome)) => {
                if outcome.dropped > 0 {
                    println!(
                        "{}",
                        format!(
                            "({} earlier messages were left out to fit the context window)",
                            outcome.dropped
                        )
                        .dimmed()
                    );
                }
                print_warnings(&outcome.warnings);
                if let Some(preview) = outcome.preview {
                    println!("{}", format!("Session titled \"{}\"", preview).dimmed());
                }
            }
            Ok(None) => {}
            Err(e) if is_overloaded(&e) => eprintln!("{}", OVERLOADED_MESSAGE.yellow()),
            Err(e) if is_retryable_provider_error(&e) => {
                eprintln!("{}", format!("{}. Please wait a moment and retry.", e).yellow())
            }
            Err(e) => eprintln!("{}", format!("Error: {}", e).red()),
        }
    }

    /// Let the user rewrite message `index`; true when the edit was applied
    fn edit_message(chat: &mut ChatSession, rl: &mut DefaultEditor, index: usize) -> bool {
        let original = match chat.conversation_mut().begin_edit(index) {
            Ok(message) => message.content.clone(),
            Err(e) => {
                eprintln!("{}", format!("Error: {}", e).red());
                return false;
            }
        };

        let prompt = format!("{} ", "edit>".yellow().bold());
        let edited = match rl.readline_with_initial(&prompt, (&original, "")) {
            Ok(text) => text,
            Err(_) => {
                chat.conversation_mut().cancel_edit();
                println!("{}", "Edit cancelled.".yellow());
                return false;
            }
        };

        let edited = edited.trim();
        if edited.is_empty() || edited == original.trim() {
            chat.conversation_mut().cancel_edit();
            println!("{}", "Edit cancelled.".yellow());
            return false;
        }

        match chat.edit(index, edited) {
            Ok(warnings) => {
                print_warnings(&warnings);
                true
            }
            Err(e) => {
                eprintln!("{}", format!("Error: {}", e).red());
                false
            }
        }
    }

    fn print_warnings(warnings: &[String]) {
        for warning in warnings {
            eprintln!("{}", format!("Warning: {}", warning).yellow());
        }
    }

    /// Numbered history menu grouped by recency
    fn print_history_menu(entries: &[HistoryEntry], label_chars: usize) {
        if entries.is_empty() {
            println!("{}", "No other sessions yet.".yellow());
            return;
        }

        let mut number = 0;
        for (bucket, members) in group_by_bucket(entries, &Local::now()) {
            println!("\n{}", bucket.to_string().bold());
            for entry in members {
                number += 1;
                println!("  {:>2}. {}", number, entry.menu_text(label_chars));
            }
        }
        println!("\nUse {} to open a session.\n", "/load <N>".cyan());
    }

    /// Numbered transcript of the active conversation
    fn print_transcript(chat: &ChatSession) {
        for (i, message) in chat.conversation().messages().iter().enumerate() {
            let role = if message.is_user() {
                "you".green().bold()
            } else {
                "assistant".cyan().bold()
            };
            println!("[{}] {}: {}", i + 1, role, message.content);
        }
        println!();
    }

    /// Display welcome banner at the start of an interactive chat
    fn print_welcome_banner(chat: &ChatSession) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Confab - Interactive Chat                  ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!("Model: {}", chat.settings().model.cyan());
        println!("Owner: {}\n", chat.owner().cyan());
        println!("Type '/help' for available commands, 'exit' to quit\n");
    }

    /// Display detailed status information about the current session
    fn print_status_display(chat: &ChatSession) {
        let settings = chat.settings();
        let system = if settings.system_prompt.is_empty() {
            "(none)".to_string()
        } else {
            settings.system_prompt.clone()
        };

        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                      Confab Session Status                    ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!("Session:           {}", chat.conversation().id().cyan());
        println!("Owner:             {}", chat.owner());
        println!("Model:             {}", settings.model.cyan());
        println!("Temperature:       {:.2}", settings.temperature);
        println!("System:            {}", system);
        println!(
            "Conversation Size: {} messages",
            chat.conversation().len()
        );
        println!("Context:           {}", chat.context_info().display());
        println!();
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::storage::SqliteStorage;
        use crate::test_utils::{temp_storage, ScriptedProvider};
        use tempfile::TempDir;

        fn chat_session() -> (ChatSession, Arc<SqliteStorage>, TempDir) {
            let (storage, dir) = temp_storage();
            let storage = Arc::new(storage);
            let chat = ChatSession::new(
                Arc::new(ScriptedProvider::new()),
                storage.clone(),
                ChatSettings::from_config(&Config::default()),
                "tester",
            )
            .unwrap();
            (chat, storage, dir)
        }

        #[tokio::test]
        async fn test_exit_and_help() {
            let (mut chat, _storage, _dir) = chat_session();
            let mut listing = Vec::new();
            assert_eq!(
                handle_special(&mut chat, SpecialCommand::Exit, &mut listing)
                    .await
                    .unwrap(),
                Action::Exit
            );
            assert_eq!(
                handle_special(&mut chat, SpecialCommand::Help, &mut listing)
                    .await
                    .unwrap(),
                Action::Continue
            );
        }

        #[tokio::test]
        async fn test_retry_only_after_unanswered_user_turn() {
            let (mut chat, _storage, _dir) = chat_session();
            let mut listing = Vec::new();
            assert_eq!(
                handle_special(&mut chat, SpecialCommand::Retry, &mut listing)
                    .await
                    .unwrap(),
                Action::Continue
            );

            chat.submit("hello");
            assert_eq!(
                handle_special(&mut chat, SpecialCommand::Retry, &mut listing)
                    .await
                    .unwrap(),
                Action::Reply
            );
        }

        #[tokio::test]
        async fn test_new_session_changes_id() {
            let (mut chat, _storage, _dir) = chat_session();
            chat.submit("hello");
            let before = chat.conversation().id().to_string();
            let mut listing = Vec::new();

            handle_special(&mut chat, SpecialCommand::NewSession, &mut listing)
                .await
                .unwrap();
            assert_ne!(chat.conversation().id(), before);
            assert!(chat.conversation().is_empty());
        }

        #[tokio::test]
        async fn test_load_by_position_requires_listing() {
            let (mut chat, _storage, _dir) = chat_session();
            let mut listing = Vec::new();
            let err = handle_special(
                &mut chat,
                SpecialCommand::Load(LoadTarget::Position(1)),
                &mut listing,
            )
            .await
            .unwrap_err();
            assert!(matches!(
                err.downcast_ref::<ConfabError>(),
                Some(ConfabError::SessionNotFound(_))
            ));
        }

        #[tokio::test]
        async fn test_history_then_load_by_position() {
            let (mut chat, _storage, _dir) = chat_session();
            chat.submit("remember me");
            chat.generate_reply(|_| {}).await.unwrap();
            let old_id = chat.conversation().id().to_string();
            chat.start_new();

            let mut listing = Vec::new();
            handle_special(&mut chat, SpecialCommand::History, &mut listing)
                .await
                .unwrap();
            assert_eq!(listing.len(), 1);

            handle_special(
                &mut chat,
                SpecialCommand::Load(LoadTarget::Position(1)),
                &mut listing,
            )
            .await
            .unwrap();
            assert_eq!(chat.conversation().id(), old_id);
            assert_eq!(chat.conversation().len(), 2);
        }

        #[tokio::test]
        async fn test_edit_only_user_messages() {
            let (mut chat, _storage, _dir) = chat_session();
            chat.submit("question");
            chat.generate_reply(|_| {}).await.unwrap();
            let mut listing = Vec::new();

            assert_eq!(
                handle_special(&mut chat, SpecialCommand::Edit(0), &mut listing)
                    .await
                    .unwrap(),
                Action::Edit(0)
            );
            assert_eq!(
                handle_special(&mut chat, SpecialCommand::Edit(1), &mut listing)
                    .await
                    .unwrap(),
                Action::Continue
            );
            assert!(
                handle_special(&mut chat, SpecialCommand::Edit(5), &mut listing)
                    .await
                    .is_err()
            );
        }

        #[tokio::test]
        async fn test_export_writes_file_and_import_reads_it() {
            let (mut chat, _storage, dir) = chat_session();
            chat.submit("one");
            chat.generate_reply(|_| {}).await.unwrap();
            let path = dir.path().join("chat.json");
            let mut listing = Vec::new();

            handle_special(
                &mut chat,
                SpecialCommand::Export(Some(path.clone())),
                &mut listing,
            )
            .await
            .unwrap();
            assert!(path.exists());

            let before = chat.conversation().id().to_string();
            let action = handle_special(&mut chat, SpecialCommand::Import(path), &mut listing)
                .await
                .unwrap();
            assert_eq!(action, Action::Continue);
            assert_ne!(chat.conversation().id(), before);
            assert_eq!(chat.conversation().len(), 2);
        }

        #[tokio::test]
        async fn test_settings_commands() {
            let (mut chat, _storage, _dir) = chat_session();
            let mut listing = Vec::new();

            assert!(handle_special(
                &mut chat,
                SpecialCommand::Model(Some("not-a-model".to_string())),
                &mut listing
            )
            .await
            .is_err());
            assert!(
                handle_special(&mut chat, SpecialCommand::Temperature(2.0), &mut listing)
                    .await
                    .is_err()
            );
            handle_special(
                &mut chat,
                SpecialCommand::System(Some("Be brief.".to_string())),
                &mut listing,
            )
            .await
            .unwrap();
            assert_eq!(chat.settings().system_prompt, "Be brief.");
        }
    }
}
