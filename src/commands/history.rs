use crate::cli::HistoryCommand;
use crate::config::{normalize_owner, Config};
use crate::conversation::{export_filename, export_json, import_json};
use crate::error::{ConfabError, Result};
use crate::history::{group_by_bucket, recent_entries, HistoryEntry};
use crate::storage::{SessionStore, SqliteStorage, StoredSession};
use chrono::Local;
use colored::Colorize;
use prettytable::{format, Table};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Handle history commands
pub fn handle_history(config: &Config, command: HistoryCommand) -> Result<()> {
    let storage = SqliteStorage::from_config(&config.storage)?;
    tracing::debug!("Using history database {}", storage.db_path().display());

    match command {
        HistoryCommand::List { owner, limit } => {
            let owner = resolve_owner(config, owner)?;
            let limit = limit.unwrap_or(config.history.recent_limit);
            let sessions = storage.list_recent(&owner, limit)?;

            if sessions.is_empty() {
                println!("{}", "No conversation history found.".yellow());
                return Ok(());
            }

            let entries = recent_entries(&sessions, None, None, &config.history);
            let mut number = 0;
            for (bucket, members) in group_by_bucket(&entries, &Local::now()) {
                let mut table = Table::new();
                table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
                table.add_row(prettytable::row![
                    "#".bold(),
                    "ID".bold(),
                    "Title".bold(),
                    "Messages".bold(),
                    "Last Updated".bold()
                ]);

                for entry in members {
                    number += 1;
                    let updated = entry
                        .updated_at
                        .with_timezone(&Local)
                        .format("%Y-%m-%d %H:%M")
                        .to_string();
                    table.add_row(prettytable::row![
                        number,
                        entry.short_id().cyan(),
                        entry.label(config.history.excerpt_chars),
                        entry.message_count,
                        updated
                    ]);
                }

                println!("\n{}", bucket.to_string().bold());
                table.printstd();
            }
            println!();
            println!(
                "Use {} to resume a session.",
                "confab chat --resume <ID>".cyan()
            );
            println!();
        }
        HistoryCommand::Show { id, owner } => {
            let owner = resolve_owner(config, owner)?;
            let session = find_session(&storage, &owner, &id)?;

            let entry =
                HistoryEntry::from_session(&session, 0, config.history.excerpt_chars, None);
            println!("\n{}", entry.display_text_in(&Local).bold());
            println!(
                "{}\n",
                format!(
                    "Session {} ({} messages)",
                    session.id,
                    session.messages.len()
                )
                .dimmed()
            );
            for (i, message) in session.messages.iter().enumerate() {
                let role = if message.is_user() {
                    message.role.green().bold()
                } else {
                    message.role.cyan().bold()
                };
                println!("[{}] {}: {}\n", i + 1, role, message.content);
            }
        }
        HistoryCommand::Export { id, output, owner } => {
            let owner = resolve_owner(config, owner)?;
            let path = output.unwrap_or_else(|| PathBuf::from(export_filename(&Local::now())));
            let count = export_session(&storage, &owner, &id, &path)?;
            println!(
                "{}",
                format!("Exported {} messages to {}", count, path.display()).green()
            );
        }
        HistoryCommand::Import { file, owner } => {
            let owner = resolve_owner(config, owner)?;
            let session = import_session(&storage, &owner, &file)?;
            println!(
                "{}",
                format!(
                    "Imported {} messages as session {}",
                    session.messages.len(),
                    session.id
                )
                .green()
            );
        }
    }

    Ok(())
}

fn resolve_owner(config: &Config, owner: Option<String>) -> Result<String> {
    normalize_owner(owner.as_deref().unwrap_or(&config.chat.owner))
}

fn find_session(store: &dyn SessionStore, owner: &str, id: &str) -> Result<StoredSession> {
    store
        .load_session(owner, id)?
        .ok_or_else(|| ConfabError::SessionNotFound(id.to_string()).into())
}

/// Write a stored session to `path` as export JSON; returns the message count
pub fn export_session(
    store: &dyn SessionStore,
    owner: &str,
    id: &str,
    path: &Path,
) -> Result<usize> {
    let session = find_session(store, owner, id)?;
    std::fs::write(path, export_json(&session.messages)?)?;
    tracing::info!("Exported session {} to {}", session.id, path.display());
    Ok(session.messages.len())
}

/// Store the conversation in `path` as a new session under a fresh id
///
/// # Errors
///
/// Returns `ConfabError::Import` when the file is not a valid export; nothing
/// is stored in that case.
pub fn import_session(store: &dyn SessionStore, owner: &str, path: &Path) -> Result<StoredSession> {
    let text = std::fs::read_to_string(path)?;
    let messages = import_json(&text)?;
    let id = Uuid::new_v4().to_string();

    let saved_at = store.save_session(owner, &id, &messages)?;
    tracing::info!(
        "Imported {} messages from {} as session {}",
        messages.len(),
        path.display(),
        id
    );

    Ok(StoredSession {
        owner: owner.to_string(),
        id,
        messages,
        created_at: saved_at,
        updated_at: saved_at,
        preview: None,
    })
}
