//! Command-line interface definition for Confab
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for chatting, browsing history, and listing models.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Confab - terminal chat client with saved sessions
///
/// Chat with a language model, edit earlier turns, and pick up saved
/// conversations where you left off.
#[derive(Parser, Debug, Clone)]
#[command(name = "confab")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the session database location
    #[arg(long, global = true)]
    pub storage_path: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Confab
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat
    Chat {
        /// Model to use (must be one of the configured models)
        #[arg(short, long)]
        model: Option<String>,

        /// Owner namespace for saved sessions
        #[arg(short, long)]
        owner: Option<String>,

        /// Resume a saved session by id or id prefix
        #[arg(short, long)]
        resume: Option<String>,

        /// Sampling temperature (0.0-1.0)
        #[arg(short, long)]
        temperature: Option<f32>,

        /// System instruction for this chat
        #[arg(short, long)]
        system: Option<String>,
    },

    /// Browse and move saved sessions
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// List configured models
    Models,
}

/// History subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List recent sessions grouped by recency
    List {
        /// Owner namespace to list
        #[arg(short, long)]
        owner: Option<String>,

        /// Maximum number of sessions
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print the messages of a session
    Show {
        /// Session id or id prefix
        id: String,

        /// Owner namespace
        #[arg(short, long)]
        owner: Option<String>,
    },

    /// Export a session as JSON
    Export {
        /// Session id or id prefix
        id: String,

        /// Output file; defaults to conversation_<timestamp>.json
        #[arg(short = 'f', long)]
        output: Option<PathBuf>,

        /// Owner namespace
        #[arg(short, long)]
        owner: Option<String>,
    },

    /// Import a JSON conversation as a new session
    Import {
        /// JSON file to import
        file: PathBuf,

        /// Owner namespace
        #[arg(short, long)]
        owner: Option<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            storage_path: None,
            command: Commands::Models,
        }
    }
}
