//! Model listing command
//!
//! Models are not discovered from the provider; the configured list is the
//! set a chat may switch between with `/model`.

use crate::config::Config;
use prettytable::{row, Table};

/// One row of the model listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRow {
    /// Model id as sent to the provider
    pub name: String,
    /// True for the model new chats start with
    pub active: bool,
}

/// Configured models, with the default model first-class even when the
/// list omits it
pub fn model_rows(config: &Config) -> Vec<ModelRow> {
    let anthropic = &config.provider.anthropic;
    let mut rows: Vec<ModelRow> = anthropic
        .models
        .iter()
        .map(|name| ModelRow {
            name: name.clone(),
            active: *name == anthropic.model,
        })
        .collect();

    if !rows.iter().any(|row| row.active) {
        rows.insert(
            0,
            ModelRow {
                name: anthropic.model.clone(),
                active: true,
            },
        );
    }
    rows
}

/// Print the configured models as a table
pub fn list_models(config: &Config) {
    tracing::info!(
        "Listing models for provider: {}",
        config.provider.provider_type
    );

    let mut table = Table::new();
    table.add_row(row!["Model Name", "Active"]);
    for model in model_rows(config) {
        table.add_row(row![model.name, if model.active { "*" } else { "" }]);
    }

    println!(
        "\nConfigured models for {}:\n",
        config.provider.provider_type
    );
    table.printstd();
    println!();
}
