//! Cache command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use docforge_client::DisabledCompletionService;
use docforge_runner::Config;
use docforge_runner::repository::{DirectoryTemplateStore, TemplateStore};
use docforge_runner::service::EnhancementCache;
use std::sync::Arc;

/// Cache subcommands
#[derive(Subcommand)]
pub enum CacheCommands {
    /// Remove the enhanced artifact of one template and workspace
    Clear {
        /// Template id
        #[arg(short, long)]
        template: String,

        /// Workspace id
        #[arg(short, long)]
        workspace: String,
    },
}

/// Handle cache commands
pub async fn handle_cache_command(command: CacheCommands, config: &Config) -> Result<()> {
    match command {
        CacheCommands::Clear {
            template,
            workspace,
        } => {
            let store = DirectoryTemplateStore::new(&config.template_root);
            let descriptor = store
                .resolve(&template)
                .await
                .with_context(|| format!("Failed to resolve template {}", template))?;

            // Invalidation never calls the completion service.
            let cache = EnhancementCache::new(Arc::new(DisabledCompletionService), config.cache_ttl);
            if cache.invalidate(&descriptor, &workspace).await? {
                println!(
                    "{} Removed enhanced artifact for {} in {}",
                    "✓".green(),
                    template.cyan(),
                    workspace.cyan()
                );
            } else {
                println!(
                    "{}",
                    format!("No enhanced artifact cached for {} in {}", template, workspace).yellow()
                );
            }
        }
    }

    Ok(())
}
