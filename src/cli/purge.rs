//! `purge` command: guarded bulk deletion of the provider account.
//!
//! The typed confirmation is deliberate friction; this deletes another
//! system's billed storage and there is no undo.

use anyhow::Result;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

use crate::config::Config;
use crate::purge::{PurgeWorkflow, CONFIRMATION_PHRASE};
use crate::transcription::GladiaClient;

use super::PurgeCliArgs;

pub async fn handle_purge_command(args: PurgeCliArgs) -> Result<()> {
    let config = Config::load()?;
    let page_size = args.page_size.unwrap_or(config.purge.page_size);

    let client = Arc::new(GladiaClient::new(&config.gladia));
    let mut workflow = PurgeWorkflow::new(client, page_size);

    println!("Checking remote transcription account...");
    let found = workflow.check().await?;

    if found == 0 {
        println!("Account is already empty; nothing to purge.");
        return Ok(());
    }

    println!(
        "Found {found} stored transcriptions. Deleting them is permanent.\n\
         Type '{CONFIRMATION_PHRASE}' to continue, or anything else to abort."
    );

    let phrase: String = Input::new().with_prompt("Confirmation").interact_text()?;
    if workflow.confirm(&phrase).is_err() {
        println!("Aborted; nothing was deleted.");
        return Ok(());
    }

    let bar = ProgressBar::new(found as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.red/white} {pos}/{len} deleted")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let result = workflow
        .purge(|_, deleted| {
            bar.set_position(deleted as u64);
            true
        })
        .await?;
    bar.finish_and_clear();

    println!(
        "Purge finished: {} found, {} deleted, {} failed",
        result.total_found, result.total_deleted, result.total_failed
    );
    for id in &result.failed_ids {
        println!("  failed: {id}");
    }
    if let Some(error) = &result.critical_error {
        println!("  stopped early by provider error: {error}");
    }
    Ok(())
}
