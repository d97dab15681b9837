//! Console summaries and JSON reports

use super::RunResult;
use crate::state::CrawlCheckpoint;
use crate::storage::RunRecord;
use crate::Result;
use chrono::SecondsFormat;
use std::collections::BTreeMap;
use std::path::Path;

/// Prints a human-readable run summary to stdout
pub fn print_summary(result: &RunResult) {
    println!("=== Sync Summary ===\n");

    println!("Overview:");
    println!("  Status: {}", result.status);
    println!(
        "  Duration: {}s",
        (result.finished_at - result.started_at).num_seconds()
    );
    println!("  Pages processed: {}", result.pages_processed());
    println!("  Documents ingested: {}", result.documents_ingested());
    if let Some(error) = &result.error {
        println!("  Error: {}", error);
    }
    println!();

    println!("Collections:");
    for c in &result.collections {
        println!(
            "  {} [{}]: {} found, {} changed, {} processed, {} ingested, {} attachments relocated{}",
            c.collection_key,
            c.status,
            c.pages_found,
            c.pages_changed,
            c.pages_processed,
            c.documents_ingested,
            c.attachments_relocated,
            if c.is_first_crawl { " (first crawl)" } else { "" }
        );
        if let Some(error) = &c.error {
            println!("    error: {}", error);
        }
    }
    println!();

    let failed: Vec<_> = result.failed_ingests().collect();
    if !failed.is_empty() {
        println!("Failed ingests ({}):", failed.len());
        for outcome in failed {
            println!(
                "  - {} [{}]: {}",
                outcome.document_id,
                outcome.status,
                outcome.reason.as_deref().unwrap_or("no reason given")
            );
        }
        println!();
    }

    let page_errors: Vec<_> = result.page_errors().collect();
    if !page_errors.is_empty() {
        println!("Page errors ({}):", page_errors.len());
        for error in page_errors {
            println!("  - {}", error);
        }
        println!();
    }

    let attachment_errors: Vec<_> = result.attachment_errors().collect();
    if !attachment_errors.is_empty() {
        println!("Attachment errors ({}):", attachment_errors.len());
        for error in attachment_errors {
            println!("  - {}", error);
        }
        println!();
    }
}

/// Prints stored checkpoints and recent runs
pub fn print_status(checkpoints: &BTreeMap<String, CrawlCheckpoint>, runs: &[RunRecord]) {
    println!("=== Sync Status ===\n");

    println!("Checkpoints:");
    if checkpoints.is_empty() {
        println!("  (none)");
    }
    for (key, checkpoint) in checkpoints {
        println!(
            "  {}: last synchronized {} (written {})",
            key,
            checkpoint
                .last_crawl_time
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            checkpoint.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }
    println!();

    println!("Recent runs:");
    if runs.is_empty() {
        println!("  (none)");
    }
    for run in runs {
        println!(
            "  #{} {} started {} finished {} (config {})",
            run.id,
            run.status.to_db_string(),
            run.started_at,
            run.finished_at.as_deref().unwrap_or("-"),
            &run.config_hash[..run.config_hash.len().min(12)]
        );
    }
    println!();
}

/// Writes the run result as pretty-printed JSON
pub fn write_report(result: &RunResult, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json)?;
    Ok(())
}
