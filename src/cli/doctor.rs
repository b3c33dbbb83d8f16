//! CLI `doctor` command — run database diagnostics and print a health report.

use anyhow::{Context, Result};

use crate::config::ProspectConfig;
use crate::db;
use crate::queue::TaskQueue;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &ProspectConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `prospect submit <query>` or `prospect serve` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path)
        .map(|m| m.len())
        .unwrap_or(0);

    let conn = db::open_database(&db_path)
        .context("failed to open database (may be corrupt)")?;

    let report = db::check_database_health(&conn)
        .context("failed to run health check")?;
    let fingerprint_version = db::migrations::get_fingerprint_version(&conn)?;

    println!("Prospect Health Report");
    println!("======================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Fingerprints:");
    println!(
        "  Stored version:  {}",
        fingerprint_version.as_deref().unwrap_or("(not set)")
    );
    if let Some(ref stored) = fingerprint_version {
        if stored != db::migrations::FINGERPRINT_VERSION {
            println!("  WARNING: normalizer mismatch! Stored fingerprints may not match new queries.");
        } else {
            println!("  Status:          OK (match)");
        }
    }
    println!();
    println!("Row counts:");
    println!("  Tasks:           {}", report.task_count);
    println!("  Memories:        {}", report.memory_count);
    println!("  Results:         {}", report.result_count);
    println!("  Status log:      {}", report.log_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
    }

    // Stuck-task detection: old, non-terminal, possibly retrying forever
    let queue = TaskQueue::new(
        std::sync::Arc::new(std::sync::Mutex::new(conn)),
        config.queue.clone(),
    );
    let stale = queue.stale_tasks(config.queue.stale_after_minutes)?;
    println!();
    if stale.is_empty() {
        println!("Stuck tasks:       none");
    } else {
        println!("Stuck tasks:       {} (older than {} min)", stale.len(), config.queue.stale_after_minutes);
        for task in stale {
            println!(
                "  #{} [{}] attempts={} submitted={} query={}",
                task.id, task.status, task.attempt_count, task.submitted_at, task.query
            );
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
