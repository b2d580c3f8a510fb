//! The `proctor sessions` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use proctor_core::model::SessionRecord;
use proctor_stores::{create_stores, load_config_from};

pub async fn execute(limit: usize, format: String, config_path: Option<PathBuf>) -> Result<()> {
    anyhow::ensure!(limit >= 1, "limit must be at least 1");

    let config = load_config_from(config_path.as_deref())?;
    let stores = create_stores(&config.store)?;

    let records = stores
        .record_store
        .list_recent(limit)
        .await
        .context("failed to list sessions")?;

    match format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            if records.is_empty() {
                println!("No sessions recorded yet.");
            } else {
                print_table(&records);
            }
        }
    }

    Ok(())
}

fn print_table(records: &[SessionRecord]) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Candidate", "Score", "Recording", "Status", "Created"]);

    for record in records {
        table.add_row(vec![
            Cell::new(&record.candidate_name),
            Cell::new(record.score),
            Cell::new(record.recording_ref.as_deref().unwrap_or("(none)")),
            Cell::new(format!("{:?}", record.status).to_lowercase()),
            Cell::new(record.created_at.format("%Y-%m-%d %H:%M:%S UTC")),
        ]);
    }

    println!("{table}");
}
