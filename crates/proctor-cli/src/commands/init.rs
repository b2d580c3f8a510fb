//! The `proctor init` command.

use std::path::Path;

use anyhow::{Context, Result};

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("proctor.toml"), SAMPLE_CONFIG)?;
    write_if_missing(Path::new("roster.toml"), SAMPLE_ROSTER)?;

    std::fs::create_dir_all("proctor-data").context("failed to create proctor-data")?;
    write_if_missing(Path::new("proctor-data/questions.toml"), SAMPLE_BANK)?;

    println!("\nNext steps:");
    println!("  1. Edit roster.toml and proctor-data/questions.toml");
    println!("  2. Run: proctor validate --bank proctor-data/questions.toml");
    println!("  3. Run: proctor run --check-only --username demo --password demo");
    println!("  4. Run: proctor run --username demo --password demo");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# proctor configuration

roster = "roster.toml"

[session]
question_duration_secs = 60
candidate_fallback_name = "Anonymous"

[capture]
liveness_threshold = 30.0
liveness_window = 8
sample_interval_ms = 150

[recording]
name_prefix = "recording"
extension = "webm"
mime_type = "video/webm"

[store]
type = "local"
dir = "proctor-data"

# Hosted store:
# [store]
# type = "rest"
# base_url = "https://your-project.example.com"
# api_key = "${PROCTOR_API_KEY}"
# bucket = "proctoring-recordings"

[device]
type = "synthetic"
"#;

const SAMPLE_ROSTER: &str = r#"# proctor roster

[[operators]]
username = "admin"
password = "change-me"
role = "super_operator"

[[candidates]]
username = "demo"
password = "demo"

[candidates.profile]
full_name = "Demo Candidate"
"#;

const SAMPLE_BANK: &str = r#"[bank]
id = "example"
name = "Example Assessment"
description = "A short example to get started"

[[questions]]
id = "capital-france"
text = "What is the capital of France?"
options = ["Berlin", "Madrid", "Paris", "Rome"]
correct_index = 2

[[questions]]
id = "binary-ten"
text = "What is 10 in binary?"
options = ["1010", "1100", "1001", "0110"]
correct_index = 0

[[questions]]
id = "true-false"
text = "Rust has a garbage collector."
options = ["True", "False"]
correct_index = 1
"#;
