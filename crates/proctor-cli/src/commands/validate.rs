//! The `proctor validate` command.

use std::path::PathBuf;

use anyhow::Result;

use proctor_core::model::QuestionSet;
use proctor_core::parser::{load_bank_directory, parse_question_bank, validate_question_bank};

pub fn execute(bank_path: PathBuf) -> Result<()> {
    let sets = if bank_path.is_dir() {
        load_bank_directory(&bank_path)?
    } else {
        vec![parse_question_bank(&bank_path)?]
    };

    let mut total_warnings = 0;
    for set in &sets {
        total_warnings += report_bank(set);
    }

    if total_warnings == 0 {
        println!("All question banks valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}

/// Print one bank's summary and warnings. Returns the warning count.
fn report_bank(set: &QuestionSet) -> usize {
    let total = set.questions.len();
    println!("Question bank: {} ({total} questions)", set.name);

    let warnings = validate_question_bank(set);
    for w in &warnings {
        let label = if w.integrity.is_some() {
            "INTEGRITY"
        } else {
            "WARNING"
        };
        match &w.question_id {
            Some(id) => println!("  [{id}] {label}: {}", w.message),
            None => println!("  {label}: {}", w.message),
        }
    }

    // Sessions still present every question, so only the reachable score changes.
    let attainable = set.attainable_score();
    if attainable < total {
        println!("  Maximum score: {attainable}/{total}");
    }

    warnings.len()
}
