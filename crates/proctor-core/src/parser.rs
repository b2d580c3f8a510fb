//! TOML question-bank parser.
//!
//! Loads question sets from TOML files and directories, and validates them.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{IntegrityIssue, Question, QuestionSet};

/// Intermediate TOML structure for parsing question-bank files.
#[derive(Debug, Deserialize)]
struct TomlBankFile {
    bank: TomlBankHeader,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

#[derive(Debug, Deserialize)]
struct TomlBankHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    id: String,
    text: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(alias = "answer_index")]
    correct_index: usize,
}

/// Parse a single TOML file into a `QuestionSet`.
pub fn parse_question_bank(path: &Path) -> Result<QuestionSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read question bank file: {}", path.display()))?;

    parse_question_bank_str(&content, path)
}

/// Parse a TOML string into a `QuestionSet`.
pub fn parse_question_bank_str(content: &str, source_path: &Path) -> Result<QuestionSet> {
    let parsed: TomlBankFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let questions = parsed
        .questions
        .into_iter()
        .map(|q| Question {
            id: q.id,
            text: q.text,
            options: q.options,
            correct_index: q.correct_index,
        })
        .collect();

    Ok(QuestionSet {
        id: parsed.bank.id,
        name: parsed.bank.name,
        description: parsed.bank.description,
        questions,
    })
}

/// Recursively load all `.toml` question-bank files from a directory.
///
/// Files that fail to parse are skipped with a warning.
pub fn load_bank_directory(dir: &Path) -> Result<Vec<QuestionSet>> {
    let mut sets = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            sets.extend(load_bank_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_question_bank(&path) {
                Ok(set) => sets.push(set),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(sets)
}

/// A warning from question-bank validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question ID (if applicable).
    pub question_id: Option<String>,
    /// Warning message.
    pub message: String,
    /// Set when a session loading this bank reports the same condition.
    pub integrity: Option<IntegrityIssue>,
}

impl ValidationWarning {
    fn authoring(question_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            question_id: question_id.map(str::to_string),
            message: message.into(),
            integrity: None,
        }
    }
}

impl From<IntegrityIssue> for ValidationWarning {
    fn from(issue: IntegrityIssue) -> Self {
        let question_id = match &issue {
            IntegrityIssue::TooFewOptions { question_id, .. }
            | IntegrityIssue::CorrectIndexOutOfRange { question_id, .. }
            | IntegrityIssue::DuplicateId { question_id, .. } => question_id.clone(),
        };
        Self {
            question_id: Some(question_id),
            message: issue.to_string(),
            integrity: Some(issue),
        }
    }
}

/// Validate a question set for common authoring mistakes.
///
/// None of these stop a session: malformed questions are still presented
/// and graded by exact index match. Integrity issues are the ones a session
/// reports when it loads the bank.
pub fn validate_question_bank(set: &QuestionSet) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if set.questions.is_empty() {
        warnings.push(ValidationWarning::authoring(None, "question bank has no questions"));
    }

    for question in &set.questions {
        if question.text.trim().is_empty() {
            warnings.push(ValidationWarning::authoring(
                Some(&question.id),
                "question text is empty",
            ));
        }
        if question.options.iter().any(|o| o.trim().is_empty()) {
            warnings.push(ValidationWarning::authoring(
                Some(&question.id),
                "question has a blank option",
            ));
        }
    }

    warnings.extend(
        IntegrityIssue::scan(&set.questions)
            .into_iter()
            .map(ValidationWarning::from),
    );

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[bank]
id = "rust-basics"
name = "Rust Basics"
description = "Warm-up questions"

[[questions]]
id = "ownership"
text = "Which keyword moves a closure's captures into it?"
options = ["ref", "move", "mut", "static"]
correct_index = 1

[[questions]]
id = "option"
text = "What does Option::None represent?"
options = ["An error", "No value"]
correct_index = 1
"#;

    #[test]
    fn parse_valid_toml() {
        let set = parse_question_bank_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(set.id, "rust-basics");
        assert_eq!(set.name, "Rust Basics");
        assert_eq!(set.questions.len(), 2);
        assert_eq!(set.questions[0].id, "ownership");
        assert_eq!(set.questions[0].options.len(), 4);
        assert_eq!(set.questions[1].correct_index, 1);
        assert!(validate_question_bank(&set).is_empty());
    }

    #[test]
    fn parse_answer_index_alias() {
        let toml = r#"
[bank]
id = "legacy"
name = "Legacy"

[[questions]]
id = "q1"
text = "Pick the second"
options = ["a", "b"]
answer_index = 1
"#;
        let set = parse_question_bank_str(toml, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(set.questions[0].correct_index, 1);
        assert!(set.description.is_empty());
    }

    #[test]
    fn validate_duplicate_ids() {
        let toml = r#"
[bank]
id = "dupes"
name = "Dupes"

[[questions]]
id = "same"
text = "First"
options = ["a", "b"]
correct_index = 0

[[questions]]
id = "same"
text = "Second"
options = ["a", "b"]
correct_index = 1
"#;
        let set = parse_question_bank_str(toml, &PathBuf::from("test.toml")).unwrap();
        let warnings = validate_question_bank(&set);
        assert_eq!(warnings.len(), 1);
        assert!(matches!(
            warnings[0].integrity,
            Some(IntegrityIssue::DuplicateId { index: 1, .. })
        ));
        assert_eq!(warnings[0].question_id.as_deref(), Some("same"));
    }

    #[test]
    fn validate_malformed_questions() {
        let toml = r#"
[bank]
id = "broken"
name = "Broken"

[[questions]]
id = "lonely"
text = "  "
options = ["only"]
correct_index = 3

[[questions]]
id = "blank-option"
text = "Pick"
options = ["a", ""]
correct_index = 0
"#;
        let set = parse_question_bank_str(toml, &PathBuf::from("test.toml")).unwrap();
        let warnings = validate_question_bank(&set);
        let for_lonely: Vec<_> = warnings
            .iter()
            .filter(|w| w.question_id.as_deref() == Some("lonely"))
            .collect();
        assert_eq!(for_lonely.len(), 3);
        assert!(for_lonely.iter().any(|w| w.message.contains("text is empty")));
        assert!(for_lonely.iter().any(|w| w.message.contains("at least 2")));
        assert!(for_lonely.iter().any(|w| w.message.contains("correct index 3")));
        assert_eq!(for_lonely.iter().filter(|w| w.integrity.is_some()).count(), 2);
        assert!(warnings
            .iter()
            .any(|w| w.question_id.as_deref() == Some("blank-option")
                && w.message.contains("blank option")));
    }

    #[test]
    fn validate_empty_bank() {
        let toml = r#"
[bank]
id = "empty"
name = "Empty"
"#;
        let set = parse_question_bank_str(toml, &PathBuf::from("test.toml")).unwrap();
        let warnings = validate_question_bank(&set);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].question_id.is_none());
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        let result = parse_question_bank_str(bad, &PathBuf::from("bad.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn load_directory_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("bad.toml"), "not = [toml").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(
            nested.join("more.toml"),
            VALID_TOML.replace("rust-basics", "nested-set"),
        )
        .unwrap();

        let sets = load_bank_directory(dir.path()).unwrap();
        let ids: Vec<_> = sets.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["rust-basics", "nested-set"]);
    }

    #[test]
    fn load_directory_rejects_file_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(load_bank_directory(file.path()).is_err());
    }
}
