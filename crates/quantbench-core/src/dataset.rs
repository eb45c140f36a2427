//! Readers for model lists, Q&A sets and MMLU-style question banks

use crate::{scorer::ChoiceScorer, BenchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Display identity of a model artifact: its file name
pub fn model_identity(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Parse a newline-delimited model list. Blank lines and `#` comments are
/// ignored; `~` and environment variables are expanded.
pub fn parse_model_list(content: &str) -> Result<Vec<PathBuf>> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            shellexpand::full(line)
                .map(|expanded| PathBuf::from(expanded.as_ref()))
                .map_err(|e| {
                    BenchError::dataset(
                        "MODEL_LIST_EXPANSION_FAILED",
                        format!("Cannot expand model path '{}': {}", line, e),
                        "Parsing the model list",
                        "Define the referenced environment variable or use a literal path",
                        None,
                    )
                })
        })
        .collect()
}

/// Read the model list file
pub fn read_model_list(path: &Path) -> Result<Vec<PathBuf>> {
    let content = std::fs::read_to_string(path).map_err(|e| BenchError::from(e).with_path(path))?;
    let models = parse_model_list(&content)?;
    if models.is_empty() {
        warn!("Model list {} contains no entries", path.display());
    }
    Ok(models)
}

/// A free-form question with its reference answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

/// Load a JSON array of `{"question": ..., "answer": ...}` records
pub fn load_qa_dataset(path: &Path) -> Result<Vec<QaPair>> {
    let content = std::fs::read_to_string(path).map_err(|e| BenchError::from(e).with_path(path))?;
    let pairs: Vec<QaPair> = serde_json::from_str(&content).map_err(|e| {
        BenchError::dataset(
            "QA_DATASET_INVALID",
            format!("Cannot parse Q&A dataset: {}", e),
            format!("File: {}", path.display()),
            "Expected a JSON array of objects with \"question\" and \"answer\" strings",
            Some(path.to_path_buf()),
        )
    })?;
    debug!("Loaded {} Q&A pairs from {}", pairs.len(), path.display());
    Ok(pairs)
}

/// Data split of an MMLU-style bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Test,
    Validation,
    Dev,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Validation => "validation",
            Self::Dev => "dev",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test" => Ok(Self::Test),
            "validation" | "val" => Ok(Self::Validation),
            "dev" => Ok(Self::Dev),
            other => Err(BenchError::invalid_parameter(
                "INVALID_SPLIT",
                format!("Unknown data split: {}", other),
                "Selecting the MMLU split",
                "Use test, validation or dev",
                "split",
                other,
                "test | validation | dev",
            )),
        }
    }
}

/// Which subjects of a question bank to evaluate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectScope {
    All,
    Only(Vec<String>),
}

impl Default for SubjectScope {
    fn default() -> Self {
        Self::All
    }
}

impl FromStr for SubjectScope {
    type Err = BenchError;

    /// `all` or a comma-separated subject list
    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        let subjects: Vec<String> = s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if subjects.is_empty() {
            return Err(BenchError::invalid_parameter(
                "INVALID_SUBJECT_SCOPE",
                "No subjects selected",
                "Selecting MMLU subjects",
                "Use 'all' or a comma-separated list such as astronomy,virology",
                "subjects",
                s,
                "all | subject[,subject...]",
            ));
        }
        Ok(Self::Only(subjects))
    }
}

/// One multiple-choice question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MmluQuestion {
    pub subject: String,
    pub question: String,
    pub choices: Vec<String>,
    /// Zero-based index of the correct choice
    pub answer: usize,
}

impl MmluQuestion {
    pub fn answer_letter(&self) -> char {
        ChoiceScorer::letter(self.answer).unwrap_or('?')
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAnswer {
    Index(usize),
    Letter(String),
}

#[derive(Deserialize)]
struct RawQuestion {
    question: String,
    choices: Vec<String>,
    answer: RawAnswer,
}

/// Questions partitioned by subject, subjects in sorted order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MmluDataset {
    subjects: BTreeMap<String, Vec<MmluQuestion>>,
}

impl MmluDataset {
    pub fn from_subjects(subjects: BTreeMap<String, Vec<MmluQuestion>>) -> Self {
        Self { subjects }
    }

    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    pub fn len(&self) -> usize {
        self.subjects.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subjects(&self) -> impl Iterator<Item = (&str, &[MmluQuestion])> {
        self.subjects.iter().map(|(s, q)| (s.as_str(), q.as_slice()))
    }

    /// All questions, subject by subject
    pub fn questions(&self) -> impl Iterator<Item = &MmluQuestion> {
        self.subjects.values().flatten()
    }
}

fn parse_question(subject: &str, line: &str, path: &Path, line_no: usize) -> Result<MmluQuestion> {
    let invalid = |message: String| {
        BenchError::dataset(
            "MMLU_RECORD_INVALID",
            message,
            format!("{}:{}", path.display(), line_no),
            "Each line must be {\"question\": str, \"choices\": [str, ...], \"answer\": index or letter}",
            Some(path.to_path_buf()),
        )
    };

    let raw: RawQuestion =
        serde_json::from_str(line).map_err(|e| invalid(format!("Malformed record: {}", e)))?;

    if !(2..=26).contains(&raw.choices.len()) {
        return Err(invalid(format!(
            "Expected between 2 and 26 choices, found {}",
            raw.choices.len()
        )));
    }

    let answer = match raw.answer {
        RawAnswer::Index(i) => i,
        RawAnswer::Letter(letter) => {
            let mut chars = letter.trim().chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphabetic() => {
                    (c.to_ascii_uppercase() as u8 - b'A') as usize
                }
                _ => return Err(invalid(format!("Answer '{}' is not a choice letter", letter))),
            }
        }
    };
    if answer >= raw.choices.len() {
        return Err(invalid(format!(
            "Answer index {} is out of range for {} choices",
            answer,
            raw.choices.len()
        )));
    }

    Ok(MmluQuestion {
        subject: subject.to_string(),
        question: raw.question,
        choices: raw.choices,
        answer,
    })
}

fn load_subject_file(subject: &str, path: &Path, cap: Option<usize>) -> Result<Vec<MmluQuestion>> {
    let content = std::fs::read_to_string(path).map_err(|e| BenchError::from(e).with_path(path))?;
    let limit = cap.unwrap_or(usize::MAX);

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .take(limit)
        .map(|(i, line)| parse_question(subject, line, path, i + 1))
        .collect()
}

/// Load `<root>/<split>/<subject>.jsonl` files for the requested subjects,
/// keeping at most `samples_per_subject` questions (in file order) each.
pub fn load_mmlu(
    root: &Path,
    scope: &SubjectScope,
    split: Split,
    samples_per_subject: Option<usize>,
) -> Result<MmluDataset> {
    let split_dir = root.join(split.as_str());
    if !split_dir.is_dir() {
        return Err(BenchError::dataset(
            "MMLU_SPLIT_NOT_FOUND",
            format!("Split directory not found: {}", split_dir.display()),
            format!("Loading the {} split", split),
            "Export the dataset as <root>/<split>/<subject>.jsonl",
            Some(split_dir),
        ));
    }

    let mut available = BTreeMap::new();
    let entries =
        std::fs::read_dir(&split_dir).map_err(|e| BenchError::from(e).with_path(&split_dir))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                available.insert(stem.to_string(), path.clone());
            }
        }
    }

    let selected: Vec<(String, PathBuf)> = match scope {
        SubjectScope::All => available.into_iter().collect(),
        SubjectScope::Only(subjects) => subjects
            .iter()
            .map(|subject| {
                available
                    .get(subject)
                    .map(|p| (subject.clone(), p.clone()))
                    .ok_or_else(|| {
                        BenchError::dataset(
                            "MMLU_SUBJECT_NOT_FOUND",
                            format!("Subject '{}' has no {} file", subject, split),
                            format!("Looked for {}/{}.jsonl", split_dir.display(), subject),
                            "Check the subject name or use 'all'",
                            Some(split_dir.clone()),
                        )
                    })
            })
            .collect::<Result<_>>()?,
    };

    let mut subjects = BTreeMap::new();
    for (subject, path) in selected {
        let questions = load_subject_file(&subject, &path, samples_per_subject)?;
        debug!("Loaded {} questions for {}", questions.len(), subject);
        subjects.insert(subject, questions);
    }

    Ok(MmluDataset { subjects })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_model_list_skips_blanks_and_comments() {
        let models = parse_model_list("models/a.gguf\n\n# disabled\n  models/b.gguf  \n").unwrap();
        assert_eq!(models, vec![PathBuf::from("models/a.gguf"), PathBuf::from("models/b.gguf")]);
    }

    #[test]
    fn test_model_identity_is_file_name() {
        assert_eq!(model_identity(Path::new("models/llama-q4_k_m.gguf")), "llama-q4_k_m.gguf");
    }

    #[test]
    fn test_load_qa_dataset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("evaluation_set.json");
        fs::write(
            &path,
            r#"[{"question": "What is the capital of France?", "answer": "Paris"}]"#,
        )
        .unwrap();
        let pairs = load_qa_dataset(&path).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].answer, "Paris");

        fs::write(&path, r#"{"question": "x"}"#).unwrap();
        assert_eq!(load_qa_dataset(&path).unwrap_err().code(), "QA_DATASET_INVALID");
    }

    fn write_bank(root: &Path) {
        let test_dir = root.join("test");
        fs::create_dir_all(&test_dir).unwrap();
        fs::write(
            test_dir.join("astronomy.jsonl"),
            concat!(
                r#"{"question": "Which planet is second from the sun?", "choices": ["Mercury", "Venus", "Earth", "Mars"], "answer": 1}"#,
                "\n",
                r#"{"question": "Which planet is largest?", "choices": ["Jupiter", "Venus", "Earth", "Mars"], "answer": "a"}"#,
                "\n\n",
            ),
        )
        .unwrap();
        fs::write(
            test_dir.join("virology.jsonl"),
            r#"{"question": "Viruses are?", "choices": ["alive", "not cells"], "answer": 1}"#,
        )
        .unwrap();
    }

    #[test]
    fn test_load_mmlu_all_subjects() {
        let dir = tempdir().unwrap();
        write_bank(dir.path());

        let dataset = load_mmlu(dir.path(), &SubjectScope::All, Split::Test, None).unwrap();
        assert_eq!(dataset.subject_count(), 2);
        assert_eq!(dataset.len(), 3);
        let first = dataset.questions().next().unwrap();
        assert_eq!(first.subject, "astronomy");
        assert_eq!(first.answer_letter(), 'B');
        let second = dataset.questions().nth(1).unwrap();
        assert_eq!(second.answer, 0);
    }

    #[test]
    fn test_load_mmlu_scope_and_cap() {
        let dir = tempdir().unwrap();
        write_bank(dir.path());

        let scope: SubjectScope = "astronomy".parse().unwrap();
        let dataset = load_mmlu(dir.path(), &scope, Split::Test, Some(1)).unwrap();
        assert_eq!(dataset.subject_count(), 1);
        assert_eq!(dataset.len(), 1);

        let missing: SubjectScope = "astronomy, chemistry".parse().unwrap();
        let err = load_mmlu(dir.path(), &missing, Split::Test, None).unwrap_err();
        assert_eq!(err.code(), "MMLU_SUBJECT_NOT_FOUND");

        let err = load_mmlu(dir.path(), &SubjectScope::All, Split::Dev, None).unwrap_err();
        assert_eq!(err.code(), "MMLU_SPLIT_NOT_FOUND");
    }

    #[test]
    fn test_out_of_range_answer_is_rejected() {
        let dir = tempdir().unwrap();
        let test_dir = dir.path().join("test");
        fs::create_dir_all(&test_dir).unwrap();
        fs::write(
            test_dir.join("logic.jsonl"),
            r#"{"question": "q", "choices": ["x", "y"], "answer": 2}"#,
        )
        .unwrap();
        let err = load_mmlu(dir.path(), &SubjectScope::All, Split::Test, None).unwrap_err();
        assert_eq!(err.code(), "MMLU_RECORD_INVALID");
    }

    #[test]
    fn test_split_parsing() {
        assert_eq!("TEST".parse::<Split>().unwrap(), Split::Test);
        assert!("train".parse::<Split>().is_err());
    }
}
