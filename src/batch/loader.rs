//! Question files in, answer files out

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;

use super::question::{AnswerRecord, QuestionRecord};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path} at line {line}: {source}")]
    Json {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode answer record: {0}")]
    Encode(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> BatchError + '_ {
    move |source| BatchError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Read questions from a `.jsonl` file (one object per line, blank lines
/// skipped) or any other file holding a JSON array
pub fn load_questions(path: &Path) -> Result<Vec<QuestionRecord>, BatchError> {
    let text = std::fs::read_to_string(path).map_err(io_error(path))?;
    let is_jsonl = path.extension().and_then(|e| e.to_str()) == Some("jsonl");
    parse_questions(&text, is_jsonl).map_err(|(line, source)| BatchError::Json {
        path: path.to_path_buf(),
        line,
        source,
    })
}

/// Parse question text; errors carry the 1-based line number
pub fn parse_questions(
    text: &str,
    is_jsonl: bool,
) -> Result<Vec<QuestionRecord>, (usize, serde_json::Error)> {
    if !is_jsonl {
        return serde_json::from_str(text).map_err(|e| (e.line(), e));
    }

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| serde_json::from_str(line).map_err(|e| (i + 1, e)))
        .collect()
}

/// Split into contiguous batches of at most `size` (a size of 0 is treated as 1)
pub fn make_batches<T>(items: &[T], size: usize) -> Vec<&[T]> {
    items.chunks(size.max(1)).collect()
}

/// JSONL writer that flushes after every record, so an interrupted run
/// leaves a valid prefix
pub struct AnswerWriter {
    path: PathBuf,
    file: tokio::fs::File,
}

impl AnswerWriter {
    /// Create (or truncate) the output file, creating parent directories
    pub async fn create(path: &Path) -> Result<Self, BatchError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_error(parent))?;
        }
        let file = tokio::fs::File::create(path).await.map_err(io_error(path))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub async fn write(&mut self, record: &AnswerRecord) -> Result<(), BatchError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .await
            .map_err(io_error(&self.path))?;
        self.file.flush().await.map_err(io_error(&self.path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_jsonl_skips_blank_lines() {
        let text = "{\"question\": \"a\"}\n\n{\"question\": \"b\", \"id\": 2}\n";
        let questions = parse_questions(text, true).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[1].id(), Some(&json!(2)));
    }

    #[test]
    fn test_parse_jsonl_reports_line() {
        let text = "{\"question\": \"a\"}\nnot json\n";
        let (line, _) = parse_questions(text, true).unwrap_err();
        assert_eq!(line, 2);
    }

    #[test]
    fn test_parse_json_array() {
        let text = r#"[{"question": "a"}, {"question": "b"}]"#;
        assert_eq!(parse_questions(text, false).unwrap().len(), 2);
    }

    #[test]
    fn test_make_batches() {
        let items: Vec<u32> = (0..7).collect();
        let batches = make_batches(&items, 3);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2], &[6]);
        assert_eq!(make_batches(&items, 0).len(), 7);
        assert!(make_batches::<u32>(&[], 4).is_empty());
    }

    #[test]
    fn test_load_questions_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let jsonl = dir.path().join("q.jsonl");
        std::fs::write(&jsonl, "{\"question\": \"a\"}\n{\"question\": \"b\"}\n").unwrap();
        assert_eq!(load_questions(&jsonl).unwrap().len(), 2);

        let json = dir.path().join("q.json");
        std::fs::write(&json, r#"[{"question": "a"}]"#).unwrap();
        assert_eq!(load_questions(&json).unwrap().len(), 1);

        let missing = dir.path().join("missing.jsonl");
        assert!(matches!(load_questions(&missing), Err(BatchError::Io { .. })));
    }

    #[tokio::test]
    async fn test_writer_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result").join("answers.jsonl");

        let mut writer = AnswerWriter::create(&path).await.unwrap();
        let record = AnswerRecord::failed(QuestionRecord::new("q", json!({})), "boom");
        writer.write(&record).await.unwrap();
        writer.write(&record).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("\"answer_letter\":\"X\""));
    }
}
