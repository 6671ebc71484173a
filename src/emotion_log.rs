use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::AppError;
use crate::types::{EmotionVector, FrameEmotions};

/// Person key -> ordered history of emotion vectors.
pub type LogDocument = Map<String, Value>;

/// Append-only JSON history of per-person emotion vectors.
///
/// Every append reads the whole document, extends it in memory and replaces the
/// file through a temp file in the same directory, so readers only ever see a
/// complete revision.
pub struct EmotionLog {
    path: PathBuf,
}

impl EmotionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the parent directory of the log. The log file itself is left alone.
    pub fn prepare_dir(&self) -> Result<()> {
        if let Some(dir) = self.parent_dir() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// Key under which the person at `index` is stored.
    pub fn person_key(index: usize) -> String {
        (index + 1).to_string()
    }

    /// Append one frame's vectors. An empty map leaves the file untouched.
    pub fn append(&self, emotions: &FrameEmotions) -> Result<()> {
        if emotions.is_empty() {
            return Ok(());
        }

        if !self.path.exists() {
            self.write(&LogDocument::new())?;
        }
        let mut doc = self.load()?;

        for (index, vector) in emotions {
            let key = Self::person_key(*index);
            let entry = doc
                .entry(key.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            match entry {
                Value::Array(items) => items.push(serde_json::to_value(vector)?),
                _ => return Err(AppError::LogFormat { key }.into()),
            }
        }

        self.write(&doc)?;
        debug!(path = %self.path.display(), persons = emotions.len(), "emotion log updated");
        Ok(())
    }

    /// Read the document as stored. Never writes.
    pub fn load(&self) -> Result<LogDocument> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read emotion log {}", self.path.display()))?;
        let doc = serde_json::from_str(&content)
            .with_context(|| format!("Emotion log {} is not a JSON object", self.path.display()))?;
        Ok(doc)
    }

    /// Vectors logged for `key`, oldest first. A missing key is an empty history.
    pub fn history(&self, key: &str) -> Result<Vec<EmotionVector>> {
        let doc = self.load()?;
        match doc.get(key) {
            None => Ok(Vec::new()),
            Some(value @ Value::Array(_)) => Ok(serde_json::from_value(value.clone())?),
            Some(_) => Err(AppError::LogFormat { key: key.to_string() }.into()),
        }
    }

    fn write(&self, doc: &LogDocument) -> Result<()> {
        let dir = self.parent_dir().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;

        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut tmp, formatter);
        doc.serialize(&mut ser)?;
        tmp.flush()?;

        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace emotion log {}", self.path.display()))?;
        Ok(())
    }

    fn parent_dir(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: &[f32]) -> EmotionVector {
        let labels: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        EmotionVector::from_labels(&labels, values)
    }

    fn frame(entries: &[(usize, EmotionVector)]) -> FrameEmotions {
        entries.iter().cloned().collect()
    }

    #[test]
    fn test_appends_in_call_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = EmotionLog::new(dir.path().join("data.json"));

        let first = vector(&[0.7, 0.2, 0.1]);
        let second = vector(&[0.1, 0.1, 0.8]);
        log.append(&frame(&[(0, first.clone())])).unwrap();
        log.append(&frame(&[(0, second.clone())])).unwrap();

        assert_eq!(log.history("1").unwrap(), vec![first, second]);
    }

    #[test]
    fn test_keys_are_one_based_and_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = EmotionLog::new(dir.path().join("data.json"));

        log.append(&frame(&[(0, vector(&[1.0, 0.0, 0.0])), (2, vector(&[0.0, 1.0, 0.0]))]))
            .unwrap();
        log.append(&frame(&[(1, vector(&[0.0, 0.0, 1.0]))])).unwrap();

        let doc = log.load().unwrap();
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["1", "3", "2"]);
        assert_eq!(log.history("2").unwrap().len(), 1);
        assert!(log.history("9").unwrap().is_empty());
    }

    #[test]
    fn test_empty_frame_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = EmotionLog::new(dir.path().join("data.json"));
        log.append(&FrameEmotions::new()).unwrap();
        assert!(!log.path().exists());
    }

    #[test]
    fn test_extends_existing_document_from_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, r#"{"1": [{"A": 0.5, "B": 0.5, "C": 0.0}]}"#).unwrap();

        let log = EmotionLog::new(&path);
        log.append(&frame(&[(0, vector(&[0.0, 0.0, 1.0]))])).unwrap();

        let history = log.history("1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].get("A"), Some(0.5));
        assert_eq!(history[1].get("C"), Some(1.0));
    }

    #[test]
    fn test_load_does_not_modify_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = EmotionLog::new(dir.path().join("data.json"));
        log.append(&frame(&[(0, vector(&[0.3, 0.3, 0.4]))])).unwrap();

        let before = fs::read(log.path()).unwrap();
        let _ = log.load().unwrap();
        let _ = log.history("1").unwrap();
        assert_eq!(fs::read(log.path()).unwrap(), before);
    }

    #[test]
    fn test_written_with_four_space_indent() {
        let dir = tempfile::tempdir().unwrap();
        let log = EmotionLog::new(dir.path().join("data.json"));
        log.append(&frame(&[(0, vector(&[0.5, 0.25, 0.25]))])).unwrap();

        let text = fs::read_to_string(log.path()).unwrap();
        assert!(text.starts_with("{\n    \"1\": [\n        {\n            \"A\": 0.5"));
    }

    #[test]
    fn test_rejects_non_array_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, r#"{"1": {"A": 1.0}}"#).unwrap();

        let log = EmotionLog::new(&path);
        let err = log.append(&frame(&[(0, vector(&[1.0, 0.0, 0.0]))])).unwrap_err();
        assert!(matches!(err.downcast_ref::<AppError>(), Some(AppError::LogFormat { key }) if key == "1"));
    }

    #[test]
    fn test_prepare_dir_creates_nested_parent() {
        let dir = tempfile::tempdir().unwrap();
        let log = EmotionLog::new(dir.path().join("uploads/nested/data.json"));
        log.prepare_dir().unwrap();
        assert!(dir.path().join("uploads/nested").is_dir());
        assert!(!log.path().exists());
    }
}
