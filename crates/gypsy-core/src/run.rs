//! Run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Run sequence number, allocated per pipeline by the store.
pub type RunId = u64;

/// One build attempt and its recorded outcome.
///
/// A failed run has the same shape as a successful one; callers must look at
/// `success` rather than at the output or the artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub pipeline_name: String,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(pipeline_name: impl Into<String>, id: RunId) -> Self {
        Self {
            id,
            pipeline_name: pipeline_name.into(),
            stdout: String::new(),
            stderr: String::new(),
            success: false,
            completed_at: None,
        }
    }

    pub fn complete(&mut self, success: bool) {
        self.success = success;
        self.completed_at = Some(Utc::now());
    }
}

/// Per-command output accumulated during a build.
///
/// Streams are newline-joined across commands when written into a [`Run`].
#[derive(Debug, Default, Clone)]
pub struct OutputLog {
    stdout: Vec<String>,
    stderr: Vec<String>,
}

impl OutputLog {
    pub fn push(&mut self, stdout: &[u8], stderr: &[u8]) {
        self.stdout.push(String::from_utf8_lossy(stdout).into_owned());
        self.stderr.push(String::from_utf8_lossy(stderr).into_owned());
    }

    pub fn commands(&self) -> usize {
        self.stdout.len()
    }

    pub fn write_into(&self, run: &mut Run) {
        run.stdout = self.stdout.join("\n");
        run.stderr = self.stderr.join("\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_log_newline_joins() {
        let mut log = OutputLog::default();
        log.push(b"hi\n", b"");
        log.push(b"there\n", b"oops\n");

        let mut run = Run::new("demo", 1);
        log.write_into(&mut run);

        assert_eq!(log.commands(), 2);
        assert_eq!(run.stdout, "hi\n\nthere\n");
        assert_eq!(run.stderr, "\noops\n");
    }

    #[test]
    fn test_wire_format() {
        let mut run = Run::new("demo", 3);
        run.stdout = "ok".to_string();
        run.complete(true);

        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["pipeline_name"], "demo");
        assert_eq!(json["stdout"], "ok");
        assert_eq!(json["success"], true);
        assert!(json["completed_at"].is_string());
    }

    #[test]
    fn test_decode_minimal_record() {
        let run: Run = serde_json::from_str(
            r#"{"id":7,"pipeline_name":"demo","stdout":"","stderr":"","success":false}"#,
        )
        .unwrap();
        assert_eq!(run.id, 7);
        assert!(run.completed_at.is_none());
    }
}
