use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStep {
    Send,
    Receive,
    #[serde(alias = "debug", alias = "warn")]
    Info,
    Error,
}

/// One observed step of an SMTP dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub timestamp: String,
    pub step: LogStep,
    #[serde(default)]
    pub data: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_details"
    )]
    pub details: Option<String>,
}

impl LogEntry {
    pub fn new(step: LogStep, data: impl AsRef<str>, details: Option<String>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            step,
            data: data.as_ref().trim().to_string(),
            details,
        }
    }
}

/// Append-only transcript owned by a single probe and read out once the
/// probe reaches a terminal state.
#[derive(Debug, Default)]
pub struct SessionLog {
    entries: Vec<LogEntry>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn info(&mut self, data: impl AsRef<str>) {
        self.push(LogEntry::new(LogStep::Info, data, None));
    }

    pub fn info_with(&mut self, data: impl AsRef<str>, details: impl Into<String>) {
        self.push(LogEntry::new(LogStep::Info, data, Some(details.into())));
    }

    pub fn send(&mut self, command: impl AsRef<str>) {
        self.push(LogEntry::new(LogStep::Send, command, None));
    }

    pub fn receive(&mut self, reply: impl AsRef<str>) {
        self.push(LogEntry::new(LogStep::Receive, reply, None));
    }

    pub fn error(&mut self, data: impl AsRef<str>, details: Option<String>) {
        self.push(LogEntry::new(LogStep::Error, data, details));
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn finish(self) -> Vec<LogEntry> {
        self.entries
    }
}

// Remote transcripts sometimes carry structured details; keep them as JSON text.
fn lenient_details<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
