use serde::{Deserialize, Serialize};

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 5;

/// One news item extracted from a source article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub title: String,
    pub location: String,
    pub is_local: bool,
    pub bullet: Option<String>,
    pub priority: u8,
}

/// How the topic list of an [`Analysis`] was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Analyzed,
    Unconfigured,
    Fallback,
}

/// Analyzer output. `topics` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub topics: Vec<Topic>,
    pub outcome: AnalysisOutcome,
}

impl Analysis {
    pub fn is_roundup(&self) -> bool {
        self.topics.len() > 1
    }
}

/// Topic shape as the LLM returns it. Every field is untrusted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTopic {
    #[serde(default)]
    pub title: Option<serde_json::Value>,
    #[serde(default)]
    pub location: Option<serde_json::Value>,
    #[serde(default)]
    pub is_local: Option<serde_json::Value>,
    #[serde(default, alias = "summary", alias = "summary_bullet")]
    pub bullet: Option<serde_json::Value>,
    #[serde(default)]
    pub priority: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTopicList {
    #[serde(default, alias = "items", alias = "stories")]
    pub topics: Vec<RawTopic>,
}
