use serde_json::Value;
use std::sync::Arc;

use crate::config::AnalyzerConfig;
use crate::llm::parser::parse_topics;
use crate::llm::{LLMProvider, TopicRequest};
use crate::models::{Analysis, AnalysisOutcome, RawTopic, Topic, MAX_PRIORITY, MIN_PRIORITY};

/// Per-call knobs that depend on the source rather than the analyzer.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzeOptions {
    /// Trusted sources never drop below this priority.
    pub priority_floor: Option<u8>,
    /// Overrides the configured body budget.
    pub char_budget: Option<usize>,
}

/// Turns article text into one or more topics. Fail-open: every path yields
/// at least one topic.
pub struct ArticleAnalyzer {
    llm: Option<Arc<dyn LLMProvider>>,
    config: AnalyzerConfig,
}

impl ArticleAnalyzer {
    pub fn new(llm: Option<Arc<dyn LLMProvider>>, config: AnalyzerConfig) -> Self {
        Self { llm, config }
    }

    pub async fn analyze(&self, title: &str, body: &str, default_location: &str) -> Analysis {
        self.analyze_with(title, body, default_location, AnalyzeOptions::default())
            .await
    }

    pub async fn analyze_with(
        &self,
        title: &str,
        body: &str,
        default_location: &str,
        options: AnalyzeOptions,
    ) -> Analysis {
        let Some(llm) = &self.llm else {
            return self.default_analysis(title, default_location, options, AnalysisOutcome::Unconfigured);
        };

        let request = TopicRequest {
            title,
            body,
            default_location,
            char_budget: options.char_budget.unwrap_or(self.config.body_char_budget),
        };

        let response = match llm.complete(request.into_completion()).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Analysis failed for '{}': {}", title, e);
                return self.default_analysis(title, default_location, options, AnalysisOutcome::Fallback);
            }
        };

        let raw_topics = match parse_topics(&response) {
            Ok(topics) if !topics.is_empty() => topics,
            Ok(_) => {
                tracing::warn!("Analysis for '{}' returned no topics", title);
                return self.default_analysis(title, default_location, options, AnalysisOutcome::Fallback);
            }
            Err(e) => {
                tracing::warn!("Unparseable analysis for '{}': {}", title, e);
                return self.default_analysis(title, default_location, options, AnalysisOutcome::Fallback);
            }
        };

        let topics: Vec<Topic> = raw_topics
            .iter()
            .map(|raw| self.sanitize(raw, title, default_location, options.priority_floor))
            .collect();

        if topics.len() > 1 {
            tracing::info!("'{}' split into {} topics", title, topics.len());
        }

        Analysis {
            topics,
            outcome: AnalysisOutcome::Analyzed,
        }
    }

    fn default_analysis(
        &self,
        title: &str,
        default_location: &str,
        options: AnalyzeOptions,
        outcome: AnalysisOutcome,
    ) -> Analysis {
        Analysis {
            topics: vec![Topic {
                title: title.to_string(),
                location: default_location.to_string(),
                is_local: true,
                bullet: None,
                priority: self.apply_floor(None, options.priority_floor),
            }],
            outcome,
        }
    }

    fn sanitize(
        &self,
        raw: &RawTopic,
        source_title: &str,
        default_location: &str,
        floor: Option<u8>,
    ) -> Topic {
        let title = text_field(raw.title.as_ref()).unwrap_or_else(|| source_title.to_string());

        let location = text_field(raw.location.as_ref())
            .filter(|l| !l.eq_ignore_ascii_case("unknown"))
            .unwrap_or_else(|| default_location.to_string());

        let is_local = match raw.is_local.as_ref() {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !s.trim().eq_ignore_ascii_case("false"),
            _ => true,
        };

        let priority = self.apply_floor(priority_field(raw.priority.as_ref()), floor);

        Topic {
            title,
            location,
            is_local,
            bullet: text_field(raw.bullet.as_ref()),
            priority,
        }
    }

    /// Valid priorities pass through; anything else becomes the default.
    /// Either way the floor, when set, wins if higher.
    fn apply_floor(&self, priority: Option<u8>, floor: Option<u8>) -> u8 {
        let value = priority.unwrap_or(self.config.default_priority);
        match floor {
            Some(f) => value.max(f.clamp(MIN_PRIORITY, MAX_PRIORITY)),
            None => value,
        }
    }
}

fn text_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn priority_field(value: Option<&Value>) -> Option<u8> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    if n.fract() != 0.0 || n < MIN_PRIORITY as f64 || n > MAX_PRIORITY as f64 {
        return None;
    }
    Some(n as u8)
}
