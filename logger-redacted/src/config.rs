// Logger configuration
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level or a full `EnvFilter` directive string. `RUST_LOG` wins when set.
    pub level: String,
    /// Structured JSON lines instead of the human-readable format.
    pub json: bool,
    pub redaction: RedactionConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            redaction: RedactionConfig::default(),
        }
    }
}

impl LoggingConfig {
    /// Filter directives used when `RUST_LOG` is unset.
    pub fn directives(&self) -> String {
        if self.level.contains('=') || self.level.contains(',') {
            self.level.clone()
        } else {
            format!("{},sqlx=warn,hyper=warn,reqwest=info", self.level)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomPattern {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionConfig {
    pub enabled: bool,
    /// Replace matches with a short hash so the same value can be correlated
    /// across log lines; otherwise matches are masked.
    pub hash_for_correlation: bool,
    pub custom_patterns: Vec<CustomPattern>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hash_for_correlation: true,
            custom_patterns: Vec::new(),
        }
    }
}
