use serde::{Deserialize, Serialize};

/// Transactional email API and addressing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: String,
    /// `From:` address on every message.
    pub sender: String,
    /// Shared inbox that receives refill alerts.
    pub care_team_address: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Name printed on the clinician letter.
    #[serde(default = "default_clinic_name")]
    pub clinic_name: String,
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_clinic_name() -> String {
    "Care Team".to_string()
}
