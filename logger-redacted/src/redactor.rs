use base64::{engine::general_purpose, Engine as _};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};

use crate::config::RedactionConfig;
use crate::error::{LoggerError, LoggerResult};

/// Category of sensitive value a built-in pattern detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhiKind {
    Email,
    Phone,
    Ssn,
    CardNumber,
    IpAddress,
}

impl PhiKind {
    fn tag(&self) -> &'static str {
        match self {
            PhiKind::Email => "EMAIL",
            PhiKind::Phone => "PHONE",
            PhiKind::Ssn => "SSN",
            PhiKind::CardNumber => "CC",
            PhiKind::IpAddress => "IP",
        }
    }
}

// Card numbers run before phones so a 16-digit number is not split into phone matches.
const BUILTIN: &[(PhiKind, &str)] = &[
    (PhiKind::Email, r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
    (PhiKind::CardNumber, r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b"),
    (PhiKind::Ssn, r"\b\d{3}-\d{2}-\d{4}\b"),
    (
        PhiKind::Phone,
        r"(?:\+1[-.\s]?)?(?:\(\d{3}\)|\b\d{3})[-.\s]?\d{3}[-.\s]?\d{4}\b",
    ),
    (PhiKind::IpAddress, r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b"),
];

lazy_static! {
    static ref PATTERNS: Vec<(PhiKind, Regex)> = BUILTIN
        .iter()
        .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|regex| (*kind, regex)))
        .collect();
}

/// Scrubs contact details and identifiers out of text bound for a log line.
#[derive(Debug, Clone)]
pub struct PhiRedactor {
    enabled: bool,
    hash_for_correlation: bool,
    custom: Vec<(Regex, String)>,
}

impl Default for PhiRedactor {
    fn default() -> Self {
        Self {
            enabled: true,
            hash_for_correlation: true,
            custom: Vec::new(),
        }
    }
}

impl PhiRedactor {
    pub fn new(config: &RedactionConfig) -> LoggerResult<Self> {
        let custom = config
            .custom_patterns
            .iter()
            .map(|custom| {
                Regex::new(&custom.pattern)
                    .map(|regex| (regex, custom.replacement.clone()))
                    .map_err(|e| LoggerError::Pattern {
                        pattern: custom.pattern.clone(),
                        message: e.to_string(),
                    })
            })
            .collect::<LoggerResult<Vec<_>>>()?;

        Ok(Self {
            enabled: config.enabled,
            hash_for_correlation: config.hash_for_correlation,
            custom,
        })
    }

    pub fn redact(&self, text: &str) -> String {
        if !self.enabled {
            return text.to_string();
        }

        let mut result = text.to_string();
        for (kind, regex) in PATTERNS.iter() {
            result = regex
                .replace_all(&result, |caps: &Captures| {
                    let matched = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
                    self.replacement(*kind, matched)
                })
                .into_owned();
        }
        for (regex, replacement) in &self.custom {
            result = regex.replace_all(&result, replacement.as_str()).into_owned();
        }
        result
    }

    /// Stable short token for a value, so a redacted field still correlates.
    pub fn token(&self, value: &str) -> String {
        let digest = Sha256::digest(value.as_bytes());
        general_purpose::URL_SAFE_NO_PAD.encode(digest.get(..8).unwrap_or_default())
    }

    fn replacement(&self, kind: PhiKind, matched: &str) -> String {
        if self.hash_for_correlation {
            return format!("{}[{}]", kind.tag(), self.token(matched));
        }
        match kind {
            PhiKind::Email => mask_email(matched),
            PhiKind::Phone => "(***) ***-****".to_string(),
            PhiKind::Ssn => "***-**-****".to_string(),
            PhiKind::CardNumber => {
                let digits: Vec<char> = matched.chars().filter(char::is_ascii_digit).collect();
                let last4: String = digits.iter().skip(digits.len().saturating_sub(4)).collect();
                format!("****-****-****-{last4}")
            }
            PhiKind::IpAddress => {
                let mut octets = matched.split('.');
                match (octets.next(), octets.last()) {
                    (Some(first), Some(last)) => format!("{first}.***.***.{last}"),
                    _ => "***.***.***.***".to_string(),
                }
            }
        }
    }
}

fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let local_head = local.chars().next().map(String::from).unwrap_or_default();
            let domain_head = domain.chars().next().map(String::from).unwrap_or_default();
            format!("{local_head}***@{domain_head}***")
        }
        None => "***@***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CustomPattern;

    fn masking() -> PhiRedactor {
        PhiRedactor::new(&RedactionConfig {
            hash_for_correlation: false,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn every_builtin_pattern_compiles() {
        assert_eq!(PATTERNS.len(), BUILTIN.len());
    }

    #[test]
    fn test_email_masking() {
        let redacted = masking().redact("Letter sent to john.doe@example.com");
        assert_eq!(redacted, "Letter sent to j***@e***");
    }

    #[test]
    fn test_phone_masking() {
        let redacted = masking().redact("Call me at (555) 123-4567");
        assert!(redacted.contains("(***) ***-****"), "{redacted}");
        assert!(!redacted.contains("4567"));
    }

    #[test]
    fn card_keeps_last_four() {
        let redacted = masking().redact("card 4111-1111-1111-1234 on file");
        assert_eq!(redacted, "card ****-****-****-1234 on file");
    }

    #[test]
    fn hashed_tokens_correlate() {
        let redactor = PhiRedactor::default();
        let first = redactor.redact("to a@clinic.test");
        let second = redactor.redact("retry a@clinic.test");
        let token = redactor.token("a@clinic.test");
        assert_eq!(first, format!("to EMAIL[{token}]"));
        assert_eq!(second, format!("retry EMAIL[{token}]"));
        assert_ne!(token, redactor.token("b@clinic.test"));
    }

    #[test]
    fn custom_patterns_apply_after_builtins() {
        let redactor = PhiRedactor::new(&RedactionConfig {
            custom_patterns: vec![CustomPattern {
                pattern: r"\bMRN\d+".into(),
                replacement: "MRN[REDACTED]".into(),
            }],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(redactor.redact("patient MRN123456"), "patient MRN[REDACTED]");
    }

    #[test]
    fn invalid_custom_pattern_is_rejected() {
        let err = PhiRedactor::new(&RedactionConfig {
            custom_patterns: vec![CustomPattern {
                pattern: "(unclosed".into(),
                replacement: String::new(),
            }],
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, LoggerError::Pattern { .. }));
    }

    #[test]
    fn disabled_redactor_passes_text_through() {
        let redactor = PhiRedactor::new(&RedactionConfig {
            enabled: false,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(redactor.redact("a@b.io"), "a@b.io");
    }
}
