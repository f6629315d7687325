//! Masking eligibility: which resolved secrets may join the log redaction set.
//!
//! Ineligible values are still injected into the job; they are only left out
//! of redaction, and every such case is reported.

use derive_more::Display;
use jobenv_config::MaskingPolicy;
use jobenv_core::VariableCollection;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Display)]
pub enum Eligibility {
    #[display("eligible")]
    Eligible,
    #[display("value is {length} characters, minimum is {minimum}")]
    TooShort { length: usize, minimum: usize },
    #[display("value contains forbidden character {_0:?}")]
    ForbiddenCharacter(char),
    #[display("value is a known placeholder")]
    Placeholder,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaskedValue {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub key: String,
    pub reason: Eligibility,
}

/// Outcome of checking a resolved collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaskingReport {
    pub accepted: Vec<MaskedValue>,
    pub rejected: Vec<Rejection>,
}

impl MaskingReport {
    /// Values to redact from job logs.
    pub fn redaction_set(&self) -> impl Iterator<Item = &str> {
        self.accepted.iter().map(|m| m.value.as_str())
    }

    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

pub struct MaskingChecker {
    policy: MaskingPolicy,
}

impl MaskingChecker {
    pub fn new(policy: MaskingPolicy) -> Self {
        Self { policy }
    }

    pub fn check(&self, value: &str) -> Eligibility {
        let length = value.chars().count();
        if length < self.policy.min_length {
            return Eligibility::TooShort {
                length,
                minimum: self.policy.min_length,
            };
        }
        if let Some(c) = value.chars().find(|c| self.policy.forbidden_chars.contains(c)) {
            return Eligibility::ForbiddenCharacter(c);
        }
        if self.policy.placeholders.iter().any(|p| p == value) {
            return Eligibility::Placeholder;
        }
        Eligibility::Eligible
    }

    /// Check every masked entry of the effective map. Overridden entries are
    /// never injected, so they are not considered.
    pub fn report(&self, variables: &VariableCollection) -> MaskingReport {
        let mut report = MaskingReport::default();
        for (key, entry) in variables.to_effective_map() {
            if !entry.is_masked() {
                continue;
            }
            match self.check(entry.value()) {
                Eligibility::Eligible => report.accepted.push(MaskedValue {
                    key,
                    value: entry.value().to_string(),
                }),
                reason => {
                    warn!(key = %key, reason = %reason, "Variable will not be masked in job logs");
                    report.rejected.push(Rejection { key, reason });
                }
            }
        }
        report
    }
}

impl Default for MaskingChecker {
    fn default() -> Self {
        Self::new(MaskingPolicy::default())
    }
}
