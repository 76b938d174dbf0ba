use serde::{Deserialize, Serialize};

/// Severity of a single analyzer finding.
///
/// Distinct from [`RiskLevel`], which is derived from the aggregate score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A single finding produced by one of the analyzer's checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    /// Stable machine-readable kind, e.g. `forbidden_identifier`, `infinite_loop`,
    /// `encoded_payload`, `oversized_source`, `excessive_nesting`, `delete_builtin`,
    /// `syntax_error`.
    pub kind: String,
    pub message: String,
    /// Byte offset into the source where the issue was found, if applicable.
    pub location: Option<u32>,
}

impl Issue {
    pub fn new(severity: Severity, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind: kind.into(),
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, offset: u32) -> Self {
        self.location = Some(offset);
        self
    }
}

/// Aggregate risk bucket derived from [`Analysis::score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Map a 0..=100 score to its risk bucket.
    ///
    /// `>=80` low, `>=60` medium, `>=40` high, below that critical.
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=100 => RiskLevel::Low,
            60..=79 => RiskLevel::Medium,
            40..=59 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }
}

/// Result of analyzing one script's source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub score: u8,
    pub issues: Vec<Issue>,
}

impl Analysis {
    /// `true` if any issue has [`Severity::High`] — the orchestrator refuses to
    /// dispatch such a script regardless of its aggregate score.
    pub fn has_blocking_issue(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::High)
    }

    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_score(self.score)
    }
}
