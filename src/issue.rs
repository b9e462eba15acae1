use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    MissingColumn,
    ExtraColumn,
    TypeOrRuleMismatch,
    UnrecognizedKey,
    CapitalMismatch,
    ProfileTypeDrift,
    ProfileHighNullRate,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::MissingColumn => "MISSING_COLUMN",
            IssueCode::ExtraColumn => "EXTRA_COLUMN",
            IssueCode::TypeOrRuleMismatch => "TYPE_OR_RULE_MISMATCH",
            IssueCode::UnrecognizedKey => "UNRECOGNIZED_KEY",
            IssueCode::CapitalMismatch => "CAPITAL_MISMATCH",
            IssueCode::ProfileTypeDrift => "PROFILE_TYPE_DRIFT",
            IssueCode::ProfileHighNullRate => "PROFILE_HIGH_NULL_RATE",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finding of a validation run. Issues are appended, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: IssueCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col_name: Option<String>,
    /// 1-based position among body rows; the header is not counted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(severity: Severity, code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            col_name: None,
            row_index: None,
            value: None,
            expected: None,
            message: message.into(),
        }
    }

    pub fn error(code: IssueCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    pub fn warn(code: IssueCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warn, code, message)
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.col_name = Some(name.into());
        self
    }

    pub fn row(mut self, index: usize) -> Self {
        self.row_index = Some(index);
        self
    }

    pub fn value(mut self, value: Option<String>) -> Self {
        self.value = value;
        self
    }

    pub fn expected(mut self, expected: Option<String>) -> Self {
        self.expected = expected;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_serializes_with_wire_names() {
        let issue = ValidationIssue::error(IssueCode::TypeOrRuleMismatch, "Required")
            .column("amount")
            .row(2);
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["severity"], "error");
        assert_eq!(json["code"], "TYPE_OR_RULE_MISMATCH");
        assert_eq!(json["colName"], "amount");
        assert_eq!(json["rowIndex"], 2);
        assert!(json.get("value").is_none());
    }
}
