use serde::{Deserialize, Serialize};

use crate::error::CalculationError;
use crate::telemetry::event::tags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Cache,
    Telemetry,
    HostIntegration,
    Calculation,
    /// Fallback; handled like a render fault.
    Unclassified,
}

impl FailureCategory {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Telemetry => "telemetry",
            Self::HostIntegration => "host_integration",
            Self::Calculation => "calculation",
            Self::Unclassified => "unclassified",
        }
    }

    pub fn tag(self) -> String {
        format!("{}{}", tags::CATEGORY_PREFIX, self.label())
    }

    /// Host faults are surfaced for manual handling; everything else gets an
    /// automated remediation before the caller may retry.
    pub const fn auto_recoverable(self) -> bool {
        !matches!(self, Self::HostIntegration)
    }

    pub const fn user_message(self) -> &'static str {
        match self {
            Self::Cache => "Stored results could not be read. Cached data was cleared.",
            Self::Telemetry => {
                "Performance monitoring failed and is restarting. Results are unaffected."
            }
            Self::HostIntegration => {
                "The spreadsheet reported an error. Check the workbook, then reset to continue."
            }
            Self::Calculation => {
                "The WACC calculation failed. Cached results were cleared so it can run again."
            }
            Self::Unclassified => "Something went wrong while displaying results.",
        }
    }
}

/// A failure caught at a protected boundary: either a typed engine error or
/// an untyped error raised by the UI or host layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub message: String,
    /// Where the failure surfaced (component name, operation, host API...).
    pub context: Vec<String>,
    pub declared: Option<FailureCategory>,
    pub caller_fixable: bool,
}

impl Fault {
    pub fn external(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: Vec::new(),
            declared: None,
            caller_fixable: false,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    pub fn declared_as(mut self, category: FailureCategory) -> Self {
        self.declared = Some(category);
        self
    }

    pub fn description(&self) -> String {
        if self.context.is_empty() {
            self.message.clone()
        } else {
            format!("{} ({})", self.message, self.context.join(" > "))
        }
    }
}

impl From<CalculationError> for Fault {
    fn from(err: CalculationError) -> Self {
        Self {
            message: err.to_string(),
            context: Vec::new(),
            declared: err.declared_category(),
            caller_fixable: err.is_invalid_input(),
        }
    }
}

impl From<&CalculationError> for Fault {
    fn from(err: &CalculationError) -> Self {
        Self::from(err.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRule {
    pub category: FailureCategory,
    /// Lowercase substrings matched against message and context.
    pub signals: Vec<String>,
}

impl ClassificationRule {
    pub fn new(category: FailureCategory, signals: &[&str]) -> Self {
        Self {
            category,
            signals: signals.iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    fn matches(&self, haystack: &str) -> bool {
        self.signals.iter().any(|signal| haystack.contains(signal.as_str()))
    }
}

/// Tagged-variant classifier.
///
/// A fault with a declared category is classified by that tag alone. Untyped
/// faults fall through the rule list in precedence order; the first rule with
/// a matching signal wins. Keyword matching is an approximation: an untyped
/// calculation error mentioning "cache" is classified as a cache fault.
#[derive(Debug, Clone, PartialEq)]
pub struct Classifier {
    rules: Vec<ClassificationRule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(vec![
            ClassificationRule::new(
                FailureCategory::Cache,
                &["cache", "storage", "indexeddb", "quota", "memoiz"],
            ),
            ClassificationRule::new(
                FailureCategory::Telemetry,
                &["telemetry", "performance", "observer", "metric", "monitor"],
            ),
            ClassificationRule::new(
                FailureCategory::HostIntegration,
                &["excel", "office", "workbook", "worksheet", "spreadsheet", "host"],
            ),
            ClassificationRule::new(
                FailureCategory::Calculation,
                &["calculat", "wacc", "nan", "infinit", "divide", "division", "overflow", "arithmetic"],
            ),
        ])
    }
}

impl Classifier {
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn classify(&self, fault: &Fault) -> FailureCategory {
        if let Some(category) = fault.declared {
            return category;
        }

        let haystack = fault.description().to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&haystack))
            .map(|rule| rule.category)
            .unwrap_or(FailureCategory::Unclassified)
    }
}
