//! Diagnostics infrastructure for tracking non-fatal issues during a run.
//!
//! Several error classes in this engine are *value-encoded* rather than
//! raised as exceptions: an alignment request that cannot be fully satisfied
//! sets `fulfilled = false` on itself and an `alignment_status` tag on the
//! involved blocks; a packing-invariant violation outside `DBG_LAYOUT` mode is
//! recorded and the search continues. This module provides a common container
//! for collecting those observations so callers can inspect them after a run
//! without the engine aborting.
//!
//! # Example
//!
//! ```
//! use fp_core::diagnostics::{Diagnostics, Severity};
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning("alignment", "request 3 not fulfilled: overlap 1.2 short of required 2.0");
//! diag.add_error_with_entity("packing", "stack-top mismatch after shift", "die 1");
//!
//! assert_eq!(diag.warning_count(), 1);
//! assert_eq!(diag.error_count(), 1);
//! ```

use serde::Serialize;

/// Severity level for diagnostic issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Unusual but the run continued (e.g. an alignment request went unmet).
    Warning,
    /// A stage could not complete as intended (e.g. an invalid layout under `DBG_LAYOUT`).
    Error,
}

/// A single diagnostic issue encountered during an operation.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Category for grouping, e.g. "alignment", "packing", "voltage", "thermal".
    pub category: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<usize>,
    /// Optional entity reference, e.g. "die 1", "block B3".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(severity: Severity, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            iteration: None,
            entity: None,
        }
    }

    pub fn with_iteration(mut self, iteration: usize) -> Self {
        self.iteration = Some(iteration);
        self
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };

        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;

        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }
        if let Some(iteration) = self.iteration {
            write!(f, " at iteration {}", iteration)?;
        }

        Ok(())
    }
}

/// Collection of diagnostic issues for a run (or a single SA iteration).
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: DiagnosticIssue) {
        self.issues.push(issue);
    }

    pub fn add_warning(&mut self, category: &str, message: &str) {
        self.issues.push(DiagnosticIssue::new(Severity::Warning, category, message));
    }

    pub fn add_warning_at_iteration(&mut self, category: &str, message: &str, iteration: usize) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message).with_iteration(iteration));
    }

    pub fn add_warning_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message).with_entity(entity));
    }

    pub fn add_error(&mut self, category: &str, message: &str) {
        self.issues.push(DiagnosticIssue::new(Severity::Error, category, message));
    }

    pub fn add_error_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message).with_entity(entity));
    }

    pub fn warning_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Warning).count()
    }

    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Error).count()
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Warning)
    }

    pub fn issues_by_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    pub fn clear(&mut self) {
        self.issues.clear();
    }

    pub fn summary(&self) -> String {
        let warnings = self.warning_count();
        let errors = self.error_count();

        match (warnings, errors) {
            (0, 0) => "No issues".to_string(),
            (w, 0) => format!("{} warning{}", w, if w == 1 { "" } else { "s" }),
            (0, e) => format!("{} error{}", e, if e == 1 { "" } else { "s" }),
            (w, e) => format!(
                "{} warning{}, {} error{}",
                w,
                if w == 1 { "" } else { "s" },
                e,
                if e == 1 { "" } else { "s" }
            ),
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_counts() {
        let mut diag = Diagnostics::new();
        diag.add_warning("alignment", "test warning");
        diag.add_error("packing", "test error");
        diag.add_warning_at_iteration("alignment", "iteration warning", 42);

        assert_eq!(diag.warning_count(), 2);
        assert_eq!(diag.error_count(), 1);
        assert!(diag.has_issues());
        assert!(diag.has_errors());
        assert!(diag.has_warnings());
    }

    #[test]
    fn test_diagnostics_serialization() {
        let mut diag = Diagnostics::new();
        diag.add_warning_at_iteration("alignment", "request unmet", 47);
        diag.add_error_with_entity("packing", "stack mismatch", "die 1");

        let json = serde_json::to_string_pretty(&diag).unwrap();
        assert!(json.contains("\"warning\""));
        assert!(json.contains("\"iteration\": 47"));
        assert!(json.contains("\"entity\": \"die 1\""));
    }

    #[test]
    fn test_diagnostic_issue_display() {
        let issue = DiagnosticIssue::new(Severity::Error, "voltage", "no feasible module")
            .with_entity("block B14")
            .with_iteration(42);

        let display = format!("{}", issue);
        assert!(display.contains("error"));
        assert!(display.contains("voltage"));
        assert!(display.contains("block B14"));
        assert!(display.contains("iteration 42"));
    }

    #[test]
    fn test_diagnostics_summary() {
        let mut diag = Diagnostics::new();
        assert_eq!(diag.summary(), "No issues");

        diag.add_warning("alignment", "warning");
        assert_eq!(diag.summary(), "1 warning");

        diag.add_error("packing", "error");
        assert_eq!(diag.summary(), "1 warning, 1 error");

        diag.add_warning("alignment", "another warning");
        assert_eq!(diag.summary(), "2 warnings, 1 error");
    }

    #[test]
    fn test_issues_by_category() {
        let mut diag = Diagnostics::new();
        diag.add_warning("alignment", "alignment warning");
        diag.add_warning("packing", "packing warning");
        diag.add_error("alignment", "alignment error");

        let alignment_issues: Vec<_> = diag.issues_by_category("alignment").collect();
        assert_eq!(alignment_issues.len(), 2);

        let packing_issues: Vec<_> = diag.issues_by_category("packing").collect();
        assert_eq!(packing_issues.len(), 1);
    }

    #[test]
    fn test_diagnostics_merge() {
        let mut diag1 = Diagnostics::new();
        diag1.add_warning("alignment", "warning 1");

        let mut diag2 = Diagnostics::new();
        diag2.add_error("packing", "error 1");

        diag1.merge(diag2);
        assert_eq!(diag1.warning_count(), 1);
        assert_eq!(diag1.error_count(), 1);
    }
}
