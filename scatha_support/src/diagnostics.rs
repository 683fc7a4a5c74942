//! Soft, accumulating diagnostics and the append-only [`IssueHandler`] that
//! collects them across a whole compilation run.

use crate::{ScathaError, Span};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a single reported issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
            Severity::Hint => write!(f, "hint"),
        }
    }
}

/// The taxonomy a reported issue falls under, mirroring the pipeline stage
/// that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    Lexical,
    Syntactic,
    Semantic,
    Pipeline,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::Lexical => write!(f, "lexical"),
            IssueKind::Syntactic => write!(f, "syntactic"),
            IssueKind::Semantic => write!(f, "semantic"),
            IssueKind::Pipeline => write!(f, "pipeline"),
        }
    }
}

/// A single diagnostic: a message, its severity, its taxonomy, and the span
/// of source it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: IssueKind,
    pub message: String,
    pub span: Span,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, kind: IssueKind, message: impl Into<String>, span: Span) -> Self {
        Self { severity, kind, message: message.into(), span, help: None }
    }

    pub fn error(kind: IssueKind, message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Error, kind, message, span)
    }

    pub fn warning(kind: IssueKind, message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Warning, kind, message, span)
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {} at {}", self.severity, self.kind, self.message, self.span)?;
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

/// Append-only collection of diagnostics gathered over the lifetime of a
/// compilation. Never throws; callers gate on [`IssueHandler::has_errors`]
/// at stage boundaries instead of short-circuiting on the first issue.
#[derive(Debug, Clone, Default)]
pub struct IssueHandler {
    issues: Vec<Diagnostic>,
}

impl IssueHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.issues.push(diagnostic);
    }

    pub fn error(&mut self, kind: IssueKind, message: impl Into<String>, span: Span) {
        self.push(Diagnostic::error(kind, message, span));
    }

    pub fn warning(&mut self, kind: IssueKind, message: impl Into<String>, span: Span) {
        self.push(Diagnostic::warning(kind, message, span));
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|d| d.severity == Severity::Error).count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues.iter().filter(|d| d.severity == Severity::Warning).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.issues.iter()
    }

    pub fn extend(&mut self, other: IssueHandler) {
        self.issues.extend(other.issues);
    }

    /// Exit code the driver should use: 0 if nothing errored, 1 otherwise.
    /// Reserved for callers: driver-internal failures (bad CLI args, I/O
    /// failures before a single file was even read) use other exit codes.
    pub fn exit_code(&self) -> i32 {
        if self.has_errors() {
            1
        } else {
            0
        }
    }
}

impl From<ScathaError> for Diagnostic {
    fn from(err: ScathaError) -> Self {
        let span = Span::single(crate::Position::start(), 0);
        Diagnostic::error(IssueKind::Pipeline, err.to_string(), span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Position;
    use pretty_assertions::assert_eq;

    fn span() -> Span {
        Span::single(Position::start(), 0)
    }

    #[test]
    fn has_errors_only_true_with_error_severity() {
        let mut issues = IssueHandler::new();
        issues.warning(IssueKind::Semantic, "unused variable", span());
        assert!(!issues.has_errors());
        issues.error(IssueKind::Semantic, "undefined symbol", span());
        assert!(issues.has_errors());
        assert_eq!(issues.exit_code(), 1);
    }

    #[test]
    fn empty_handler_exits_zero() {
        let issues = IssueHandler::new();
        assert_eq!(issues.exit_code(), 0);
    }

    /// Diagnostics round-trip through JSON losslessly, the shape a driver
    /// embedding the compiler as a library needs to hand issues to tooling
    /// outside the process (an IDE, a build server) without re-parsing
    /// `Display` output.
    #[test]
    fn diagnostic_round_trips_through_json() {
        let diagnostic = Diagnostic::error(IssueKind::Semantic, "undefined symbol `foo`", span()).with_help("did you mean `bar`?");
        let json = serde_json::to_string(&diagnostic).expect("Diagnostic must serialize");
        let back: Diagnostic = serde_json::from_str(&json).expect("Diagnostic must deserialize");
        assert_eq!(diagnostic, back);
    }
}
