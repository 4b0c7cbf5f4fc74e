//! Configuration errors.

use std::fmt;
use thiserror::Error;

/// One problem found while compiling a rule file, tied to its source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub source: String,
    pub line: usize,
    /// The offending config line, trimmed.
    pub directive: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        source: impl Into<String>,
        line: usize,
        directive: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            line,
            directive: directive.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}  {}", self.source, self.line, self.message)?;
        if !self.directive.is_empty() {
            write!(f, "\n    | {}", self.directive)?;
        }
        Ok(())
    }
}

/// Every diagnostic reported for a rule file that failed to compile.
#[derive(Debug, Error)]
#[error("{}", render(.diagnostics))]
pub struct ConfigError {
    pub diagnostics: Vec<Diagnostic>,
}

fn render(diagnostics: &[Diagnostic]) -> String {
    let mut out = String::new();
    for diagnostic in diagnostics {
        out.push_str("Error: ");
        out.push_str(&diagnostic.to_string());
        out.push('\n');
    }
    out.push_str(&format!("{} error(s) in configuration", diagnostics.len()));
    out
}

/// Why a set of regions cannot form a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    #[error("marker extends beyond template (column {end} > width {width})")]
    OutOfBounds { end: usize, width: usize },
    #[error("overlap with another marker at column {column}")]
    Overlap { column: usize },
    #[error("duplicate variable name: {0}")]
    DuplicateName(String),
    #[error("empty marker")]
    Empty,
    /// The region's regex rejects the template's own text at that position.
    #[error("regex does not match marker")]
    SampleRejected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_every_diagnostic() {
        let err = ConfigError {
            diagnostics: vec![
                Diagnostic::new("rules.conf", 3, "? x", "malformed marker directive"),
                Diagnostic::new("rules.conf", 9, "", "unbound name: seq"),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("Error: rules.conf:3  malformed marker directive\n    | ? x"));
        assert!(text.contains("Error: rules.conf:9  unbound name: seq"));
        assert!(text.ends_with("2 error(s) in configuration"));
    }
}
