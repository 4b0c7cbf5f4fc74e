//! `$name` substitution for controller messages.

use crate::template::Bindings;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// A message with `$name` placeholders, split once at compile time.
///
/// A placeholder is `$` followed by one or more word characters
/// (`[A-Za-z0-9_]`). A `$` that is not followed by a word character is kept
/// as-is, so `"cost: $$amount"` expands to `"cost: $"` + the value of `amount`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFormat {
    segments: Vec<Segment>,
}

fn is_word(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

impl MessageFormat {
    pub fn parse(format: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = format.chars().peekable();

        while let Some(ch) = chars.next() {
            if ch == '$' && chars.peek().copied().is_some_and(is_word) {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if !is_word(next) {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Variable(name));
            } else {
                literal.push(ch);
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments }
    }

    /// Names referenced by the message, in order of first appearance.
    pub fn references(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Variable(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Substitute every placeholder with its binding.
    ///
    /// Names are checked against the template when the rule is compiled, so a
    /// missing binding can only come from a caller bypassing that check; it
    /// expands to an empty string.
    pub fn expand(&self, bindings: &Bindings) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(name) => {
                    out.push_str(bindings.get(name).map(String::as_str).unwrap_or_default())
                }
            }
        }
        out
    }
}
