//! Rule compiler for reactty configuration files.
//!
//! The top-level entry points are [`parse_str`], [`parse_named`] and
//! [`parse_file`]. Compilation never stops at the first problem: every
//! malformed line is collected into one [`ConfigError`].

use crate::action::Action;
use crate::actions::{SendToController, TypeLiteral};
use crate::error::{ConfigError, Diagnostic};
use crate::rule::{Rule, RuleSet};
use crate::template::{Template, VariableRegion};
use anyhow::{Context as _, Result, anyhow};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Compile rules from a string slice. Diagnostics name the source `<inline>`.
///
/// # Example
///
/// ```
/// use reactty::parse_str;
///
/// let rules = parse_str(">Continue?\n!terminal \"y\"\n").unwrap();
/// assert_eq!(rules.len(), 1);
/// ```
pub fn parse_str(content: &str) -> Result<RuleSet, ConfigError> {
    parse_named("<inline>", content)
}

/// Compile rules from a file.
///
/// A [`ConfigError`] is returned inside the [`anyhow::Error`] so callers can
/// tell bad configuration from I/O failure with `downcast_ref`.
///
/// ```no_run
/// use reactty::parse_file;
///
/// let rules = parse_file("ping.cfg").unwrap();
/// ```
pub fn parse_file(path: impl AsRef<Path>) -> Result<RuleSet> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Ok(parse_named(&path.display().to_string(), &content)?)
}

/// Compile rules from `content`, labelling diagnostics with `source`.
pub fn parse_named(source: &str, content: &str) -> Result<RuleSet, ConfigError> {
    let lines: Vec<&str> = content.lines().collect();
    let mut compiler = Compiler {
        source,
        lines: &lines,
        diagnostics: Vec::new(),
    };

    let mut rules = Vec::new();
    let mut open: Option<PendingRule> = None;

    for (index, raw) in lines.iter().enumerate() {
        let line_num = index + 1;
        match parse_directive(raw) {
            Ok(None) => {}
            Ok(Some(Directive::Template(text))) => {
                if let Some(pending) = open.take() {
                    compiler.report(pending.line, "missing action line for template");
                }
                open = Some(PendingRule {
                    line: line_num,
                    text,
                    markers: Vec::new(),
                });
            }
            Ok(Some(Directive::Marker(marker))) => match open.as_mut() {
                Some(pending) => pending.markers.push((line_num, marker)),
                None => compiler.report(line_num, "marker line without a template"),
            },
            Ok(Some(Directive::Action(action))) => match open.take() {
                Some(pending) => {
                    if let Some(rule) = compiler.finish(pending, action, line_num) {
                        rules.push(rule);
                    }
                }
                None => compiler.report(line_num, "action line without a template"),
            },
            Err(message) => {
                // A broken action or template line still closes the open block.
                match raw.trim_start().chars().next() {
                    Some('!') => open = None,
                    Some('>') => {
                        if let Some(pending) = open.take() {
                            compiler.report(pending.line, "missing action line for template");
                        }
                    }
                    _ => {}
                }
                compiler.report(line_num, message);
            }
        }
    }

    if let Some(pending) = open {
        compiler.report(pending.line, "missing action line for template");
    }

    if !compiler.diagnostics.is_empty() {
        return Err(ConfigError {
            diagnostics: compiler.diagnostics,
        });
    }

    debug!(source, rules = rules.len(), "Rules compiled");
    Ok(RuleSet::new(rules))
}

type ParseFn = fn(&str) -> Result<Box<dyn Action>>;

static REGISTRY: &[(&str, ParseFn)] = &[
    (TypeLiteral::NAME, TypeLiteral::parse_boxed),
    (SendToController::NAME, SendToController::parse_boxed),
];

/// One parsed config line.
enum Directive {
    Template(String),
    Marker(Marker),
    Action(Box<dyn Action>),
}

/// A `?` line before it is checked against its template.
#[derive(Debug, PartialEq)]
struct Marker {
    start: usize,
    end: usize,
    name: Option<String>,
    pattern: Option<String>,
}

/// A template whose action line has not been seen yet.
struct PendingRule {
    line: usize,
    text: String,
    markers: Vec<(usize, Marker)>,
}

struct Compiler<'a> {
    source: &'a str,
    lines: &'a [&'a str],
    diagnostics: Vec<Diagnostic>,
}

impl Compiler<'_> {
    fn report(&mut self, line_num: usize, message: impl Into<String>) {
        let directive = self
            .lines
            .get(line_num - 1)
            .map(|l| l.trim())
            .unwrap_or_default();
        self.diagnostics
            .push(Diagnostic::new(self.source, line_num, directive, message));
    }

    /// Check a complete block and turn it into a rule, reporting every problem.
    fn finish(&mut self, pending: PendingRule, action: Box<dyn Action>, action_line: usize) -> Option<Rule> {
        let mut ok = true;
        let mut regions = Vec::with_capacity(pending.markers.len());
        let mut region_lines = Vec::with_capacity(pending.markers.len());

        for (line_num, marker) in pending.markers {
            let mut region = VariableRegion::new(marker.start, marker.end);
            if let Some(name) = marker.name {
                region = region.named(name);
            }
            if let Some(pattern) = marker.pattern {
                match region.clone().constrained(&pattern) {
                    Ok(r) => region = r,
                    Err(e) => {
                        self.report(line_num, format!("invalid regular expression: {e}"));
                        ok = false;
                    }
                }
            }
            regions.push(region);
            region_lines.push(line_num);
        }

        let template = match Template::new(&pending.text, regions) {
            Ok(template) => template,
            Err((index, e)) => {
                self.report(region_lines[index], e.to_string());
                return None;
            }
        };

        let bound: HashSet<&str> = template.bound_names().collect();
        for name in action.references() {
            if !bound.contains(name) {
                self.report(action_line, format!("unbound name: {name}"));
                ok = false;
            }
        }

        ok.then(|| Rule {
            template,
            action,
            line: pending.line,
        })
    }
}

/// Classify one raw config line. `Ok(None)` for blanks and comments.
fn parse_directive(raw: &str) -> Result<Option<Directive>, String> {
    let line = raw.trim_start();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    if line.contains('\t') {
        return Err("TAB character in directive".to_string());
    }

    if let Some(text) = line.strip_prefix('>') {
        Ok(Some(Directive::Template(text.to_string())))
    } else if let Some(rest) = line.strip_prefix('?') {
        parse_marker(rest).map(|m| Some(Directive::Marker(m)))
    } else if let Some(rest) = line.strip_prefix('!') {
        parse_action(rest).map(|a| Some(Directive::Action(a)))
    } else {
        Err("unrecognized directive".to_string())
    }
}

/// Parse the text after `?`: padding, a run of dots, an optional name and an
/// optional `/regex/`. Columns are relative to the text after the sigil,
/// matching the template line above.
fn parse_marker(rest: &str) -> Result<Marker, String> {
    if rest.trim().is_empty() {
        return Err("empty marker line".to_string());
    }

    let start = rest.len() - rest.trim_start_matches(' ').len();
    let after_pad = &rest[start..];
    let dots = after_pad.len() - after_pad.trim_start_matches('.').len();
    if dots == 0 {
        return Err("malformed marker line: expected a run of '.'".to_string());
    }

    let tail = after_pad[dots..].trim_start_matches(' ');
    let name_len = tail
        .find(|c: char| !is_word_char(c))
        .unwrap_or(tail.len());
    let name = (name_len > 0).then(|| tail[..name_len].to_string());

    let tail = tail[name_len..].trim_matches(' ');
    let pattern = if tail.is_empty() {
        None
    } else {
        match tail.strip_prefix('/').and_then(|t| t.strip_suffix('/')) {
            Some(p) if !p.is_empty() => Some(p.to_string()),
            _ => return Err("malformed marker line: expected NAME or /REGEX/".to_string()),
        }
    };

    Ok(Marker {
        start,
        end: start + dots,
        name,
        pattern,
    })
}

/// Parse the text after `!`: an action kind and its quoted payload.
///
/// To add a new action, add one entry to [`REGISTRY`] using the action's
/// `NAME` constant and `parse_boxed` function pointer.
fn parse_action(rest: &str) -> Result<Box<dyn Action>, String> {
    let rest = rest.trim_start();
    if rest.trim_end().is_empty() {
        return Err("empty action line".to_string());
    }

    let kind_len = rest
        .find(|c: char| !is_word_char(c))
        .unwrap_or(rest.len());
    let (kind, args) = rest.split_at(kind_len);
    if kind.is_empty() || !args.starts_with(' ') {
        return Err("malformed action line: expected KIND \"TEXT\"".to_string());
    }

    let (_, parse) = REGISTRY
        .iter()
        .find(|(name, _)| *name == kind)
        .ok_or_else(|| format!("invalid channel name: {kind}"))?;
    parse(args).map_err(|e| format!("malformed action line: {e}"))
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Parse a double-quoted string, processing `\n`, `\t`, `\"`, and `\\`.
///
/// Only the outermost quotes delimit the string. Other backslash sequences
/// are kept as written.
pub(crate) fn parse_quoted_string(s: &str) -> Result<String> {
    let s = s.trim();
    if !s.starts_with('"') {
        return Err(anyhow!("Expected string to start with '\"'"));
    }
    if s.len() < 2 || !s.ends_with('"') {
        return Err(anyhow!("Expected string to end with '\"'"));
    }

    let mut out = String::with_capacity(s.len() - 2);
    let mut chars = s[1..s.len() - 1].chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PING_LINE: &str =
        "64 bytes from slashdot.org (216.34.181.45): icmp_seq=3 ttl=230 time=94.4 ms";

    fn ping_config() -> String {
        format!(
            "# report each ping reply\n\
             >{PING_LINE}\n\
             ?{}. seq\n\
             ?{}... ttl\n\
             ?{}.... time\n\
             !controller \"REPLY $seq $ttl $time\"\n",
            " ".repeat(53),
            " ".repeat(59),
            " ".repeat(68),
        )
    }

    fn messages(err: &ConfigError) -> Vec<(usize, String)> {
        err.diagnostics
            .iter()
            .map(|d| (d.line, d.message.clone()))
            .collect()
    }

    #[test]
    fn test_parse_quoted_string() {
        assert_eq!(parse_quoted_string("\"hello\"").unwrap(), "hello");
        assert_eq!(parse_quoted_string("  \"hello world\" ").unwrap(), "hello world");
        assert_eq!(parse_quoted_string("\"hello\\nworld\"").unwrap(), "hello\nworld");
        assert_eq!(parse_quoted_string(r#""a\\n""#).unwrap(), "a\\n");
        assert_eq!(parse_quoted_string(r#""say \"hi\"""#).unwrap(), "say \"hi\"");
        assert!(parse_quoted_string("\"").is_err());
        assert!(parse_quoted_string("\"unclosed").is_err());
        assert!(parse_quoted_string("bare").is_err());
    }

    #[test]
    fn test_parse_marker() {
        assert_eq!(
            parse_marker("   ... ttl").unwrap(),
            Marker {
                start: 3,
                end: 6,
                name: Some("ttl".into()),
                pattern: None
            }
        );
        assert_eq!(
            parse_marker("...").unwrap(),
            Marker {
                start: 0,
                end: 3,
                name: None,
                pattern: None
            }
        );
        let constrained = parse_marker(" .. n /[0-9]+/ ").unwrap();
        assert_eq!(constrained.pattern.as_deref(), Some("[0-9]+"));
        assert!(parse_marker(" name").is_err());
        assert!(parse_marker(" . name /open").is_err());
        assert!(parse_marker(" . two words").is_err());
        assert!(parse_marker("   ").is_err());
    }

    #[test]
    fn test_literal_rule() {
        let rules = parse_str(
            ">Would you like to play a game?\n\
             !terminal \"no\"\n",
        )
        .unwrap();
        assert_eq!(rules.len(), 1);
        let (rule, bindings) = rules
            .first_match("Would you like to play a game? (y/n)")
            .unwrap();
        assert_eq!(rule.action.name(), "terminal");
        assert!(bindings.is_empty());
    }

    #[test]
    fn test_ping_rule_binds_regions() {
        let rules = parse_str(&ping_config()).unwrap();
        let (rule, bindings) = rules.first_match(PING_LINE).unwrap();
        assert_eq!(rule.line, 2);
        assert_eq!(rule.action.name(), "controller");
        assert_eq!(bindings["seq"], "3");
        assert_eq!(bindings["ttl"], "230");
        assert_eq!(bindings["time"], "94.4");

        let next = PING_LINE.replace("seq=3 ttl=230 time=94.4", "seq=4 ttl=231 time=12.1");
        let (_, bindings) = rules.first_match(&next).unwrap();
        assert_eq!(bindings["seq"], "4");
        assert_eq!(bindings["time"], "12.1");

        let other_host = PING_LINE.replace("slashdot", "slashdoT");
        assert!(rules.first_match(&other_host).is_none());
    }

    #[test]
    fn test_unnamed_region_is_wildcard() {
        let rules = parse_str(
            ">Password for ....:\n\
             ?             ....\n\
             !terminal \"hunter2\"\n",
        )
        .unwrap();
        let (_, bindings) = rules.first_match("Password for root:").unwrap();
        assert!(bindings.is_empty());
        assert!(rules.first_match("Password for bob:").is_none());
    }

    #[test]
    fn test_constrained_region() {
        let rules = parse_str(
            ">seq=00\n\
             ?    .. n /[0-9]+/\n\
             !controller \"$n\"\n",
        )
        .unwrap();
        assert!(rules.first_match("seq=42").is_some());
        assert!(rules.first_match("seq=4x").is_none());
    }

    #[test]
    fn test_regex_must_accept_sample() {
        let err = parse_str(
            ">code=000\n\
             ?     ... c /[a-z]+/\n\
             !controller \"$c\"\n",
        )
        .unwrap_err();
        assert_eq!(messages(&err), vec![(2, "regex does not match marker".to_string())]);
    }

    #[test]
    fn test_rules_keep_config_order() {
        let rules = parse_str(
            ">Continue?\n!terminal \"y\"\n\
             \n# second\n\
             >Continue?\n!terminal \"n\"\n",
        )
        .unwrap();
        let lines: Vec<usize> = rules.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![1, 5]);
    }

    #[test]
    fn test_overlapping_markers_fail() {
        let err = parse_str(
            ">abcdef\n\
             ? ...  x\n\
             ?  ... y\n\
             !controller \"$x $y\"\n",
        )
        .unwrap_err();
        let found = messages(&err);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, 3);
        assert!(found[0].1.contains("overlap"), "got: {found:?}");
    }

    #[test]
    fn test_marker_beyond_template_fails() {
        let err = parse_str(">abc\n?  ... x\n!controller \"$x\"\n").unwrap_err();
        assert_eq!(err.diagnostics[0].line, 2);
        assert!(err.diagnostics[0].message.contains("beyond"));
    }

    #[test]
    fn test_duplicate_names_fail() {
        let err = parse_str(">ab\n?. x\n? . x\n!controller \"$x\"\n").unwrap_err();
        assert_eq!(messages(&err), vec![(3, "duplicate variable name: x".to_string())]);
    }

    #[test]
    fn test_unbound_name_fails() {
        let err = parse_str(">ab\n?. x\n!controller \"$x $y\"\n").unwrap_err();
        assert_eq!(messages(&err), vec![(3, "unbound name: y".to_string())]);
    }

    #[test]
    fn test_terminal_payload_ignores_dollar() {
        let rules = parse_str(">prompt$ \n!terminal \"echo $HOME\"\n").unwrap();
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_invalid_regex_fails() {
        let err = parse_str(">ab\n?.. x /[/\n!controller \"$x\"\n").unwrap_err();
        assert_eq!(err.diagnostics.len(), 1);
        assert_eq!(err.diagnostics[0].line, 2);
        assert!(err.diagnostics[0].message.contains("invalid regular expression"));
    }

    #[test]
    fn test_structural_errors() {
        let err = parse_str(
            "?. stray\n\
             !terminal \"orphan\"\n\
             >first\n\
             >second\n\
             !shell \"x\"\n\
             hello\n\
             >\tx\n\
             !terminal \"ok\"\n\
             >dangling\n",
        )
        .unwrap_err();
        let lines: Vec<usize> = err.diagnostics.iter().map(|d| d.line).collect();
        assert_eq!(lines, vec![1, 2, 3, 5, 6, 7, 8, 9]);
        assert!(err.diagnostics[0].message.contains("without a template"));
        assert!(err.diagnostics[1].message.contains("without a template"));
        assert!(err.diagnostics[2].message.contains("missing action line"));
        assert_eq!(err.diagnostics[3].message, "invalid channel name: shell");
        assert_eq!(err.diagnostics[3].directive, "!shell \"x\"");
        assert!(err.diagnostics[4].message.contains("unrecognized"));
        assert!(err.diagnostics[5].message.contains("TAB"));
        assert!(err.diagnostics[7].message.contains("missing action line"));
    }

    #[test]
    fn test_broken_template_line_closes_open_block() {
        let err = parse_str(
            ">first\n!terminal \"a\"\n\
             >second\n\
             >\tbad\n\
             ?. x\n\
             !controller \"$x\"\n",
        )
        .unwrap_err();
        assert_eq!(
            messages(&err),
            vec![
                (3, "missing action line for template".to_string()),
                (4, "TAB character in directive".to_string()),
                (5, "marker line without a template".to_string()),
                (6, "action line without a template".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_directives_fail() {
        let err = parse_str(">x\n?\n!\n").unwrap_err();
        let found = messages(&err);
        assert_eq!(found[0], (2, "empty marker line".to_string()));
        assert_eq!(found[1], (3, "empty action line".to_string()));
    }

    #[test]
    fn test_malformed_action_payload() {
        assert!(parse_str(">x\n!terminal no-quotes\n").is_err());
        assert!(parse_str(">x\n!terminal\"x\"\n").is_err());
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let rules = parse_str("# only\n\n   # indented\n").unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_error_names_source() {
        let err = parse_named("ping.cfg", ">x\n").unwrap_err();
        assert!(err.to_string().starts_with("Error: ping.cfg:1  missing action line"));
    }

    #[test]
    fn test_parse_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, ping_config().as_bytes()).unwrap();
        let rules = parse_file(file.path()).unwrap();
        assert_eq!(rules.len(), 1);
        assert!(rules.uses_controller());
    }

    #[test]
    fn test_parse_file_config_error_downcasts() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"garbage\n").unwrap();
        let err = parse_file(file.path()).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_parse_file_missing() {
        let err = parse_file("/nonexistent/rules.cfg").unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_none());
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
