//! Compiled rules and first-match-wins evaluation.

use crate::action::Action;
use crate::actions::SendToController;
use crate::template::{Bindings, Template};
use std::fmt;

/// A template paired with the action to run when it matches.
pub struct Rule {
    pub template: Template,
    pub action: Box<dyn Action>,
    /// Config line of the rule's `>` directive.
    pub line: usize,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("line", &self.line)
            .field("width", &self.template.width())
            .field("action", &self.action.name())
            .finish()
    }
}

/// Rules in config order. Immutable once compiled.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Whether any rule reports to the controller.
    pub fn uses_controller(&self) -> bool {
        self.rules
            .iter()
            .any(|r| r.action.name() == SendToController::NAME)
    }

    /// Evaluate rules in order against one complete line and return the first
    /// that matches, with its bindings.
    pub fn first_match(&self, line: &str) -> Option<(&Rule, Bindings)> {
        let chars: Vec<char> = line.chars().collect();
        self.rules
            .iter()
            .find_map(|rule| rule.template.match_chars(&chars).map(|b| (rule, b)))
    }
}
