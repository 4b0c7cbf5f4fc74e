//! Column templates: a sample output line with variable regions.
//!
//! A template is a literal line of width `W`. Columns covered by a
//! [`VariableRegion`] may hold anything (optionally restricted by a regex);
//! every other column must match the observed line exactly. A line matches
//! when it is at least `W` characters wide and all literal columns agree;
//! characters past `W` are ignored.
//!
//! Columns count Unicode scalar values, which keeps marker lines aligned with
//! the sample as it appears in an editor. For ASCII output this is the same as
//! a byte-for-byte comparison.

use crate::error::RegionError;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Values captured by the named regions of one successful match.
pub type Bindings = HashMap<String, String>;

/// A half-open column interval `[start, end)` whose content is not compared.
#[derive(Debug, Clone)]
pub struct VariableRegion {
    pub start: usize,
    pub end: usize,
    pub name: Option<String>,
    constraint: Option<Regex>,
}

impl VariableRegion {
    /// An anonymous region covering `[start, end)`.
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            name: None,
            constraint: None,
        }
    }

    /// Bind the region's content to `name` on match.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Require the region's content to match `pattern` in full.
    pub fn constrained(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.constraint = Some(Regex::new(&format!("^(?:{pattern})$"))?);
        Ok(self)
    }

    fn accepts(&self, value: &str) -> bool {
        self.constraint.as_ref().is_none_or(|re| re.is_match(value))
    }
}

/// A compiled single-line template.
#[derive(Debug, Clone)]
pub struct Template {
    text: Vec<char>,
    regions: Vec<VariableRegion>,
}

impl Template {
    /// Build a template from its sample line and regions.
    ///
    /// Regions may be given in any order. On error, the returned index points
    /// at the offending region in the caller's order.
    pub fn new(text: &str, regions: Vec<VariableRegion>) -> Result<Self, (usize, RegionError)> {
        let text: Vec<char> = text.chars().collect();
        let width = text.len();

        let mut seen = HashSet::new();
        for (index, region) in regions.iter().enumerate() {
            if region.start >= region.end {
                return Err((index, RegionError::Empty));
            }
            if region.end > width {
                return Err((
                    index,
                    RegionError::OutOfBounds {
                        end: region.end,
                        width,
                    },
                ));
            }
            let sample: String = text[region.start..region.end].iter().collect();
            if !region.accepts(&sample) {
                return Err((index, RegionError::SampleRejected));
            }
            if let Some(name) = &region.name {
                if !seen.insert(name.as_str()) {
                    return Err((index, RegionError::DuplicateName(name.clone())));
                }
            }
        }

        let mut order: Vec<usize> = (0..regions.len()).collect();
        order.sort_by_key(|&i| (regions[i].start, i));
        for pair in order.windows(2) {
            let (prev, next) = (&regions[pair[0]], &regions[pair[1]]);
            if next.start < prev.end {
                let later = pair[0].max(pair[1]);
                return Err((later, RegionError::Overlap { column: next.start }));
            }
        }

        let mut regions = regions;
        regions.sort_by_key(|r| r.start);
        Ok(Self { text, regions })
    }

    /// A template with no variable regions.
    pub fn literal(text: &str) -> Self {
        Self {
            text: text.chars().collect(),
            regions: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.text.len()
    }

    pub fn regions(&self) -> &[VariableRegion] {
        &self.regions
    }

    /// Names bound by this template's regions.
    pub fn bound_names(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().filter_map(|r| r.name.as_deref())
    }

    /// Match one complete output line.
    pub fn match_line(&self, line: &str) -> Option<Bindings> {
        let chars: Vec<char> = line.chars().collect();
        self.match_chars(&chars)
    }

    pub(crate) fn match_chars(&self, line: &[char]) -> Option<Bindings> {
        if line.len() < self.width() {
            return None;
        }

        let mut bindings = Bindings::new();
        let mut column = 0;
        for region in &self.regions {
            if self.text[column..region.start] != line[column..region.start] {
                return None;
            }
            let value: String = line[region.start..region.end].iter().collect();
            if !region.accepts(&value) {
                return None;
            }
            if let Some(name) = &region.name {
                bindings.insert(name.clone(), value);
            }
            column = region.end;
        }

        if self.text[column..] != line[column..self.width()] {
            return None;
        }
        Some(bindings)
    }
}
