//! RRULE tokenization.
//!
//! Splits a raw RRULE value such as `FREQ=WEEKLY;BYDAY=TH;UNTIL=20170817T113631Z`
//! into a mapping of rule-part name to value. `BY*` parts keep their raw value
//! and are additionally split on `,` into a list. Unknown part names are
//! retained but never rejected, so feeds using newer rule parts keep parsing;
//! the recurrence mapper simply ignores what it does not understand.

use std::collections::HashMap;

use crate::error::RRuleError;

/// An RRULE decomposed into its rule parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRRule {
    parts: HashMap<String, String>,
    lists: HashMap<String, Vec<String>>,
}

impl ParsedRRule {
    /// Tokenize an RRULE value.
    ///
    /// Fails only when `FREQ` is absent, since every downstream rule requires
    /// a cadence. Segments without `=` are skipped.
    pub fn parse(text: &str) -> Result<Self, RRuleError> {
        let mut rule = ParsedRRule::default();

        for segment in text.split(';') {
            let Some((name, value)) = segment.split_once('=') else {
                continue;
            };
            let name = name.trim().to_uppercase();
            if name.is_empty() {
                continue;
            }
            if name.starts_with("BY") {
                let values = value.split(',').map(str::to_string).collect();
                rule.lists.insert(name.clone(), values);
            }
            rule.parts.insert(name, value.to_string());
        }

        if !rule.parts.contains_key("FREQ") {
            return Err(RRuleError(text.to_string()));
        }

        Ok(rule)
    }

    /// Raw value of a rule part, e.g. `part("UNTIL")`.
    pub fn part(&self, name: &str) -> Option<&str> {
        self.parts.get(name).map(String::as_str)
    }

    /// Comma-split values of a `BY*` part. `None` when the part is absent.
    pub fn by_list(&self, name: &str) -> Option<&[String]> {
        self.lists.get(name).map(Vec::as_slice)
    }

    /// The raw FREQ value. Present by construction.
    pub fn freq(&self) -> &str {
        self.part("FREQ").unwrap_or_default()
    }

    /// True when any consumable `BY*` part carries at least one non-empty
    /// value. Time-granular parts (BYSECOND, BYMINUTE, BYHOUR) and unknown
    /// future parts never influence the mapped shape.
    pub fn has_by_parts(&self) -> bool {
        const CONSUMED: [&str; 6] = [
            "BYDAY",
            "BYMONTHDAY",
            "BYYEARDAY",
            "BYWEEKNO",
            "BYMONTH",
            "BYSETPOS",
        ];
        CONSUMED.iter().any(|name| {
            self.lists
                .get(*name)
                .is_some_and(|values| values.iter().any(|v| !v.is_empty()))
        })
    }
}
