//! Placeholder guard for `{{ name }}` query parameters.
//!
//! Parameters are not SQL, so they are swapped for plain identifiers before
//! parsing and swapped back after printing. A guard looks like
//! `__param_start_time__`: lower case, so case folding leaves it alone, and
//! made only of identifier characters, so the generator never needs to quote
//! it.

use std::sync::LazyLock;

use regex::Regex;

static PARAMETER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{.*?\}\}").expect("valid parameter pattern"));

const PREFIX: &str = "__param_";
const SUFFIX: &str = "__";

/// Bijection between guards and the original `{{ ... }}` tokens of one query.
#[derive(Debug, Clone, Default)]
pub struct ParameterMap {
    /// `(guard, token)` in first-appearance order.
    entries: Vec<(String, String)>,
}

impl ParameterMap {
    /// Collect every parameter token in `query`. Repeated tokens share a guard.
    pub fn extract(query: &str) -> Self {
        let mut map = ParameterMap::default();
        for m in PARAMETER.find_iter(query) {
            let token = m.as_str();
            if map.entries.iter().any(|(_, t)| t == token) {
                continue;
            }
            let guard = map.unique_guard(&normalize(token));
            map.entries.push((guard, token.to_string()));
        }
        map
    }

    fn unique_guard(&self, base: &str) -> String {
        let mut guard = format!("{}{}{}", PREFIX, base, SUFFIX);
        let mut n = 2;
        while self.entries.iter().any(|(g, _)| *g == guard) {
            guard = format!("{}{}_{}{}", PREFIX, base, n, SUFFIX);
            n += 1;
        }
        guard
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Replace every token with its guard.
    pub fn protect(&self, query: &str) -> String {
        if self.entries.is_empty() {
            return query.to_string();
        }
        PARAMETER
            .replace_all(query, |caps: &regex::Captures| {
                let token = &caps[0];
                self.entries
                    .iter()
                    .find(|(_, t)| t == token)
                    .map(|(g, _)| g.clone())
                    .unwrap_or_else(|| token.to_string())
            })
            .into_owned()
    }

    /// Replace every surviving guard with its token, longest guard first so
    /// `__param_a_2__` is never mistaken for `__param_a__`.
    ///
    /// Works on generated SQL and on error messages alike.
    pub fn restore(&self, text: &str) -> String {
        let mut ordered: Vec<&(String, String)> = self.entries.iter().collect();
        ordered.sort_by_key(|(g, _)| std::cmp::Reverse(g.len()));
        let mut out = text.to_string();
        for (guard, token) in ordered {
            out = out.replace(guard.as_str(), token);
        }
        out
    }

    /// True when `name` is one of this query's guards.
    pub fn is_guard(&self, name: &str) -> bool {
        self.entries.iter().any(|(g, _)| g.eq_ignore_ascii_case(name))
    }

    /// Parameter name behind a guard, trimmed of braces and spaces.
    pub fn parameter_name(&self, guard: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(g, _)| g.eq_ignore_ascii_case(guard))
            .map(|(_, t)| t.trim_start_matches("{{").trim_end_matches("}}").trim())
    }
}

/// `{{ Start Time }}` -> `start_time`
fn normalize(token: &str) -> String {
    let inner = token.trim_start_matches("{{").trim_end_matches("}}").trim();
    let mut out = String::with_capacity(inner.len());
    for c in inner.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let out = out.trim_matches('_').to_string();
    if out.is_empty() { "p".to_string() } else { out }
}
