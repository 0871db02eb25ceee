//! Naming policy for object identifiers.
//!
//! Family names have the shape `<prefix><n>` (e.g. `sphere3`). The free
//! functions are pure over names. `NamingFamilies` is the per-program "next
//! index" table the engine threads through every call; it also owns the
//! compiled matcher for each family.

use std::collections::HashMap;

use regex::Regex;

/// Build the `^prefix[0-9]+$` matcher for a family.
fn family_pattern(prefix: &str) -> Option<Regex> {
    Regex::new(&format!("^{}([0-9]+)$", regex::escape(prefix))).ok()
}

fn captured_suffix(pattern: &Regex, name: &str) -> Option<u32> {
    pattern.captures(name)?.get(1)?.as_str().parse().ok()
}

/// Scan n = 1, 2, ... until `prefix + n` is not taken.
pub fn lowest_available_suffix(prefix: &str, mut exists: impl FnMut(&str) -> bool) -> u32 {
    let mut n = 1;
    while exists(&format!("{}{}", prefix, n)) {
        n += 1;
    }
    n
}

/// Next name for a user-chosen identifier.
///
/// A trailing integer is incremented in place (`myStar3` -> `myStar4`);
/// names without one get `1` appended (`myStar` -> `myStar1`).
pub fn increment_custom_name(name: &str) -> String {
    let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
    let digits = &name[stem.len()..];
    if digits.is_empty() {
        return format!("{}1", name);
    }
    match digits.parse::<u64>().ok().and_then(|n| n.checked_add(1)) {
        Some(next) => format!("{}{}", stem, next),
        // Too long to increment; fall back to appending.
        None => format!("{}1", name),
    }
}

/// Per-program table of family prefix -> next index.
///
/// Reset when a program is loaded. After the resolver touches a family,
/// `next_index(prefix) == 1 + max existing suffix`.
#[derive(Debug, Clone, Default)]
pub struct NamingFamilies {
    next: HashMap<String, u32>,
    /// Compiled family matchers; kept across resets.
    patterns: HashMap<String, Regex>,
}

impl NamingFamilies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next index for a family; families never seen start at 1.
    pub fn next_index(&self, prefix: &str) -> u32 {
        self.next.get(prefix).copied().unwrap_or(1)
    }

    pub fn set_next_index(&mut self, prefix: &str, index: u32) {
        self.next.insert(prefix.to_string(), index.max(1));
    }

    /// Bump the next index by one and return the value it had before.
    pub fn take_next(&mut self, prefix: &str) -> u32 {
        let current = self.next_index(prefix);
        self.next.insert(prefix.to_string(), current.saturating_add(1));
        current
    }

    fn pattern(&mut self, prefix: &str) -> Option<&Regex> {
        if !self.patterns.contains_key(prefix) {
            let pattern = family_pattern(prefix)?;
            self.patterns.insert(prefix.to_string(), pattern);
        }
        self.patterns.get(prefix)
    }

    /// Trailing integer of `name` if it is a family name for `prefix`.
    pub fn suffix_of(&mut self, name: &str, prefix: &str) -> Option<u32> {
        captured_suffix(self.pattern(prefix)?, name)
    }

    /// Whether `name` is a routine family name (`prefix` followed by digits only).
    pub fn is_family_name(&mut self, name: &str, prefix: &str) -> bool {
        self.suffix_of(name, prefix).is_some()
    }

    /// Largest suffix among the family names in `names`, or 0 if there are none.
    pub fn max_suffix<'a>(&mut self, prefix: &str, names: impl IntoIterator<Item = &'a str>) -> u32 {
        let Some(pattern) = self.pattern(prefix) else {
            return 0;
        };
        names
            .into_iter()
            .filter_map(|name| captured_suffix(pattern, name))
            .max()
            .unwrap_or(0)
    }

    /// Recompute a family's next index from the names that actually exist.
    pub fn recompute<'a>(&mut self, prefix: &str, names: impl IntoIterator<Item = &'a str>) {
        let max = self.max_suffix(prefix, names);
        self.set_next_index(prefix, max.saturating_add(1));
    }

    /// Forget every family (program load).
    pub fn reset(&mut self) {
        self.next.clear();
    }

    pub fn len(&self) -> usize {
        self.next.len()
    }

    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }
}
