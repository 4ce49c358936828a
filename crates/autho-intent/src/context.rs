//! Variable context and template resolution.
//!
//! A [`VariableContext`] maps names to JSON values.  Steps write their
//! results into it and later steps read them back through `{{name}}`
//! placeholders.  Dotted paths reach into nested values:
//! `{{response.body.items.0}}`.
//!
//! Resolution rules:
//!
//! - A string that is exactly one placeholder is replaced by the referenced
//!   value with its type intact (list stays list, number stays number).
//! - Placeholders embedded in other text are replaced by the value's string
//!   form: strings verbatim, anything else as compact JSON.
//! - Unknown names are left as the literal placeholder text.
//! - Lists and mappings are resolved element by element.

use std::collections::HashMap;
use std::sync::LazyLock;

use autho_kernel::display_value;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*(\w+(?:\.\w+)*)\s*\}\}").expect("valid placeholder regex"));

/// Mutable name-to-value store owned by one workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableContext {
    vars: HashMap<String, Value>,
}

impl VariableContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.vars.insert(name.into(), value)
    }

    /// Get a top-level variable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Remove a variable.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }

    /// Whether a top-level variable exists.
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Look up a dotted path such as `user.emails.0`.
    ///
    /// Numeric segments index into lists; other segments index into
    /// mappings.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.vars.get(segments.next()?)?;
        for segment in segments {
            current = step_into(current, segment)?;
        }
        Some(current)
    }

    /// Merge entries from another mapping, overwriting existing names.
    pub fn extend<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.vars.extend(entries);
    }

    /// Remove every variable.
    pub fn clear(&mut self) {
        self.vars.clear();
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate over all variables.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }

    /// Snapshot the context as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    // -- Template resolution ------------------------------------------------

    /// Resolve every placeholder inside `value`.
    pub fn resolve(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => self.resolve_str(s),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.resolve(v)).collect()),
            Value::Object(map) => Value::Object(self.resolve_map(map)),
            other => other.clone(),
        }
    }

    /// Resolve every value of a parameter mapping.
    pub fn resolve_map(&self, map: &Map<String, Value>) -> Map<String, Value> {
        map.iter()
            .map(|(k, v)| (k.clone(), self.resolve(v)))
            .collect()
    }

    fn resolve_str(&self, s: &str) -> Value {
        if let Some(caps) = PLACEHOLDER.captures(s)
            && caps.get(0).is_some_and(|m| m.start() == 0 && m.end() == s.len())
        {
            return match self.lookup(&caps[1]) {
                Some(found) => found.clone(),
                None => Value::String(s.to_string()),
            };
        }

        let replaced = PLACEHOLDER.replace_all(s, |caps: &Captures<'_>| match self.lookup(&caps[1]) {
            Some(found) => display_value(found),
            None => caps[0].to_string(),
        });
        Value::String(replaced.into_owned())
    }
}

fn step_into<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

impl FromIterator<(String, Value)> for VariableContext {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
