//! Schema Inference - Deterministic schema detection from a header row
//!
//! Column names are normalized into lower-case identifiers that any SQL
//! backend accepts, then made unique. Types default to text.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Longest column name a backend is asked to create
pub const MAX_COLUMN_LENGTH: usize = 64;

/// Characters given up when a long name is truncated, room for `_<n>`
const TRUNCATION_MARGIN: usize = 5;

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
    static ref DISALLOWED_RUN: Regex = Regex::new(r"[^a-z0-9_]+").unwrap();
}

/// Inferred column type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Text,
    Integer,
    Float,
    Boolean,
}

impl FieldType {
    /// Classify a single sample value. Empty or ambiguous values are text.
    pub fn infer(sample: &str) -> Self {
        let trimmed = sample.trim();
        if trimmed.is_empty() {
            return FieldType::Text;
        }
        if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
            return FieldType::Boolean;
        }
        if trimmed.parse::<i64>().is_ok() {
            return FieldType::Integer;
        }
        if trimmed.parse::<f64>().map(f64::is_finite).unwrap_or(false) {
            return FieldType::Float;
        }
        FieldType::Text
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// Ordered field list; names are unique and at most `MAX_COLUMN_LENGTH` long
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Normalize one raw header value. `index` is the 0-based column position,
/// used to name columns whose header is blank.
pub fn sanitize_header(raw: &str, index: usize) -> String {
    let spaced = WHITESPACE_RUN.replace_all(raw.trim(), "_");
    let lowered = spaced.to_lowercase();
    let cleaned = DISALLOWED_RUN.replace_all(&lowered, "_");
    let trimmed = cleaned.trim_matches('_');

    if trimmed.is_empty() {
        format!("column_{}", index + 1)
    } else if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Schema Builder
pub struct SchemaBuilder {
    max_length: usize,
    typed: bool,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            max_length: MAX_COLUMN_LENGTH,
            typed: false,
        }
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length.max(TRUNCATION_MARGIN + 1);
        self
    }

    /// Infer column types from a sample data row instead of defaulting to text
    pub fn with_typed(mut self, typed: bool) -> Self {
        self.typed = typed;
        self
    }

    pub fn build(&self, header: &[String], sample: Option<&[String]>) -> Schema {
        let sanitized = header
            .iter()
            .enumerate()
            .map(|(i, raw)| sanitize_header(raw, i))
            .collect();
        let names = self.deduplicate(self.truncate(sanitized));

        let fields = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let field_type = match sample {
                    Some(row) if self.typed => row.get(i).map(|v| FieldType::infer(v)).unwrap_or_default(),
                    _ => FieldType::Text,
                };
                Field { name, field_type }
            })
            .collect();

        Schema { fields }
    }

    /// Long names are grouped by their first `max_length - 5` characters and
    /// become that prefix plus `_<n>`, where `n` counts earlier columns in the
    /// group. Wide suffixes eat into the prefix so the bound always holds.
    fn truncate(&self, names: Vec<String>) -> Vec<String> {
        let keep = self.max_length - TRUNCATION_MARGIN;
        let mut prefix_counts: HashMap<String, usize> = HashMap::new();

        names
            .into_iter()
            .map(|name| {
                if name.len() <= self.max_length {
                    return name;
                }
                let prefix = name[..keep].to_string();
                let seen = prefix_counts.entry(prefix.clone()).or_insert(0);
                let truncated = self.with_suffix(&prefix, *seen);
                *seen += 1;
                truncated
            })
            .collect()
    }

    /// First occurrence keeps its name, later ones get `_1`, `_2`, ...
    fn deduplicate(&self, names: Vec<String>) -> Vec<String> {
        let mut taken: HashSet<String> = names.iter().cloned().collect();
        let mut emitted: HashSet<String> = HashSet::new();
        let mut group_counts: HashMap<String, usize> = HashMap::new();
        let mut out = Vec::with_capacity(names.len());

        for name in names {
            if emitted.insert(name.clone()) {
                out.push(name);
                continue;
            }
            let count = group_counts.entry(name.clone()).or_insert(0);
            let candidate = loop {
                *count += 1;
                let candidate = self.with_suffix(&name, *count);
                if !taken.contains(&candidate) {
                    break candidate;
                }
            };
            taken.insert(candidate.clone());
            emitted.insert(candidate.clone());
            out.push(candidate);
        }

        out
    }

    fn with_suffix(&self, base: &str, n: usize) -> String {
        let suffix = format!("_{}", n);
        let room = self.max_length.saturating_sub(suffix.len());
        // Sanitized names are ASCII, byte slicing is safe
        let base = if base.len() > room { &base[..room] } else { base };
        format!("{}{}", base, suffix)
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}
