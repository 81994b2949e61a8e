//! Table schemas and fuzzy "did you mean" lookups.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use strsim::levenshtein;

use sqlparser::ast::ObjectName;

use super::types::TypeKind;
use crate::ast::name_key;
use crate::error::{TranslationError, TranslationResult};

/// Column types per table. Names are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// Lower-cased dotted table names, in registration order.
    tables: Vec<String>,
    /// Lower-cased column names with their types, in declaration order.
    columns: HashMap<String, Vec<(String, TypeKind)>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table with typed columns.
    pub fn add_table<I, S>(&mut self, table: &str, cols: I)
    where
        I: IntoIterator<Item = (S, TypeKind)>,
        S: Into<String>,
    {
        let key = table.to_lowercase();
        let cols = cols
            .into_iter()
            .map(|(name, ty)| (name.into().to_lowercase(), ty))
            .collect();
        if !self.tables.contains(&key) {
            self.tables.push(key.clone());
        }
        self.columns.insert(key, cols);
    }

    /// Builder form of [`Schema::add_table`].
    pub fn with_table<I, S>(mut self, table: &str, cols: I) -> Self
    where
        I: IntoIterator<Item = (S, TypeKind)>,
        S: Into<String>,
    {
        self.add_table(table, cols);
        self
    }

    /// Parse `{"table": {"column": "type"}}`. Tables may nest under schema
    /// objects: `{"dex": {"trades": {"amount_usd": "double"}}}`.
    pub fn from_json(text: &str) -> TranslationResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| TranslationError::Config(format!("invalid schema JSON: {}", e)))?;
        let mut schema = Schema::new();
        schema.load_level(&value, "")?;
        Ok(schema)
    }

    /// Read a JSON schema file.
    pub fn from_path(path: impl AsRef<Path>) -> TranslationResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    fn load_level(&mut self, value: &Value, prefix: &str) -> TranslationResult<()> {
        let Value::Object(entries) = value else {
            return Err(TranslationError::Config(format!(
                "expected an object for '{}'",
                prefix
            )));
        };
        let is_table = !entries.is_empty() && entries.values().all(Value::is_string);
        if is_table && !prefix.is_empty() {
            let mut cols = Vec::with_capacity(entries.len());
            for (name, ty) in entries {
                let text = ty.as_str().unwrap_or_default();
                let ty = TypeKind::from_sql(text).ok_or_else(|| {
                    TranslationError::Config(format!(
                        "column '{}.{}': unknown type '{}'",
                        prefix, name, text
                    ))
                })?;
                cols.push((name.clone(), ty));
            }
            self.add_table(prefix, cols);
            return Ok(());
        }
        for (name, nested) in entries {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", prefix, name)
            };
            self.load_level(nested, &path)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_names(&self) -> &[String] {
        &self.tables
    }

    /// Columns of a table. A bare name also matches `schema.name` when only
    /// one registered table ends that way.
    pub fn columns(&self, table: &ObjectName) -> Option<&[(String, TypeKind)]> {
        let key = name_key(table);
        if let Some(cols) = self.columns.get(&key) {
            return Some(cols);
        }
        let suffix = format!(".{}", key);
        let mut found = self.tables.iter().filter(|t| t.ends_with(&suffix));
        match (found.next(), found.next()) {
            (Some(only), None) => self.columns.get(only).map(Vec::as_slice),
            _ => None,
        }
    }

    pub fn column_type(&self, table: &ObjectName, column: &str) -> Option<TypeKind> {
        let column = column.to_lowercase();
        self.columns(table)?
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, ty)| *ty)
    }
}

/// Closest candidate within an edit-distance threshold that grows with the
/// length of the input.
pub fn did_you_mean<'c>(input: &str, candidates: impl IntoIterator<Item = &'c str>) -> Option<String> {
    let threshold = match input.len() {
        0..=2 => 0,
        3..=5 => 2,
        _ => 3,
    };
    let input = input.to_lowercase();
    candidates
        .into_iter()
        .map(|c| (levenshtein(&input, &c.to_lowercase()), c))
        .filter(|(dist, _)| *dist <= threshold)
        .min_by_key(|(dist, _)| *dist)
        .map(|(_, c)| c.to_string())
}
