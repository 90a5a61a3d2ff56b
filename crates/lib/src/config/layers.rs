//! Layered key resolution.
//!
//! Every configurable value is looked up through an ordered list of TOML
//! tables. The first table that defines a key wins; later tables only supply
//! values the earlier ones leave out. Module fields, meta fields and
//! inherited submodule meta all go through the same resolver.

use serde::de::DeserializeOwned;
use toml::{Table, Value};

use super::error::ConfigError;

/// An ordered, first-wins stack of configuration tables.
#[derive(Debug, Clone, Default)]
pub struct Layers<'a> {
  tables: Vec<&'a Table>,
  skip_empty: bool,
}

impl<'a> Layers<'a> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Push a table below every table already added.
  pub fn with(mut self, table: &'a Table) -> Self {
    self.tables.push(table);
    self
  }

  /// Push a table only when present.
  pub fn with_opt(self, table: Option<&'a Table>) -> Self {
    match table {
      Some(table) => self.with(table),
      None => self,
    }
  }

  /// Treat empty strings and empty arrays as unset, so a lower layer fills them.
  pub fn skip_empty(mut self) -> Self {
    self.skip_empty = true;
    self
  }

  /// Find the raw value for a (possibly dotted) key.
  pub fn lookup(&self, key: &str) -> Option<&'a Value> {
    self
      .tables
      .iter()
      .filter_map(|table| lookup_path(table, key))
      .find(|value| !(self.skip_empty && is_empty(value)))
  }

  /// Resolve a key and deserialize it.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
    let Some(value) = self.lookup(key) else {
      return Ok(None);
    };
    let parsed: T = value.clone().try_into().map_err(|e| ConfigError::InvalidValue {
      key: key.to_string(),
      message: e.to_string(),
    })?;
    Ok(Some(parsed))
  }

  /// Resolve a key that has no default anywhere in the stack.
  pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
    self.get(key)?.ok_or_else(|| ConfigError::MissingKey(key.to_string()))
  }

  /// Resolve a key, falling back to `default` when no layer defines it.
  pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, ConfigError> {
    Ok(self.get(key)?.unwrap_or(default))
  }

  /// Flatten the stack into one table of top-level keys.
  pub fn merged(&self) -> Table {
    let mut merged = Table::new();
    for table in self.tables.iter().rev() {
      for (key, value) in table.iter() {
        if self.skip_empty && is_empty(value) {
          continue;
        }
        merged.insert(key.clone(), value.clone());
      }
    }
    merged
  }
}

fn lookup_path<'v>(table: &'v Table, key: &str) -> Option<&'v Value> {
  let mut parts = key.split('.');
  let first = parts.next()?;
  let mut current = table.get(first)?;
  for part in parts {
    current = current.as_table()?.get(part)?;
  }
  Some(current)
}

fn is_empty(value: &Value) -> bool {
  match value {
    Value::String(s) => s.is_empty(),
    Value::Array(a) => a.is_empty(),
    _ => false,
  }
}

/// Build a table from literal key/value pairs.
pub(crate) fn table_of<I, V>(entries: I) -> Table
where
  I: IntoIterator<Item = (&'static str, V)>,
  V: Into<Value>,
{
  entries.into_iter().map(|(k, v)| (k.to_string(), v.into())).collect()
}

pub(crate) fn string_array(items: &[&str]) -> Value {
  Value::Array(items.iter().map(|s| Value::String(s.to_string())).collect())
}
