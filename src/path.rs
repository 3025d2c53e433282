//! Dotted key-path traversal over a configuration tree.
//!
//! A path like `database.pool.max` names one segment per nesting level.
//! Lookup never allocates; writes create missing intermediate tables and
//! overwrite non-table intermediates outright, so a write is always
//! structurally possible.

use crate::value::{Table, Value};

/// Separator between path segments.
pub const DELIMITER: char = '.';

/// Resolve `path` against `table`, descending one table per segment.
///
/// Returns `None` when a segment is absent or a non-final segment resolves
/// to anything other than a table.
#[must_use]
pub fn get<'a>(table: &'a Table, path: &str) -> Option<&'a Value> {
    let mut current = table;
    let mut segments = path.split(DELIMITER).peekable();
    while let Some(segment) = segments.next() {
        let value = current.get(segment)?;
        if segments.peek().is_none() {
            return Some(value);
        }
        current = value.as_table()?;
    }
    None
}

/// Write `value` at `path`, creating intermediate tables as needed.
///
/// A non-table value sitting where an intermediate table is needed is
/// replaced by a fresh table; the write never fails.
pub fn set(table: &mut Table, path: &str, value: Value) {
    let mut current = table;
    let mut segments = path.split(DELIMITER).peekable();
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_owned(), value);
            return;
        }
        let slot = current
            .entry(segment.to_owned())
            .or_insert_with(Value::empty_table);
        if !slot.is_table() {
            *slot = Value::empty_table();
        }
        // The slot was just forced to a table.
        current = slot.as_table_mut().unwrap();
    }
}

/// Enumerate every path in the tree, dotted and in pre-order.
///
/// Intermediate table nodes appear alongside their descendants, so every
/// path [`get`] can resolve is listed.
#[must_use]
pub fn keys(table: &Table) -> Vec<String> {
    let mut out = Vec::new();
    collect_keys(table, "", &mut out);
    out
}

fn collect_keys(table: &Table, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}{DELIMITER}{key}")
        };
        out.push(path.clone());
        if let Value::Table(nested) = value {
            collect_keys(nested, &path, out);
        }
    }
}
