//! Struct binding: hydrate any `Deserialize` target from a configuration
//! tree.
//!
//! Precedence runs in three tiers, lowest first: the target's own field
//! defaults (`#[serde(default)]` or `Option`), the caller-supplied default
//! value, and the live configuration. A field absent from every layer is
//! simply not fed to the target, which is how the lowest tier survives.
//! Field naming follows serde attributes, so `rename` and `rename_all`
//! stand in for tag namespaces.

mod de;

use serde::Serialize;
use serde::de::DeserializeOwned;
use uncased::UncasedStr;

use crate::error::Result;
use crate::value::{Value, to_value};

/// Options controlling a single bind call.
///
/// The builder is consumed by value so options chain:
///
/// ```
/// use confmap::BindOptions;
///
/// let options = BindOptions::new()
///     .deep_merge(true)
///     .ignore_case(true)
///     .required(["host"])
///     .error_on_missing(true);
/// # let _ = options;
/// ```
#[derive(Clone, Debug, Default)]
pub struct BindOptions {
    pub(crate) default: Option<Value>,
    pub(crate) use_defaults: bool,
    pub(crate) deep_merge: bool,
    pub(crate) error_on_missing: bool,
    pub(crate) required: Vec<String>,
    pub(crate) ignore_case: bool,
}

impl BindOptions {
    /// Start from the lenient defaults: no fallback layer, no deep merge,
    /// conversion failures fall back silently.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply a fallback layer by flattening any serializable value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Bind`] when the value cannot be represented
    /// as a configuration tree.
    pub fn default_value<T: Serialize>(mut self, value: &T) -> Result<Self> {
        self.default = Some(to_value(value)?);
        self.use_defaults = true;
        Ok(self)
    }

    /// Supply an already-built tree as the fallback layer.
    #[must_use]
    pub fn default_tree(mut self, value: Value) -> Self {
        self.default = Some(value);
        self.use_defaults = true;
        self
    }

    /// Bind from an empty tree instead of failing when the requested data
    /// is entirely absent.
    #[must_use]
    pub fn use_defaults(mut self, enabled: bool) -> Self {
        self.use_defaults = enabled;
        self
    }

    /// Merge the fallback layer under the live data field by field instead
    /// of consulting it only when a whole subtree is absent.
    #[must_use]
    pub fn deep_merge(mut self, enabled: bool) -> Self {
        self.deep_merge = enabled;
        self
    }

    /// Strict mode: conversion failures and missing required fields become
    /// errors instead of falling back.
    #[must_use]
    pub fn error_on_missing(mut self, enabled: bool) -> Self {
        self.error_on_missing = enabled;
        self
    }

    /// Field names that must be present in the data. Only enforced under
    /// [`BindOptions::error_on_missing`].
    #[must_use]
    pub fn required<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Match field names case-insensitively against data keys.
    #[must_use]
    pub fn ignore_case(mut self, enabled: bool) -> Self {
        self.ignore_case = enabled;
        self
    }

    pub(crate) fn is_required(&self, field: &str) -> bool {
        self.required.iter().any(|key| {
            if self.ignore_case {
                UncasedStr::new(key) == UncasedStr::new(field)
            } else {
                key == field
            }
        })
    }
}

/// Bind `live` (and the options' fallback layer) into a fresh `T`.
///
/// # Errors
///
/// Lenient binds fail only for structurally impossible targets; strict
/// binds propagate conversion and required-field errors.
pub fn bind_value<T: DeserializeOwned>(live: Option<&Value>, options: &BindOptions) -> Result<T> {
    T::deserialize(de::Binder::new(live, options.default.as_ref(), options))
}

/// Bind a value into `T` with the lenient defaults and no fallback layer.
///
/// # Errors
///
/// Propagates [`crate::Error::Bind`] for targets the value cannot shape.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T> {
    bind_value(Some(value), &BindOptions::new())
}
