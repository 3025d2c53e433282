//! Error types for configuration access, conversion, and binding.

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while reading, converting, or binding configuration.
///
/// The simple typed getters on [`crate::Config`] never surface these: they
/// fall back to a caller-supplied default or the type's zero value. The
/// options-based getters and the binding engine propagate them, because those
/// entry points opt into strictness.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Generic configuration failure.
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable description of the failure.
        message: String,
    },

    /// A validator rejected the tree or a single value.
    #[error("validation failed for '{key}': {message}")]
    Validation {
        /// Key that failed validation.
        key: String,
        /// Explanation supplied by the validator.
        message: String,
    },

    /// A value could not be coerced into the requested type.
    #[error("cannot convert to {target}: {message}")]
    Conversion {
        /// Name of the requested target type.
        target: &'static str,
        /// Explanation of the coercion failure.
        message: String,
    },

    /// Struct binding failed.
    #[error("binding failed: {message}")]
    Bind {
        /// Explanation of the binding failure.
        message: String,
    },

    /// No configuration was found at the requested key.
    #[error("no configuration found for key '{key}'")]
    Missing {
        /// The dotted path that resolved to nothing.
        key: String,
    },

    /// A key marked required was absent.
    #[error("required key '{key}' not found")]
    Required {
        /// The missing required key or field name.
        key: String,
    },

    /// A configuration source failed to produce a tree.
    #[error("source '{name}' failed: {message}")]
    Source {
        /// Name of the failing source.
        name: String,
        /// Explanation reported by the source.
        message: String,
    },

    /// A value shape the engine cannot represent or traverse.
    #[error("unsupported type: {type_name}")]
    Unsupported {
        /// Name of the offending type.
        type_name: String,
    },
}

impl Error {
    /// Construct a generic configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Construct a validation error for `key`.
    pub fn validation(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Construct a conversion error toward `target`.
    pub fn conversion(target: &'static str, message: impl Into<String>) -> Self {
        Self::Conversion {
            target,
            message: message.into(),
        }
    }

    /// Construct a binding error.
    pub fn bind(message: impl Into<String>) -> Self {
        Self::Bind {
            message: message.into(),
        }
    }

    /// Construct a missing-key error.
    pub fn missing(key: impl Into<String>) -> Self {
        Self::Missing { key: key.into() }
    }

    /// Construct a required-key error.
    pub fn required(key: impl Into<String>) -> Self {
        Self::Required { key: key.into() }
    }

    /// Construct a source error.
    pub fn source(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Construct an unsupported-type error.
    pub fn unsupported(type_name: impl Into<String>) -> Self {
        Self::Unsupported {
            type_name: type_name.into(),
        }
    }
}

impl serde::de::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Bind {
            message: msg.to_string(),
        }
    }
}

impl serde::ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Bind {
            message: msg.to_string(),
        }
    }
}
