//! Options-based reads: the strict counterpart to the silent typed getters.
//!
//! A plain getter swallows problems and hands back a zero value. Reads
//! through [`GetOptions`] instead report them: a required key that is
//! absent, a validator that rejects the value, a conversion that fails.

use crate::convert::FromValue;
use crate::error::{Error, Result};
use crate::value::Value;

type TransformFn<T> = Box<dyn Fn(T) -> T + Send + Sync>;
type ValidateFn<T> = Box<dyn Fn(&T) -> std::result::Result<(), String> + Send + Sync>;
type OnMissingFn = Box<dyn Fn(&str) -> Option<Value> + Send + Sync>;

/// Options for a single strict read, consumed by
/// [`crate::Config::get_with`].
///
/// Resolution order: a missing key first trips the required check, then the
/// on-missing callback may supply a substitute value, then the default is
/// returned as-is. Present (or substituted) values are converted,
/// transformed, and validated in that order; the default bypasses
/// transformation and validation because the caller already chose it.
pub struct GetOptions<T> {
    required: bool,
    default: Option<T>,
    transform: Option<TransformFn<T>>,
    validate: Option<ValidateFn<T>>,
    on_missing: Option<OnMissingFn>,
}

impl<T> Default for GetOptions<T> {
    fn default() -> Self {
        Self {
            required: false,
            default: None,
            transform: None,
            validate: None,
            on_missing: None,
        }
    }
}

impl<T: FromValue> GetOptions<T> {
    /// Start with no constraints: missing keys resolve to `None`.
    #[must_use]
    pub fn new() -> Self {
        // `Self::default()` would resolve to the builder method below.
        <Self as Default>::default()
    }

    /// Fail with [`Error::Required`] when the key is absent.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Value to return when the key is absent.
    #[must_use]
    pub fn default(mut self, value: T) -> Self {
        self.default = Some(value);
        self
    }

    /// Rewrite the converted value before validation.
    #[must_use]
    pub fn transform(mut self, f: impl Fn(T) -> T + Send + Sync + 'static) -> Self {
        self.transform = Some(Box::new(f));
        self
    }

    /// Reject values; the message becomes [`Error::Validation`].
    #[must_use]
    pub fn validate(
        mut self,
        f: impl Fn(&T) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validate = Some(Box::new(f));
        self
    }

    /// Called when the key is absent; a returned value substitutes for the
    /// missing one and flows through transform and validation.
    #[must_use]
    pub fn on_missing(mut self, f: impl Fn(&str) -> Option<Value> + Send + Sync + 'static) -> Self {
        self.on_missing = Some(Box::new(f));
        self
    }

    pub(crate) fn resolve(self, key: &str, found: Option<&Value>) -> Result<Option<T>> {
        let substituted;
        let value = match found.filter(|v| !v.is_null()) {
            Some(value) => value,
            None => {
                if self.required {
                    return Err(Error::required(key));
                }
                match self.on_missing.as_ref().and_then(|f| f(key)) {
                    Some(supplied) => {
                        substituted = supplied;
                        &substituted
                    }
                    None => return Ok(self.default),
                }
            }
        };
        let mut converted = T::from_value(value)?;
        if let Some(transform) = &self.transform {
            converted = transform(converted);
        }
        if let Some(validate) = &self.validate {
            validate(&converted).map_err(|message| Error::validation(key, message))?;
        }
        Ok(Some(converted))
    }
}
