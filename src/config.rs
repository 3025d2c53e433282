//! The configuration accessor: a shared, thread-safe tree with typed reads,
//! struct binding, source loading, and change notification.
//!
//! A [`Config`] is a cheap handle over shared state. [`Config::sub`]
//! produces a handle scoped to a subtree that stays live with its parent;
//! [`Config::deep_clone`] produces a fully independent copy. Simple typed
//! getters never fail: a missing key or failed coercion yields the zero
//! value (or the caller's default), while [`Config::get_with`] and the
//! binding entry points report errors.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::bind::{self, BindOptions};
use crate::convert::{self, FromValue};
use crate::error::{Error, Result};
use crate::merge;
use crate::options::GetOptions;
use crate::path;
use crate::source::{ChangeEvent, ChangeKind, Source, Validate, ValidationMode};
use crate::value::{Table, Value};

type WatchCallback = dyn Fn(String, Option<Value>) + Send + Sync;
type ChangeCallback = dyn Fn(ChangeEvent) + Send + Sync;

/// Source name reported for direct writes.
const MANAGER: &str = "manager";

#[derive(Default)]
struct Observers {
    watch: BTreeMap<String, Vec<Arc<WatchCallback>>>,
    change: Vec<Arc<ChangeCallback>>,
}

struct Shared {
    data: RwLock<Table>,
    observers: Mutex<Observers>,
    sources: Mutex<Vec<Box<dyn Source>>>,
    validators: Mutex<Vec<Box<dyn Validate>>>,
    validation_mode: ValidationMode,
}

/// Thread-safe configuration accessor.
///
/// Cloning the handle shares the underlying tree, observers, and sources;
/// use [`Config::deep_clone`] for an independent copy.
#[derive(Clone)]
pub struct Config {
    shared: Arc<Shared>,
    scope: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// An empty configuration with lenient validation.
    #[must_use]
    pub fn new() -> Self {
        Self::with_validation_mode(ValidationMode::Lenient)
    }

    /// An empty configuration with the given validation mode. Strict mode
    /// rolls back source-driven updates that fail validation.
    #[must_use]
    pub fn with_validation_mode(mode: ValidationMode) -> Self {
        Self {
            shared: Arc::new(Shared {
                data: RwLock::new(Table::new()),
                observers: Mutex::new(Observers::default()),
                sources: Mutex::new(Vec::new()),
                validators: Mutex::new(Vec::new()),
                validation_mode: mode,
            }),
            scope: String::new(),
        }
    }

    /// A configuration seeded from an existing tree.
    #[must_use]
    pub fn from_table(data: Table) -> Self {
        let config = Self::new();
        *config.write_data() = data;
        config
    }

    // Lock poisoning only means another thread panicked mid-operation; the
    // tree itself is still structurally sound, so reads continue.
    fn read_data(&self) -> RwLockReadGuard<'_, Table> {
        self.shared.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_data(&self) -> RwLockWriteGuard<'_, Table> {
        self.shared
            .data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn observers(&self) -> MutexGuard<'_, Observers> {
        self.shared
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn scoped(&self, key: &str) -> String {
        match (self.scope.is_empty(), key.is_empty()) {
            (true, _) => key.to_owned(),
            (false, true) => self.scope.clone(),
            (false, false) => format!("{}{}{key}", self.scope, path::DELIMITER),
        }
    }

    /// The subtree this handle is scoped to, cloned.
    fn scoped_table(&self) -> Table {
        let data = self.read_data();
        if self.scope.is_empty() {
            data.clone()
        } else {
            path::get(&data, &self.scope)
                .and_then(Value::as_table)
                .cloned()
                .unwrap_or_default()
        }
    }

    /// Read the value at `key`, cloned. Stored nulls count as absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let data = self.read_data();
        let full = self.scoped(key);
        if full.is_empty() {
            return Some(Value::Table(data.clone()));
        }
        path::get(&data, &full).filter(|v| !v.is_null()).cloned()
    }

    /// Read and convert, reporting failures.
    ///
    /// # Errors
    ///
    /// [`Error::Missing`] when the key is absent, or a conversion error.
    pub fn get_as<T: FromValue>(&self, key: &str) -> Result<T> {
        let value = self.get(key).ok_or_else(|| Error::missing(key))?;
        T::from_value(&value)
    }

    /// Read and convert, falling back to `default` on any failure.
    pub fn get_or<T: FromValue>(&self, key: &str, default: T) -> T {
        self.get_as(key).unwrap_or(default)
    }

    fn get_silently<T: FromValue + Default>(&self, key: &str) -> T {
        match self.get_as(key) {
            Ok(value) => value,
            Err(Error::Missing { .. }) => T::default(),
            Err(err) => {
                tracing::debug!(key, %err, "typed getter fell back to the zero value");
                T::default()
            }
        }
    }

    /// The string at `key`, or `""`.
    #[must_use]
    pub fn get_string(&self, key: &str) -> String {
        self.get_silently(key)
    }

    /// The string at `key`, or `default`.
    #[must_use]
    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get(key)
            .map_or_else(|| default.to_owned(), |v| convert::to_string_lossy(&v))
    }

    /// The integer at `key`, or `0`.
    #[must_use]
    pub fn get_i64(&self, key: &str) -> i64 {
        self.get_silently(key)
    }

    /// The unsigned integer at `key`, or `0`.
    #[must_use]
    pub fn get_u64(&self, key: &str) -> u64 {
        self.get_silently(key)
    }

    /// The float at `key`, or `0.0`.
    #[must_use]
    pub fn get_f64(&self, key: &str) -> f64 {
        self.get_silently(key)
    }

    /// The boolean at `key`, or `false`.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        self.get_silently(key)
    }

    /// The duration at `key`, or zero.
    #[must_use]
    pub fn get_duration(&self, key: &str) -> Duration {
        self.get_silently(key)
    }

    /// The timestamp at `key`, or the UNIX epoch.
    #[must_use]
    pub fn get_timestamp(&self, key: &str) -> SystemTime {
        self.get(key)
            .and_then(|v| convert::to_timestamp(&v).ok())
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }

    /// The byte size at `key` ("10MB", "1.5GB", plain integers), or `0`.
    #[must_use]
    pub fn get_size_in_bytes(&self, key: &str) -> u64 {
        self.get_size_in_bytes_or(key, 0)
    }

    /// The byte size at `key`, or `default`.
    #[must_use]
    pub fn get_size_in_bytes_or(&self, key: &str, default: u64) -> u64 {
        self.get(key)
            .and_then(|v| convert::to_size_in_bytes(&v).ok())
            .unwrap_or(default)
    }

    /// The string array at `key`; a lone string becomes a one-element
    /// slice, anything else is empty.
    #[must_use]
    pub fn get_string_slice(&self, key: &str) -> Vec<String> {
        self.get_silently(key)
    }

    /// The string at `key` split on commas with parts trimmed.
    #[must_use]
    pub fn get_csv(&self, key: &str) -> Vec<String> {
        let raw = self.get_string(key);
        if raw.is_empty() {
            Vec::new()
        } else {
            convert::split_csv(&raw)
        }
    }

    /// The table at `key` with every value rendered as a string.
    #[must_use]
    pub fn get_string_map(&self, key: &str) -> BTreeMap<String, String> {
        self.get(key)
            .as_ref()
            .and_then(Value::as_table)
            .map(|table| {
                table
                    .iter()
                    .map(|(k, v)| (k.clone(), convert::to_string_lossy(v)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The table at `key` with every value as a string slice; lone strings
    /// promote to one-element slices.
    #[must_use]
    pub fn get_string_map_slice(&self, key: &str) -> BTreeMap<String, Vec<String>> {
        self.get(key)
            .as_ref()
            .and_then(Value::as_table)
            .map(|table| {
                table
                    .iter()
                    .filter_map(|(k, v)| {
                        Vec::<String>::from_value(v).ok().map(|slice| (k.clone(), slice))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Strict read through [`GetOptions`]: required keys, defaults,
    /// transforms, and validators.
    ///
    /// # Errors
    ///
    /// Propagates required, conversion, and validation failures.
    pub fn get_with<T: FromValue>(&self, key: &str, options: GetOptions<T>) -> Result<Option<T>> {
        let found = self.get(key);
        options.resolve(key, found.as_ref())
    }

    /// Write `value` at `key`, then notify observers.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let full = self.scoped(key);
        let value = value.into();
        let old_value = {
            let mut data = self.write_data();
            let old = path::get(&data, &full).cloned();
            path::set(&mut data, &full, value.clone());
            old
        };
        self.notify(Some(ChangeEvent {
            source: MANAGER.to_owned(),
            kind: ChangeKind::Set,
            key: Some(full),
            old_value,
            new_value: Some(value),
            timestamp: SystemTime::now(),
        }));
    }

    /// Remove the value at `key`, notifying observers when one was present.
    pub fn delete(&self, key: &str) {
        let full = self.scoped(key);
        let old_value = {
            let mut data = self.write_data();
            remove_path(&mut data, &full)
        };
        if old_value.is_none() {
            return;
        }
        self.notify(Some(ChangeEvent {
            source: MANAGER.to_owned(),
            kind: ChangeKind::Delete,
            key: Some(full),
            old_value,
            new_value: None,
            timestamp: SystemTime::now(),
        }));
    }

    /// Drop all data, sources, and observers.
    pub fn reset(&self) {
        self.write_data().clear();
        self.shared
            .sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self.observers() = Observers::default();
    }

    /// Deep-merge `incoming` over this handle's subtree, then notify
    /// observers.
    pub fn merge_with(&self, incoming: Table) {
        {
            let mut data = self.write_data();
            let layer = nest(&self.scope, incoming);
            merge::merge_in_place(&mut data, &layer);
        }
        self.notify(Some(ChangeEvent {
            source: MANAGER.to_owned(),
            kind: ChangeKind::Update,
            key: None,
            old_value: None,
            new_value: None,
            timestamp: SystemTime::now(),
        }));
    }

    /// Deep-merge another accessor's tree over this handle's subtree.
    ///
    /// Takes a snapshot of `other` first, so merging a handle into itself
    /// (or into an overlapping `sub`) cannot deadlock or self-feed.
    pub fn merge_from(&self, other: &Config) {
        self.merge_with(other.all_settings());
    }

    /// All keys under this handle's scope, dotted and in pre-order.
    /// Intermediate table nodes are listed alongside their descendants.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        path::keys(&self.scoped_table())
    }

    /// Whether `key` resolves to a value. Stored nulls count as absent.
    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Whether `key` resolves to a meaningfully set value: present and not
    /// an empty string, array, or table. `0` and `false` count as set.
    #[must_use]
    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !v.is_empty())
    }

    /// Number of dotted keys in the scoped tree, counted as [`Self::keys`]
    /// lists them.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    /// Whether the scoped tree has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The nested table at `key`, if there is one.
    #[must_use]
    pub fn section(&self, key: &str) -> Option<Table> {
        self.get(key).as_ref().and_then(Value::as_table).cloned()
    }

    /// A snapshot of the whole scoped tree.
    #[must_use]
    pub fn all_settings(&self) -> Table {
        self.scoped_table()
    }

    /// A handle scoped to the subtree at `key`. The handle stays live:
    /// writes through either handle are visible through both.
    #[must_use]
    pub fn sub(&self, key: &str) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            scope: self.scoped(key),
        }
    }

    /// An independent copy of the scoped tree with no sources or observers.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        Self::from_table(self.scoped_table())
    }

    /// Bind the subtree at `key` (the whole scope when `key` is empty) into
    /// a fresh `T`.
    ///
    /// # Errors
    ///
    /// [`Error::Missing`] when nothing is stored at `key`, plus binding
    /// failures.
    pub fn bind<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let live = self.get(key).ok_or_else(|| Error::missing(key))?;
        bind::from_value(&live)
    }

    /// Bind with a fallback value deep-merged under the live data.
    ///
    /// # Errors
    ///
    /// Propagates binding failures and unserializable defaults.
    pub fn bind_with_default<T, D>(&self, key: &str, default: &D) -> Result<T>
    where
        T: DeserializeOwned,
        D: Serialize,
    {
        let options = BindOptions::new().default_value(default)?.deep_merge(true);
        self.bind_with_options(key, &options)
    }

    /// Bind with full control over defaults, strictness, required fields,
    /// and case handling.
    ///
    /// # Errors
    ///
    /// [`Error::Missing`] when the data is absent and the options neither
    /// supply a default nor allow binding from nothing; otherwise binding
    /// failures per the options.
    pub fn bind_with_options<T: DeserializeOwned>(
        &self,
        key: &str,
        options: &BindOptions,
    ) -> Result<T> {
        let live = self.get(key);
        if live.is_none()
            && options.default.is_none()
            && !options.use_defaults
            && options.error_on_missing
        {
            return Err(Error::missing(key));
        }
        bind::bind_value(live.as_ref(), options)
    }

    /// Register `sources` and rebuild the root tree from every registered
    /// source, lowest priority first. Sources always populate the root,
    /// regardless of the handle's scope.
    ///
    /// # Errors
    ///
    /// A failing source or validator aborts the load; the previous tree is
    /// kept.
    pub fn load_from(&self, sources: Vec<Box<dyn Source>>) -> Result<()> {
        tracing::info!(source_count = sources.len(), "loading configuration");
        {
            let mut registered = self
                .shared
                .sources
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            registered.extend(sources);
        }
        let merged = self.rebuild_from_sources()?;
        self.run_validators(&merged)
            .map_err(|err| Error::config(format!("configuration validation failed: {err}")))?;
        *self.write_data() = merged;
        Ok(())
    }

    /// Rebuild the tree from the registered sources and notify watchers.
    ///
    /// # Errors
    ///
    /// Same contract as [`Config::load_from`].
    pub fn reload(&self) -> Result<()> {
        tracing::info!("reloading configuration from all sources");
        let merged = self.rebuild_from_sources()?;
        self.run_validators(&merged).map_err(|err| {
            Error::config(format!("configuration validation failed after reload: {err}"))
        })?;
        *self.write_data() = merged;
        self.notify(None);
        Ok(())
    }

    fn rebuild_from_sources(&self) -> Result<Table> {
        let sources = self
            .shared
            .sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut ordered: Vec<_> = sources.iter().collect();
        ordered.sort_by_key(|source| source.priority());
        let mut merged = Table::new();
        for source in ordered {
            let data = source
                .load()
                .map_err(|err| Error::source(source.name(), err.to_string()))?;
            merge::merge_in_place(&mut merged, &data);
        }
        Ok(merged)
    }

    /// Merge a tree pushed by a watchable source into the root, validate,
    /// and notify. Under strict validation a failing tree is rolled back;
    /// under lenient validation the failure is logged and the tree kept.
    pub fn apply_update(&self, source: &str, incoming: Table) {
        let validation = {
            let mut data = self.write_data();
            let previous = data.clone();
            merge::merge_in_place(&mut data, &incoming);
            match self.run_validators(&data) {
                Ok(()) => Ok(()),
                Err(err) => {
                    if self.shared.validation_mode == ValidationMode::Strict {
                        *data = previous;
                    }
                    Err(err)
                }
            }
        };
        if let Err(err) = validation {
            tracing::error!(source, %err, "configuration validation failed after change");
            if self.shared.validation_mode == ValidationMode::Strict {
                return;
            }
        }
        self.notify(Some(ChangeEvent {
            source: source.to_owned(),
            kind: ChangeKind::Update,
            key: None,
            old_value: None,
            new_value: None,
            timestamp: SystemTime::now(),
        }));
    }

    /// Register a whole-tree validator.
    pub fn add_validator(&self, validator: impl Validate + 'static) {
        self.shared
            .validators
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(validator));
    }

    /// Run every registered validator against the current tree.
    ///
    /// # Errors
    ///
    /// The first validator rejection.
    pub fn validate(&self) -> Result<()> {
        let data = self.read_data().clone();
        self.run_validators(&data)
    }

    fn run_validators(&self, data: &Table) -> Result<()> {
        let validators = self
            .shared
            .validators
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for validator in validators.iter() {
            validator.validate(data)?;
        }
        Ok(())
    }

    /// Watch a single key: after every mutation the callback receives the
    /// key and its current value, on its own thread.
    pub fn watch_key(
        &self,
        key: &str,
        callback: impl Fn(String, Option<Value>) + Send + Sync + 'static,
    ) {
        let full = self.scoped(key);
        self.observers()
            .watch
            .entry(full)
            .or_default()
            .push(Arc::new(callback));
    }

    /// Watch every mutation: the callback receives each [`ChangeEvent`], on
    /// its own thread.
    pub fn watch_changes(&self, callback: impl Fn(ChangeEvent) + Send + Sync + 'static) {
        self.observers().change.push(Arc::new(callback));
    }

    /// Snapshot observers and current values under the locks, then fire
    /// callbacks on detached threads after release. Key watchers fire on
    /// every mutation, not only when their own key changed.
    fn notify(&self, event: Option<ChangeEvent>) {
        let mut jobs: Vec<Box<dyn FnOnce() + Send>> = Vec::new();
        {
            let observers = self.observers();
            let data = self.read_data();
            for (key, callbacks) in &observers.watch {
                let value = path::get(&data, key).filter(|v| !v.is_null()).cloned();
                for callback in callbacks {
                    let callback = Arc::clone(callback);
                    let key = key.clone();
                    let value = value.clone();
                    jobs.push(Box::new(move || callback(key, value)));
                }
            }
            if let Some(event) = &event {
                for callback in &observers.change {
                    let callback = Arc::clone(callback);
                    let event = event.clone();
                    jobs.push(Box::new(move || callback(event)));
                }
            }
        }
        for job in jobs {
            thread::spawn(job);
        }
    }
}

/// Wrap `table` under a dotted scope so it can merge at the root.
fn nest(scope: &str, table: Table) -> Table {
    if scope.is_empty() {
        return table;
    }
    let mut wrapped = table;
    for segment in scope.rsplit(path::DELIMITER) {
        let mut outer = Table::new();
        outer.insert(segment.to_owned(), Value::Table(wrapped));
        wrapped = outer;
    }
    wrapped
}

fn remove_path(table: &mut Table, dotted: &str) -> Option<Value> {
    match dotted.split_once(path::DELIMITER) {
        None => table.remove(dotted),
        Some((head, rest)) => table
            .get_mut(head)
            .and_then(Value::as_table_mut)
            .and_then(|nested| remove_path(nested, rest)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::table_from_json;
    use serde_json::json;

    fn sample() -> Config {
        Config::from_table(table_from_json(json!({
            "server": {"host": "localhost", "port": 8080, "tags": ["a", "b"]},
            "debug": true,
            "limit": "10MB",
            "timeout": "2m",
            "empty": "",
            "zero": 0,
            "masked": null,
        })))
    }

    #[test]
    fn typed_getters_read_dotted_paths() {
        let config = sample();
        assert_eq!(config.get_string("server.host"), "localhost");
        assert_eq!(config.get_i64("server.port"), 8080);
        assert!(config.get_bool("debug"));
        assert_eq!(config.get_size_in_bytes("limit"), 10 * 1024 * 1024);
        assert_eq!(config.get_duration("timeout"), Duration::from_secs(120));
        assert_eq!(
            config.get_string_slice("server.tags"),
            vec!["a".to_owned(), "b".to_owned()]
        );
    }

    #[test]
    fn typed_getters_swallow_failures() {
        let config = sample();
        assert_eq!(config.get_string("missing"), "");
        assert_eq!(config.get_i64("server.host"), 0);
        assert_eq!(config.get_or("missing", 7_i64), 7);
        assert_eq!(config.get_string_or("missing", "fallback"), "fallback");
    }

    #[test]
    fn presence_distinguishes_empty_from_unset() {
        let config = sample();
        assert!(config.has_key("empty"));
        assert!(!config.is_set("empty"));
        assert!(config.is_set("zero"));
        assert!(config.is_set("debug"));
        assert!(!config.has_key("masked"));
        assert!(!config.is_set("missing"));
    }

    #[test]
    fn set_and_delete_round_trip() {
        let config = sample();
        config.set("server.pool.max", 10);
        assert_eq!(config.get_i64("server.pool.max"), 10);
        config.delete("server.pool.max");
        assert!(!config.has_key("server.pool.max"));
    }

    #[test]
    fn sub_is_a_live_alias() {
        let config = sample();
        let server = config.sub("server");
        assert_eq!(server.get_string("host"), "localhost");
        server.set("port", 9090);
        assert_eq!(config.get_i64("server.port"), 9090);
        config.set("server.host", "remote");
        assert_eq!(server.get_string("host"), "remote");
    }

    #[test]
    fn deep_clone_is_independent() {
        let config = sample();
        let copy = config.deep_clone();
        config.set("debug", false);
        assert!(copy.get_bool("debug"));
        assert_eq!(copy.keys().len(), sample().keys().len());
    }

    #[test]
    fn merge_with_layers_over_a_scope() {
        let config = sample();
        config
            .sub("server")
            .merge_with(table_from_json(json!({"port": 1, "extra": true})));
        assert_eq!(config.get_i64("server.port"), 1);
        assert!(config.get_bool("server.extra"));
        assert_eq!(config.get_string("server.host"), "localhost");
    }

    #[test]
    fn merge_from_layers_another_accessor() {
        let config = sample();
        let overlay = Config::from_table(table_from_json(json!({
            "server": {"port": 1},
            "region": "eu",
        })));
        config.merge_from(&overlay);
        assert_eq!(config.get_i64("server.port"), 1);
        assert_eq!(config.get_string("region"), "eu");
        assert_eq!(config.get_string("server.host"), "localhost");

        // A scoped handle merges the other tree under its own scope.
        config.sub("server").merge_from(&overlay.sub("server"));
        assert_eq!(config.get_i64("server.port"), 1);
    }
}
