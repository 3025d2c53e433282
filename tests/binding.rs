//! End-to-end tests for struct binding through the accessor, covering the
//! three-tier default precedence and the missing-data policies.

use std::time::Duration;

use confmap::{BindOptions, Config, table_from_json};
use serde::{Deserialize, Serialize};
use serde_json::json;

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ServerConfig {
    #[serde(default)]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    timeout: Option<Duration>,
}

#[derive(Debug, Deserialize, PartialEq)]
struct AppConfig {
    #[serde(default)]
    name: String,
    server: ServerConfig,
    #[serde(default)]
    features: Vec<String>,
}

#[test]
fn live_data_beats_supplied_default_beats_field_default() {
    let config = Config::from_table(table_from_json(json!({
        "server": {"port": 999},
    })));

    // Field default only.
    let bound: ServerConfig = config.bind("server").expect("bind");
    assert_eq!(bound.port, 999);
    assert_eq!(bound.host, "");

    // Supplied default fills what live data leaves open; live data still
    // wins where both speak.
    let supplied = ServerConfig {
        host: "fallback.example".into(),
        port: 50,
        timeout: Some(Duration::from_secs(30)),
    };
    let bound: ServerConfig = config
        .bind_with_default("server", &supplied)
        .expect("bind");
    assert_eq!(bound.port, 999);
    assert_eq!(bound.host, "fallback.example");
    assert_eq!(bound.timeout, Some(Duration::from_secs(30)));

    // With no live data at all, the supplied default stands alone.
    let bound: ServerConfig = config
        .bind_with_default("absent", &supplied)
        .expect("bind");
    assert_eq!(bound.port, 50);
}

#[test]
fn field_defaults_apply_when_nothing_else_speaks() {
    let config = Config::from_table(table_from_json(json!({
        "server": {"host": "example.com"},
    })));
    let bound: ServerConfig = config.bind("server").expect("bind");
    assert_eq!(bound.host, "example.com");
    assert_eq!(bound.port, 8080);
    assert_eq!(bound.timeout, None);
}

#[test]
fn whole_tree_binds_through_an_empty_key() -> anyhow::Result<()> {
    let config = Config::from_table(table_from_json(json!({
        "name": "svc",
        "server": {"host": "h", "port": "9000", "timeout": "1m30s"},
        "features": ["a", "b"],
    })));
    let app: AppConfig = config.bind("")?;
    assert_eq!(app.name, "svc");
    assert_eq!(app.server.port, 9000);
    assert_eq!(app.server.timeout, Some(Duration::from_secs(90)));
    assert_eq!(app.features, vec!["a".to_owned(), "b".to_owned()]);
    Ok(())
}

#[test]
fn subtree_handles_bind_their_scope() {
    let config = Config::from_table(table_from_json(json!({
        "services": {"web": {"server": {"host": "web-1", "port": 80}}},
    })));
    let web = config.sub("services.web");
    let bound: ServerConfig = web.bind("server").expect("bind");
    assert_eq!(bound.host, "web-1");
    assert_eq!(bound.port, 80);
}

#[test]
fn plain_bind_requires_data() {
    let config = Config::new();
    let err = config.bind::<ServerConfig>("server").expect_err("bind");
    assert!(matches!(err, confmap::Error::Missing { ref key } if key == "server"));
}

#[test]
fn missing_data_policy_follows_the_options() {
    let config = Config::new();

    // Strict with no fallback layer: missing data is an error.
    let strict = BindOptions::new().error_on_missing(true);
    let err = config
        .bind_with_options::<ServerConfig>("server", &strict)
        .expect_err("bind");
    assert!(matches!(err, confmap::Error::Missing { .. }));

    // Lenient with no fallback: field defaults carry the bind.
    let lenient = BindOptions::new();
    let bound: ServerConfig = config.bind_with_options("server", &lenient).expect("bind");
    assert_eq!(bound.port, 8080);

    // A supplied default satisfies even the strict policy.
    let with_default = BindOptions::new()
        .default_tree(confmap::Value::Table(table_from_json(json!({"port": 50}))))
        .error_on_missing(true);
    let bound: ServerConfig = config
        .bind_with_options("server", &with_default)
        .expect("bind");
    assert_eq!(bound.port, 50);
}

#[test]
fn strict_required_fields_are_enforced() {
    let config = Config::from_table(table_from_json(json!({
        "server": {"port": 1},
    })));
    let options = BindOptions::new()
        .required(["host"])
        .error_on_missing(true);
    let err = config
        .bind_with_options::<ServerConfig>("server", &options)
        .expect_err("bind");
    assert!(matches!(err, confmap::Error::Required { ref key } if key == "host"));
}

#[test]
fn case_insensitive_binding_matches_loose_keys() {
    let config = Config::from_table(table_from_json(json!({
        "server": {"HOST": "upper", "Port": 7},
    })));
    let options = BindOptions::new().ignore_case(true);
    let bound: ServerConfig = config.bind_with_options("server", &options).expect("bind");
    assert_eq!(bound.host, "upper");
    assert_eq!(bound.port, 7);
}

#[test]
fn live_coercions_apply_during_binding() {
    let config = Config::from_table(table_from_json(json!({
        "server": {"host": 123, "port": "443", "timeout": 90},
    })));
    let bound: ServerConfig = config.bind("server").expect("bind");
    assert_eq!(bound.host, "123");
    assert_eq!(bound.port, 443);
    assert_eq!(bound.timeout, Some(Duration::from_secs(90)));
}

#[test]
fn bound_structs_round_trip_as_defaults() {
    // A struct bound once can seed the next bind, the supplied-default tier
    // flattening through serde names.
    let config = Config::from_table(table_from_json(json!({
        "server": {"host": "live"},
    })));
    let seed = ServerConfig {
        host: "seed".into(),
        port: 1234,
        timeout: None,
    };
    let bound: ServerConfig = config.bind_with_default("server", &seed).expect("bind");
    assert_eq!(bound.host, "live");
    assert_eq!(bound.port, 1234);
}
