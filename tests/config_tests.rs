use std::io::Write;
use std::time::Duration;

use monitoring_stack_operator::config::{
    Args, ConfigLoader, InstanceSelector, LogFormat, DEFAULT_NAMESPACE,
};
use monitoring_stack_operator::Error;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn defaults_without_sources() {
    let config = ConfigLoader::new().build().unwrap();
    assert_eq!(config.namespace, DEFAULT_NAMESPACE);
    assert_eq!(config.instance_selector.key(), "app.kubernetes.io/managed-by");
    assert_eq!(config.instance_selector.value(), "observability-operator");
    assert_eq!(config.resync_interval, Duration::from_secs(1800));
}

#[test]
fn file_overrides_defaults() {
    let file = write_config(
        r#"
namespace = "observability"
workers = 4

[log]
level = "debug"
format = "json"
"#,
    );

    let config = ConfigLoader::new()
        .load_from_file(Some(file.path().to_path_buf()))
        .build()
        .unwrap();
    assert_eq!(config.namespace, "observability");
    assert_eq!(config.workers, 4);
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.log.format, LogFormat::Json);
    // untouched keys keep their defaults
    assert_eq!(config.instance_selector.value(), "observability-operator");
}

#[test]
fn flags_override_file() {
    let file = write_config("namespace = \"from-file\"\nworkers = 4\n");
    let args = Args {
        config: Some(file.path().to_path_buf()),
        namespace: Some("from-flag".into()),
        instance_selector: Some("team=platform".into()),
        ..Default::default()
    };

    let config = ConfigLoader::new().load_from_cli(args).build().unwrap();
    assert_eq!(config.namespace, "from-flag");
    assert_eq!(config.workers, 4);
    assert_eq!(config.instance_selector.to_string(), "team=platform");
}

#[test]
fn malformed_selector_is_rejected() {
    let args = Args {
        instance_selector: Some("no-separator".into()),
        ..Default::default()
    };
    let err = ConfigLoader::new().load_from_cli(args).build().unwrap_err();
    assert!(matches!(err, Error::InvalidConfiguration(_)));
}

#[test]
fn selector_needs_a_key() {
    assert!(InstanceSelector::parse("=observability-operator").is_err());
    assert!(InstanceSelector::parse("  =x").is_err());

    // an empty value is allowed
    let selector = InstanceSelector::parse("team=").unwrap();
    assert_eq!(selector.key(), "team");
    assert_eq!(selector.value(), "");
}

#[test]
fn missing_file_is_an_error() {
    let result = ConfigLoader::new()
        .load_from_file(Some("/nonexistent/operator.toml".into()))
        .build();
    assert!(matches!(result, Err(Error::Config(_))));
}
