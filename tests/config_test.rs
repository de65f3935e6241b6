//! Command line and environment configuration tests

use clap::Parser;
use std::time::Duration;

use vault_autounseal::config::{Args, LogFormat};
use vault_autounseal::{ElectionPolicy, ReadinessMode};

fn parse(extra: &[&str]) -> Args {
    let mut argv = vec!["vault-autounseal"];
    argv.extend_from_slice(extra);
    Args::try_parse_from(argv).expect("valid arguments")
}

#[test]
fn test_defaults() {
    let args = parse(&[]);

    assert_eq!(args.namespace, "vault");
    assert_eq!(args.vault_port, 8200);
    assert_eq!(args.check_interval(), Duration::from_secs(10));
    assert_eq!(args.unseal_keys_dir.to_str(), Some("/vault/unseal-keys"));
    assert_eq!(args.label_selector, "app.kubernetes.io/name=vault,component=server");
    assert_eq!(args.init_election, ElectionPolicy::Fleet);
    assert_eq!(args.readiness_mode, ReadinessMode::Unsealed);
    assert_eq!(args.log_format, LogFormat::Text);
    assert!(!args.overwrite_existing_secrets);
    assert!(args.validate().is_ok());
}

#[test]
fn test_overrides() {
    let args = parse(&[
        "--namespace",
        "secrets",
        "--vault-port",
        "8300",
        "--check-interval",
        "30",
        "--init-election",
        "per-tick",
        "--readiness-mode",
        "reachable",
        "--log-format",
        "json",
        "--overwrite-existing-secrets",
    ]);

    assert_eq!(args.namespace, "secrets");
    assert_eq!(args.vault_port, 8300);
    assert_eq!(args.check_interval(), Duration::from_secs(30));
    assert_eq!(args.init_election, ElectionPolicy::PerTick);
    assert_eq!(args.readiness_mode, ReadinessMode::Reachable);
    assert_eq!(args.log_format, LogFormat::Json);
    assert!(args.overwrite_existing_secrets);
}

#[test]
fn test_rejects_non_numeric_interval() {
    let result = Args::try_parse_from(["vault-autounseal", "--check-interval", "soon"]);
    assert!(result.is_err());
}

#[test]
fn test_validate_rejects_zero_interval() {
    let args = parse(&["--check-interval", "0"]);
    assert!(args.validate().is_err());
}

#[test]
fn test_validate_rejects_empty_namespace() {
    let args = parse(&["--namespace", " "]);
    assert!(args.validate().is_err());
}

#[test]
fn test_validate_rejects_unknown_scheme() {
    let args = parse(&["--vault-scheme", "ftp"]);
    assert!(args.validate().is_err());
}
