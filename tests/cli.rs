// tests/cli.rs

use std::path::PathBuf;

use clap::Parser;

use modelflow::cli::CliArgs;
use modelflow::config::default_config_path;
use modelflow::types::ExecutionMode;

#[test]
fn config_defaults_to_pipeline_file_in_cwd() {
    let args = CliArgs::try_parse_from(["modelflow"]).unwrap();
    assert_eq!(args.config, default_config_path());
    assert_eq!(args.invocations, 1);
    assert!(args.mode.is_none());
    assert!(!args.dry_run);
}

#[test]
fn flags_override_defaults() {
    let args = CliArgs::try_parse_from([
        "modelflow",
        "--config",
        "demos/Modelflow.toml",
        "--mode",
        "debug",
        "--concurrency",
        "3",
        "--invocations",
        "5",
        "--dry-run",
    ])
    .unwrap();

    assert_eq!(args.config, PathBuf::from("demos/Modelflow.toml"));
    assert_eq!(args.mode, Some(ExecutionMode::Debug));
    assert_eq!(args.concurrency, Some(3));
    assert_eq!(args.invocations, 5);
    assert!(args.dry_run);
}

#[test]
fn unknown_mode_is_rejected() {
    assert!(CliArgs::try_parse_from(["modelflow", "--mode", "turbo"]).is_err());
}
