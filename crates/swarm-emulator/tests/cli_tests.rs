use clap::Parser;
use std::io::Write;
use swarm_common::{DisconnectPolicy, Isolation};
use swarm_emulator::cli::{Cli, Commands};

#[test]
fn defaults_without_flags() {
    let cli = Cli::try_parse_from(["swarm-emulator"]).unwrap();
    let config = cli.resolve_config().unwrap();
    assert_eq!(config.endpoints.count, 100);
    assert_eq!(config.endpoints.base_port, 14567);
    assert!(config.identity.enabled);
    assert!(cli.command.is_none());
}

#[test]
fn num_middlewares_flag_sets_the_count() {
    let cli = Cli::try_parse_from(["swarm-emulator", "-n", "250"]).unwrap();
    assert_eq!(cli.resolve_config().unwrap().endpoints.count, 250);

    let cli = Cli::try_parse_from(["swarm-emulator", "--num-middlewares", "0"]).unwrap();
    assert_eq!(cli.resolve_config().unwrap().endpoints.count, 0);
}

#[test]
fn negative_count_is_a_configuration_error() {
    let cli = Cli::try_parse_from(["swarm-emulator", "-n", "-3"]).unwrap();
    let err = cli.resolve_config().unwrap_err();
    assert!(err.to_string().contains("non-negative"));
}

#[test]
fn non_numeric_count_is_rejected_by_the_parser() {
    assert!(Cli::try_parse_from(["swarm-emulator", "-n", "many"]).is_err());
}

#[test]
fn flags_override_the_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "endpoints:\n  count: 5\n  base_port: 20000\n\
         dispatch:\n  isolation: runtime\n\
         identity:\n  enabled: true"
    )
    .unwrap();

    let path = file.path().to_str().unwrap().to_string();
    let cli = Cli::try_parse_from([
        "swarm-emulator",
        "--config",
        path.as_str(),
        "--base-port",
        "21000",
        "--on-disconnect",
        "reaccept",
        "--no-identity",
        "--metrics-port",
        "9100",
    ])
    .unwrap();
    let config = cli.resolve_config().unwrap();
    assert_eq!(config.endpoints.count, 5);
    assert_eq!(config.endpoints.base_port, 21000);
    assert_eq!(config.dispatch.isolation, Isolation::Runtime);
    assert_eq!(config.dispatch.on_disconnect, DisconnectPolicy::Reaccept);
    assert!(!config.identity.enabled);
    assert!(config.metrics.enabled);
    assert_eq!(config.metrics.port, 9100);
}

#[test]
fn worker_subcommand_parses_its_bucket() {
    let cli = Cli::try_parse_from([
        "swarm-emulator",
        "worker",
        "--ports",
        "14667,14668,14669",
        "--first-index",
        "100",
        "--chunk-size",
        "512",
        "--on-disconnect",
        "reaccept",
    ])
    .unwrap();
    let Some(Commands::Worker(args)) = cli.command else {
        panic!("expected the worker subcommand");
    };
    let bucket = args.bucket();
    assert_eq!(bucket.ports(), &[14667, 14668, 14669]);
    assert_eq!(bucket.first_index(), 100);

    let settings = args.settings();
    assert_eq!(settings.chunk_size, 512);
    assert_eq!(settings.backlog, 1);
    assert_eq!(settings.on_disconnect, DisconnectPolicy::Reaccept);
}

#[test]
fn worker_rejects_zero_chunk_size_and_backlog() {
    let base = ["swarm-emulator", "worker", "--ports", "14567"];

    for (flag, value) in [
        ("--chunk-size", "0"),
        ("--backlog", "0"),
        ("--stats-interval-ms", "0"),
    ] {
        let mut argv = base.to_vec();
        argv.extend([flag, value]);
        assert!(Cli::try_parse_from(argv).is_err(), "{} 0 must be rejected", flag);
    }

    let cli = Cli::try_parse_from([
        "swarm-emulator",
        "worker",
        "--ports",
        "14567",
        "--chunk-size",
        "1",
        "--backlog",
        "8",
    ])
    .unwrap();
    let Some(Commands::Worker(args)) = cli.command else {
        panic!("expected the worker subcommand");
    };
    assert_eq!(args.settings().chunk_size, 1);
    assert_eq!(args.settings().backlog, 8);
    assert_eq!(args.stats_interval_ms, 500);
}
