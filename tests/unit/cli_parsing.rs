//! Unit tests for CLI argument parsing and target loading

use clap::Parser;
use std::io::Write;
use tempfile::NamedTempFile;
use tweet_harvester::cli::{Cli, Commands};
use tweet_harvester::resolver::IdentifierKind;

fn users_csv(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_cli_defaults() {
    let cli = Cli::parse_from(["tweet-harvester", "search", "--query", "rustlang"]);

    assert_eq!(cli.config, std::path::PathBuf::from("config.yaml"));
    assert!(cli.output_dir.is_none());
    assert!(cli.save_format.is_none());
    assert!(cli.accumulation.is_none());
    match cli.command {
        Commands::Search(args) => {
            assert_eq!(args.max_results, 100);
            assert!(args.start_time.is_none());
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn test_lookup_defaults_to_tweet_id_column() {
    let cli = Cli::parse_from(["tweet-harvester", "lookup", "--id-csv", "ids.csv"]);

    match cli.command {
        Commands::Lookup(args) => {
            assert_eq!(args.id_column, "tweet_id");
            assert!(args.ids.is_empty());
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn test_handles_and_author_ids_conflict() {
    let result = Cli::try_parse_from([
        "tweet-harvester",
        "timeline",
        "--handles",
        "jack",
        "--author-ids",
        "12",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_use_skip_requires_csv() {
    let result = Cli::try_parse_from(["tweet-harvester", "users", "--handles", "jack", "--use-skip"]);
    assert!(result.is_err());
}

#[test]
fn test_csv_targets_honor_skip_column() {
    let file = users_csv("handle,skip\njack,0\nghost,1\nrustlang,\n");
    let path = file.path().to_str().unwrap();

    let cli = Cli::parse_from([
        "tweet-harvester",
        "users",
        "--user-csv",
        path,
        "--handle-column",
        "handle",
        "--use-skip",
    ]);

    let Commands::Users(args) = cli.command else {
        panic!("expected users command");
    };
    let list = args.targets.load().unwrap();
    assert_eq!(list.kind, IdentifierKind::Handle);
    assert_eq!(list.identifiers, vec!["jack", "rustlang"]);
}

#[test]
fn test_csv_author_id_column() {
    let file = users_csv("name,author_id\njack,12\nrust,5170\n");
    let path = file.path().to_str().unwrap();

    let cli = Cli::parse_from([
        "tweet-harvester",
        "timeline",
        "--user-csv",
        path,
        "--author-id-column",
        "author_id",
    ]);

    let Commands::Timeline(args) = cli.command else {
        panic!("expected timeline command");
    };
    let list = args.targets.load().unwrap();
    assert_eq!(list.kind, IdentifierKind::NumericId);
    assert_eq!(list.identifiers, vec!["12", "5170"]);
}

#[test]
fn test_missing_targets_rejected() {
    let cli = Cli::parse_from(["tweet-harvester", "users"]);

    let Commands::Users(args) = cli.command else {
        panic!("expected users command");
    };
    assert!(args.targets.kind().is_err());
}
