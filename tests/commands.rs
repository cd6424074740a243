//! Integration tests for the command layer against a file-backed config and
//! database, reopened between commands the way separate CLI runs would.

use std::path::{Path, PathBuf};

use clap::Parser;
use gator::commands::{dispatch, AppContext, Cli};
use gator::config::Config;
use gator::ErrorKind;

async fn run(config_path: &Path, args: &[&str]) -> Result<String, gator::Error> {
    let argv = std::iter::once("gator").chain(args.iter().copied());
    let cli = Cli::try_parse_from(argv).unwrap();

    let mut ctx = AppContext::open(config_path.to_path_buf()).await?;
    let mut out = Vec::new();
    dispatch(&mut ctx, cli.command, &mut out).await?;
    Ok(String::from_utf8(out).unwrap())
}

fn config_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("gator").join("config.toml")
}

#[tokio::test]
async fn test_state_survives_between_invocations() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_path(&dir);

    run(&cfg, &["register", "kahya"]).await.unwrap();
    run(&cfg, &["addfeed", "Boot.dev", "https://blog.boot.dev/index.xml"])
        .await
        .unwrap();

    let following = run(&cfg, &["following"]).await.unwrap();
    assert_eq!(following, "* Boot.dev (https://blog.boot.dev/index.xml)\n");

    // Database lives next to the config by default
    assert!(cfg.with_file_name("gator.db").exists());
}

#[tokio::test]
async fn test_login_switches_identity() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_path(&dir);

    run(&cfg, &["register", "kahya"]).await.unwrap();
    run(&cfg, &["register", "holgith"]).await.unwrap();
    assert_eq!(
        Config::load(&cfg).unwrap().current_user_name.as_deref(),
        Some("holgith")
    );

    let output = run(&cfg, &["login", "kahya"]).await.unwrap();
    assert_eq!(output, "Logged in as kahya\n");

    let users = run(&cfg, &["users"]).await.unwrap();
    assert_eq!(users, "* holgith\n* kahya (current)\n");
}

#[tokio::test]
async fn test_duplicate_feed_url_is_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_path(&dir);

    run(&cfg, &["register", "kahya"]).await.unwrap();
    run(&cfg, &["addfeed", "HN", "https://news.ycombinator.com/rss"])
        .await
        .unwrap();

    let err = run(&cfg, &["addfeed", "HN again", "https://news.ycombinator.com/rss"])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Store);

    // The failed insert did not leave a dangling follow behind
    let following = run(&cfg, &["following"]).await.unwrap();
    assert_eq!(following.lines().count(), 1);
}

#[tokio::test]
async fn test_reset_then_logged_in_commands_fail() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_path(&dir);

    run(&cfg, &["register", "kahya"]).await.unwrap();
    run(&cfg, &["reset"]).await.unwrap();

    // Config still names kahya, but the user is gone
    let err = run(&cfg, &["browse"]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Store);
}

#[tokio::test]
async fn test_browse_without_posts() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_path(&dir);

    run(&cfg, &["register", "kahya"]).await.unwrap();
    let output = run(&cfg, &["browse", "5"]).await.unwrap();
    assert_eq!(output, "Found 0 posts for user kahya:\n");
}
