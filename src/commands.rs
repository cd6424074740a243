//! Command-line surface.
//!
//! [`Cli`] is parsed once in `main` and handed to [`dispatch`]. Commands that
//! act on behalf of a user resolve the logged-in user there, once, and receive
//! it as a parameter. Handlers write their output to any `Write` so tests can
//! capture it.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::Error;
use crate::feed::{build_client, FeedScheduler, FetchWorker, RunSummary};
use crate::storage::{Database, StoreError, User};
use crate::util::{parse_interval, strip_control_chars, truncate_to_width, validate_feed_url};

const DESCRIPTION_WIDTH: usize = 200;

#[derive(Parser, Debug)]
#[command(name = "gator", version, about = "Multi-user RSS/Atom feed aggregator")]
pub struct Cli {
    /// Config file (default: ~/.config/gator/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a user and log in as them
    Register { name: String },
    /// Switch the current user
    Login { name: String },
    /// Delete every user, with their feeds, follows and posts
    Reset,
    /// List users
    Users,
    /// Fetch feeds continuously, one batch per interval, until Ctrl-C
    Agg {
        /// Time between cycles, e.g. 30s, 1m, 1h30m
        #[arg(value_parser = parse_interval)]
        interval: Duration,
        /// Concurrent fetches per cycle (overrides config)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Add a feed for the current user and follow it
    Addfeed { name: String, url: String },
    /// List all feeds
    Feeds,
    /// Follow an existing feed by URL
    Follow { url: String },
    /// List feeds the current user follows
    Following,
    /// Stop following a feed by URL
    Unfollow { url: String },
    /// Show the newest posts from followed feeds
    Browse { limit: Option<u32> },
}

/// Everything a command handler needs: the store and the config it came from.
pub struct AppContext {
    pub db: Database,
    pub config: Config,
    pub config_path: PathBuf,
}

impl AppContext {
    /// Load the config at `config_path` and open the database it names.
    pub async fn open(config_path: PathBuf) -> Result<Self, Error> {
        let config = Config::load(&config_path)?;
        let db_path = config.resolve_database_path(&config_path);

        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        let db_path_str = db_path
            .to_str()
            .ok_or_else(|| Error::invalid_input("database path is not valid UTF-8"))?;
        let db = Database::open(db_path_str).await?;
        tracing::debug!(path = %db_path.display(), "Database opened");

        Ok(Self {
            db,
            config,
            config_path,
        })
    }
}

/// Run one command.
///
/// The logged-in user is looked up here for the commands that act on their
/// behalf, so a missing login fails before any handler runs.
pub async fn dispatch<W: Write>(ctx: &mut AppContext, command: Command, out: &mut W) -> Result<(), Error> {
    match command {
        Command::Register { name } => register(ctx, &name, out).await,
        Command::Login { name } => login(ctx, &name, out).await,
        Command::Reset => reset(ctx, out).await,
        Command::Users => users(ctx, out).await,
        Command::Agg { interval, workers } => {
            let shutdown = CancellationToken::new();
            let on_signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupt received, finishing current cycle");
                    on_signal.cancel();
                }
            });
            aggregate(ctx, interval, workers, shutdown, out).await.map(|_| ())
        }
        Command::Feeds => feeds(ctx, out).await,
        Command::Addfeed { name, url } => {
            let user = current_user(ctx).await?;
            add_feed(ctx, &user, &name, &url, out).await
        }
        Command::Follow { url } => {
            let user = current_user(ctx).await?;
            follow(ctx, &user, &url, out).await
        }
        Command::Following => {
            let user = current_user(ctx).await?;
            following(ctx, &user, out).await
        }
        Command::Unfollow { url } => {
            let user = current_user(ctx).await?;
            unfollow(ctx, &user, &url, out).await
        }
        Command::Browse { limit } => {
            let user = current_user(ctx).await?;
            browse(ctx, &user, limit, out).await
        }
    }
}

async fn current_user(ctx: &AppContext) -> Result<User, Error> {
    let name = ctx.config.current_user()?;
    let user = ctx.db.get_user_by_name(name).await?;
    Ok(user)
}

fn non_empty<'a>(value: &'a str, what: &str) -> Result<&'a str, Error> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::invalid_input(format!("{what} must not be empty")));
    }
    Ok(value)
}

fn print_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<(), Error> {
    serde_json::to_writer_pretty(&mut *out, value).map_err(std::io::Error::from)?;
    writeln!(out)?;
    Ok(())
}

// ============================================================================
// Users
// ============================================================================

pub async fn register<W: Write>(ctx: &mut AppContext, name: &str, out: &mut W) -> Result<(), Error> {
    let name = non_empty(name, "user name")?;
    let user = ctx.db.create_user(name).await?;
    ctx.config = Config::set_user(&ctx.config_path, &user.name)?;

    tracing::info!(user = %user.name, "User registered");
    writeln!(out, "User created:")?;
    print_json(out, &user)
}

pub async fn login<W: Write>(ctx: &mut AppContext, name: &str, out: &mut W) -> Result<(), Error> {
    let name = non_empty(name, "user name")?;
    let user = ctx.db.get_user_by_name(name).await?;
    ctx.config = Config::set_user(&ctx.config_path, &user.name)?;

    writeln!(out, "Logged in as {}", user.name)?;
    Ok(())
}

pub async fn reset<W: Write>(ctx: &mut AppContext, out: &mut W) -> Result<(), Error> {
    let removed = ctx.db.reset().await?;
    tracing::info!(users = removed, "Database reset");
    writeln!(out, "Database reset: removed {removed} users")?;
    Ok(())
}

pub async fn users<W: Write>(ctx: &AppContext, out: &mut W) -> Result<(), Error> {
    let current = ctx.config.current_user_name.as_deref();
    for user in ctx.db.list_users().await? {
        if Some(user.name.as_str()) == current {
            writeln!(out, "* {} (current)", user.name)?;
        } else {
            writeln!(out, "* {}", user.name)?;
        }
    }
    Ok(())
}

// ============================================================================
// Aggregation
// ============================================================================

/// Run the collector until `shutdown` is cancelled.
pub async fn aggregate<W: Write>(
    ctx: &AppContext,
    interval: Duration,
    workers: Option<usize>,
    shutdown: CancellationToken,
    out: &mut W,
) -> Result<RunSummary, Error> {
    let workers = workers.unwrap_or(ctx.config.workers);
    if workers == 0 {
        return Err(Error::invalid_input("workers must be at least 1"));
    }

    let timeout = Duration::from_secs(ctx.config.fetch_timeout_secs.max(1));
    let client = build_client(&ctx.config.user_agent, timeout)?;
    let worker = FetchWorker::new(client, ctx.db.clone(), timeout);
    let scheduler = FeedScheduler::new(ctx.db.clone(), worker, interval, workers);

    writeln!(out, "Collecting feeds every {interval:?}")?;
    out.flush()?;

    let summary = scheduler.run(shutdown).await;
    writeln!(
        out,
        "Stopped after {} cycles, {} new posts",
        summary.cycles, summary.inserted
    )?;
    Ok(summary)
}

// ============================================================================
// Feeds and follows
// ============================================================================

pub async fn add_feed<W: Write>(
    ctx: &AppContext,
    user: &User,
    name: &str,
    url: &str,
    out: &mut W,
) -> Result<(), Error> {
    let name = non_empty(name, "feed name")?;
    let url = url.trim();
    validate_feed_url(url).map_err(|e| Error::invalid_input(format!("{url}: {e}")))?;

    let (feed, follow) = ctx.db.create_feed_with_follow(name, url, user.id).await?;
    tracing::info!(feed_id = feed.id, url = %feed.url, "Feed added");

    writeln!(out, "Feed created:")?;
    print_json(out, &feed)?;
    writeln!(out, "{} now follows {}", follow.user_name, follow.feed_name)?;
    Ok(())
}

pub async fn feeds<W: Write>(ctx: &AppContext, out: &mut W) -> Result<(), Error> {
    let feeds = ctx.db.list_feeds().await?;
    if feeds.is_empty() {
        writeln!(out, "No feeds yet")?;
        return Ok(());
    }
    for feed in feeds {
        writeln!(out, "* {} ({}) added by {}", feed.name, feed.url, feed.owner_name)?;
    }
    Ok(())
}

pub async fn follow<W: Write>(ctx: &AppContext, user: &User, url: &str, out: &mut W) -> Result<(), Error> {
    let feed = ctx.db.get_feed_by_url(url.trim()).await?;
    let row = ctx.db.create_follow(user.id, feed.id).await?;
    writeln!(out, "{} now follows {}", row.user_name, row.feed_name)?;
    Ok(())
}

pub async fn following<W: Write>(ctx: &AppContext, user: &User, out: &mut W) -> Result<(), Error> {
    let follows = ctx.db.list_follows_for_user(user.id).await?;
    if follows.is_empty() {
        writeln!(out, "{} is not following any feeds", user.name)?;
        return Ok(());
    }
    for followed in follows {
        writeln!(out, "* {} ({})", followed.feed_name, followed.feed_url)?;
    }
    Ok(())
}

pub async fn unfollow<W: Write>(ctx: &AppContext, user: &User, url: &str, out: &mut W) -> Result<(), Error> {
    let url = url.trim();
    if !ctx.db.delete_follow(user.id, url).await? {
        return Err(StoreError::not_found("follow", url).into());
    }
    writeln!(out, "{} unfollowed {}", user.name, url)?;
    Ok(())
}

// ============================================================================
// Browse
// ============================================================================

pub async fn browse<W: Write>(
    ctx: &AppContext,
    user: &User,
    limit: Option<u32>,
    out: &mut W,
) -> Result<(), Error> {
    let limit = limit.unwrap_or(ctx.config.browse_limit);
    let posts = ctx.db.list_posts_for_user(user.id, limit).await?;

    writeln!(out, "Found {} posts for user {}:", posts.len(), user.name)?;
    for post in posts {
        let date = post
            .published_at
            .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
            .map(|dt| dt.format("%a %b %e %Y").to_string())
            .unwrap_or_else(|| "undated".to_string());

        writeln!(out, "{} from {}", date, strip_control_chars(&post.feed_name))?;
        writeln!(out, "--- {} ---", strip_control_chars(&post.title))?;
        if let Some(description) = &post.description {
            let description = strip_control_chars(description);
            writeln!(out, "    {}", truncate_to_width(&description, DESCRIPTION_WIDTH))?;
        }
        writeln!(out, "Link: {}", strip_control_chars(&post.url))?;
        writeln!(out, "=====================================")?;
    }
    Ok(())
}
