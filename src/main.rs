use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use feedwatch::{Config, FeedEvent, FeedWatcher, PollOutcome};

#[derive(Parser, Debug)]
#[command(name = "feedwatch", about = "Watch RSS and Atom feeds for new items")]
struct Args {
    /// TOML config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Feed URL to watch (repeatable, added to the config's feeds)
    #[arg(long = "feed", value_name = "URL")]
    feeds: Vec<String>,

    /// Poll interval in milliseconds
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,

    /// Keep at most this many items per feed
    #[arg(long, value_name = "N")]
    item_limit: Option<usize>,

    /// Look up Open Graph images for items without an image thumbnail
    #[arg(long)]
    extra_images: bool,

    /// Print new items as JSON lines
    #[arg(long)]
    json: bool,
}

impl Args {
    fn into_config(self) -> Result<(Config, bool)> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => Config::default(),
        };

        config.feeds.extend(self.feeds);
        if let Some(ms) = self.interval_ms {
            config.update_interval_ms = ms;
        }
        if let Some(limit) = self.item_limit {
            config.item_limit = limit;
        }
        if self.extra_images {
            config.extra_images = true;
        }
        Ok((config, self.json))
    }
}

fn print_event(event: &FeedEvent, json: bool) -> Result<()> {
    match event {
        FeedEvent::NewItem { item, feed } if json => {
            let line = serde_json::json!({ "feed": feed.source, "item": item });
            println!("{}", serde_json::to_string(&line)?);
        }
        FeedEvent::NewItem { item, feed } => {
            println!(
                "[{}] {}\n    {}",
                feed.title.as_deref().unwrap_or(&feed.source),
                item.title.as_deref().unwrap_or("(untitled)"),
                item.link.as_deref().unwrap_or("-"),
            );
        }
        FeedEvent::Error(err) => eprintln!("error: {err}"),
        FeedEvent::Updating => tracing::debug!("Update cycle starting"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (config, json) = Args::parse().into_config()?;
    if config.feeds.is_empty() {
        eprintln!("Error: no feeds to watch");
        eprintln!();
        eprintln!("Pass one or more feeds on the command line:");
        eprintln!("  feedwatch --feed https://example.com/feed.xml");
        eprintln!();
        eprintln!("Or list them under `feeds` in a config file given with --config.");
        std::process::exit(1);
    }

    let watcher = FeedWatcher::new(&config).context("Failed to create HTTP client")?;
    let mut events = watcher.events().subscribe();

    let results = watcher.launch().await;
    let baselines = results
        .iter()
        .filter(|r| matches!(r.outcome, PollOutcome::Baseline { .. }))
        .count();
    println!(
        "Watching {} feeds ({} loaded), checking every {}s",
        watcher.feeds().len(),
        baselines,
        config.update_interval().as_secs()
    );

    loop {
        tokio::select! {
            Some(event) = events.recv() => print_event(&event, json)?,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    watcher.scheduler().stop();
    println!("Goodbye!");
    Ok(())
}
