use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hoyolab_news::config::Config;
use hoyolab_news::models::{FeedItemCategory, Game, Language};
use hoyolab_news::sync::{self, FetchPolicy};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

/// Get the default config file path (~/.config/hoyolab-news/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("hoyolab-news")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(name = "hoyolab-news", about = "Fetch HoYoLAB news posts as JSON")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Response language (e.g. en-us, ja-jp), overrides the config file
    #[arg(short, long, global = true)]
    language: Option<Language>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch one post as a feed item
    Post { game: Game, post_id: u64 },

    /// Fetch change-detection metadata for the newest posts of a category
    Metas {
        game: Game,
        category: FeedItemCategory,
        #[arg(long, default_value_t = 5)]
        page_size: usize,
    },

    /// Fetch the newest posts of every source in the config file
    Poll {
        /// fail-fast or collect-all, overrides the config file
        #[arg(long)]
        policy: Option<FetchPolicy>,
    },
}

/// Writes one JSON document per line to stdout.
fn print_json_lines<T: Serialize>(values: &[T]) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for value in values {
        serde_json::to_writer(&mut out, value).context("Failed to serialize output")?;
        writeln!(out).context("Failed to write to stdout")?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };

    // First poll without a config file: write a starter file and stop
    if matches!(args.command, Command::Poll { .. }) && !config_path.exists() {
        Config::write_default(&config_path).with_context(|| {
            format!("Failed to create config file at {}", config_path.display())
        })?;
        println!("Default config file created at {:?}!", config_path);
        return Ok(());
    }

    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if let Some(language) = args.language {
        config.language = language;
    }

    let session = reqwest::Client::new();

    match args.command {
        Command::Post { game, post_id } => {
            let api = config.client_for(game)?;
            let item = api
                .get_feed_item(&session, post_id)
                .await
                .with_context(|| format!("Failed to fetch post {post_id}"))?;
            print_json_lines(&[item])?;
        }
        Command::Metas {
            game,
            category,
            page_size,
        } => {
            let api = config.client_for(game)?;
            let metas = api
                .get_latest_item_metas(&session, category, page_size)
                .await
                .with_context(|| format!("Failed to fetch {category} metadata for {game}"))?;
            print_json_lines(&metas)?;
        }
        Command::Poll { policy } => {
            if let Some(policy) = policy {
                config.policy = policy;
            }
            if config.sources.is_empty() {
                eprintln!("Error: No sources configured in {}", config_path.display());
                eprintln!();
                eprintln!("Add at least one source, for example:");
                eprintln!("  [[sources]]");
                eprintln!("  game = \"genshin\"");
                eprintln!("  categories = [\"notices\", \"info\"]");
                std::process::exit(1);
            }

            let mut failed_sources = 0;
            for source in &config.sources {
                let api = config.client_for(source.game)?;
                let options = config.refresh_options(source);

                match sync::refresh(&api, &session, &source.categories, Vec::new(), options).await {
                    Ok(report) => {
                        for (post_id, e) in &report.failures {
                            tracing::warn!(game = %source.game, post_id, error = %e, "Skipped post");
                        }
                        print_json_lines(&report.items)?;
                    }
                    Err(e) => {
                        // One failing game should not hide the others
                        tracing::error!(
                            game = %source.game,
                            kind = ?e.kind(),
                            retryable = e.is_retryable(),
                            error = %e,
                            "Poll failed for source"
                        );
                        failed_sources += 1;
                    }
                }
            }

            if failed_sources == config.sources.len() {
                anyhow::bail!("Poll failed for every configured source");
            }
        }
    }

    Ok(())
}
