use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use memecast::config::Config;
use memecast::delivery::{DeliveryEngine, MediaResolver, DEFAULT_CATEGORY};
use memecast::ingest::{self, meme, reddit, IngestReport};
use memecast::storage::{Database, DatabaseError, SubscriptionOutcome};
use memecast::transport::TelegramClient;

/// Get the config directory path (~/.config/memecast/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("memecast"))
}

#[derive(Parser, Debug)]
#[command(
    name = "memecast",
    about = "Fan out memes and posts to subscribed Telegram channels"
)]
struct Args {
    /// Config file (default: ~/.config/memecast/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deliver the next unposted item (highest priority, then oldest)
    PostNext,
    /// Deliver one item by id
    Deliver { id: i64 },
    /// Fetch new content from an upstream source
    Fetch {
        #[command(subcommand)]
        source: FetchSource,
    },
    /// Subscribe a channel to a category
    Subscribe {
        channel_id: String,
        #[arg(long, default_value = DEFAULT_CATEGORY)]
        category: String,
        /// Human-readable channel name
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove a channel's subscription to a category
    Unsubscribe {
        channel_id: String,
        #[arg(long, default_value = DEFAULT_CATEGORY)]
        category: String,
    },
    /// Set the queue priority of an item (higher goes first)
    Prioritize { id: i64, priority: i64 },
    /// List stored content or subscriptions
    List {
        #[command(subcommand)]
        target: ListTarget,
    },
    /// Post on a fixed interval until Ctrl-C
    Run,
}

#[derive(Subcommand, Debug)]
enum FetchSource {
    /// Hot posts from a subreddit
    Reddit {
        #[arg(long)]
        subreddit: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        category: Option<String>,
    },
    /// One random meme
    Meme {
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ListTarget {
    Content {
        /// Only posted items
        #[arg(long, conflicts_with = "unposted")]
        posted: bool,
        /// Only items still in the queue
        #[arg(long)]
        unposted: bool,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    Subscriptions {
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = match &config.database {
        Some(path) => PathBuf::from(path),
        None => {
            ensure_private_dir(&config_dir)?;
            config_dir.join("memecast.db")
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: the database at {} is locked by another process.", db_path.display());
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let client = http_client()?;

    match args.command {
        Command::PostNext => {
            let engine = build_engine(&config, &db, &client)?;
            match engine.post_next().await? {
                Some(posted) => print_json(&posted)?,
                None => println!("Nothing to post."),
            }
        }
        Command::Deliver { id } => {
            let engine = build_engine(&config, &db, &client)?;
            print_json(&engine.deliver(id).await)?;
        }
        Command::Fetch { source } => {
            let report = match source {
                FetchSource::Reddit {
                    subreddit,
                    limit,
                    category,
                } => {
                    let mut settings = config.ingest.reddit.clone();
                    if let Some(subreddit) = subreddit {
                        settings.subreddit = subreddit;
                    }
                    if let Some(limit) = limit {
                        settings.limit = limit;
                    }
                    if category.is_some() {
                        settings.category = category;
                    }
                    fetch_reddit(&db, &client, &settings, config.ingest.title_max_chars).await?
                }
                FetchSource::Meme { category } => {
                    let category = category.or_else(|| config.ingest.meme.category.clone());
                    let items = meme::fetch_random_meme(&client, &config.ingest.meme.base_url)
                        .await
                        .context("Failed to fetch meme")?;
                    ingest::store_items(
                        &db,
                        &items.into_iter().collect::<Vec<_>>(),
                        category.as_deref(),
                        config.ingest.title_max_chars,
                    )
                    .await?
                }
            };
            print_json(&report)?;
        }
        Command::Subscribe {
            channel_id,
            category,
            name,
        } => {
            let outcome = db
                .add_subscription(&channel_id, name.as_deref(), &category)
                .await
                .context("Failed to add subscription")?;
            match outcome {
                SubscriptionOutcome::Added => {
                    println!("Subscribed {} to '{}'.", channel_id, category.trim())
                }
                SubscriptionOutcome::AlreadySubscribed => {
                    println!("{} is already subscribed to '{}'.", channel_id, category.trim())
                }
            }
        }
        Command::Unsubscribe {
            channel_id,
            category,
        } => {
            if db
                .remove_subscription(&channel_id, &category)
                .await
                .context("Failed to remove subscription")?
            {
                println!("Unsubscribed {} from '{}'.", channel_id, category.trim());
            } else {
                println!("{} was not subscribed to '{}'.", channel_id, category.trim());
            }
        }
        Command::Prioritize { id, priority } => {
            if !db.set_priority(id, priority).await? {
                anyhow::bail!("No content item with id {id}");
            }
            println!("Item {id} priority set to {priority}.");
        }
        Command::List { target } => match target {
            ListTarget::Content {
                posted,
                unposted,
                limit,
            } => {
                let filter = match (posted, unposted) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                };
                print_json(&db.list_content(filter, limit).await?)?;
            }
            ListTarget::Subscriptions { limit } => {
                print_json(&db.list_subscriptions(limit).await?)?;
            }
        },
        Command::Run => {
            let engine = build_engine(&config, &db, &client)?;
            run_schedule(&config, &db, &client, &engine).await;
        }
    }

    Ok(())
}

/// Fallback budget for any request that does not set its own
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

fn build_engine(config: &Config, db: &Database, client: &reqwest::Client) -> Result<DeliveryEngine> {
    let token = config.bot_token().ok_or_else(|| {
        anyhow::anyhow!("No bot token configured: set BOT_TOKEN or telegram.bot_token")
    })?;

    let transport = TelegramClient::new(client.clone(), token)
        .with_base_url(config.telegram.api_base_url.as_str())
        .with_timeout(Duration::from_secs(config.telegram.request_timeout_secs));
    let media = MediaResolver::new(client.clone(), config.media_timeout())
        .with_max_bytes(config.delivery.max_media_bytes);

    Ok(DeliveryEngine::new(
        db.clone(),
        Arc::new(db.clone()),
        Arc::new(transport),
        media,
        config.delivery_config(),
    ))
}

async fn fetch_reddit(
    db: &Database,
    client: &reqwest::Client,
    settings: &memecast::config::RedditConfig,
    title_max_chars: usize,
) -> Result<IngestReport> {
    let items = reddit::fetch_hot(client, &settings.base_url, &settings.subreddit, settings.limit)
        .await
        .with_context(|| format!("Failed to fetch r/{}", settings.subreddit))?;
    ingest::store_items(db, &items, settings.category.as_deref(), title_max_chars).await
}

/// Post every `post_interval_minutes`, fetch every `fetch_interval_minutes`
/// (when non-zero), until Ctrl-C. Job failures are logged and the loop goes on.
async fn run_schedule(
    config: &Config,
    db: &Database,
    client: &reqwest::Client,
    engine: &DeliveryEngine,
) {
    use tokio::time::{interval, MissedTickBehavior};

    let mut post_tick = interval(Duration::from_secs(config.schedule.post_interval_minutes * 60));
    post_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut fetch_tick = (config.schedule.fetch_interval_minutes > 0).then(|| {
        let mut tick = interval(Duration::from_secs(config.schedule.fetch_interval_minutes * 60));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick
    });

    tracing::info!(
        post_interval_minutes = config.schedule.post_interval_minutes,
        fetch_interval_minutes = config.schedule.fetch_interval_minutes,
        "Scheduler started"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested");
                break;
            }
            _ = post_tick.tick() => {
                match engine.post_next().await {
                    Ok(Some(posted)) => tracing::info!(
                        content_id = posted.item.id,
                        status = ?posted.result.status,
                        sent = posted.result.sent_count,
                        "Scheduled post done"
                    ),
                    Ok(None) => tracing::info!("Queue empty, nothing to post"),
                    Err(e) => tracing::error!(error = %format!("{e:#}"), "Scheduled post failed"),
                }
            }
            _ = async {
                match fetch_tick.as_mut() {
                    Some(tick) => { tick.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                if let Err(e) = fetch_reddit(db, client, &config.ingest.reddit, config.ingest.title_max_chars).await {
                    tracing::error!(error = %format!("{e:#}"), "Scheduled fetch failed");
                }
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

fn ensure_private_dir(dir: &std::path::Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).context("Failed to create config directory")?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }
    Ok(())
}
