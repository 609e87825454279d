//! `tesseractl`: warm and inspect a Tessera thumbnail cache from the shell.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tessera_core::{
    CacheConfig, ConfigLoader, InMemoryMessageStore, StorageProfile,
    ThumbnailCache,
    config::{ConfigLoad, FileConfig},
    infra::fetch::NoSniff,
};
use tessera_model::{CorrelationIds, TaskKind, ThumbnailRequest};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tesseractl")]
#[command(about = "Warm and inspect the Tessera media thumbnail cache")]
struct Cli {
    /// Path to a TOML config file (overrides TESSERA_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to a .env file loaded before reading TESSERA_* variables
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download URLs into the cache and print where each one landed
    Fetch(FetchArgs),
    /// Print the cache address a URL maps to without downloading it
    Address(AddressArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(ClapArgs, Debug, Clone)]
struct StorageArgs {
    /// Cache owner; selects the userData/<user> folder
    #[arg(long)]
    user_id: Option<String>,

    /// Base directory holding userData/ (overrides the platform default)
    #[arg(long)]
    storage_root: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
struct FetchArgs {
    /// Remote URLs to cache
    #[arg(required = true)]
    urls: Vec<String>,

    /// Media kind: image, video or emoji
    #[arg(long, default_value = "image")]
    kind: TaskKind,

    /// Owning message id; its body is patched with the local path and
    /// printed once every url has been processed
    #[arg(long, default_value = "")]
    message_id: String,

    /// Owning room id
    #[arg(long, default_value = "")]
    room_id: String,

    /// Concurrent download limit (overrides config)
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Print one JSON object per URL instead of plain text
    #[arg(long, default_value_t = false)]
    json: bool,

    #[command(flatten)]
    storage: StorageArgs,
}

#[derive(ClapArgs, Debug)]
struct AddressArgs {
    /// Remote URL to address
    url: String,

    /// Media kind: image, video or emoji
    #[arg(long, default_value = "image")]
    kind: TaskKind,

    /// Skip remote type detection for URLs without an extension
    #[arg(long, default_value_t = false)]
    no_sniff: bool,

    #[command(flatten)]
    storage: StorageArgs,
}

#[derive(Debug, Serialize)]
struct FetchReport<'a> {
    url: &'a str,
    path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tessera_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let loaded = load_config(&cli)?;
    if loaded.env_file_loaded {
        debug!("loaded .env file");
    }
    if let Some(path) = &loaded.config_path {
        debug!(path = %path.display(), "using config file");
    }

    match cli.command {
        Command::Fetch(args) => fetch(loaded.config, args).await,
        Command::Address(args) => address(loaded.config, args).await,
        Command::Config => print_config(&loaded),
    }
}

fn load_config(cli: &Cli) -> Result<ConfigLoad> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &cli.env_file {
        loader = loader.with_env_file(path);
    }
    loader.load().context("failed to load configuration")
}

fn apply_storage(config: &mut CacheConfig, args: &StorageArgs) {
    if let Some(user) = &args.user_id {
        config.storage.user_id = user.clone();
    }
    if let Some(root) = &args.storage_root {
        match config.storage.profile {
            StorageProfile::Desktop => config.storage.resource_root = Some(root.clone()),
            StorageProfile::Mobile => config.storage.app_data_root = Some(root.clone()),
        }
    }
}

async fn fetch(mut config: CacheConfig, args: FetchArgs) -> Result<()> {
    apply_storage(&mut config, &args.storage);
    if let Some(limit) = args.max_concurrency {
        config.max_concurrency = limit;
    }

    let messages = Arc::new(InMemoryMessageStore::new());
    let track_message = !args.message_id.is_empty();
    if track_message {
        messages.insert(&args.message_id, &args.room_id, json!({}));
    }

    let cache = ThumbnailCache::builder(config)
        .message_store(messages.clone())
        .build()
        .context("failed to start thumbnail cache")?;
    info!(
        root = %cache.store().base_root().display(),
        count = args.urls.len(),
        "warming cache"
    );

    let correlation =
        CorrelationIds::new(args.message_id.clone(), args.room_id.clone());
    let completions = args.urls.iter().map(|url| {
        cache.enqueue_thumbnail(ThumbnailRequest::new(
            url.clone(),
            args.kind,
            correlation.clone(),
        ))
    });
    let results = join_all(completions).await;

    let mut failures = 0usize;
    for (url, path) in args.urls.iter().zip(&results) {
        if path.is_none() {
            failures += 1;
        }
        if args.json {
            let report = FetchReport {
                url,
                path: path.as_ref().map(|p| p.display().to_string()),
            };
            println!("{}", serde_json::to_string(&report)?);
        } else {
            match path {
                Some(path) => println!("{url} -> {}", path.display()),
                None => println!("{url} -> (remote)"),
            }
        }
    }

    cache.wait_idle().await;
    if track_message && let Some(message) = messages.get(&args.message_id) {
        if args.json {
            let report = json!({
                "message_id": args.message_id,
                "room_id": message.room_id,
                "body": message.body,
            });
            println!("{report}");
        } else {
            println!("message {} -> {}", args.message_id, message.body);
        }
    }

    if failures > 0 {
        bail!("{failures} of {} urls could not be cached", results.len());
    }
    Ok(())
}

async fn address(mut config: CacheConfig, args: AddressArgs) -> Result<()> {
    apply_storage(&mut config, &args.storage);

    let mut builder = ThumbnailCache::builder(config);
    if args.no_sniff {
        builder = builder.sniffer(Arc::new(NoSniff));
    }
    let cache = builder.build().context("failed to start thumbnail cache")?;

    let request = ThumbnailRequest::new(
        args.url.clone(),
        args.kind,
        CorrelationIds::default(),
    );
    let (address, relative) = cache.address_for(&request).await;
    println!("url:       {}", args.url);
    println!("key:       {}", address.cache_key);
    println!("extension: {}", address.extension);
    println!("relative:  {}", relative.display());
    println!("absolute:  {}", cache.store().to_absolute(&relative).display());
    Ok(())
}

fn print_config(loaded: &ConfigLoad) -> Result<()> {
    match &loaded.config_path {
        Some(path) => println!("# source: {}", path.display()),
        None => println!("# source: defaults + environment"),
    }
    let rendered = toml::to_string_pretty(&FileConfig::from(&loaded.config))
        .context("failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}
