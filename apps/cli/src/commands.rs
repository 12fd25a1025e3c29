//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use gitblog_core::{ContentIndexBuilder, ContentTypeResolver, SyncOutcome, SyncService};
use gitblog_shared::{BlogSettings, Configuration, ContentSnapshot, EntryTag};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// gitblog: blog content, mirrored from git.
#[derive(Parser)]
#[command(
    name = "gitblog",
    version,
    about = "Mirror a git content repository and build publishable blog snapshots.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Override file to layer over the bundled config (skips the container
    /// home lookup).
    #[arg(long, global = true, env = "GITBLOG_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Start the mirror and keep pulling on schedule until Ctrl-C.
    Run,

    /// Bring the mirror up, pull once, and print the resulting snapshot.
    Sync,

    /// Build a snapshot from the current working copy without fetching.
    Snapshot {
        /// Print the snapshot as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show the display and URL forms of a tag.
    Tag {
        /// Tag as authored.
        tag: String,
    },

    /// Resolve the media type for a file extension.
    ContentType {
        /// Extension, with or without the leading dot.
        extension: String,

        /// Returned when the extension is not configured.
        #[arg(long, default_value = "application/octet-stream")]
        fallback: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Print the merged configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "gitblog=info",
        1 => "gitblog=debug",
        _ => "gitblog=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = Arc::new(load_config(cli.config.as_deref())?);

    match cli.command {
        Command::Run => cmd_run(&config).await,
        Command::Sync => cmd_sync(&config).await,
        Command::Snapshot { json } => cmd_snapshot(&config, json).await,
        Command::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(&config),
        },
        Command::Tag { tag } => {
            cmd_tag(&tag);
            Ok(())
        }
        Command::ContentType {
            extension,
            fallback,
        } => {
            let resolver = ContentTypeResolver::new(Arc::clone(&config));
            println!("{}", resolver.resolve(&extension, &fallback));
            Ok(())
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Configuration> {
    let config = match path {
        Some(path) => Configuration::load_with_override(path),
        None => Configuration::load(),
    };
    config.wrap_err("failed to load configuration")
}

fn settings(config: &Configuration) -> Result<Arc<BlogSettings>> {
    let settings = BlogSettings::from_config(config).wrap_err("incomplete configuration")?;
    Ok(Arc::new(settings))
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_run(config: &Configuration) -> Result<()> {
    let settings = settings(config)?;
    if settings.dev_mode {
        info!("dev mode enabled");
    }

    let service = Arc::new(SyncService::start(settings).await?);
    let scheduler = service.spawn_scheduler();

    info!(
        title = %service.settings().title,
        entries = service.snapshot().entry_count(),
        "serving content; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .wrap_err("failed to listen for Ctrl-C")?;

    info!("shutting down");
    scheduler.shutdown().await;
    Ok(())
}

async fn cmd_sync(config: &Configuration) -> Result<()> {
    let settings = settings(config)?;
    let service = SyncService::start(settings).await?;

    match service.sync_once().await? {
        SyncOutcome::Updated { revision, sequence } => {
            println!("Updated to {revision} (sync #{sequence})");
        }
        SyncOutcome::Unchanged => println!("Already up to date"),
        SyncOutcome::Skipped => println!("Another sync is in progress"),
    }

    print_snapshot(&service.snapshot());
    Ok(())
}

async fn cmd_snapshot(config: &Configuration, json: bool) -> Result<()> {
    let settings = settings(config)?;
    let builder = ContentIndexBuilder::new(settings.title.clone(), settings.content.clone());
    let workdir = settings.clone.path.clone();

    let snapshot = tokio::task::spawn_blocking(move || builder.build(&workdir, 0))
        .await
        .wrap_err("snapshot task failed")?
        .wrap_err_with(|| {
            format!("failed to build snapshot from {}", settings.clone.path.display())
        })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_snapshot(&snapshot);
    }
    Ok(())
}

fn cmd_config_show(config: &Configuration) -> Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn cmd_tag(tag: &str) {
    let tag = EntryTag::new(tag);
    println!("display:             {}", tag.display_text());
    println!("url-encoded:         {}", tag.url_encoded_text());
    println!("encoded-and-escaped: {}", tag.encoded_and_escaped_text());
}

fn print_snapshot(snapshot: &ContentSnapshot) {
    println!(
        "Snapshot #{} at {}",
        snapshot.sequence,
        snapshot.revision.as_deref().unwrap_or("(no revision)")
    );

    println!("Entries ({}):", snapshot.entry_count());
    for entry in snapshot.entries() {
        let tags: Vec<_> = entry.tags.iter().map(EntryTag::as_str).collect();
        println!(
            "  {}  {:<30} {}  [{}]",
            entry.provenance.short_revision(),
            entry.name,
            entry.title,
            tags.join(", ")
        );
    }

    println!("Pages ({}):", snapshot.page_count());
    for page in snapshot.pages() {
        println!(
            "  {}  {:<30} {}",
            page.provenance.short_revision(),
            page.name,
            page.title
        );
    }
}
