//! snapguard: encrypted snapshot store and startup data-directory guard
//!
//! Commands:
//!   initialize                      - validate the data directory, restore the latest snapshot if unusable
//!   snapshot list [--json]          - list stored snapshots, oldest first
//!   snapshot save <file>            - store a file as a new snapshot
//!   snapshot fetch <name> <out>     - decrypt a stored snapshot to a file (or `-` for stdout)
//!   snapshot delete <name>          - remove a stored snapshot
//!   config show                     - display the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use snapguard_core::config::{
    SnapguardConfig, ENV_DATA_ENCRYPTION_KEY, ENV_STORAGE_CONTAINER, ENV_STORAGE_PROVIDER,
};
use snapguard_core::{Snapshot, SnapshotKind};
use snapguard_crypto::{CipherScheme, MasterSecret};
use snapguard_init::{InitConfig, Initializer};
use snapguard_storage::{
    decorate, BackendFactory, BackendSpec, DefaultBackendFactory, SnapStore, SnapStoreDecorator,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "snapguard",
    version,
    about = "Encrypted snapshot store and data directory guard",
    long_about = "snapguard: keep encrypted snapshots in local or object storage and \
                  rebuild the data directory from the newest one when it cannot be trusted"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(
        long,
        short = 'c',
        env = "SNAPGUARD_CONFIG",
        default_value = "/etc/snapguard/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "SNAPGUARD_LOG")]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "SNAPGUARD_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Storage provider (local, s3)
    #[arg(long, env = ENV_STORAGE_PROVIDER)]
    provider: Option<String>,

    /// Storage container: bucket name, or root directory for local storage
    #[arg(long, env = ENV_STORAGE_CONTAINER)]
    container: Option<String>,

    /// Data directory to validate and restore into
    #[arg(long, env = "SNAPGUARD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// At-rest encryption scheme (sealed, legacy)
    #[arg(long, env = "DATA_ENCRYPTION_SCHEME")]
    scheme: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the data directory; wipe and restore the newest snapshot if unusable
    Initialize,

    /// Snapshot management
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum SnapshotAction {
    /// List stored snapshots, oldest first
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Store a local file as a new snapshot
    Save {
        /// File holding the snapshot payload
        file: PathBuf,
        /// Snapshot kind (full, incr)
        #[arg(long, default_value = "full")]
        kind: SnapshotKind,
        /// First revision covered by the snapshot
        #[arg(long, default_value_t = 0)]
        start_revision: u64,
        /// Last revision covered by the snapshot
        #[arg(long, default_value_t = 0)]
        last_revision: u64,
    },

    /// Fetch (and decrypt) a stored snapshot
    Fetch {
        /// Snapshot name or path (Backup-<t>/<name>)
        name: String,
        /// Output file, `-` for stdout
        out: PathBuf,
    },

    /// Delete a stored snapshot
    Delete {
        /// Snapshot name or path (Backup-<t>/<name>)
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration (defaults + file + overrides)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    apply_overrides(&mut config, &cli);

    let log_format = match &cli.log_format {
        Some(f) => f.clone(),
        None => parse_log_format(&config.log.format),
    };
    init_logging(&config.log.level, &log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "snapguard starting"
    );

    match cli.command {
        Commands::Initialize => cmd_initialize(&config),
        Commands::Snapshot { action } => match action {
            SnapshotAction::List { json } => cmd_snapshot_list(&config, json),
            SnapshotAction::Save {
                file,
                kind,
                start_revision,
                last_revision,
            } => cmd_snapshot_save(&config, &file, kind, start_revision, last_revision),
            SnapshotAction::Fetch { name, out } => cmd_snapshot_fetch(&config, &name, &out),
            SnapshotAction::Delete { name } => cmd_snapshot_delete(&config, &name),
        },
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

fn load_config(path: &Path) -> Result<SnapguardConfig> {
    SnapguardConfig::load(path).with_context(|| format!("loading config: {}", path.display()))
}

/// Command-line flags and their environment variables win over the file.
fn apply_overrides(config: &mut SnapguardConfig, cli: &Cli) {
    if let Some(level) = &cli.log {
        config.log.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.log.format = match format {
            LogFormat::Json => "json".into(),
            LogFormat::Text => "text".into(),
        };
    }
    if let Some(provider) = &cli.provider {
        config.storage.provider = provider.clone();
    }
    if let Some(container) = &cli.container {
        config.storage.container = Some(container.clone());
    }
    if let Some(data_dir) = &cli.data_dir {
        config.restore.data_dir = data_dir.clone();
    }
    if let Some(scheme) = &cli.scheme {
        config.encryption.scheme = scheme.clone();
    }
}

fn parse_log_format(s: &str) -> LogFormat {
    if s.eq_ignore_ascii_case("json") {
        LogFormat::Json
    } else {
        LogFormat::Text
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so `snapshot fetch <name> -` can stream to stdout.
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
}

/// Master secret from the environment only; never from the config file.
fn load_secret() -> Option<MasterSecret> {
    let secret = MasterSecret::from_env(ENV_DATA_ENCRYPTION_KEY);
    if secret.is_none() {
        warn!(
            "{ENV_DATA_ENCRYPTION_KEY} is not set: snapshots are stored and read \
             WITHOUT encryption"
        );
    }
    secret
}

fn cipher_scheme(config: &SnapguardConfig) -> Result<CipherScheme> {
    config
        .encryption
        .scheme
        .parse()
        .context("invalid [encryption] scheme")
}

// ── Snapshot store from configuration ─────────────────────────────────────────

fn open_store(config: &SnapguardConfig) -> Result<SnapStoreDecorator<Box<dyn SnapStore>>> {
    let scheme = cipher_scheme(config)?;
    let spec = BackendSpec::resolve(&config.storage).context("invalid storage configuration")?;
    let raw = DefaultBackendFactory
        .build(&spec)
        .context("failed to create snapstore from configured storage provider")?;
    Ok(decorate(raw, load_secret(), scheme))
}

/// Look a snapshot up by name, or by its `Backup-<t>/<name>` path.
fn find_snapshot(store: &dyn SnapStore, name: &str) -> Result<Snapshot> {
    let list = store.list().context("listing snapshots")?;
    list.iter()
        .find(|s| s.snap_name == name || s.path() == name)
        .cloned()
        .with_context(|| format!("snapshot not found: {name}"))
}

// ── `snapguard initialize` ────────────────────────────────────────────────────

fn cmd_initialize(config: &SnapguardConfig) -> Result<()> {
    let init = InitConfig {
        data_dir: config.restore.data_dir.clone(),
        storage: config.storage.clone(),
        scheme: cipher_scheme(config)?,
    };
    Initializer::new(init, load_secret())
        .initialize()
        .map_err(|e| {
            let phase = e.phase();
            anyhow::Error::new(e).context(format!("initialization failed during {phase}"))
        })?;

    println!(
        "data directory ready: {}",
        config.restore.data_dir.display()
    );
    Ok(())
}

// ── `snapguard snapshot ...` ──────────────────────────────────────────────────

fn cmd_snapshot_list(config: &SnapguardConfig, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let list = store.list().context("listing snapshots")?;

    if json {
        let rendered = serde_json::to_string_pretty(&list).context("serializing snapshot list")?;
        println!("{rendered}");
        return Ok(());
    }

    if list.is_empty() {
        println!("no snapshots");
        return Ok(());
    }
    println!(
        "{:<6} {:>12} {:>12} {:>12}  PATH",
        "KIND", "START", "LAST", "CREATED"
    );
    for snap in &list {
        println!(
            "{:<6} {:>12} {:>12} {:>12}  {}",
            snap.kind.as_str(),
            snap.start_revision,
            snap.last_revision,
            snap.created_on,
            snap.path()
        );
    }
    Ok(())
}

fn cmd_snapshot_save(
    config: &SnapguardConfig,
    file: &Path,
    kind: SnapshotKind,
    start_revision: u64,
    last_revision: u64,
) -> Result<()> {
    anyhow::ensure!(
        last_revision >= start_revision,
        "--last-revision ({last_revision}) must not be below --start-revision ({start_revision})"
    );

    let store = open_store(config)?;
    let source = std::fs::File::open(file)
        .with_context(|| format!("opening snapshot source: {}", file.display()))?;
    let snapshot = Snapshot::new(kind, start_revision, last_revision);

    store
        .save(&snapshot, Box::new(source))
        .with_context(|| format!("saving snapshot {}", snapshot.snap_name))?;

    println!("saved {}", snapshot.path());
    Ok(())
}

fn cmd_snapshot_fetch(config: &SnapguardConfig, name: &str, out: &Path) -> Result<()> {
    let store = open_store(config)?;
    let snapshot = find_snapshot(&store, name)?;
    let mut reader = store
        .fetch(&snapshot)
        .with_context(|| format!("fetching snapshot {}", snapshot.snap_name))?;

    if out == Path::new("-") {
        let mut stdout = io::stdout().lock();
        io::copy(&mut reader, &mut stdout).context("writing snapshot to stdout")?;
        stdout.flush()?;
        return Ok(());
    }

    // Write beside the destination and rename, so a failed verification
    // never leaves a partial file under the requested name.
    let dir = match out.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = tempfile_in(&dir)?;
    let bytes = io::copy(&mut reader, tmp.as_file_mut())
        .with_context(|| format!("reading snapshot {}", snapshot.snap_name))?;
    tmp.persist(out)
        .with_context(|| format!("writing {}", out.display()))?;

    println!("fetched {} ({bytes} bytes) -> {}", snapshot.path(), out.display());
    Ok(())
}

fn tempfile_in(dir: &Path) -> Result<tempfile::NamedTempFile> {
    tempfile::Builder::new()
        .prefix(".snapguard-")
        .tempfile_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))
}

fn cmd_snapshot_delete(config: &SnapguardConfig, name: &str) -> Result<()> {
    let store = open_store(config)?;
    let snapshot = find_snapshot(&store, name)?;
    store
        .delete(&snapshot)
        .with_context(|| format!("deleting snapshot {}", snapshot.snap_name))?;
    println!("deleted {}", snapshot.path());
    Ok(())
}

// ── `snapguard config show` ───────────────────────────────────────────────────

fn cmd_config_show(config: &SnapguardConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    let key_state = match MasterSecret::from_env(ENV_DATA_ENCRYPTION_KEY) {
        Some(_) => "set",
        None => "unset, encryption disabled",
    };
    println!("# {ENV_DATA_ENCRYPTION_KEY}: {key_state}");
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
