use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use humansize::{format_size, BINARY};
use serde::Serialize;
use std::path::PathBuf;

use fetchsync::backend::{AdbDevice, DeviceBackend, DispatchRemote, MountedDevice, RcloneRemote};
use fetchsync::config::Config;
use fetchsync::eligibility::{eligible_files, eligible_for_all, EligibilityMode, EligibleFiles};
use fetchsync::logging;
use fetchsync::state::StateStore;
use fetchsync::sync::{
    PullResult, Puller, PushResult, Pusher, StreamOptions, StreamResult, Streamer, SyncMode,
    SyncReport, SyncRunner,
};

/// Pull media off a device and push it to remote destinations.
#[derive(Parser)]
#[command(name = "fetchsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration directory (holds config.toml and manifest.db)
    #[arg(global = true, long)]
    config_dir: Option<PathBuf>,

    /// Read from a mounted directory instead of adb
    #[arg(global = true, long, requires = "source_id")]
    mount: Option<PathBuf>,

    /// Source id recorded for files read from --mount
    #[arg(global = true, long)]
    source_id: Option<String>,

    /// More log output (repeatable)
    #[arg(global = true, short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(global = true, short, long)]
    quiet: bool,

    /// Print results as JSON
    #[arg(global = true, long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy new or changed files from the device into the sync directory
    Pull {
        /// Only this source (id or nickname)
        #[arg(short, long)]
        device: Option<String>,
    },

    /// Upload staged files to every configured destination
    Push,

    /// Pull and push file by file
    Stream {
        /// Only this source (id or nickname)
        #[arg(short, long)]
        device: Option<String>,

        /// Stage into a temporary directory; keep nothing that pushed fine
        #[arg(long)]
        skip_local: bool,

        /// Delete each local copy once every destination has it
        #[arg(long)]
        delete_after_push: bool,
    },

    /// Pull then push
    Sync {
        /// Only this source (id or nickname)
        #[arg(short, long)]
        device: Option<String>,

        /// Interleave per file without keeping local copies
        #[arg(long)]
        skip_local: bool,
    },

    /// Show per-source counts from the state store
    Status {
        /// Only this source (id or nickname)
        #[arg(short, long)]
        device: Option<String>,
    },

    /// List files that are safe to clean up on the device
    Eligible {
        /// Only this source (id or nickname)
        #[arg(short, long)]
        device: Option<String>,

        /// Uploaded to at least one destination instead of all of them
        #[arg(long)]
        any: bool,
    },

    /// List connected sources
    Devices {
        /// First run `adb connect` for every device with a Wi-Fi address
        #[arg(long)]
        connect: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose, cli.quiet) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let config_dir = match &cli.config_dir {
        Some(dir) => dir.clone(),
        None => Config::default_dir()?,
    };
    let config = Config::load_from(&config_dir).context("Failed to load configuration")?;
    let config_path = Config::path_in(&config_dir);
    if !config_path.exists() {
        config.save_to(&config_dir).context("Failed to write default configuration")?;
        eprintln!("Wrote default configuration to {}", config_path.display());
    }
    let store = StateStore::open_in_dir(&config_dir).context("Failed to open state store")?;

    let device: Box<dyn DeviceBackend> = match (&cli.mount, &cli.source_id) {
        (Some(root), Some(id)) => Box::new(MountedDevice::new(id.clone(), root.clone())),
        (Some(_), None) => bail!("--mount needs --source-id"),
        _ => Box::new(AdbDevice::new()),
    };
    let remote = DispatchRemote::new(RcloneRemote::new());
    let out = Output { json: cli.json };

    match cli.command {
        Commands::Pull { device: source } => {
            let puller = Puller::new(device.as_ref(), &store, &config);
            let results = match resolve_source(&config, source.as_deref()) {
                Some(id) => vec![puller.pull_source(&id)],
                None => puller.pull_all()?,
            };
            out.pulls(&config, &results)?;
        }
        Commands::Push => {
            require_destinations(&config)?;
            let results = Pusher::new(&remote, &store, &config).push_all();
            out.pushes(&results)?;
        }
        Commands::Stream {
            device: source,
            skip_local,
            delete_after_push,
        } => {
            require_destinations(&config)?;
            let options = StreamOptions {
                skip_local,
                delete_after_push,
            };
            let streamer = Streamer::new(device.as_ref(), &remote, &store, &config, options);
            let results = match resolve_source(&config, source.as_deref()) {
                Some(id) => vec![streamer.stream_source(&id)],
                None => streamer.stream_all()?,
            };
            out.streams(&config, &results)?;
        }
        Commands::Sync {
            device: source,
            skip_local,
        } => {
            require_destinations(&config)?;
            let mode = if skip_local {
                SyncMode::Interleaved
            } else {
                SyncMode::Batched
            };
            let source = resolve_source(&config, source.as_deref());
            let report = SyncRunner::new(device.as_ref(), &remote, &store, &config)
                .run(mode, source.as_deref())?;
            out.sync(&config, &report)?;
        }
        Commands::Status { device: source } => {
            let sources = match resolve_source(&config, source.as_deref()) {
                Some(id) => vec![id],
                None => store.sources()?,
            };
            out.status(&config, &store, &sources)?;
        }
        Commands::Eligible { device: source, any } => {
            let mode = if any {
                EligibilityMode::AnySynced
            } else {
                EligibilityMode::FullySynced
            };
            let listings = match resolve_source(&config, source.as_deref()) {
                Some(id) => vec![eligible_files(&store, &config, &id, mode)?],
                None => eligible_for_all(&store, &config, mode)?,
            };
            out.eligible(&config, &listings)?;
        }
        Commands::Devices { connect } => {
            if connect {
                connect_wifi_devices(&config);
            }
            let sources = device.connected_sources()?;
            if sources.is_empty() {
                println!("No devices connected");
            }
            for source in sources {
                let name = config.devices.display_name(&source.id);
                let state = if source.is_online() {
                    source.state.green()
                } else {
                    source.state.yellow()
                };
                println!(
                    "{:<24} {:<8} {:<6} {}",
                    name.bold(),
                    state,
                    source.connection.short_name(),
                    source.model.as_deref().unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}

/// Map a nickname from the device registry back to its source id.
fn resolve_source(config: &Config, name: Option<&str>) -> Option<String> {
    let name = name?;
    let id = config
        .devices
        .iter()
        .find(|(_, settings)| settings.nickname.as_deref() == Some(name))
        .map(|(id, _)| id)
        .unwrap_or(name);
    Some(id.to_string())
}

/// Port `adb tcpip` listens on by default.
const ADB_WIFI_PORT: u16 = 5555;

fn connect_wifi_devices(config: &Config) {
    let adb = AdbDevice::new();
    for (id, settings) in config.devices.iter() {
        let Some(ip) = settings.wifi_ip.as_deref() else {
            continue;
        };
        match adb.connect(ip, ADB_WIFI_PORT) {
            Ok(()) => println!("Connected {} at {ip}", config.devices.display_name(id)),
            Err(e) => eprintln!("{} {e}", "error:".red()),
        }
    }
}

fn require_destinations(config: &Config) -> Result<()> {
    if config.destinations.is_empty() {
        bail!("No destinations configured; add one to config.toml");
    }
    Ok(())
}

struct Output {
    json: bool,
}

impl Output {
    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn pulls(&self, config: &Config, results: &[PullResult]) -> Result<()> {
        if self.json {
            return self.print_json(results);
        }
        if results.is_empty() {
            println!("No devices connected");
        }
        for result in results {
            println!("{}", config.devices.display_name(&result.source_id).bold());
            println!("  pulled {}, skipped {}", result.pulled, result.skipped);
            print_errors(&result.errors);
        }
        Ok(())
    }

    fn pushes(&self, results: &[PushResult]) -> Result<()> {
        if self.json {
            return self.print_json(results);
        }
        for result in results {
            println!("{}", result.destination.bold());
            println!("  pushed {}, skipped {}", result.pushed, result.skipped);
            print_errors(&result.errors);
        }
        Ok(())
    }

    fn streams(&self, config: &Config, results: &[StreamResult]) -> Result<()> {
        if self.json {
            return self.print_json(results);
        }
        if results.is_empty() {
            println!("No devices connected");
        }
        for result in results {
            println!("{}", config.devices.display_name(&result.source_id).bold());
            println!(
                "  streamed {}, skipped {}, deleted {}, retained {}, resumed {}",
                result.streamed, result.skipped, result.deleted, result.retained, result.resumed
            );
            print_errors(&result.errors);
        }
        Ok(())
    }

    fn sync(&self, config: &Config, report: &SyncReport) -> Result<()> {
        if self.json {
            return self.print_json(report);
        }
        match report {
            SyncReport::Batched { pulls, pushes } => {
                println!("{}", "Pull".cyan().bold());
                self.pulls(config, pulls)?;
                println!("{}", "Push".cyan().bold());
                self.pushes(pushes)
            }
            SyncReport::Interleaved { streams } => self.streams(config, streams),
        }
    }

    fn status(&self, config: &Config, store: &StateStore, sources: &[String]) -> Result<()> {
        let destination_count = config.destinations.len();
        let mut rows = Vec::new();
        for source_id in sources {
            let stats = store.stats(source_id, destination_count)?;
            let size: u64 = store.records(source_id)?.iter().map(|r| r.size).sum();
            rows.push(StatusRow {
                source_id: source_id.clone(),
                name: config.devices.display_name(source_id).to_string(),
                total: stats.total,
                pulled: stats.pulled,
                fully_synced: stats.fully_synced,
                bytes: size,
            });
        }

        if self.json {
            return self.print_json(&rows);
        }
        if rows.is_empty() {
            println!("Nothing pulled yet");
        }
        for row in rows {
            println!(
                "{:<24} {} files ({}), {} pulled, {} synced to all {} destinations",
                row.name.bold(),
                row.total,
                format_size(row.bytes, BINARY),
                row.pulled,
                row.fully_synced.to_string().green(),
                destination_count
            );
        }
        Ok(())
    }

    fn eligible(&self, config: &Config, listings: &[EligibleFiles]) -> Result<()> {
        if self.json {
            return self.print_json(listings);
        }
        for listing in listings {
            println!(
                "{} {} files, {}",
                config.devices.display_name(&listing.source_id).bold(),
                listing.files.len(),
                format_size(listing.total_size(), BINARY)
            );
            for file in &listing.files {
                println!("  {:>10}  {}", format_size(file.size, BINARY), file.source_path);
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusRow {
    source_id: String,
    name: String,
    total: usize,
    pulled: usize,
    fully_synced: usize,
    bytes: u64,
}

fn print_errors(errors: &[String]) {
    for error in errors {
        eprintln!("  {} {error}", "error:".red());
    }
}
