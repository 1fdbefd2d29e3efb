//! `memfs-mount`: mount an empty in-memory volume and block until it is
//! unmounted.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dokan_host::{
    DeviceOptions, MountController, default_driver, install_signal_handler, shutdown_requested,
};
use dokan_memfs::{MemFs, MemFsConfig};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Mount an in-memory filesystem through the Dokan driver
#[derive(Parser, Debug)]
#[command(name = "memfs-mount")]
#[command(author, version)]
#[command(after_help = "EXAMPLES:
    # Mount at M: until Ctrl-C
    memfs-mount M:

    # Read-only removable volume with settings from a file
    memfs-mount M: --write-protect --removable --config memfs.toml
")]
struct Cli {
    /// Drive letter (M:) or empty NTFS folder to mount at
    #[arg(value_name = "MOUNT_POINT")]
    mount_point: String,

    /// Driver worker threads
    #[arg(short = 't', long)]
    threads: Option<u16>,

    /// Advisory driver request timeout (e.g. 30s, 2m)
    #[arg(long, value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Present the volume as removable media
    #[arg(long)]
    removable: bool,

    /// Present the volume as a network drive
    #[arg(long)]
    network: bool,

    /// UNC name for network drives (\\server\share)
    #[arg(long, value_name = "UNC")]
    unc_name: Option<String>,

    /// Refuse every modification
    #[arg(long)]
    write_protect: bool,

    /// Register with the Windows mount manager
    #[arg(long)]
    mount_manager: bool,

    /// Volume label
    #[arg(long)]
    label: Option<String>,

    /// Volume capacity in bytes
    #[arg(long, value_name = "BYTES")]
    capacity: Option<u64>,

    /// TOML file with [device] and [volume] tables; flags override it
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Settings file layout.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    device: DeviceOptions,
    volume: MemFsConfig,
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let file = match &cli.config {
        Some(path) => load_config(path)?,
        None => FileConfig::default(),
    };
    let (options, volume) = apply(&cli, file);

    let driver = default_driver().context("Dokan driver is not available")?;
    install_signal_handler().context("Failed to install signal handlers")?;

    let mount_point = options.mount_point.clone();
    let controller = MountController::new(options, MemFs::new(volume), driver)
        .context("Invalid mount options")?;
    info!(
        mount_point = %mount_point,
        library = controller.library_version(),
        driver = controller.driver_version(),
        "starting memory volume"
    );

    controller
        .start()
        .with_context(|| format!("Failed to mount {mount_point}"))?;

    if shutdown_requested() {
        info!(mount_point = %mount_point, "unmounted after signal");
    } else {
        info!(mount_point = %mount_point, "unmounted");
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<FileConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Failed to parse config: {}", path.display()))
}

/// Overlays command-line flags on the settings file. Flags only ever turn
/// options on.
fn apply(cli: &Cli, file: FileConfig) -> (DeviceOptions, MemFsConfig) {
    let FileConfig {
        device: mut options,
        mut volume,
    } = file;

    options.mount_point.clone_from(&cli.mount_point);
    if let Some(threads) = cli.threads {
        options.thread_count = threads;
    }
    if let Some(timeout) = cli.timeout {
        options.timeout = timeout;
    }
    if cli.unc_name.is_some() {
        options.unc_name.clone_from(&cli.unc_name);
    }
    options.flags.removable |= cli.removable;
    options.flags.network |= cli.network;
    options.flags.mount_manager |= cli.mount_manager;
    options.flags.write_protect |= cli.write_protect || volume.write_protect;

    volume.write_protect = options.flags.write_protect;
    if let Some(label) = &cli.label {
        volume.label.clone_from(label);
    }
    if let Some(capacity) = cli.capacity {
        volume.capacity = capacity;
    }
    (options, volume)
}

fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("memfs-mount").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_without_config() {
        let cli = parse(&["M:", "-t", "4", "--timeout", "2m", "--removable", "--label", "Scratch"]);
        let (options, volume) = apply(&cli, FileConfig::default());
        assert_eq!(options.mount_point, "M:");
        assert_eq!(options.thread_count, 4);
        assert_eq!(options.timeout, Duration::from_secs(120));
        assert!(options.flags.removable);
        assert!(!options.flags.write_protect);
        assert_eq!(volume.label, "Scratch");
    }

    #[test]
    fn test_config_file_overlaid_by_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            concat!(
                "[device]\nthread_count = 8\ntimeout = \"45s\"\n\n",
                "[device.flags]\nnetwork = true\n\n",
                "[volume]\nlabel = \"FromFile\"\ncapacity = 1048576\n",
            )
        )
        .unwrap();

        let cli = parse(&["N:", "--write-protect", "-c", file.path().to_str().unwrap()]);
        let config = load_config(cli.config.as_deref().unwrap()).unwrap();
        let (options, volume) = apply(&cli, config);

        assert_eq!(options.mount_point, "N:");
        assert_eq!(options.thread_count, 8);
        assert_eq!(options.timeout, Duration::from_secs(45));
        assert!(options.flags.network);
        assert!(options.flags.write_protect);
        assert!(volume.write_protect);
        assert_eq!(volume.label, "FromFile");
        assert_eq!(volume.capacity, 1_048_576);
    }

    #[test]
    fn test_write_protect_from_volume_table_sets_flag() {
        let config: FileConfig = toml::from_str("[volume]\nwrite_protect = true\n").unwrap();
        let (options, volume) = apply(&parse(&["O:"]), config);
        assert!(options.flags.write_protect);
        assert!(volume.write_protect);
    }

    #[test]
    fn test_unknown_config_key_rejected() {
        assert!(toml::from_str::<FileConfig>("[mystery]\nx = 1\n").is_err());
    }

    #[test]
    fn test_bad_timeout_rejected() {
        assert!(Cli::try_parse_from(["memfs-mount", "M:", "--timeout", "soon"]).is_err());
    }
}
