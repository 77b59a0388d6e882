use anyhow::{Context, Result};
use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use log::{debug, info};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::fs;
use std::path::PathBuf;

use smartfs_image::config::{mode_check_with_help, BuildConfig};
use smartfs_image::walk::{walk_dirs, walk_files};
use smartfs_image::SmartFsBuilder;

#[derive(Parser)]
#[command(name = "smartfs-mkfs")]
#[command(about = "Builds a SmartFS flash image from a host directory tree", long_about = None)]
struct Cli {
    /// Host directory whose contents become the image's root (required
    /// unless given via --config)
    #[arg(long, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    /// Output image path (required unless given via --config)
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,

    /// Total image size in bytes (required unless given via --config)
    #[arg(long)]
    storage_size: Option<u32>,

    /// Flash erase-block size in bytes
    #[arg(long, default_value_t = 4096)]
    smart_erase_block_size: u32,

    /// Sector size in bytes
    #[arg(long, default_value_t = 1024)]
    smart_sector_size: u32,

    /// On-media format version
    #[arg(long, default_value_t = 1)]
    smart_version: u8,

    /// CRC mode: "none" or "crc8"
    #[arg(long, default_value = "none")]
    smart_crc: String,

    /// Maximum filename length
    #[arg(long, default_value_t = 16)]
    smart_max_len_filename: u8,

    /// Number of extra root directories beyond the default one
    #[arg(long, default_value_t = 0)]
    smart_number_root_dir: u8,

    /// Default directory permission mode, three octal digits
    #[arg(long, default_value = "777", value_parser = mode_check_with_help)]
    dir_mode: String,

    /// Default file permission mode, three octal digits
    #[arg(long, default_value = "666", value_parser = mode_check_with_help)]
    file_mode: String,

    /// Optional TOML config file; CLI flags override its fields
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("failed to initialize logger")?;

    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).context("failed to parse arguments")?;
    let cfg = build_config(&cli, &matches)?;
    let geometry = cfg.geometry().context("invalid geometry")?;
    let dir_mode = cfg.dir_mode().context("invalid dir-mode")?;
    let file_mode = cfg.file_mode().context("invalid file-mode")?;

    let mut builder = SmartFsBuilder::new(geometry).context("failed to format image")?;

    for dir in walk_dirs(&cfg.base_dir).context("failed to walk base directory")? {
        let image_path = format!("/{}", dir.to_string_lossy().replace('\\', "/"));
        debug!("mkdir {}", image_path);
        builder
            .mkdir(&image_path, dir_mode)
            .with_context(|| format!("failed to create directory {}", image_path))?;
    }

    for file in walk_files(&cfg.base_dir).context("failed to walk base directory")? {
        let image_path = format!("/{}", file.to_string_lossy().replace('\\', "/"));
        let host_path = cfg.base_dir.join(&file);
        let data = fs::read(&host_path)
            .with_context(|| format!("failed to read {}", host_path.display()))?;
        debug!("create_file {} ({} bytes)", image_path, data.len());
        builder
            .create_file(&image_path, &data, file_mode)
            .with_context(|| format!("failed to create file {}", image_path))?;
    }

    fs::write(&cfg.out, builder.dump())
        .with_context(|| format!("failed to write image to {}", cfg.out.display()))?;

    info!(
        "wrote {} ({} free sectors remaining)",
        cfg.out.display(),
        builder.free_sectors()
    );

    Ok(())
}

/// True when `id` was given explicitly on the command line, as opposed
/// to falling back to a clap default or being absent.
fn given_on_cli(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

/// Builds the effective configuration: a `--config` TOML file, if any,
/// with every explicitly-given CLI flag overlaid on top of it. With no
/// `--config`, the CLI flags (including their defaults) are the whole
/// configuration.
fn build_config(cli: &Cli, matches: &ArgMatches) -> Result<BuildConfig> {
    let mut cfg = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => BuildConfig {
            storage_size: cli
                .storage_size
                .ok_or_else(|| anyhow::anyhow!("--storage-size is required when no --config is given"))?,
            base_dir: cli
                .base_dir
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--base-dir is required when no --config is given"))?,
            out: cli
                .out
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--out is required when no --config is given"))?,
            erase_block_size: cli.smart_erase_block_size,
            sector_size: cli.smart_sector_size,
            version: cli.smart_version,
            crc_mode: cli.smart_crc.clone(),
            max_filename_len: cli.smart_max_len_filename,
            number_extra_root_dirs: cli.smart_number_root_dir,
            dir_mode: cli.dir_mode.clone(),
            file_mode: cli.file_mode.clone(),
        },
    };

    if given_on_cli(matches, "storage_size") {
        if let Some(v) = cli.storage_size {
            cfg.storage_size = v;
        }
    }
    if given_on_cli(matches, "base_dir") {
        if let Some(v) = &cli.base_dir {
            cfg.base_dir = v.clone();
        }
    }
    if given_on_cli(matches, "out") {
        if let Some(v) = &cli.out {
            cfg.out = v.clone();
        }
    }
    if given_on_cli(matches, "smart_erase_block_size") {
        cfg.erase_block_size = cli.smart_erase_block_size;
    }
    if given_on_cli(matches, "smart_sector_size") {
        cfg.sector_size = cli.smart_sector_size;
    }
    if given_on_cli(matches, "smart_version") {
        cfg.version = cli.smart_version;
    }
    if given_on_cli(matches, "smart_crc") {
        cfg.crc_mode = cli.smart_crc.clone();
    }
    if given_on_cli(matches, "smart_max_len_filename") {
        cfg.max_filename_len = cli.smart_max_len_filename;
    }
    if given_on_cli(matches, "smart_number_root_dir") {
        cfg.number_extra_root_dirs = cli.smart_number_root_dir;
    }
    if given_on_cli(matches, "dir_mode") {
        cfg.dir_mode = cli.dir_mode.clone();
    }
    if given_on_cli(matches, "file_mode") {
        cfg.file_mode = cli.file_mode.clone();
    }

    Ok(cfg)
}
