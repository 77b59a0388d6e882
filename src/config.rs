use std::path::PathBuf;

use serde::Deserialize;

use crate::codec::Mode;
use crate::error::{Result, SmartFsError};
use crate::geometry::{CrcMode, Geometry};

fn default_erase_block_size() -> u32 {
    4096
}
fn default_sector_size() -> u32 {
    1024
}
fn default_version() -> u8 {
    1
}
fn default_crc_mode() -> String {
    "none".into()
}
fn default_max_filename_len() -> u8 {
    16
}
fn default_number_extra_root_dirs() -> u8 {
    0
}
fn default_dir_mode() -> String {
    "777".into()
}
fn default_file_mode() -> String {
    "666".into()
}

/// The recognized configuration surface for a build, loadable from a
/// TOML file or assembled directly from parsed CLI flags. Mirrors the
/// CLI's flags one field each, with the same defaults; CLI flags
/// override any field also given on the command line.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    pub storage_size: u32,
    pub base_dir: PathBuf,
    pub out: PathBuf,
    #[serde(default = "default_erase_block_size")]
    pub erase_block_size: u32,
    #[serde(default = "default_sector_size")]
    pub sector_size: u32,
    #[serde(default = "default_version")]
    pub version: u8,
    #[serde(default = "default_crc_mode")]
    pub crc_mode: String,
    #[serde(default = "default_max_filename_len")]
    pub max_filename_len: u8,
    #[serde(default = "default_number_extra_root_dirs")]
    pub number_extra_root_dirs: u8,
    #[serde(default = "default_dir_mode")]
    pub dir_mode: String,
    #[serde(default = "default_file_mode")]
    pub file_mode: String,
}

impl BuildConfig {
    pub fn geometry(&self) -> Result<Geometry> {
        let crc_mode = match self.crc_mode.as_str() {
            "none" => CrcMode::None,
            "crc8" => CrcMode::Crc8,
            other => {
                return Err(SmartFsError::Domain(format!(
                    "unknown crc mode {:?}, expected \"none\" or \"crc8\"",
                    other
                )))
            }
        };
        Geometry::new(
            self.storage_size,
            self.erase_block_size,
            self.sector_size,
            self.version,
            crc_mode,
            self.max_filename_len,
            self.number_extra_root_dirs,
        )
    }

    pub fn dir_mode(&self) -> Result<Mode> {
        mode_from_str(&self.dir_mode)
    }

    pub fn file_mode(&self) -> Result<Mode> {
        mode_from_str(&self.file_mode)
    }
}

/// Validates that `s` is exactly three octal digits, mirroring the
/// command-line mode validator (`mode_check_with_help`).
pub fn mode_check_with_help(s: &str) -> std::result::Result<String, String> {
    if s.len() != 3 || !s.chars().all(|c| ('0'..='7').contains(&c)) {
        return Err(format!(
            "mode {:?} must be exactly 3 octal digits, e.g. \"755\"",
            s
        ));
    }
    Ok(s.to_string())
}

fn mode_from_str(s: &str) -> Result<Mode> {
    mode_check_with_help(s).map_err(SmartFsError::Domain)?;
    let value = u16::from_str_radix(s, 8)
        .map_err(|e| SmartFsError::Domain(format!("invalid mode {:?}: {}", s, e)))?;
    Ok(Mode::from_octal(value))
}
