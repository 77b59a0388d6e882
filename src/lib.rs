//! SmartFS image builder.
//!
//! Synthesizes a byte-exact SmartFS flash image from a host directory
//! tree and a set of geometry parameters, without mounting or running
//! on a live device.
//!
//! Layers, leaves first: `codec` (on-media structs), `mtd` (erase-block
//! and sector bookkeeping), `fs` (directory/file chain construction).

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod fs;
pub mod geometry;
pub mod mtd;
pub mod walk;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::BuildConfig;
pub use error::{Result, SmartFsError};
pub use fs::{DirEntry, SmartFsBuilder};
pub use geometry::{CrcMode, Geometry};
pub use mtd::MtdBlockLayer;
