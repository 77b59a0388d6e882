pub mod chain_header;
pub mod crc;
pub mod entry_header;
pub mod permissions;
pub mod sector;
pub mod sector_header;
pub mod status;

pub use chain_header::{ChainHeader, SectorType, CH_SIZE, UNSET};
pub use entry_header::{eh_size, EntryFlags, EntryHeader, EH_NAME_OFFSET};
pub use permissions::{Mode, PBits};
pub use sector::Sector;
pub use sector_header::{SectorHeader, SH_SIZE};
pub use status::SectorStatus;
