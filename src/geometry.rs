use crate::error::{Result, SmartFsError};

/// Sector sizes SmartFS recognizes, paired with their 3-bit status-byte code.
pub const VALID_SECTOR_SIZES: [u32; 8] = [256, 512, 1024, 2048, 4096, 8192, 16384, 32768];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcMode {
    None,
    Crc8,
}

/// Immutable geometry for a build: storage size, flash erase-block size,
/// sector size, and the handful of format-time knobs that shape the
/// on-media layout.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub image_size: u32,
    pub erase_block_size: u32,
    pub sector_size: u32,
    pub version: u8,
    pub crc_mode: CrcMode,
    pub max_filename_len: u8,
    pub number_extra_root_dirs: u8,
}

impl Geometry {
    pub fn new(
        image_size: u32,
        erase_block_size: u32,
        sector_size: u32,
        version: u8,
        crc_mode: CrcMode,
        max_filename_len: u8,
        number_extra_root_dirs: u8,
    ) -> Result<Self> {
        let g = Geometry {
            image_size,
            erase_block_size,
            sector_size,
            version,
            crc_mode,
            max_filename_len,
            number_extra_root_dirs,
        };
        g.validate()?;
        Ok(g)
    }

    fn validate(&self) -> Result<()> {
        if !VALID_SECTOR_SIZES.contains(&self.sector_size) {
            return Err(SmartFsError::Domain(format!(
                "unsupported sector size {}",
                self.sector_size
            )));
        }
        if self.version != 1 {
            return Err(SmartFsError::Domain(format!(
                "unsupported format version {}",
                self.version
            )));
        }
        if self.erase_block_size == 0 || self.erase_block_size % self.sector_size != 0 {
            return Err(SmartFsError::Invariant(
                "erase_block_size must be a positive multiple of sector_size".into(),
            ));
        }
        if self.image_size == 0 || self.image_size % self.erase_block_size != 0 {
            return Err(SmartFsError::Invariant(
                "image_size must be a positive multiple of erase_block_size".into(),
            ));
        }
        if self.max_filename_len == 0 {
            return Err(SmartFsError::Domain("max_filename_len must be nonzero".into()));
        }
        Ok(())
    }

    /// Sector-size status-byte code: `256 << code == sector_size`.
    pub fn sector_size_code(&self) -> u8 {
        VALID_SECTOR_SIZES
            .iter()
            .position(|&s| s == self.sector_size)
            .expect("validated at construction") as u8
    }

    pub fn sectors_per_eb(&self) -> u32 {
        self.erase_block_size / self.sector_size
    }

    pub fn n_erase_blocks(&self) -> u32 {
        self.image_size / self.erase_block_size
    }

    /// Total addressable sectors, clamped so a logical-sector index
    /// always fits a u16 (the top two sectors are reserved when the
    /// raw count lands exactly on 65536).
    pub fn total_sectors(&self) -> Result<u32> {
        let raw = self.sectors_per_eb() * self.n_erase_blocks();
        let total = if raw == 65536 { raw - 2 } else { raw };
        if total > 65536 {
            return Err(SmartFsError::Invariant(format!(
                "total_sectors {} exceeds 65536",
                total
            )));
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_defaults_valid() {
        let g = Geometry::new(1_048_576, 4096, 1024, 1, CrcMode::None, 16, 0).unwrap();
        assert_eq!(g.sectors_per_eb(), 4);
        assert_eq!(g.n_erase_blocks(), 256);
        assert_eq!(g.total_sectors().unwrap(), 1024);
    }

    #[test]
    fn test_sector_size_code() {
        let g = Geometry::new(4096, 4096, 512, 1, CrcMode::None, 16, 0).unwrap();
        assert_eq!(g.sector_size_code(), 1);
    }

    #[test]
    fn test_rejects_bad_sector_size() {
        assert!(Geometry::new(4096, 4096, 300, 1, CrcMode::None, 16, 0).is_err());
    }

    #[test]
    fn test_rejects_misaligned_image_size() {
        assert!(Geometry::new(4000, 4096, 512, 1, CrcMode::None, 16, 0).is_err());
    }

    #[test]
    fn test_total_sectors_clamped_at_65536() {
        let g = Geometry::new(65536 * 256, 256, 256, 1, CrcMode::None, 16, 0).unwrap();
        assert_eq!(g.total_sectors().unwrap(), 65536 - 2);
    }
}
