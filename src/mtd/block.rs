use crate::codec::{ChainHeader, Sector, SectorType, UNSET};
use crate::error::{Result, SmartFsError};
use crate::geometry::Geometry;

pub const FORMAT_SECTOR: u16 = 0;
pub const ROOT_DIR_SECTOR: u16 = 3;
pub const FIRST_GENERAL_SECTOR: u16 = 12;

/// Owns the whole image buffer and the bookkeeping needed to place
/// sectors inside it: free/allocated maps per erase block, the
/// logical-to-physical sector map, and the round-robin allocation
/// cursor.
pub struct MtdBlockLayer {
    geometry: Geometry,
    buf: Vec<u8>,
    free_sector_map: Vec<Vec<bool>>,
    smap: Vec<u16>,
    free_sectors: u32,
    last_alloc_block: u32,
    next_seq: u16,
}

impl MtdBlockLayer {
    pub fn new(buf: Vec<u8>, geometry: Geometry, formatted: bool) -> Result<Self> {
        if buf.len() != geometry.image_size as usize {
            return Err(SmartFsError::Invariant(format!(
                "buffer length {} does not match image_size {}",
                buf.len(),
                geometry.image_size
            )));
        }
        let total_sectors = geometry.total_sectors()?;
        let sectors_per_eb = geometry.sectors_per_eb();
        let n_eb = geometry.n_erase_blocks();

        let mut layer = MtdBlockLayer {
            geometry,
            buf,
            free_sector_map: vec![vec![true; sectors_per_eb as usize]; n_eb as usize],
            smap: vec![UNSET; total_sectors as usize],
            free_sectors: total_sectors,
            last_alloc_block: n_eb.wrapping_sub(1),
            next_seq: 0,
        };

        if formatted {
            layer.low_level_format()?;
        }
        Ok(layer)
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn free_sectors(&self) -> u32 {
        self.free_sectors
    }

    fn low_level_format(&mut self) -> Result<()> {
        for b in self.buf.iter_mut() {
            *b = 0xFF;
        }

        self.allocate(Some(FORMAT_SECTOR), Some(0))?;
        {
            let mut sector = self.sector_by_physical(0)?;
            let mut payload = Vec::with_capacity(7);
            payload.extend_from_slice(b"SMRT");
            payload.push(self.geometry.version);
            payload.push(self.geometry.max_filename_len);
            payload.push(self.geometry.number_extra_root_dirs);
            sector.write_bytes(0, &payload)?;
        }

        for i in 0..=self.geometry.number_extra_root_dirs as u16 {
            let logical = ROOT_DIR_SECTOR + i;
            self.allocate(Some(logical), None)?;
            let mut sector = self.sector_by_logical(logical)?;
            sector.write_chain_header(&ChainHeader {
                sector_type: SectorType::Directory,
                next_sector: UNSET,
                used: UNSET,
            })?;
        }
        Ok(())
    }

    fn choose_physical_sector(&mut self) -> Result<u32> {
        let n_eb = self.geometry.n_erase_blocks();
        let sectors_per_eb = self.geometry.sectors_per_eb();

        let mut all_free_block = None;
        let mut best: Option<(u32, u32)> = None;
        for i in 0..n_eb {
            let block = (self.last_alloc_block + 1 + i) % n_eb;
            let free_count = self.free_sector_map[block as usize]
                .iter()
                .filter(|&&free| free)
                .count() as u32;
            if free_count == 0 {
                continue;
            }
            if free_count == sectors_per_eb {
                all_free_block = Some(block);
                break;
            }
            match best {
                None => best = Some((block, free_count)),
                Some((_, best_free)) if free_count > best_free => best = Some((block, free_count)),
                _ => {}
            }
        }

        let block = all_free_block
            .or_else(|| best.map(|(b, _)| b))
            .ok_or_else(|| SmartFsError::Capacity("no erase block has a free sector".into()))?;

        let idx = self.free_sector_map[block as usize]
            .iter()
            .position(|&free| free)
            .ok_or_else(|| SmartFsError::Capacity("chosen erase block has no free sector".into()))?;

        self.last_alloc_block = block;
        Ok(block * sectors_per_eb + idx as u32)
    }

    /// Allocates a logical sector, optionally pinned to a specific
    /// logical number and/or physical location, writing its header in
    /// place.
    pub fn allocate(&mut self, requested: Option<u16>, physical: Option<u32>) -> Result<u16> {
        let total_sectors = self.geometry.total_sectors()?;
        let sectors_per_eb = self.geometry.sectors_per_eb();

        if self.free_sectors < sectors_per_eb + 4 {
            return Err(SmartFsError::Capacity(
                "free sector count below the sectors_per_eb + 4 floor".into(),
            ));
        }

        let logical = match requested {
            Some(n) => {
                if n as u32 >= total_sectors {
                    return Err(SmartFsError::Invariant(format!(
                        "requested logical sector {} exceeds total_sectors {}",
                        n, total_sectors
                    )));
                }
                if self.smap[n as usize] != UNSET {
                    return Err(SmartFsError::Invariant(format!(
                        "logical sector {} is already allocated",
                        n
                    )));
                }
                n
            }
            None => {
                let mut found = None;
                for l in FIRST_GENERAL_SECTOR as u32..total_sectors {
                    if self.smap[l as usize] == UNSET {
                        found = Some(l as u16);
                        break;
                    }
                }
                found.ok_or_else(|| SmartFsError::Capacity("no logical sector available".into()))?
            }
        };

        let phys = match physical {
            Some(p) => {
                let block = p / sectors_per_eb;
                let idx = p % sectors_per_eb;
                if block as usize >= self.free_sector_map.len()
                    || !self.free_sector_map[block as usize][idx as usize]
                {
                    return Err(SmartFsError::Invariant(format!(
                        "requested physical sector {} is not free",
                        p
                    )));
                }
                p
            }
            None => self.choose_physical_sector()?,
        };

        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        let sector_size = self.geometry.sector_size as usize;
        let start = phys as usize * sector_size;
        let end = start + sector_size;
        Sector::init(
            &mut self.buf[start..end],
            logical,
            seq,
            self.geometry.crc_mode,
            self.geometry.sector_size_code(),
        );

        self.smap[logical as usize] = phys as u16;
        self.free_sector_map[(phys / sectors_per_eb) as usize][(phys % sectors_per_eb) as usize] =
            false;
        self.free_sectors -= 1;

        Ok(logical)
    }

    pub fn sector_by_physical(&mut self, physical: u32) -> Result<Sector<'_>> {
        let sector_size = self.geometry.sector_size as usize;
        let start = physical as usize * sector_size;
        if start + sector_size > self.buf.len() {
            return Err(SmartFsError::Invariant(format!(
                "physical sector {} is out of range",
                physical
            )));
        }
        Sector::attach(&mut self.buf[start..start + sector_size])
    }

    pub fn sector_by_logical(&mut self, logical: u16) -> Result<Sector<'_>> {
        let physical = *self
            .smap
            .get(logical as usize)
            .ok_or_else(|| SmartFsError::Invariant(format!("logical sector {} out of range", logical)))?;
        if physical == UNSET {
            return Err(SmartFsError::Invariant(format!(
                "logical sector {} is not mapped",
                logical
            )));
        }
        self.sector_by_physical(physical as u32)
    }

    pub fn is_mapped(&self, logical: u16) -> bool {
        self.smap
            .get(logical as usize)
            .map(|&p| p != UNSET)
            .unwrap_or(false)
    }

    /// The physical sector a logical sector is mapped to, if any.
    pub fn physical_of(&self, logical: u16) -> Option<u16> {
        self.smap.get(logical as usize).copied().filter(|&p| p != UNSET)
    }

    pub fn dump(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_buffer(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SH_SIZE;
    use crate::geometry::CrcMode;

    fn small_geometry() -> Geometry {
        Geometry::new(1_048_576, 4096, 1024, 1, CrcMode::None, 16, 0).unwrap()
    }

    #[test]
    fn test_format_writes_signature() {
        let g = small_geometry();
        let buf = vec![0u8; g.image_size as usize];
        let layer = MtdBlockLayer::new(buf, g, true).unwrap();
        assert_eq!(&layer.dump()[5..9], b"SMRT");
    }

    #[test]
    fn test_format_sector_status_byte() {
        let g = small_geometry();
        let buf = vec![0u8; g.image_size as usize];
        let layer = MtdBlockLayer::new(buf, g, true).unwrap();
        assert_eq!(layer.dump()[4], 0x45);
    }

    #[test]
    fn test_root_dir_pinned_at_logical_3() {
        let g = small_geometry();
        let buf = vec![0u8; g.image_size as usize];
        let mut layer = MtdBlockLayer::new(buf, g, true).unwrap();
        assert!(layer.is_mapped(ROOT_DIR_SECTOR));
        let sector = layer.sector_by_logical(ROOT_DIR_SECTOR).unwrap();
        let ch = sector.read_chain_header().unwrap();
        assert_eq!(ch.sector_type, SectorType::Directory);
        assert!(ch.is_end_of_chain());
    }

    #[test]
    fn test_free_sectors_accounting() {
        let g = small_geometry();
        let total = g.total_sectors().unwrap();
        let buf = vec![0u8; g.image_size as usize];
        let layer = MtdBlockLayer::new(buf, g, true).unwrap();
        // format sector + one root dir sector consumed.
        assert_eq!(layer.free_sectors(), total - 2);
    }

    #[test]
    fn test_allocate_rejects_already_allocated_logical() {
        let g = small_geometry();
        let buf = vec![0u8; g.image_size as usize];
        let mut layer = MtdBlockLayer::new(buf, g, true).unwrap();
        assert!(layer.allocate(Some(ROOT_DIR_SECTOR), None).is_err());
    }

    #[test]
    fn test_allocate_auto_logical_starts_at_first_general_sector() {
        let g = small_geometry();
        let buf = vec![0u8; g.image_size as usize];
        let mut layer = MtdBlockLayer::new(buf, g, true).unwrap();
        let l = layer.allocate(None, None).unwrap();
        assert_eq!(l, FIRST_GENERAL_SECTOR);
    }

    #[test]
    fn test_smap_pins_format_and_root_sectors() {
        let g = small_geometry();
        let buf = vec![0u8; g.image_size as usize];
        let layer = MtdBlockLayer::new(buf, g, true).unwrap();
        assert_eq!(layer.physical_of(FORMAT_SECTOR), Some(0));
        assert_eq!(layer.physical_of(ROOT_DIR_SECTOR), Some(3));
    }

    #[test]
    fn test_free_sectors_plus_mapped_equals_total() {
        let g = small_geometry();
        let total = g.total_sectors().unwrap();
        let buf = vec![0u8; g.image_size as usize];
        let mut layer = MtdBlockLayer::new(buf, g, true).unwrap();
        layer.allocate(None, None).unwrap();
        layer.allocate(None, None).unwrap();
        let mapped = (0..total as u16).filter(|&l| layer.is_mapped(l)).count() as u32;
        assert_eq!(layer.free_sectors() + mapped, total);
    }

    #[test]
    fn test_empty_image_scenario() {
        // Scenario 1 of the on-media spec: 1MiB image, 4096-byte erase
        // blocks, 1024-byte sectors, no CRC, no extra roots.
        let g = Geometry::new(1_048_576, 4096, 1024, 1, CrcMode::None, 16, 0).unwrap();
        let buf = vec![0u8; g.image_size as usize];
        let layer = MtdBlockLayer::new(buf, g, true).unwrap();
        let image = layer.dump();
        assert_eq!(image.len(), 1_048_576);
        assert_eq!(image[4], 0x45);
        assert_eq!(&image[5..9], b"SMRT");
        // Every sector beyond the format and root-directory sectors is
        // untouched: header logical number 0xFFFF, data region all 0xFF.
        let sector_size = g.sector_size as usize;
        for phys in 2..(g.total_sectors().unwrap() as usize) {
            let start = phys * sector_size;
            let sector_bytes = &image[start..start + sector_size];
            assert_eq!(u16::from_le_bytes([sector_bytes[0], sector_bytes[1]]), 0xFFFF);
            assert!(sector_bytes[SH_SIZE..].iter().all(|&b| b == 0xFF));
        }
    }

    #[test]
    fn test_crc_enabled_format_sector_is_self_consistent() {
        let g = Geometry::new(1_048_576, 4096, 1024, 1, CrcMode::Crc8, 16, 0).unwrap();
        let buf = vec![0u8; g.image_size as usize];
        let mut layer = MtdBlockLayer::new(buf, g, true).unwrap();
        let sector = layer.sector_by_logical(FORMAT_SECTOR).unwrap();
        let header = sector.header().unwrap();
        assert!(header.status.crc_enable);
        let mut crc_input = sector.data().to_vec();
        let packed = header.pack();
        crc_input.extend_from_slice(&packed[0..3]);
        crc_input.push(packed[4]);
        assert_eq!(crate::codec::crc::crc8_ccitt(&crc_input), header.seq_high_or_crc);
    }
}
