use super::entry::DirEntry;
use crate::clock::{Clock, SystemClock};
use crate::codec::{eh_size, entry_header::EH_UNSET_SECTOR, ChainHeader, EntryFlags, EntryHeader, Mode, SectorType, CH_SIZE, UNSET};
use crate::error::{Result, SmartFsError};
use crate::geometry::Geometry;
use crate::mtd::MtdBlockLayer;

/// Directory/file layer: walks and extends sector chains on top of the
/// MTD block layer to build a whole volume in one pass.
pub struct SmartFsBuilder<C: Clock = SystemClock> {
    mtd: MtdBlockLayer,
    clock: C,
}

impl SmartFsBuilder<SystemClock> {
    pub fn new(geometry: Geometry) -> Result<Self> {
        Self::with_clock(geometry, SystemClock)
    }
}

impl<C: Clock> SmartFsBuilder<C> {
    pub fn with_clock(geometry: Geometry, clock: C) -> Result<Self> {
        let buf = vec![0u8; geometry.image_size as usize];
        let mtd = MtdBlockLayer::new(buf, geometry, true)?;
        Ok(SmartFsBuilder { mtd, clock })
    }

    pub fn geometry(&self) -> &Geometry {
        self.mtd.geometry()
    }

    pub fn free_sectors(&self) -> u32 {
        self.mtd.free_sectors()
    }

    pub fn dump(&self) -> &[u8] {
        self.mtd.dump()
    }

    pub fn into_buffer(self) -> Vec<u8> {
        self.mtd.into_buffer()
    }

    /// Resolves an absolute path to its directory entry, walking
    /// component by component from the root.
    pub fn find_dir_entry(&mut self, path_abs: &str) -> Result<DirEntry> {
        if !path_abs.starts_with('/') {
            return Err(SmartFsError::Domain(format!(
                "path {:?} is not absolute",
                path_abs
            )));
        }
        if path_abs == "/" {
            return Ok(DirEntry::root());
        }
        let mut current = DirEntry::root();
        for component in path_abs.trim_start_matches('/').split('/').filter(|c| !c.is_empty()) {
            current = self.find_child(current.first_sector, component)?;
        }
        Ok(current)
    }

    fn find_child(&mut self, parent_first_sector: u16, name: &str) -> Result<DirEntry> {
        let max_len = self.mtd.geometry().max_filename_len;
        let eh_sz = eh_size(max_len);
        let mut sector_logical = parent_first_sector;
        loop {
            let mut matched = None;
            let ch = {
                let sector = self.mtd.sector_by_logical(sector_logical)?;
                let usable_after_ch = sector.usable_size() - CH_SIZE;
                let slots = usable_after_ch / eh_sz;
                for k in 0..slots {
                    let offset = CH_SIZE + k * eh_sz;
                    let eh = sector.read_entry_header(offset, max_len)?;
                    if eh.first_sector == EH_UNSET_SECTOR {
                        break;
                    }
                    if eh.name == name {
                        matched = Some((offset, eh));
                        break;
                    }
                }
                sector.read_chain_header()?
            };

            if let Some((offset, eh)) = matched {
                return Ok(DirEntry {
                    first_sector: eh.first_sector as u16,
                    dir_sector: sector_logical,
                    dir_offset: offset,
                    name: eh.name,
                    is_dir: eh.flags.is_dir,
                });
            }

            if ch.is_end_of_chain() {
                return Err(SmartFsError::Domain(format!("{:?} not found", name)));
            }
            sector_logical = ch.next_sector;
        }
    }

    /// Appends a new entry to `parent`'s chain, extending it with a
    /// continuation sector if no empty slot remains, and allocates the
    /// new entry's own content sector.
    pub fn create_entry(
        &mut self,
        parent: &DirEntry,
        name: &str,
        is_dir: bool,
        mode: Mode,
    ) -> Result<DirEntry> {
        let max_len = self.mtd.geometry().max_filename_len;
        if name.len() > max_len as usize {
            return Err(SmartFsError::Domain(format!(
                "entry name {:?} exceeds max_filename_len {}",
                name, max_len
            )));
        }
        let eh_sz = eh_size(max_len);
        let mut sector_logical = parent.first_sector;

        let (entry_sector, offset) = loop {
            let (slot, ch) = {
                let sector = self.mtd.sector_by_logical(sector_logical)?;
                let usable_after_ch = sector.usable_size() - CH_SIZE;
                let slots = usable_after_ch / eh_sz;
                let mut slot = None;
                for k in 0..slots {
                    let o = CH_SIZE + k * eh_sz;
                    let eh = sector.read_entry_header(o, max_len)?;
                    if eh.first_sector == EH_UNSET_SECTOR {
                        slot = Some(o);
                        break;
                    }
                }
                (slot, sector.read_chain_header()?)
            };

            if let Some(offset) = slot {
                break (sector_logical, offset);
            }

            if ch.is_end_of_chain() {
                let new_logical = self.mtd.allocate(None, None)?;
                {
                    let mut new_sector = self.mtd.sector_by_logical(new_logical)?;
                    new_sector.write_chain_header(&ChainHeader {
                        sector_type: SectorType::Directory,
                        next_sector: UNSET,
                        used: UNSET,
                    })?;
                }
                let mut old_ch = ch;
                old_ch.next_sector = new_logical;
                {
                    let mut old_sector = self.mtd.sector_by_logical(sector_logical)?;
                    old_sector.write_chain_header(&old_ch)?;
                }
                sector_logical = new_logical;
            } else {
                sector_logical = ch.next_sector;
            }
        };

        let content_logical = self.mtd.allocate(None, None)?;
        {
            let mut content_sector = self.mtd.sector_by_logical(content_logical)?;
            content_sector.write_chain_header(&ChainHeader {
                sector_type: if is_dir { SectorType::Directory } else { SectorType::File },
                next_sector: UNSET,
                used: UNSET,
            })?;
        }

        let eh = EntryHeader {
            flags: EntryFlags {
                empty: false,
                active: true,
                is_dir,
                deleting: true,
                mode,
            },
            first_sector: content_logical as i16,
            utc: self.clock.now_unix(),
            name: name.to_string(),
        };
        {
            let mut sector = self.mtd.sector_by_logical(entry_sector)?;
            sector.write_entry_header(offset, &eh, max_len)?;
        }

        Ok(DirEntry {
            first_sector: content_logical,
            dir_sector: entry_sector,
            dir_offset: offset,
            name: name.to_string(),
            is_dir,
        })
    }

    pub fn mkdir(&mut self, path_abs: &str, mode: Mode) -> Result<DirEntry> {
        if path_abs == "/" {
            return Err(SmartFsError::Domain("cannot create the root directory".into()));
        }
        let (parent_path, name) = split_abs(path_abs)?;
        let parent = self.find_dir_entry(&parent_path)?;
        self.create_entry(&parent, &name, true, mode)
    }

    pub fn create_file(&mut self, path_abs: &str, data: &[u8], mode: Mode) -> Result<DirEntry> {
        let (parent_path, name) = split_abs(path_abs)?;
        let parent = self.find_dir_entry(&parent_path)?;
        let entry = self.create_entry(&parent, &name, false, mode)?;
        self.write_file_content(entry.first_sector, data)?;
        Ok(entry)
    }

    fn write_file_content(&mut self, first_sector: u16, data: &[u8]) -> Result<()> {
        let payload_size = self.mtd.geometry().sector_size as usize - crate::codec::SH_SIZE - CH_SIZE;
        let mut sector_logical = first_sector;
        let mut offset = 0usize;
        loop {
            let end = std::cmp::min(offset + payload_size, data.len());
            let slice = &data[offset..end];
            let next_logical = if end >= data.len() {
                None
            } else {
                Some(self.mtd.allocate(None, None)?)
            };
            {
                let mut sector = self.mtd.sector_by_logical(sector_logical)?;
                sector.write_bytes(CH_SIZE, slice)?;
                sector.write_chain_header(&ChainHeader {
                    sector_type: SectorType::File,
                    next_sector: next_logical.unwrap_or(UNSET),
                    used: slice.len() as u16,
                })?;
            }
            offset = end;
            match next_logical {
                Some(next) => sector_logical = next,
                None => break,
            }
        }
        Ok(())
    }

    /// Reading file content back is explicitly out of scope for the builder.
    pub fn read_file(&mut self, _path_abs: &str) -> Result<Vec<u8>> {
        Err(SmartFsError::Unsupported("read_file is not implemented".into()))
    }

    /// Listing a directory's children is explicitly out of scope for the builder.
    pub fn list_dir(&mut self, _path_abs: &str) -> Result<Vec<DirEntry>> {
        Err(SmartFsError::Unsupported("list_dir is not implemented".into()))
    }
}

fn split_abs(path: &str) -> Result<(String, String)> {
    if !path.starts_with('/') {
        return Err(SmartFsError::Domain(format!("path {:?} is not absolute", path)));
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(SmartFsError::Domain("path must not be the root directory".into()));
    }
    match trimmed.rfind('/') {
        Some(0) => Ok(("/".to_string(), trimmed[1..].to_string())),
        Some(idx) => Ok((trimmed[..idx].to_string(), trimmed[idx + 1..].to_string())),
        None => Err(SmartFsError::Domain(format!("path {:?} is not absolute", path))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::geometry::CrcMode;

    fn builder(sector_size: u32) -> SmartFsBuilder<FixedClock> {
        let geometry =
            Geometry::new(1_048_576, 4096, sector_size, 1, CrcMode::None, 16, 0).unwrap();
        SmartFsBuilder::with_clock(geometry, FixedClock(1_700_000_000)).unwrap()
    }

    #[test]
    fn test_find_root() {
        let mut b = builder(1024);
        let root = b.find_dir_entry("/").unwrap();
        assert_eq!(root.name, "/");
        assert!(root.is_dir);
    }

    #[test]
    fn test_mkdir_then_find() {
        let mut b = builder(1024);
        b.mkdir("/dir1", Mode::from_octal(0o777)).unwrap();
        let found = b.find_dir_entry("/dir1").unwrap();
        assert_eq!(found.name, "dir1");
        assert!(found.is_dir);
    }

    #[test]
    fn test_nested_mkdir() {
        let mut b = builder(1024);
        b.mkdir("/dir1", Mode::from_octal(0o777)).unwrap();
        b.mkdir("/dir1/dir2", Mode::from_octal(0o777)).unwrap();
        let found = b.find_dir_entry("/dir1/dir2").unwrap();
        assert_eq!(found.name, "dir2");
    }

    #[test]
    fn test_create_file_roundtrip_chain() {
        let mut b = builder(256);
        let data = vec![0xABu8; 2000];
        let entry = b.create_file("/big.bin", &data, Mode::from_octal(0o666)).unwrap();

        let mut seen = 0usize;
        let mut logical = entry.first_sector;
        loop {
            let sector = b.mtd.sector_by_logical(logical).unwrap();
            let ch = sector.read_chain_header().unwrap();
            seen += ch.used as usize;
            if ch.is_end_of_chain() {
                break;
            }
            logical = ch.next_sector;
        }
        assert_eq!(seen, data.len());
    }

    #[test]
    fn test_create_file_rejects_overlong_name() {
        let mut b = builder(1024);
        let free_before = b.free_sectors();
        let res = b.create_file(
            "/too_long_name_exceeding_16_bytes",
            b"x",
            Mode::from_octal(0o666),
        );
        assert!(res.is_err());
        assert_eq!(b.free_sectors(), free_before, "a rejected name must consume no sectors");
    }

    #[test]
    fn test_directory_chain_extends_with_many_siblings() {
        let mut b = builder(256);
        for i in 0..15 {
            b.mkdir(&format!("/d{}", i), Mode::from_octal(0o777)).unwrap();
        }
        let root_sector = b.mtd.sector_by_logical(crate::mtd::ROOT_DIR_SECTOR).unwrap();
        let continuation = root_sector.next_in_chain();
        assert!(continuation.is_some());
        let continuation_sector = b.mtd.sector_by_logical(continuation.unwrap()).unwrap();
        assert_eq!(
            continuation_sector.read_chain_header().unwrap().sector_type,
            SectorType::Directory
        );
    }

    #[test]
    fn test_last_file_sector_used_matches_remainder() {
        let mut b = builder(256);
        let data = vec![0xABu8; 2000];
        let entry = b.create_file("/big.bin", &data, Mode::from_octal(0o666)).unwrap();

        let payload_size = 256 - crate::codec::SH_SIZE - CH_SIZE;
        let mut logical = entry.first_sector;
        let mut last_used = 0u16;
        let mut hops = 0;
        loop {
            let sector = b.mtd.sector_by_logical(logical).unwrap();
            let ch = sector.read_chain_header().unwrap();
            hops += 1;
            if ch.is_end_of_chain() {
                last_used = ch.used;
                break;
            }
            assert_eq!(ch.used as usize, payload_size, "interior sectors report full payload");
            logical = ch.next_sector;
        }
        assert_eq!(last_used as usize, data.len() % payload_size);
        assert_eq!(hops, (data.len() + payload_size - 1) / payload_size);
    }

    #[test]
    fn test_find_missing_is_domain_error() {
        let mut b = builder(1024);
        assert!(b.find_dir_entry("/nope").is_err());
    }

    #[test]
    fn test_capacity_error_leaves_prior_writes_intact() {
        // Small enough that the allocator exhausts its reserve floor
        // partway through, but large enough for the format/root
        // sectors and a first file.
        let geometry = Geometry::new(16384, 4096, 1024, 1, CrcMode::None, 16, 0).unwrap();
        let mut b = SmartFsBuilder::with_clock(geometry, FixedClock(1_700_000_000)).unwrap();

        b.create_file("/first.txt", b"hello", Mode::from_octal(0o666)).unwrap();

        let mut failed = false;
        for i in 0..64 {
            let data = vec![0x11u8; 4000];
            if b.create_file(&format!("/f{}", i), &data, Mode::from_octal(0o666)).is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed, "this geometry must eventually run out of sectors");

        // No rollback: the first file's entry and content are still valid.
        let entry = b.find_dir_entry("/first.txt").unwrap();
        assert!(!entry.is_dir);
        let sector = b.mtd.sector_by_logical(entry.first_sector).unwrap();
        let ch = sector.read_chain_header().unwrap();
        assert_eq!(ch.used, 5);
        assert_eq!(&sector.data()[CH_SIZE..CH_SIZE + 5], b"hello");
    }
}
