use super::permissions::Mode;
use crate::error::{Result, SmartFsError};

pub const EH_FIXED_SIZE: usize = 8;
pub const EH_NAME_OFFSET: usize = 8;
pub const EH_UNSET_SECTOR: i16 = -1;

pub fn eh_size(max_filename_len: u8) -> usize {
    EH_FIXED_SIZE + max_filename_len as usize
}

/// The 16-bit flags word of a directory entry header.
///
/// Bit layout, MSB first: empty(15), active(14, 0 = live), type(13, 1 =
/// directory), deleting(12), reserved(11-9, always 1), mode(8-0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryFlags {
    pub empty: bool,
    pub active: bool,
    pub is_dir: bool,
    pub deleting: bool,
    pub mode: Mode,
}

impl EntryFlags {
    pub fn pack(&self) -> u16 {
        let mut v: u16 = 0;
        if self.empty {
            v |= 0x8000;
        }
        if self.active {
            v |= 0x4000;
        }
        if self.is_dir {
            v |= 0x2000;
        }
        if self.deleting {
            v |= 0x1000;
        }
        v |= 0b111 << 9;
        v |= self.mode.pack9();
        v
    }

    pub fn unpack(v: u16) -> Self {
        EntryFlags {
            empty: v & 0x8000 != 0,
            active: v & 0x4000 != 0,
            is_dir: v & 0x2000 != 0,
            deleting: v & 0x1000 != 0,
            mode: Mode::unpack9(v & 0x1FF),
        }
    }

    /// The all-ones flags word of an unwritten slot.
    pub fn never_written() -> Self {
        EntryFlags::unpack(0xFFFF)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    pub flags: EntryFlags,
    pub first_sector: i16,
    pub utc: u32,
    pub name: String,
}

impl EntryHeader {
    pub fn pack(&self, max_filename_len: u8) -> Result<Vec<u8>> {
        if self.name.len() > max_filename_len as usize {
            return Err(SmartFsError::Domain(format!(
                "entry name {:?} exceeds max_filename_len {}",
                self.name, max_filename_len
            )));
        }
        let mut out = vec![0u8; eh_size(max_filename_len)];
        out[0..2].copy_from_slice(&self.flags.pack().to_le_bytes());
        out[2..4].copy_from_slice(&(self.first_sector as u16).to_le_bytes());
        out[4..8].copy_from_slice(&self.utc.to_le_bytes());
        let name_bytes = self.name.as_bytes();
        out[EH_NAME_OFFSET..EH_NAME_OFFSET + name_bytes.len()].copy_from_slice(name_bytes);
        Ok(out)
    }

    pub fn unpack(bytes: &[u8], max_filename_len: u8) -> Result<Self> {
        let expected = eh_size(max_filename_len);
        if bytes.len() != expected {
            return Err(SmartFsError::Decode(format!(
                "entry header expects {} bytes, got {}",
                expected,
                bytes.len()
            )));
        }
        let flags = EntryFlags::unpack(u16::from_le_bytes([bytes[0], bytes[1]]));
        let first_sector = u16::from_le_bytes([bytes[2], bytes[3]]) as i16;
        let utc = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let name_raw = &bytes[EH_NAME_OFFSET..];
        let end = name_raw.iter().position(|&b| b == 0).unwrap_or(name_raw.len());
        let name = String::from_utf8_lossy(&name_raw[..end]).into_owned();
        Ok(EntryHeader {
            flags,
            first_sector,
            utc,
            name,
        })
    }

    /// True when the slot's name byte shows the `0xFF` never-written marker.
    pub fn is_never_written(bytes: &[u8]) -> bool {
        bytes.get(EH_NAME_OFFSET) == Some(&0xFF)
    }
}
