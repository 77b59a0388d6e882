use crate::error::{Result, SmartFsError};

pub const CH_SIZE: usize = 5;
pub const UNSET: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorType {
    Directory = 1,
    File = 2,
}

impl SectorType {
    fn from_byte(b: u8) -> Result<Self> {
        match b {
            1 => Ok(SectorType::Directory),
            2 => Ok(SectorType::File),
            other => Err(SmartFsError::Decode(format!(
                "unknown chain header sector type {}",
                other
            ))),
        }
    }
}

/// Chain header: links sectors belonging to the same entry and
/// records how many payload bytes the sector actually holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainHeader {
    pub sector_type: SectorType,
    pub next_sector: u16,
    pub used: u16,
}

impl ChainHeader {
    pub fn pack(&self) -> [u8; CH_SIZE] {
        let mut out = [0u8; CH_SIZE];
        out[0] = self.sector_type as u8;
        let next = self.next_sector.to_le_bytes();
        out[1] = next[0];
        out[2] = next[1];
        let used = self.used.to_le_bytes();
        out[3] = used[0];
        out[4] = used[1];
        out
    }

    pub fn unpack(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != CH_SIZE {
            return Err(SmartFsError::Decode(format!(
                "chain header expects {} bytes, got {}",
                CH_SIZE,
                bytes.len()
            )));
        }
        Ok(ChainHeader {
            sector_type: SectorType::from_byte(bytes[0])?,
            next_sector: u16::from_le_bytes([bytes[1], bytes[2]]),
            used: u16::from_le_bytes([bytes[3], bytes[4]]),
        })
    }

    pub fn is_end_of_chain(&self) -> bool {
        self.next_sector == UNSET
    }
}
