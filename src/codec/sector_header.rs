use super::status::SectorStatus;
use crate::error::{Result, SmartFsError};

pub const SH_SIZE: usize = 5;

/// Sector header, version 1. Byte 3 holds either the high byte of the
/// sequence number or the CRC-8 of the sector, depending on whether
/// CRC is enabled in the status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorHeader {
    pub logical_sector_number: u16,
    pub seq_low: u8,
    pub seq_high_or_crc: u8,
    pub status: SectorStatus,
}

impl SectorHeader {
    pub fn pack(&self) -> [u8; SH_SIZE] {
        let mut out = [0u8; SH_SIZE];
        let l = self.logical_sector_number.to_le_bytes();
        out[0] = l[0];
        out[1] = l[1];
        out[2] = self.seq_low;
        out[3] = self.seq_high_or_crc;
        out[4] = self.status.pack();
        out
    }

    pub fn unpack(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SH_SIZE {
            return Err(SmartFsError::Decode(format!(
                "sector header expects {} bytes, got {}",
                SH_SIZE,
                bytes.len()
            )));
        }
        let status = SectorStatus::unpack(bytes[4])?;
        Ok(SectorHeader {
            logical_sector_number: u16::from_le_bytes([bytes[0], bytes[1]]),
            seq_low: bytes[2],
            seq_high_or_crc: bytes[3],
            status,
        })
    }
}
