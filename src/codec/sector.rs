use super::chain_header::{ChainHeader, CH_SIZE};
use super::crc::crc8_ccitt;
use super::entry_header::{eh_size, EntryHeader};
use super::sector_header::{SectorHeader, SH_SIZE};
use super::status::SectorStatus;
use crate::error::{Result, SmartFsError};
use crate::geometry::CrcMode;

/// A view over one physical sector's bytes. Every mutation goes
/// through `write_bytes`, which keeps the CRC (when enabled)
/// consistent with the data it covers.
pub struct Sector<'a> {
    buf: &'a mut [u8],
}

impl<'a> Sector<'a> {
    pub fn usable_size(&self) -> usize {
        self.buf.len() - SH_SIZE
    }

    pub fn header(&self) -> Result<SectorHeader> {
        SectorHeader::unpack(&self.buf[0..SH_SIZE])
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[SH_SIZE..]
    }

    fn recompute_and_write_header(&mut self, mut header: SectorHeader) {
        if header.status.crc_enable {
            let mut crc_input = self.buf[SH_SIZE..].to_vec();
            let packed = header.pack();
            crc_input.extend_from_slice(&packed[0..3]);
            crc_input.push(packed[4]);
            header.seq_high_or_crc = crc8_ccitt(&crc_input);
        }
        self.buf[0..SH_SIZE].copy_from_slice(&header.pack());
    }

    /// Formats a fresh sector: fills the buffer with `0xFF`, writes the
    /// sector header, and recomputes the CRC.
    pub fn init(
        buf: &'a mut [u8],
        logical: u16,
        seq: u16,
        crc_mode: CrcMode,
        sector_size_code: u8,
    ) -> Self {
        for b in buf.iter_mut() {
            *b = 0xFF;
        }
        let status = SectorStatus {
            committed: true,
            released: false,
            crc_enable: crc_mode == CrcMode::Crc8,
            sector_size_code,
            format_version: 1,
        };
        let header = SectorHeader {
            logical_sector_number: logical,
            seq_low: seq as u8,
            seq_high_or_crc: (seq >> 8) as u8,
            status,
        };
        let mut s = Sector { buf };
        s.recompute_and_write_header(header);
        s
    }

    /// Attaches to an existing sector's bytes, parsing its header.
    pub fn attach(buf: &'a mut [u8]) -> Result<Self> {
        SectorHeader::unpack(&buf[0..SH_SIZE])?;
        Ok(Sector { buf })
    }

    pub fn fits(&self, offset: usize, size: usize) -> bool {
        offset.checked_add(size).map(|end| end <= self.usable_size()).unwrap_or(false)
    }

    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        if !self.fits(offset, bytes.len()) {
            return Err(SmartFsError::Capacity(format!(
                "write of {} bytes at offset {} does not fit in {}-byte sector data region",
                bytes.len(),
                offset,
                self.usable_size()
            )));
        }
        let header = self.header()?;
        let start = SH_SIZE + offset;
        self.buf[start..start + bytes.len()].copy_from_slice(bytes);
        self.recompute_and_write_header(header);
        Ok(())
    }

    pub fn read_chain_header(&self) -> Result<ChainHeader> {
        ChainHeader::unpack(&self.data()[0..CH_SIZE])
    }

    pub fn write_chain_header(&mut self, ch: &ChainHeader) -> Result<()> {
        self.write_bytes(0, &ch.pack())
    }

    pub fn next_in_chain(&self) -> Option<u16> {
        self.read_chain_header()
            .ok()
            .filter(|ch| !ch.is_end_of_chain())
            .map(|ch| ch.next_sector)
    }

    pub fn read_entry_header(&self, offset: usize, max_filename_len: u8) -> Result<EntryHeader> {
        let sz = eh_size(max_filename_len);
        if offset + sz > self.data().len() {
            return Err(SmartFsError::Decode("entry header read out of bounds".into()));
        }
        EntryHeader::unpack(&self.data()[offset..offset + sz], max_filename_len)
    }

    pub fn write_entry_header(
        &mut self,
        offset: usize,
        eh: &EntryHeader,
        max_filename_len: u8,
    ) -> Result<()> {
        let packed = eh.pack(max_filename_len)?;
        self.write_bytes(offset, &packed)
    }
}
