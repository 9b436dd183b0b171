//! Bounds-checked little-endian packet reader

use crate::{Result, TimingError};

/// Cursor over a datagram. Every read checks the remaining length first and
/// fails with [`TimingError::Decode`] instead of reading past the end.
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
    packet: &'static str,
}

impl<'a> PacketReader<'a> {
    /// Create a reader positioned after the packet type byte.
    pub fn after_type(data: &'a [u8], packet: &'static str) -> Result<Self> {
        let mut reader = Self { data, pos: 0, packet };
        reader.read_u8()?;
        Ok(reader)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(TimingError::decode(
                self.packet,
                format!("need {} bytes at offset {}, have {}", len, self.pos, remaining),
            ));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    /// Byte-count prefixed UTF-8 string. Invalid sequences decode to U+FFFD.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u8()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Character-count prefixed UTF-32LE string. Invalid scalars decode to U+FFFD.
    pub fn read_wide_string(&mut self) -> Result<String> {
        let chars = self.read_u8()? as usize;
        let bytes = self.take(chars * 4)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| {
                let scalar = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                char::from_u32(scalar).unwrap_or(char::REPLACEMENT_CHARACTER)
            })
            .collect())
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}
