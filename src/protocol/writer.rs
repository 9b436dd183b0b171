//! Little-endian packet writer

/// Maximum length of either string encoding; the prefix is a single byte.
const MAX_STRING_UNITS: usize = u8::MAX as usize;

/// Growable buffer that writes fields in wire order.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    /// Start a packet with its type byte.
    pub fn new(packet_type: u8) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.push(packet_type);
        Self { buf }
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.u8(u8::from(value))
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn f32(&mut self, value: f32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Byte-count prefixed UTF-8. Longer strings are cut at the last char
    /// boundary that fits in 255 bytes.
    pub fn string(&mut self, value: &str) -> &mut Self {
        let mut end = value.len().min(MAX_STRING_UNITS);
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        let bytes = &value.as_bytes()[..end];
        self.buf.push(bytes.len() as u8);
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Character-count prefixed UTF-32LE, at most 255 characters.
    pub fn wide_string(&mut self, value: &str) -> &mut Self {
        let chars: Vec<char> = value.chars().take(MAX_STRING_UNITS).collect();
        self.buf.push(chars.len() as u8);
        for ch in chars {
            self.buf.extend_from_slice(&(ch as u32).to_le_bytes());
        }
        self
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_fields_in_order() {
        let bytes = PacketWriter::new(200).u16(100).finish();
        assert_eq!(bytes, vec![200, 100, 0]);
    }

    #[test]
    fn long_utf8_strings_are_cut_on_char_boundaries() {
        let long = "é".repeat(200); // 400 bytes
        let bytes = PacketWriter::new(0).string(&long).finish();
        assert_eq!(bytes[1], 254);
        assert!(std::str::from_utf8(&bytes[2..]).is_ok());
    }

    #[test]
    fn wide_strings_use_four_bytes_per_char() {
        let bytes = PacketWriter::new(0).wide_string("ab").finish();
        assert_eq!(bytes, vec![0, 2, b'a', 0, 0, 0, b'b', 0, 0, 0]);
    }
}
