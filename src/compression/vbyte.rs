use bytes::BufMut;
use crate::core::error::{Error, ErrorKind, Result};

/// Variable byte encoding for integers (best for small integers)
pub struct VByteEncoder;

impl VByteEncoder {
    /// Encode single u32 value
    /// Values < 128 use 1 byte, < 16384 use 2 bytes, etc.
    pub fn encode_u32<B: BufMut>(output: &mut B, mut value: u32) {
        while value >= 128 {
            output.put_u8((value & 127) as u8 | 128);  // Set continuation bit
            value >>= 7;
        }
        output.put_u8(value as u8);  // Last byte without continuation bit
    }

    pub fn encoded_len_u32(value: u32) -> usize {
        match value {
            0..=0x7f => 1,
            0x80..=0x3fff => 2,
            0x4000..=0x1f_ffff => 3,
            0x20_0000..=0xfff_ffff => 4,
            _ => 5,
        }
    }

    /// Decode single u32 value, returns (value, bytes_consumed)
    pub fn decode_u32(input: &[u8]) -> Result<(u32, usize)> {
        let mut value = 0u32;
        let mut shift = 0;
        let mut consumed = 0;

        for &byte in input {
            consumed += 1;
            value |= ((byte & 127) as u32) << shift;

            if byte & 128 == 0 {  // No continuation bit
                return Ok((value, consumed));
            }

            shift += 7;
            if shift > 28 {  // Max 5 bytes for u32
                return Err(Error::new(ErrorKind::Parse, "VByte overflow".to_string()));
            }
        }

        Err(Error::malformed("Incomplete VByte"))
    }
}

/// Forward reader over an encoded value with explicit positioning
#[derive(Debug, Clone)]
pub struct VByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> VByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        VByteReader { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn available(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::malformed(format!(
                "seek to {} beyond end of stream ({})", pos, self.data.len()
            )));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = *self.data.get(self.pos)
            .ok_or_else(|| Error::malformed("unexpected end of stream reading byte"))?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let (value, consumed) = VByteEncoder::decode_u32(&self.data[self.pos..])?;
        self.pos += consumed;
        Ok(value)
    }

    pub fn read_fixed_u32(&mut self) -> Result<u32> {
        let raw = self.read_raw(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    pub fn read_fixed_u64(&mut self) -> Result<u64> {
        let raw = self.read_raw(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        Ok(u64::from_le_bytes(buf))
    }

    /// Borrow the next `len` bytes without decoding them
    pub fn read_raw(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.available() < len {
            return Err(Error::malformed(format!(
                "need {} bytes at offset {}, only {} left", len, self.pos, self.available()
            )));
        }
        let raw = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(raw)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_raw(len).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_len_matches_output() {
        for value in [0u32, 1, 127, 128, 16_383, 16_384, 2_097_151, 2_097_152, u32::MAX] {
            let mut out = Vec::new();
            VByteEncoder::encode_u32(&mut out, value);
            assert_eq!(out.len(), VByteEncoder::encoded_len_u32(value), "value {}", value);
            assert_eq!(VByteEncoder::decode_u32(&out).unwrap(), (value, out.len()));
        }
    }

    #[test]
    fn truncated_input_is_malformed() {
        let err = VByteEncoder::decode_u32(&[0x80, 0x80]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedStream);
    }

    #[test]
    fn reader_mixes_fixed_and_variable_fields() {
        let mut out = Vec::new();
        VByteEncoder::encode_u32(&mut out, 300);
        out.put_u8(7);
        out.put_u32_le(0xdead_beef);
        out.put_u64_le(42);

        let mut reader = VByteReader::new(&out);
        assert_eq!(reader.read_u32().unwrap(), 300);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.read_fixed_u32().unwrap(), 0xdead_beef);
        assert_eq!(reader.read_fixed_u64().unwrap(), 42);
        assert!(reader.is_empty());
        assert_eq!(reader.read_u8().unwrap_err().kind, ErrorKind::MalformedStream);
    }

    #[test]
    fn skip_past_end_fails() {
        let data = [1u8, 2, 3];
        let mut reader = VByteReader::new(&data);
        reader.skip(2).unwrap();
        assert_eq!(reader.skip(2).unwrap_err().kind, ErrorKind::MalformedStream);
        assert_eq!(reader.position(), 2);
    }
}
