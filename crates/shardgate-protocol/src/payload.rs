use bytes::{Buf, BufMut, Bytes, BytesMut};
use shardgate_core::error::ProxyError;

/// Write side of a MySQL packet payload. Integers are little-endian.
#[derive(Debug, Default)]
pub struct PacketPayload {
    buf: BytesMut,
}

impl PacketPayload {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn write_int1(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_int2(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    pub fn write_int3(&mut self, value: u32) {
        self.buf.put_uint_le(u64::from(value & 0x00ff_ffff), 3);
    }

    pub fn write_int4(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    pub fn write_int8(&mut self, value: u64) {
        self.buf.put_u64_le(value);
    }

    /// Length-encoded integer: 1, 3, 4 or 9 bytes depending on magnitude.
    pub fn write_int_lenenc(&mut self, value: u64) {
        if value < 0xfb {
            self.buf.put_u8(value as u8);
        } else if value < 1 << 16 {
            self.buf.put_u8(0xfc);
            self.buf.put_u16_le(value as u16);
        } else if value < 1 << 24 {
            self.buf.put_u8(0xfd);
            self.buf.put_uint_le(value, 3);
        } else {
            self.buf.put_u8(0xfe);
            self.buf.put_u64_le(value);
        }
    }

    pub fn write_bytes_lenenc(&mut self, value: &[u8]) {
        self.write_int_lenenc(value.len() as u64);
        self.buf.extend_from_slice(value);
    }

    pub fn write_string_lenenc(&mut self, value: &str) {
        self.write_bytes_lenenc(value.as_bytes());
    }

    pub fn write_string_nul(&mut self, value: &str) {
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.put_u8(0);
    }

    pub fn write_string_eof(&mut self, value: &str) {
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn write_bytes(&mut self, value: &[u8]) {
        self.buf.extend_from_slice(value);
    }

    pub fn write_zero(&mut self, count: usize) {
        self.buf.put_bytes(0, count);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Read side of a MySQL packet payload. Every read checks the remaining
/// length first and reports truncation as a protocol error.
#[derive(Debug, Clone)]
pub struct PayloadReader {
    buf: Bytes,
}

impl PayloadReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    fn need(&self, count: usize, what: &str) -> Result<(), ProxyError> {
        if self.buf.remaining() < count {
            return Err(ProxyError::Protocol(format!(
                "truncated payload reading {what}: need {count} bytes, have {}",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn read_int1(&mut self) -> Result<u8, ProxyError> {
        self.need(1, "int<1>")?;
        Ok(self.buf.get_u8())
    }

    pub fn read_int2(&mut self) -> Result<u16, ProxyError> {
        self.need(2, "int<2>")?;
        Ok(self.buf.get_u16_le())
    }

    pub fn read_int3(&mut self) -> Result<u32, ProxyError> {
        self.need(3, "int<3>")?;
        Ok(self.buf.get_uint_le(3) as u32)
    }

    pub fn read_int4(&mut self) -> Result<u32, ProxyError> {
        self.need(4, "int<4>")?;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_int8(&mut self) -> Result<u64, ProxyError> {
        self.need(8, "int<8>")?;
        Ok(self.buf.get_u64_le())
    }

    pub fn read_f32(&mut self) -> Result<f32, ProxyError> {
        self.need(4, "float")?;
        Ok(self.buf.get_f32_le())
    }

    pub fn read_f64(&mut self) -> Result<f64, ProxyError> {
        self.need(8, "double")?;
        Ok(self.buf.get_f64_le())
    }

    pub fn read_int_lenenc(&mut self) -> Result<u64, ProxyError> {
        let first = self.read_int1()?;
        match first {
            0xfc => Ok(u64::from(self.read_int2()?)),
            0xfd => Ok(u64::from(self.read_int3()?)),
            0xfe => self.read_int8(),
            0xfb | 0xff => Err(ProxyError::Protocol(format!(
                "invalid length-encoded integer prefix 0x{first:02x}"
            ))),
            small => Ok(u64::from(small)),
        }
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Bytes, ProxyError> {
        self.need(count, "fixed bytes")?;
        Ok(self.buf.split_to(count))
    }

    pub fn read_bytes_lenenc(&mut self) -> Result<Bytes, ProxyError> {
        let len = self.read_int_lenenc()?;
        let len = usize::try_from(len)
            .map_err(|_| ProxyError::Protocol(format!("length {len} exceeds address space")))?;
        self.read_bytes(len)
    }

    pub fn read_string_nul(&mut self) -> Result<String, ProxyError> {
        let end = self
            .buf
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| ProxyError::Protocol("unterminated string".into()))?;
        let raw = self.buf.split_to(end);
        self.buf.advance(1);
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    pub fn read_string_eof(&mut self) -> String {
        let raw = self.buf.split_to(self.buf.len());
        String::from_utf8_lossy(&raw).into_owned()
    }

    pub fn skip(&mut self, count: usize) -> Result<(), ProxyError> {
        self.need(count, "skipped bytes")?;
        self.buf.advance(count);
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::{PacketPayload, PayloadReader};

    #[test]
    fn lenenc_int_thresholds() {
        let cases: [(u64, &[u8]); 5] = [
            (250, &[250]),
            (251, &[0xfc, 0xfb, 0x00]),
            (65_535, &[0xfc, 0xff, 0xff]),
            (65_536, &[0xfd, 0x00, 0x00, 0x01]),
            (
                1 << 24,
                &[0xfe, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00],
            ),
        ];
        for (value, expected) in cases {
            let mut payload = PacketPayload::new();
            payload.write_int_lenenc(value);
            let bytes = payload.freeze();
            assert_eq!(&bytes[..], expected, "encoding {value}");
            let mut reader = PayloadReader::new(bytes);
            assert_eq!(reader.read_int_lenenc().expect("read"), value);
        }
    }

    #[test]
    fn truncated_reads_fail() {
        let mut reader = PayloadReader::new(bytes::Bytes::from_static(&[0x01, 0x02]));
        assert!(reader.read_int4().is_err());
        let mut reader = PayloadReader::new(bytes::Bytes::from_static(&[0x05, b'a']));
        assert!(reader.read_bytes_lenenc().is_err());
    }

    #[test]
    fn nul_terminated_strings() {
        let mut payload = PacketPayload::new();
        payload.write_string_nul("root");
        payload.write_string_eof("rest");
        let mut reader = PayloadReader::new(payload.freeze());
        assert_eq!(reader.read_string_nul().expect("nul"), "root");
        assert_eq!(reader.read_string_eof(), "rest");
        assert_eq!(reader.remaining(), 0);
    }
}
