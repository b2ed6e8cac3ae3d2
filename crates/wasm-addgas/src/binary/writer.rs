//! Encoding counterpart of [`Cursor`](super::Cursor).

/// Growable output buffer with canonical LEB128 encoders.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }

    pub fn write_u8(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn write_u32_le(&mut self, value: u32) {
        self.write(&value.to_le_bytes());
    }

    pub fn write_var_u32(&mut self, value: u32) {
        self.write_var_u64(u64::from(value));
    }

    pub fn write_var_u64(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.write_u8(byte);
                return;
            }
            self.write_u8(byte | 0x80);
        }
    }

    pub fn write_var_i32(&mut self, value: i32) {
        self.write_var_i64(i64::from(value));
    }

    pub fn write_var_i64(&mut self, mut value: i64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
            if done {
                self.write_u8(byte);
                return;
            }
            self.write_u8(byte | 0x80);
        }
    }

    /// Length-prefixed byte vector.
    pub fn write_bytes_vec(&mut self, bytes: &[u8]) {
        self.write_var_u32(bytes.len() as u32);
        self.write(bytes);
    }

    pub fn write_name(&mut self, name: &str) {
        self.write_bytes_vec(name.as_bytes());
    }
}
