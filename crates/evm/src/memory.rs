use sandbox_types::U256;

/// Byte-addressed frame memory, always a whole number of words long.
///
/// Callers expand it through [`Memory::resize_words`] after charging for the
/// expansion; reads and writes below assume the range is already covered.
#[derive(Debug, Clone, Default)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn resize_words(&mut self, words: usize) {
        let size = words * 32;
        if size > self.data.len() {
            self.data.resize(size, 0);
        }
    }

    pub fn words(&self) -> usize {
        self.data.len() / 32
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copies `size` bytes out, zero-filling anything past the end.
    pub fn get(&self, offset: usize, size: usize) -> Vec<u8> {
        let mut out = vec![0u8; size];
        if offset < self.data.len() {
            let end = offset.saturating_add(size).min(self.data.len());
            out[..end - offset].copy_from_slice(&self.data[offset..end]);
        }
        out
    }

    pub fn get_word(&self, offset: usize) -> U256 {
        U256::from_big_endian(&self.get(offset, 32))
    }

    pub fn set(&mut self, offset: usize, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let end = offset + data.len();
        if end > self.data.len() {
            self.data.resize(end.div_ceil(32) * 32, 0);
        }
        self.data[offset..end].copy_from_slice(data);
    }

    pub fn set_word(&mut self, offset: usize, value: U256) {
        let mut word = [0u8; 32];
        value.to_big_endian(&mut word);
        self.set(offset, &word);
    }

    pub fn set_byte(&mut self, offset: usize, byte: u8) {
        self.set(offset, &[byte]);
    }

    /// Writes `size` bytes taken from `source` at `source_offset`, padding
    /// with zeros where the source runs out.
    pub fn set_padded(&mut self, offset: usize, source: &[u8], source_offset: U256, size: usize) {
        if size == 0 {
            return;
        }
        let chunk = padded_slice(source, source_offset, size);
        self.set(offset, &chunk);
    }

    pub fn copy_within(&mut self, dst: usize, src: usize, len: usize) {
        if len == 0 {
            return;
        }
        let data = self.get(src, len);
        self.set(dst, &data);
    }
}

/// `size` bytes of `source` starting at `offset`, zero-padded on the right.
pub fn padded_slice(source: &[u8], offset: U256, size: usize) -> Vec<u8> {
    let mut out = vec![0u8; size];
    if offset < U256::from(source.len()) {
        let start = offset.as_usize();
        let end = start.saturating_add(size).min(source.len());
        out[..end - start].copy_from_slice(&source[start..end]);
    }
    out
}
