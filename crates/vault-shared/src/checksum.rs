//! POSIX `cksum` digest.
//!
//! CRC-32 (poly 0x04C11DB7, MSB first, init 0) over the content, then over the
//! content length as little-endian bytes with the high zero bytes dropped,
//! complemented at the end. The client compares its own value against ours,
//! so the result must match `cksum(1)` bit for bit. Chunking does not change
//! the result.

use crc::{Crc, Digest, CRC_32_CKSUM};

static CKSUM: Crc<u32> = Crc::<u32>::new(&CRC_32_CKSUM);

/// Incremental `cksum` state.
pub struct Cksum {
    digest: Digest<'static, u32>,
    len: u64,
}

impl Cksum {
    pub fn new() -> Self {
        Self {
            digest: CKSUM.digest(),
            len: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
        self.len += data.len() as u64;
    }

    pub fn finish(mut self) -> u32 {
        let mut n = self.len;
        while n != 0 {
            self.digest.update(&[n as u8]);
            n >>= 8;
        }
        self.digest.finalize()
    }
}

impl Default for Cksum {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot `cksum` of an in-memory buffer.
pub fn cksum(data: &[u8]) -> u32 {
    let mut state = Cksum::new();
    state.update(data);
    state.finish()
}
