//! Fixed little-endian wire types for the size exchange.

use bytemuck::{Pod, Zeroable};

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

/// A per-rank count, stored pre-LE.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct WireCount {
    pub n_le: u64,
}

impl WireCount {
    pub const SIZE: usize = std::mem::size_of::<WireCount>();

    pub fn new(n: u64) -> Self {
        Self { n_le: n.to_le() }
    }

    pub fn get(self) -> u64 {
        u64::from_le(self.n_le)
    }
}

/// Decodes a byte buffer of `WireCount`s. The buffer need not be aligned.
pub fn decode_counts(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(WireCount::SIZE)
        .map(|chunk| {
            let mut c = WireCount::default();
            cast_slice_mut(std::slice::from_mut(&mut c)).copy_from_slice(chunk);
            c.get()
        })
        .collect()
}

pub fn encode_counts(counts: &[u64]) -> Vec<u8> {
    let wire: Vec<WireCount> = counts.iter().map(|&n| WireCount::new(n)).collect();
    cast_slice(&wire).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_survive_the_wire() {
        let counts = [0, 3, u64::MAX, 42];
        let bytes = encode_counts(&counts);
        assert_eq!(bytes.len(), counts.len() * WireCount::SIZE);
        assert_eq!(decode_counts(&bytes), counts);
    }

    #[test]
    fn decode_ignores_unaligned_offsets() {
        let mut bytes = vec![0u8];
        bytes.extend(encode_counts(&[7, 9]));
        assert_eq!(decode_counts(&bytes[1..]), vec![7, 9]);
    }
}
