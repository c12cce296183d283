use crate::utils::varint::{put_uvarint, uvarint};
use crate::OError;
use bytes::BytesMut;

// exact distinct set of u64 values, kept sorted so union is a linear
// merge and serialization can delta-encode.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    vals: Vec<u64>,
}

impl Bitmap {
    pub fn new() -> Bitmap {
        Bitmap::default()
    }

    pub fn add(&mut self, v: u64) {
        if let Err(pos) = self.vals.binary_search(&v) {
            self.vals.insert(pos, v);
        }
    }

    pub fn contains(&self, v: u64) -> bool {
        self.vals.binary_search(&v).is_ok()
    }

    pub fn cardinality(&self) -> u64 {
        self.vals.len() as u64
    }

    pub fn merge(&mut self, other: &Bitmap) {
        if other.vals.is_empty() {
            return;
        }
        let mut merged = Vec::with_capacity(self.vals.len() + other.vals.len());
        let (mut i, mut j) = (0, 0);
        while i < self.vals.len() && j < other.vals.len() {
            let (a, b) = (self.vals[i], other.vals[j]);
            if a < b {
                merged.push(a);
                i += 1;
            } else if b < a {
                merged.push(b);
                j += 1;
            } else {
                merged.push(a);
                i += 1;
                j += 1;
            }
        }
        merged.extend_from_slice(&self.vals[i..]);
        merged.extend_from_slice(&other.vals[j..]);
        self.vals = merged;
    }

    pub fn serialize(&self, dst: &mut BytesMut) {
        put_uvarint(dst, self.vals.len() as u64);
        let mut prev = 0u64;
        for (i, v) in self.vals.iter().enumerate() {
            let delta = if i == 0 { *v } else { *v - prev };
            put_uvarint(dst, delta);
            prev = *v;
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Bitmap, OError> {
        let truncated = || OError::Corruption("bitmap input truncated".into());
        let (n, mut pos) = uvarint(data).ok_or_else(truncated)?;
        let mut vals = Vec::with_capacity(n as usize);
        let mut cur = 0u64;
        for i in 0..n {
            let (delta, used) = uvarint(&data[pos..]).ok_or_else(truncated)?;
            pos += used;
            if i > 0 && delta == 0 {
                return Err(OError::Corruption("bitmap deltas not increasing".into()));
            }
            cur = cur
                .checked_add(delta)
                .ok_or_else(|| OError::Corruption("bitmap delta overflow".into()))?;
            vals.push(cur);
        }
        if pos != data.len() {
            return Err(OError::Corruption("bitmap trailing bytes".into()));
        }
        Ok(Bitmap { vals })
    }
}
