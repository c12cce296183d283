use crate::utils::varint::{put_uvarint, uvarint};
use crate::OError;
use bytes::{BufMut, BytesMut};

const REGISTER_BITS: usize = 14;
const NUM_REGISTERS: usize = 1 << REGISTER_BITS;
// small sets stay as explicit hashes until promotion pays off
const EXPLICIT_LIMIT: usize = 160;

const TAG_EMPTY: u8 = 0;
const TAG_EXPLICIT: u8 = 1;
const TAG_DENSE: u8 = 2;

// hyperloglog over pre-hashed 64-bit values. the tuple source delivers
// these serialized; the memtable unions them per key and re-serializes
// at flush.
pub struct Hll {
    rep: Rep,
}

enum Rep {
    Empty,
    Explicit(Vec<u64>),
    Dense(Box<[u8]>),
}

impl Default for Hll {
    fn default() -> Self {
        Self::new()
    }
}

impl Hll {
    pub fn new() -> Hll {
        Hll { rep: Rep::Empty }
    }

    pub fn insert_hash(&mut self, h: u64) {
        match &mut self.rep {
            Rep::Empty => self.rep = Rep::Explicit(vec![h]),
            Rep::Explicit(hashes) => {
                if !hashes.contains(&h) {
                    hashes.push(h);
                }
            }
            Rep::Dense(regs) => {
                set_register(regs, h);
                return;
            }
        }
        if matches!(&self.rep, Rep::Explicit(hashes) if hashes.len() > EXPLICIT_LIMIT) {
            self.promote();
        }
    }

    fn promote(&mut self) {
        let hashes = match std::mem::replace(&mut self.rep, Rep::Empty) {
            Rep::Explicit(hashes) => hashes,
            other => {
                self.rep = other;
                return;
            }
        };
        let mut regs = vec![0u8; NUM_REGISTERS].into_boxed_slice();
        for h in hashes {
            set_register(&mut regs, h);
        }
        self.rep = Rep::Dense(regs);
    }

    pub fn merge(&mut self, other: &Hll) {
        match &other.rep {
            Rep::Empty => {}
            Rep::Explicit(hashes) => {
                for h in hashes {
                    self.insert_hash(*h);
                }
            }
            Rep::Dense(oregs) => {
                if !matches!(self.rep, Rep::Dense(_)) {
                    self.promote_from_any();
                }
                if let Rep::Dense(regs) = &mut self.rep {
                    for (r, o) in regs.iter_mut().zip(oregs.iter()) {
                        if *o > *r {
                            *r = *o;
                        }
                    }
                }
            }
        }
    }

    fn promote_from_any(&mut self) {
        match &self.rep {
            Rep::Empty => self.rep = Rep::Dense(vec![0u8; NUM_REGISTERS].into_boxed_slice()),
            Rep::Explicit(_) => self.promote(),
            Rep::Dense(_) => {}
        }
    }

    pub fn estimate(&self) -> u64 {
        match &self.rep {
            Rep::Empty => 0,
            Rep::Explicit(hashes) => hashes.len() as u64,
            Rep::Dense(regs) => dense_estimate(regs),
        }
    }

    pub fn serialize(&self, dst: &mut BytesMut) {
        match &self.rep {
            Rep::Empty => dst.put_u8(TAG_EMPTY),
            Rep::Explicit(hashes) => {
                dst.put_u8(TAG_EXPLICIT);
                put_uvarint(dst, hashes.len() as u64);
                for h in hashes {
                    dst.put_u64_le(*h);
                }
            }
            Rep::Dense(regs) => {
                dst.put_u8(TAG_DENSE);
                dst.put_slice(regs);
            }
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Hll, OError> {
        if data.is_empty() {
            return Err(OError::Corruption("empty hll input".into()));
        }
        match data[0] {
            TAG_EMPTY => Ok(Hll::new()),
            TAG_EXPLICIT => {
                let body = &data[1..];
                let (n, head) = uvarint(body)
                    .ok_or_else(|| OError::Corruption("hll explicit count truncated".into()))?;
                let n = n as usize;
                if n > EXPLICIT_LIMIT || body.len() != head + n * 8 {
                    return Err(OError::Corruption("hll explicit body malformed".into()));
                }
                let mut hashes = Vec::with_capacity(n);
                for i in 0..n {
                    let off = head + i * 8;
                    hashes.push(u64::from_le_bytes(
                        body[off..off + 8].try_into().unwrap(),
                    ));
                }
                Ok(Hll {
                    rep: if hashes.is_empty() {
                        Rep::Empty
                    } else {
                        Rep::Explicit(hashes)
                    },
                })
            }
            TAG_DENSE => {
                if data.len() != 1 + NUM_REGISTERS {
                    return Err(OError::Corruption("hll register body malformed".into()));
                }
                let mut regs = vec![0u8; NUM_REGISTERS].into_boxed_slice();
                regs.copy_from_slice(&data[1..]);
                Ok(Hll {
                    rep: Rep::Dense(regs),
                })
            }
            t => Err(OError::Corruption(format!("unknown hll tag {}", t))),
        }
    }
}

fn set_register(regs: &mut [u8], h: u64) {
    let idx = (h >> (64 - REGISTER_BITS)) as usize;
    let rest = h << REGISTER_BITS;
    let rho = if rest == 0 {
        (64 - REGISTER_BITS) as u8 + 1
    } else {
        rest.leading_zeros() as u8 + 1
    };
    if rho > regs[idx] {
        regs[idx] = rho;
    }
}

fn dense_estimate(regs: &[u8]) -> u64 {
    let m = NUM_REGISTERS as f64;
    let alpha = 0.7213 / (1.0 + 1.079 / m);
    let mut sum = 0f64;
    let mut zeros = 0u64;
    for r in regs {
        sum += 1.0 / (1u64 << *r) as f64;
        if *r == 0 {
            zeros += 1;
        }
    }
    let mut e = alpha * m * m / sum;
    // linear counting corrects the low range
    if e <= 2.5 * m && zeros > 0 {
        e = m * (m / zeros as f64).ln();
    }
    e.round() as u64
}

#[cfg(test)]
mod test {
    use super::{Hll, EXPLICIT_LIMIT};
    use bytes::BytesMut;

    fn hash(v: u64) -> u64 {
        // splitmix64, good enough to feed register distribution
        let mut z = v.wrapping_add(0x9e3779b97f4a7c15);
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        z ^ (z >> 31)
    }

    #[test]
    fn test_explicit_exact() {
        let mut h = Hll::new();
        for v in 0..100u64 {
            h.insert_hash(hash(v));
            h.insert_hash(hash(v)); // duplicates don't count
        }
        assert_eq!(h.estimate(), 100);
    }

    #[test]
    fn test_promotion_and_accuracy() {
        let mut h = Hll::new();
        let n = 100_000u64;
        for v in 0..n {
            h.insert_hash(hash(v));
        }
        let e = h.estimate() as f64;
        let err = (e - n as f64).abs() / n as f64;
        // 2^14 registers put the standard error around 0.8%
        assert!(err < 0.05, "estimate {} off by {}", e, err);
    }

    #[test]
    fn test_merge_and_round_trip() {
        let mut a = Hll::new();
        let mut b = Hll::new();
        for v in 0..(EXPLICIT_LIMIT as u64 * 4) {
            if v % 2 == 0 {
                a.insert_hash(hash(v));
            } else {
                b.insert_hash(hash(v));
            }
        }
        a.merge(&b);
        let merged = a.estimate();

        let mut buf = BytesMut::new();
        a.serialize(&mut buf);
        let back = Hll::from_bytes(&buf).unwrap();
        assert_eq!(back.estimate(), merged);
    }

    #[test]
    fn test_small_merge_stays_explicit_exact() {
        let mut a = Hll::new();
        let mut b = Hll::new();
        for v in 0..30u64 {
            a.insert_hash(hash(v));
        }
        for v in 20..50u64 {
            b.insert_hash(hash(v));
        }
        a.merge(&b);
        assert_eq!(a.estimate(), 50);
    }

    #[test]
    fn test_bad_input() {
        assert!(Hll::from_bytes(&[]).is_err());
        assert!(Hll::from_bytes(&[9]).is_err());
        assert!(Hll::from_bytes(&[2, 0, 0]).is_err());
        let mut buf = BytesMut::new();
        Hll::new().serialize(&mut buf);
        assert_eq!(Hll::from_bytes(&buf).unwrap().estimate(), 0);
    }
}
