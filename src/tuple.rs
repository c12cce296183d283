use crate::schema::{FieldType, Schema};
use crate::OError;

// where one column's value lives inside an encoded tuple buffer
#[derive(Clone, Debug)]
pub struct SlotDescriptor {
    pub field_type: FieldType,
    // char width, unused otherwise
    pub length: usize,
    pub tuple_offset: usize,
    pub null_indicator_offset: usize,
    pub null_indicator_bit: u8,
}

impl SlotDescriptor {
    // bytes the slot occupies in the fixed region. variable-length slots
    // hold a (u32 offset, u32 len) pair into the tuple's tail.
    fn slot_width(&self) -> usize {
        if self.field_type.is_variable() {
            return 8;
        }
        match self.field_type {
            FieldType::TinyInt => 1,
            FieldType::SmallInt => 2,
            FieldType::Int | FieldType::Float | FieldType::Date => 4,
            FieldType::BigInt | FieldType::Double | FieldType::DateTime => 8,
            FieldType::LargeInt | FieldType::Decimal => 16,
            FieldType::Char => self.length,
            FieldType::Varchar | FieldType::Hll | FieldType::Bitmap => unreachable!(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TupleDescriptor {
    // size of the fixed region; out-of-line bytes follow it
    pub byte_size: usize,
}

// lay out slots for a schema: null indicator bits up front, one per
// column, then the fixed slots in column order
pub fn plan_slots(schema: &Schema) -> (TupleDescriptor, Vec<SlotDescriptor>) {
    let n = schema.num_columns();
    let mut offset = (n + 7) / 8;
    let mut slots = Vec::with_capacity(n);
    for (i, c) in schema.columns().iter().enumerate() {
        let mut slot = SlotDescriptor {
            field_type: c.field_type,
            length: c.length,
            tuple_offset: 0,
            null_indicator_offset: i / 8,
            null_indicator_bit: 1 << (i % 8),
        };
        slot.tuple_offset = offset;
        offset += slot.slot_width();
        slots.push(slot);
    }
    (TupleDescriptor { byte_size: offset }, slots)
}

// read view over one encoded tuple delivered by the upstream batcher
pub struct Tuple<'a> {
    data: &'a [u8],
}

impl<'a> Tuple<'a> {
    pub fn new(desc: &TupleDescriptor, data: &'a [u8]) -> Result<Tuple<'a>, OError> {
        if data.len() < desc.byte_size {
            return Err(OError::Internal(format!(
                "tuple of {} bytes is smaller than its descriptor ({})",
                data.len(),
                desc.byte_size
            )));
        }
        Ok(Tuple { data })
    }

    pub fn is_null(&self, slot: &SlotDescriptor) -> bool {
        self.data[slot.null_indicator_offset] & slot.null_indicator_bit != 0
    }

    // resolved value bytes: the fixed payload for fixed-width slots, the
    // out-of-line bytes for variable-length ones
    pub fn get_slot(&self, slot: &SlotDescriptor) -> &'a [u8] {
        let off = slot.tuple_offset;
        if !slot.field_type.is_variable() {
            return &self.data[off..off + slot.slot_width()];
        }
        let data_off =
            u32::from_le_bytes(self.data[off..off + 4].try_into().unwrap()) as usize;
        let len = u32::from_le_bytes(self.data[off + 4..off + 8].try_into().unwrap()) as usize;
        &self.data[data_off..data_off + len]
    }
}

// encodes tuples the way the load pipeline's batcher does; tests and
// demo producers go through this
pub struct TupleBuilder<'a> {
    slots: &'a [SlotDescriptor],
    buf: Vec<u8>,
}

impl<'a> TupleBuilder<'a> {
    pub fn new(desc: &TupleDescriptor, slots: &'a [SlotDescriptor]) -> TupleBuilder<'a> {
        TupleBuilder {
            slots,
            buf: vec![0; desc.byte_size],
        }
    }

    pub fn set_null(&mut self, i: usize) -> &mut Self {
        let slot = &self.slots[i];
        self.buf[slot.null_indicator_offset] |= slot.null_indicator_bit;
        self
    }

    fn put_fixed(&mut self, i: usize, bytes: &[u8]) -> &mut Self {
        let slot = &self.slots[i];
        assert_eq!(bytes.len(), slot.slot_width(), "slot width mismatch");
        self.buf[slot.tuple_offset..slot.tuple_offset + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn set_i8(&mut self, i: usize, v: i8) -> &mut Self {
        self.put_fixed(i, &v.to_le_bytes())
    }

    pub fn set_i16(&mut self, i: usize, v: i16) -> &mut Self {
        self.put_fixed(i, &v.to_le_bytes())
    }

    pub fn set_i32(&mut self, i: usize, v: i32) -> &mut Self {
        self.put_fixed(i, &v.to_le_bytes())
    }

    pub fn set_i64(&mut self, i: usize, v: i64) -> &mut Self {
        self.put_fixed(i, &v.to_le_bytes())
    }

    pub fn set_i128(&mut self, i: usize, v: i128) -> &mut Self {
        self.put_fixed(i, &v.to_le_bytes())
    }

    pub fn set_f32(&mut self, i: usize, v: f32) -> &mut Self {
        self.put_fixed(i, &v.to_le_bytes())
    }

    pub fn set_f64(&mut self, i: usize, v: f64) -> &mut Self {
        self.put_fixed(i, &v.to_le_bytes())
    }

    pub fn set_date(&mut self, i: usize, v: u32) -> &mut Self {
        self.put_fixed(i, &v.to_le_bytes())
    }

    // char columns take fixed bytes; variable-length columns go to the tail
    pub fn set_bytes(&mut self, i: usize, bytes: &[u8]) -> &mut Self {
        let slot = &self.slots[i];
        if slot.field_type == FieldType::Char {
            let w = slot.length;
            let n = bytes.len().min(w);
            let off = slot.tuple_offset;
            self.buf[off..off + n].copy_from_slice(&bytes[..n]);
            for b in &mut self.buf[off + n..off + w] {
                *b = 0;
            }
            return self;
        }
        assert!(slot.field_type.is_variable(), "slot is fixed width");
        let data_off = self.buf.len() as u32;
        let len = bytes.len() as u32;
        self.buf.extend_from_slice(bytes);
        let off = slot.tuple_offset;
        self.buf[off..off + 4].copy_from_slice(&data_off.to_le_bytes());
        self.buf[off + 4..off + 8].copy_from_slice(&len.to_le_bytes());
        self
    }

    pub fn set_str(&mut self, i: usize, s: &str) -> &mut Self {
        self.set_bytes(i, s.as_bytes())
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}
