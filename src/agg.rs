use crate::agg::bitmap::Bitmap;
use crate::agg::hll::Hll;
use crate::compare::compare_cell;
use crate::mem::pool::MemPool;
use crate::mem::ObjectPool;
use crate::row::{CellMut, CellRef, Slice};
use crate::schema::{AggMethod, FieldType};
use crate::OError;
use bytes::BytesMut;
use std::cmp::Ordering;

pub mod bitmap;
pub mod hll;

fn fixed<const N: usize>(raw: &[u8]) -> [u8; N] {
    match raw.try_into() {
        Ok(a) => a,
        Err(_) => panic!("tuple slot is {} bytes, column expects {}", raw.len(), N),
    }
}

fn copy_out_of_line(cell: CellMut, bytes: &[u8], pool: &MemPool) -> Result<(), OError> {
    if bytes.is_empty() {
        cell.put_slice(Slice::empty());
        return Ok(());
    }
    let dst = pool.allocate(bytes.len())?;
    unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst.as_ptr(), bytes.len()) };
    cell.put_slice(Slice {
        data: dst.as_ptr(),
        size: bytes.len(),
    });
    Ok(())
}

// encode one incoming typed value into a row cell. `value` is the raw
// slot payload from the tuple source, None when the slot is null.
// variable-length bytes move into the arena; hll/bitmap inputs arrive
// serialized and become live objects in the object pool.
pub(crate) fn consume(
    cell: CellMut,
    value: Option<&[u8]>,
    pool: &MemPool,
    objs: &ObjectPool,
) -> Result<(), OError> {
    let raw = match value {
        None => {
            cell.set_null(true);
            return Ok(());
        }
        Some(raw) => raw,
    };
    cell.set_null(false);
    match cell.column().field_type {
        FieldType::TinyInt => cell.put_i8(i8::from_le_bytes(fixed::<1>(raw))),
        FieldType::SmallInt => cell.put_i16(i16::from_le_bytes(fixed::<2>(raw))),
        FieldType::Int => cell.put_i32(i32::from_le_bytes(fixed::<4>(raw))),
        FieldType::BigInt | FieldType::DateTime => {
            cell.put_i64(i64::from_le_bytes(fixed::<8>(raw)))
        }
        FieldType::LargeInt | FieldType::Decimal => {
            cell.put_i128(i128::from_le_bytes(fixed::<16>(raw)))
        }
        FieldType::Float => cell.put_f32(f32::from_le_bytes(fixed::<4>(raw))),
        FieldType::Double => cell.put_f64(f64::from_le_bytes(fixed::<8>(raw))),
        FieldType::Date => cell.put_date(u32::from_le_bytes(fixed::<4>(raw))),
        FieldType::Char => cell.put_char_bytes(raw),
        FieldType::Varchar => copy_out_of_line(cell, raw, pool)?,
        FieldType::Hll => {
            let hll = Hll::from_bytes(raw)?;
            cell.put_object(objs.add(hll));
        }
        FieldType::Bitmap => {
            let bm = Bitmap::from_bytes(raw)?;
            cell.put_object(objs.add(bm));
        }
    }
    Ok(())
}

// fold an incoming cell into an existing one with the same key.
// sum/min/max and the unions treat null as the fold identity; replace
// copies the incoming cell verbatim, null included.
pub(crate) fn agg_update(dst: CellMut, src: CellRef) {
    match dst.column().agg {
        AggMethod::None => unreachable!("agg_update on a key column"),
        AggMethod::Sum => sum_cell(dst, src),
        AggMethod::Min => {
            if !src.is_null()
                && (dst.as_ref().is_null() || compare_cell(src, dst.as_ref()) == Ordering::Less)
            {
                dst.copy_from(src);
            }
        }
        AggMethod::Max => {
            if !src.is_null()
                && (dst.as_ref().is_null() || compare_cell(src, dst.as_ref()) == Ordering::Greater)
            {
                dst.copy_from(src);
            }
        }
        AggMethod::Replace => dst.copy_from(src),
        AggMethod::HllUnion => {
            if src.is_null() {
                return;
            }
            if dst.as_ref().is_null() {
                dst.copy_from(src);
            } else {
                let d = dst.as_ref().object_ptr::<Hll>();
                let s = src.object_ptr::<Hll>();
                unsafe { (*d).merge(&*s) };
            }
        }
        AggMethod::BitmapUnion => {
            if src.is_null() {
                return;
            }
            if dst.as_ref().is_null() {
                dst.copy_from(src);
            } else {
                let d = dst.as_ref().object_ptr::<Bitmap>();
                let s = src.object_ptr::<Bitmap>();
                unsafe { (*d).merge(&*s) };
            }
        }
    }
}

fn sum_cell(dst: CellMut, src: CellRef) {
    if src.is_null() {
        return;
    }
    if dst.as_ref().is_null() {
        dst.copy_from(src);
        return;
    }
    let d = dst.as_ref();
    match dst.column().field_type {
        FieldType::TinyInt => dst.put_i8(d.get_i8().wrapping_add(src.get_i8())),
        FieldType::SmallInt => dst.put_i16(d.get_i16().wrapping_add(src.get_i16())),
        FieldType::Int => dst.put_i32(d.get_i32().wrapping_add(src.get_i32())),
        FieldType::BigInt => dst.put_i64(d.get_i64().wrapping_add(src.get_i64())),
        FieldType::LargeInt | FieldType::Decimal => {
            dst.put_i128(d.get_i128().wrapping_add(src.get_i128()))
        }
        FieldType::Float => dst.put_f32(d.get_f32() + src.get_f32()),
        FieldType::Double => dst.put_f64(d.get_f64() + src.get_f64()),
        other => unreachable!("sum over {:?}", other),
    }
}

// flush-time pass: object cells trade their in-memory aggregate for the
// serialized form the rowset writer expects. everything else is already
// in its on-disk shape.
pub(crate) fn finalize(cell: CellMut, pool: &MemPool) -> Result<(), OError> {
    if cell.as_ref().is_null() {
        return Ok(());
    }
    match cell.column().field_type {
        FieldType::Hll => {
            let obj = cell.as_ref().object_ptr::<Hll>();
            let mut buf = BytesMut::new();
            unsafe { (*obj).serialize(&mut buf) };
            copy_out_of_line(cell, &buf, pool)
        }
        FieldType::Bitmap => {
            let obj = cell.as_ref().object_ptr::<Bitmap>();
            let mut buf = BytesMut::new();
            unsafe { (*obj).serialize(&mut buf) };
            copy_out_of_line(cell, &buf, pool)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod test {
    use super::{agg_update, consume, finalize};
    use crate::agg::bitmap::Bitmap;
    use crate::agg::hll::Hll;
    use crate::mem::pool::MemPool;
    use crate::mem::tracker::MemTracker;
    use crate::mem::ObjectPool;
    use crate::opts::default_opts;
    use crate::row::RowMut;
    use crate::schema::{AggMethod, ColumnSchema, FieldType, Schema};
    use bytes::BytesMut;

    fn fixture() -> (Schema, MemPool, ObjectPool) {
        let schema = Schema::new(
            vec![
                ColumnSchema::new("k", FieldType::Int, false, AggMethod::None),
                ColumnSchema::new("sum", FieldType::BigInt, true, AggMethod::Sum),
                ColumnSchema::new("min", FieldType::Varchar, true, AggMethod::Min),
                ColumnSchema::new("rep", FieldType::Double, true, AggMethod::Replace),
                ColumnSchema::new("hll", FieldType::Hll, true, AggMethod::HllUnion),
                ColumnSchema::new("bm", FieldType::Bitmap, true, AggMethod::BitmapUnion),
            ],
            1,
        )
        .unwrap();
        let pool = MemPool::new(MemTracker::root(-1, "t"), &default_opts());
        (schema, pool, ObjectPool::new())
    }

    fn new_row<'a>(schema: &'a Schema, pool: &MemPool) -> RowMut<'a> {
        let buf = pool.allocate(schema.schema_size()).unwrap().as_ptr();
        unsafe { RowMut::from_raw(schema, buf) }
    }

    fn hll_bytes(hashes: &[u64]) -> Vec<u8> {
        let mut h = Hll::new();
        for x in hashes {
            h.insert_hash(*x);
        }
        let mut buf = BytesMut::new();
        h.serialize(&mut buf);
        buf.to_vec()
    }

    fn bitmap_bytes(vals: &[u64]) -> Vec<u8> {
        let mut b = Bitmap::new();
        for x in vals {
            b.add(*x);
        }
        let mut buf = BytesMut::new();
        b.serialize(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn test_sum_ignores_null() {
        let (schema, pool, objs) = fixture();
        let a = new_row(&schema, &pool);
        let b = new_row(&schema, &pool);
        consume(a.cell(1), Some(&5i64.to_le_bytes()), &pool, &objs).unwrap();
        consume(b.cell(1), None, &pool, &objs).unwrap();
        agg_update(a.cell(1), b.cell(1).as_ref());
        assert_eq!(a.cell(1).as_ref().get_i64(), 5);

        // null dst adopts the first non-null input
        consume(b.cell(1), Some(&7i64.to_le_bytes()), &pool, &objs).unwrap();
        let c = new_row(&schema, &pool);
        consume(c.cell(1), None, &pool, &objs).unwrap();
        agg_update(c.cell(1), b.cell(1).as_ref());
        assert_eq!(c.cell(1).as_ref().get_i64(), 7);
        agg_update(a.cell(1), b.cell(1).as_ref());
        assert_eq!(a.cell(1).as_ref().get_i64(), 12);
    }

    #[test]
    fn test_min_varchar_and_replace_null() {
        let (schema, pool, objs) = fixture();
        let a = new_row(&schema, &pool);
        let b = new_row(&schema, &pool);
        consume(a.cell(2), Some(b"melon"), &pool, &objs).unwrap();
        consume(b.cell(2), Some(b"apple"), &pool, &objs).unwrap();
        agg_update(a.cell(2), b.cell(2).as_ref());
        assert_eq!(a.cell(2).as_ref().var_bytes(), b"apple");
        // larger input doesn't move it
        consume(b.cell(2), Some(b"zebra"), &pool, &objs).unwrap();
        agg_update(a.cell(2), b.cell(2).as_ref());
        assert_eq!(a.cell(2).as_ref().var_bytes(), b"apple");
        // null input is ignored by min
        consume(b.cell(2), None, &pool, &objs).unwrap();
        agg_update(a.cell(2), b.cell(2).as_ref());
        assert!(!a.cell(2).as_ref().is_null());

        // replace takes null verbatim
        consume(a.cell(3), Some(&1.5f64.to_le_bytes()), &pool, &objs).unwrap();
        consume(b.cell(3), None, &pool, &objs).unwrap();
        agg_update(a.cell(3), b.cell(3).as_ref());
        assert!(a.cell(3).as_ref().is_null());
    }

    #[test]
    fn test_hll_union_and_finalize() {
        let (schema, pool, objs) = fixture();
        let a = new_row(&schema, &pool);
        let b = new_row(&schema, &pool);
        consume(a.cell(4), Some(&hll_bytes(&[1, 2, 3])), &pool, &objs).unwrap();
        consume(b.cell(4), Some(&hll_bytes(&[3, 4])), &pool, &objs).unwrap();
        agg_update(a.cell(4), b.cell(4).as_ref());
        finalize(a.cell(4), &pool).unwrap();
        let out = Hll::from_bytes(a.cell(4).as_ref().var_bytes()).unwrap();
        assert_eq!(out.estimate(), 4);
    }

    #[test]
    fn test_bitmap_union_null_identity() {
        let (schema, pool, objs) = fixture();
        let a = new_row(&schema, &pool);
        let b = new_row(&schema, &pool);
        // dst starts null, adopts src's object
        consume(a.cell(5), None, &pool, &objs).unwrap();
        consume(b.cell(5), Some(&bitmap_bytes(&[10, 20])), &pool, &objs).unwrap();
        agg_update(a.cell(5), b.cell(5).as_ref());
        assert!(!a.cell(5).as_ref().is_null());
        finalize(a.cell(5), &pool).unwrap();
        let out = Bitmap::from_bytes(a.cell(5).as_ref().var_bytes()).unwrap();
        assert_eq!(out.cardinality(), 2);
    }

    #[test]
    fn test_corrupt_object_input_surfaces() {
        let (schema, pool, objs) = fixture();
        let a = new_row(&schema, &pool);
        let e = consume(a.cell(4), Some(&[250, 1, 2]), &pool, &objs).unwrap_err();
        match e {
            crate::OError::Corruption(_) => {}
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
