use crate::row::{CellRef, RowRef};
use crate::schema::{FieldType, Schema};
use std::cmp::Ordering;
use std::sync::Arc;

// lexicographic comparison over the key prefix of two encoded rows.
// the rowset writer relies on receiving rows in exactly this order.
#[derive(Clone)]
pub struct RowComparator {
    schema: Arc<Schema>,
}

impl RowComparator {
    pub fn new(schema: Arc<Schema>) -> RowComparator {
        RowComparator { schema }
    }

    // caller guarantees both pointers reference live row buffers of this
    // comparator's schema
    pub unsafe fn compare_raw(&self, a: *const u8, b: *const u8) -> Ordering {
        let ra = RowRef::from_raw(&self.schema, a);
        let rb = RowRef::from_raw(&self.schema, b);
        for i in 0..self.schema.num_key_columns() {
            let c = compare_cell(ra.cell(i), rb.cell(i));
            if c != Ordering::Equal {
                return c;
            }
        }
        Ordering::Equal
    }
}

// nulls sort before everything; floats use the ieee total order so the
// result is total even with nans around
pub(crate) fn compare_cell(a: CellRef, b: CellRef) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare_value(a, b),
    }
}

fn compare_value(a: CellRef, b: CellRef) -> Ordering {
    match a.column().field_type {
        FieldType::TinyInt => a.get_i8().cmp(&b.get_i8()),
        FieldType::SmallInt => a.get_i16().cmp(&b.get_i16()),
        FieldType::Int => a.get_i32().cmp(&b.get_i32()),
        FieldType::BigInt => a.get_i64().cmp(&b.get_i64()),
        FieldType::LargeInt => a.get_i128().cmp(&b.get_i128()),
        FieldType::Float => a.get_f32().total_cmp(&b.get_f32()),
        FieldType::Double => a.get_f64().total_cmp(&b.get_f64()),
        FieldType::Decimal => a.get_decimal().cmp(&b.get_decimal()),
        FieldType::Date => a.get_date().cmp(&b.get_date()),
        FieldType::DateTime => a.get_datetime().cmp(&b.get_datetime()),
        FieldType::Char => a.char_bytes().cmp(b.char_bytes()),
        FieldType::Varchar => a.var_bytes().cmp(b.var_bytes()),
        // schema validation keeps objects out of keys and out of min/max
        FieldType::Hll | FieldType::Bitmap => {
            panic!("object cells are not comparable")
        }
    }
}

#[cfg(test)]
mod test {
    use super::RowComparator;
    use crate::mem::pool::MemPool;
    use crate::mem::tracker::MemTracker;
    use crate::opts::default_opts;
    use crate::row::{RowMut, Slice};
    use crate::schema::{AggMethod, ColumnSchema, FieldType, Schema};
    use std::cmp::Ordering;
    use std::sync::Arc;

    fn make_row(pool: &MemPool, schema: &Schema, k1: Option<i32>, k2: &str) -> *mut u8 {
        let buf = pool.allocate(schema.schema_size()).unwrap().as_ptr();
        let row = unsafe { RowMut::from_raw(schema, buf) };
        match k1 {
            None => row.cell(0).set_null(true),
            Some(v) => {
                row.cell(0).set_null(false);
                row.cell(0).put_i32(v);
            }
        }
        let bytes = pool.allocate(k2.len().max(1)).unwrap().as_ptr();
        unsafe { std::ptr::copy_nonoverlapping(k2.as_ptr(), bytes, k2.len()) };
        row.cell(1).set_null(false);
        row.cell(1).put_slice(Slice {
            data: bytes,
            size: k2.len(),
        });
        row.cell(2).set_null(false);
        row.cell(2).put_i64(0);
        buf
    }

    #[test]
    fn test_composite_key_order() {
        let schema = Arc::new(
            Schema::new(
                vec![
                    ColumnSchema::new("k1", FieldType::Int, true, AggMethod::None),
                    ColumnSchema::new("k2", FieldType::Varchar, false, AggMethod::None),
                    ColumnSchema::new("v", FieldType::BigInt, true, AggMethod::Sum),
                ],
                2,
            )
            .unwrap(),
        );
        let pool = MemPool::new(MemTracker::root(-1, "t"), &default_opts());
        let cmp = RowComparator::new(schema.clone());

        let a = make_row(&pool, &schema, Some(1), "aa");
        let b = make_row(&pool, &schema, Some(1), "ab");
        let c = make_row(&pool, &schema, Some(2), "aa");
        let n = make_row(&pool, &schema, None, "zz");
        let n2 = make_row(&pool, &schema, None, "zz");

        unsafe {
            assert_eq!(cmp.compare_raw(a, b), Ordering::Less);
            assert_eq!(cmp.compare_raw(b, a), Ordering::Greater);
            assert_eq!(cmp.compare_raw(b, c), Ordering::Less);
            assert_eq!(cmp.compare_raw(a, a), Ordering::Equal);
            // null key sorts first
            assert_eq!(cmp.compare_raw(n, a), Ordering::Less);
            assert_eq!(cmp.compare_raw(n, n2), Ordering::Equal);
        }
    }

    #[test]
    fn test_value_columns_do_not_affect_order() {
        let schema = Arc::new(
            Schema::new(
                vec![
                    ColumnSchema::new("k1", FieldType::Int, true, AggMethod::None),
                    ColumnSchema::new("k2", FieldType::Varchar, false, AggMethod::None),
                    ColumnSchema::new("v", FieldType::BigInt, true, AggMethod::Sum),
                ],
                2,
            )
            .unwrap(),
        );
        let pool = MemPool::new(MemTracker::root(-1, "t"), &default_opts());
        let cmp = RowComparator::new(schema.clone());
        let a = make_row(&pool, &schema, Some(7), "x");
        let b = make_row(&pool, &schema, Some(7), "x");
        unsafe {
            let row = RowMut::from_raw(&schema, b);
            row.cell(2).put_i64(99999);
            assert_eq!(cmp.compare_raw(a, b), Ordering::Equal);
        }
    }
}
