use crate::schema::{ColumnSchema, Schema};
use std::ptr;

// pointer/length pair for out-of-line bytes. the bytes live in the
// memtable's arena, so the pointer stays valid for the row's lifetime.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Slice {
    pub data: *const u8,
    pub size: usize,
}

impl Slice {
    pub fn empty() -> Slice {
        Slice {
            data: ptr::null(),
            size: 0,
        }
    }

    // caller guarantees `data` points at `size` live bytes
    pub unsafe fn as_bytes<'a>(&self) -> &'a [u8] {
        if self.size == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(self.data, self.size)
        }
    }
}

// read view over one encoded row. handed to the rowset writer during
// flush; the writer copies whatever it wants to keep.
#[derive(Clone, Copy)]
pub struct RowRef<'a> {
    schema: &'a Schema,
    data: *const u8,
}

impl<'a> RowRef<'a> {
    // caller guarantees `data` points at a fully initialized row buffer
    // of `schema.schema_size()` bytes that outlives 'a
    pub unsafe fn from_raw(schema: &'a Schema, data: *const u8) -> RowRef<'a> {
        RowRef { schema, data }
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub fn cell(&self, i: usize) -> CellRef<'a> {
        CellRef {
            col: self.schema.column(i),
            ptr: unsafe { self.data.add(self.schema.cell_offset(i)) },
        }
    }
}

// one typed slot: a null byte followed by the fixed value
#[derive(Clone, Copy)]
pub struct CellRef<'a> {
    col: &'a ColumnSchema,
    ptr: *const u8,
}

impl<'a> CellRef<'a> {
    pub fn column(&self) -> &'a ColumnSchema {
        self.col
    }

    pub fn is_null(&self) -> bool {
        unsafe { *self.ptr != 0 }
    }

    fn value_ptr(&self) -> *const u8 {
        unsafe { self.ptr.add(1) }
    }

    pub fn get_i8(&self) -> i8 {
        unsafe { self.value_ptr().cast::<i8>().read_unaligned() }
    }

    pub fn get_i16(&self) -> i16 {
        unsafe { self.value_ptr().cast::<i16>().read_unaligned() }
    }

    pub fn get_i32(&self) -> i32 {
        unsafe { self.value_ptr().cast::<i32>().read_unaligned() }
    }

    pub fn get_i64(&self) -> i64 {
        unsafe { self.value_ptr().cast::<i64>().read_unaligned() }
    }

    pub fn get_i128(&self) -> i128 {
        unsafe { self.value_ptr().cast::<i128>().read_unaligned() }
    }

    pub fn get_f32(&self) -> f32 {
        unsafe { self.value_ptr().cast::<f32>().read_unaligned() }
    }

    pub fn get_f64(&self) -> f64 {
        unsafe { self.value_ptr().cast::<f64>().read_unaligned() }
    }

    pub fn get_date(&self) -> u32 {
        unsafe { self.value_ptr().cast::<u32>().read_unaligned() }
    }

    pub fn get_datetime(&self) -> i64 {
        self.get_i64()
    }

    pub fn get_decimal(&self) -> i128 {
        self.get_i128()
    }

    pub fn char_bytes(&self) -> &'a [u8] {
        unsafe { std::slice::from_raw_parts(self.value_ptr(), self.col.length) }
    }

    pub fn slice(&self) -> Slice {
        unsafe { self.value_ptr().cast::<Slice>().read_unaligned() }
    }

    pub fn var_bytes(&self) -> &'a [u8] {
        unsafe { self.slice().as_bytes() }
    }

    // only meaningful for object cells before flush finalizes them
    pub(crate) fn object_ptr<T>(&self) -> *mut T {
        unsafe { self.value_ptr().cast::<*mut T>().read_unaligned() }
    }
}

// write view used while encoding and aggregating
pub(crate) struct RowMut<'a> {
    schema: &'a Schema,
    data: *mut u8,
}

impl<'a> RowMut<'a> {
    // same contract as RowRef::from_raw, plus exclusive access
    pub(crate) unsafe fn from_raw(schema: &'a Schema, data: *mut u8) -> RowMut<'a> {
        RowMut { schema, data }
    }

    pub(crate) fn cell(&self, i: usize) -> CellMut<'a> {
        CellMut {
            col: self.schema.column(i),
            ptr: unsafe { self.data.add(self.schema.cell_offset(i)) },
        }
    }
}

#[derive(Clone, Copy)]
pub(crate) struct CellMut<'a> {
    col: &'a ColumnSchema,
    ptr: *mut u8,
}

impl<'a> CellMut<'a> {
    pub(crate) fn as_ref(&self) -> CellRef<'a> {
        CellRef {
            col: self.col,
            ptr: self.ptr,
        }
    }

    pub(crate) fn column(&self) -> &'a ColumnSchema {
        self.col
    }

    pub(crate) fn set_null(&self, null: bool) {
        unsafe { *self.ptr = null as u8 };
    }

    fn value_ptr(&self) -> *mut u8 {
        unsafe { self.ptr.add(1) }
    }

    pub(crate) fn put_i8(&self, v: i8) {
        unsafe { self.value_ptr().cast::<i8>().write_unaligned(v) }
    }

    pub(crate) fn put_i16(&self, v: i16) {
        unsafe { self.value_ptr().cast::<i16>().write_unaligned(v) }
    }

    pub(crate) fn put_i32(&self, v: i32) {
        unsafe { self.value_ptr().cast::<i32>().write_unaligned(v) }
    }

    pub(crate) fn put_i64(&self, v: i64) {
        unsafe { self.value_ptr().cast::<i64>().write_unaligned(v) }
    }

    pub(crate) fn put_i128(&self, v: i128) {
        unsafe { self.value_ptr().cast::<i128>().write_unaligned(v) }
    }

    pub(crate) fn put_f32(&self, v: f32) {
        unsafe { self.value_ptr().cast::<f32>().write_unaligned(v) }
    }

    pub(crate) fn put_f64(&self, v: f64) {
        unsafe { self.value_ptr().cast::<f64>().write_unaligned(v) }
    }

    pub(crate) fn put_date(&self, v: u32) {
        unsafe { self.value_ptr().cast::<u32>().write_unaligned(v) }
    }

    // copies at most the column width, zero-padding the tail
    pub(crate) fn put_char_bytes(&self, bytes: &[u8]) {
        let w = self.col.length;
        let n = bytes.len().min(w);
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.value_ptr(), n);
            ptr::write_bytes(self.value_ptr().add(n), 0, w - n);
        }
    }

    pub(crate) fn put_slice(&self, s: Slice) {
        unsafe { self.value_ptr().cast::<Slice>().write_unaligned(s) }
    }

    pub(crate) fn put_object<T>(&self, obj: *mut T) {
        unsafe { self.value_ptr().cast::<*mut T>().write_unaligned(obj) }
    }

    // verbatim copy, null byte included
    pub(crate) fn copy_from(&self, src: CellRef) {
        unsafe { ptr::copy_nonoverlapping(src.ptr, self.ptr, self.col.cell_width()) };
    }
}
