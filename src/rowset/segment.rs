use crate::io::Storage;
use crate::opts::Opts;
use crate::row::{CellRef, RowRef};
use crate::rowset::RowsetWriter;
use crate::schema::{FieldType, Schema};
use crate::utils::crc::crc32;
use crate::utils::varint::put_uvarint;
use crate::OError;
use bytes::{BufMut, BytesMut};
use snap::raw::Encoder;
use std::sync::Arc;

pub(crate) const SEGMENT_MAGIC: u32 = 0x5345474d; // "SEGM"

// serializes one flush into a columnar segment: rows are buffered into
// per-column pages, each page lands as [flag][len][data][crc], and a
// fixed-size footer records where every column starts.
pub struct SegmentWriter<S: Storage> {
    file: S,
    schema: Arc<Schema>,
    opts: Opts,
    pages: Vec<BytesMut>,
    num_rows: u64,
    offset: u64,
    wrote_size: u64,
    sealed: bool,
}

impl<S: Storage> SegmentWriter<S> {
    pub fn new(file: S, schema: Arc<Schema>, opts: Opts) -> SegmentWriter<S> {
        let pages = (0..schema.num_columns()).map(|_| BytesMut::new()).collect();
        SegmentWriter {
            file,
            schema,
            opts,
            pages,
            num_rows: 0,
            offset: 0,
            wrote_size: 0,
            sealed: false,
        }
    }

    pub fn num_rows(&self) -> u64 {
        self.num_rows
    }

    pub fn wrote_size(&self) -> u64 {
        self.wrote_size
    }

    fn write(&mut self, data: &[u8]) -> Result<(), OError> {
        self.file.write_all(data)?;
        self.wrote_size += data.len() as u64;
        Ok(())
    }

    fn write_page(&mut self, col: usize) -> Result<(u64, u32), OError> {
        let raw = std::mem::take(&mut self.pages[col]);
        let mut flag = 0u8;
        let mut data = raw.to_vec();
        if self.opts.get_compression() && !raw.is_empty() {
            let compressed = Encoder::new().compress_vec(&raw)?;
            if compressed.len() < raw.len() {
                flag = 1;
                data = compressed;
            }
        }
        let start = self.offset;
        let mut head = BytesMut::with_capacity(5);
        head.put_u8(flag);
        head.put_u32_le(data.len() as u32);
        self.write(&head)?;
        self.write(&data)?;
        self.write(&crc32(&data).to_le_bytes())?;
        let total = (head.len() + data.len() + 4) as u32;
        self.offset += total as u64;
        Ok((start, total))
    }
}

fn encode_cell(buf: &mut BytesMut, cell: CellRef, ft: FieldType) {
    if cell.is_null() {
        buf.put_u8(1);
        return;
    }
    buf.put_u8(0);
    match ft {
        FieldType::TinyInt => buf.put_i8(cell.get_i8()),
        FieldType::SmallInt => buf.put_i16_le(cell.get_i16()),
        FieldType::Int => buf.put_i32_le(cell.get_i32()),
        FieldType::BigInt | FieldType::DateTime => buf.put_i64_le(cell.get_i64()),
        FieldType::LargeInt | FieldType::Decimal => buf.put_i128_le(cell.get_i128()),
        FieldType::Float => buf.put_f32_le(cell.get_f32()),
        FieldType::Double => buf.put_f64_le(cell.get_f64()),
        FieldType::Date => buf.put_u32_le(cell.get_date()),
        FieldType::Char => buf.put_slice(cell.char_bytes()),
        FieldType::Varchar | FieldType::Hll | FieldType::Bitmap => {
            let bytes = cell.var_bytes();
            put_uvarint(buf, bytes.len() as u64);
            buf.put_slice(bytes);
        }
    }
}

impl<S: Storage> RowsetWriter for SegmentWriter<S> {
    fn add_row(&mut self, row: RowRef<'_>) -> Result<(), OError> {
        if self.sealed {
            return Err(OError::Internal("add_row on a sealed segment".into()));
        }
        for i in 0..self.schema.num_columns() {
            let ft = self.schema.column(i).field_type;
            encode_cell(&mut self.pages[i], row.cell(i), ft);
        }
        self.num_rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), OError> {
        if self.sealed {
            return Ok(());
        }
        let mut metas = Vec::with_capacity(self.pages.len());
        for col in 0..self.pages.len() {
            metas.push(self.write_page(col)?);
        }
        let mut footer = BytesMut::new();
        for (off, len) in metas {
            footer.put_u64_le(off);
            footer.put_u32_le(len);
        }
        footer.put_u64_le(self.num_rows);
        footer.put_u32_le(self.schema.num_columns() as u32);
        footer.put_u32_le(SEGMENT_MAGIC);
        self.write(&footer)?;
        self.file.flush()?;
        self.sealed = true;
        Ok(())
    }
}
