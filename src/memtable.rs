use crate::agg;
use crate::compare::RowComparator;
use crate::mem::pool::MemPool;
use crate::mem::tracker::MemTracker;
use crate::mem::ObjectPool;
use crate::memtable::skiplist::{InsertResult, SkipList};
use crate::metric::METRICS;
use crate::opts::Opts;
use crate::row::{RowMut, RowRef};
use crate::rowset::RowsetWriter;
use crate::schema::{AggMethod, KeysType, Schema};
use crate::tuple::{SlotDescriptor, Tuple, TupleDescriptor};
use crate::OError;
use log::{debug, warn};
use std::cell::RefCell;
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

pub mod skiplist;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Open,
    Flushing,
    Closed,
}

// in-memory write buffer of one tablet. a single producer thread
// encodes tuples into arena rows, keeps them ordered and deduplicated
// per the table's keys type, and drains them into the rowset writer on
// flush. everything it allocates dies together when it drops.
pub struct MemTable<W: RowsetWriter> {
    tablet_id: i64,
    schema: Arc<Schema>,
    slot_descs: Vec<SlotDescriptor>,
    keys_type: KeysType,
    tracker: Arc<MemTracker>,
    pool: Rc<MemPool>,
    objs: ObjectPool,
    table: SkipList,
    // the next incoming tuple is encoded here; once the index accepts
    // the buffer as a new row it belongs to the index and a fresh one
    // is carved from the arena
    scratch: Option<NonNull<u8>>,
    writer: Rc<RefCell<W>>,
    state: State,
    opts: Opts,
}

impl<W: RowsetWriter> MemTable<W> {
    pub fn new(
        tablet_id: i64,
        schema: Arc<Schema>,
        tuple_desc: &TupleDescriptor,
        slot_descs: Vec<SlotDescriptor>,
        keys_type: KeysType,
        writer: Rc<RefCell<W>>,
        parent_tracker: &Arc<MemTracker>,
        opts: Opts,
    ) -> Result<MemTable<W>, OError> {
        validate(&schema, tuple_desc, &slot_descs, keys_type)?;
        let tracker = MemTracker::child_of(parent_tracker, -1, "memtable");
        let pool = Rc::new(MemPool::new(tracker.clone(), &opts));
        let table = SkipList::new(RowComparator::new(schema.clone()), pool.clone())?;
        let scratch = pool.allocate(schema.schema_size())?;
        Ok(MemTable {
            tablet_id,
            schema,
            slot_descs,
            keys_type,
            tracker,
            pool,
            objs: ObjectPool::new(),
            table,
            scratch: Some(scratch),
            writer,
            state: State::Open,
            opts,
        })
    }

    pub fn tablet_id(&self) -> i64 {
        self.tablet_id
    }

    pub fn num_rows(&self) -> usize {
        self.table.len()
    }

    // the arena's reported consumption, chunk overhead included
    pub fn memory_usage(&self) -> usize {
        self.tracker.consumption().max(0) as usize
    }

    // the surrounding load pipeline polls this to decide when to flush
    pub fn is_full(&self) -> bool {
        self.memory_usage() >= self.opts.get_write_buffer_size()
    }

    pub fn insert(&mut self, tuple: &Tuple) -> Result<(), OError> {
        if self.state != State::Open {
            return Err(OError::Internal(format!(
                "insert into a {:?} memtable of tablet {}",
                self.state, self.tablet_id
            )));
        }
        let scratch = match self.encode(tuple) {
            Ok(p) => p,
            Err(e) => {
                if let OError::MemLimitExceeded(msg) = &e {
                    warn!("tablet {} insert refused: {}", self.tablet_id, msg);
                }
                return Err(e);
            }
        };
        match self.table.insert(scratch.as_ptr(), self.keys_type)? {
            InsertResult::Added | InsertResult::Replaced => {
                // the index took the buffer; if the next scratch cannot
                // be carved right now the next insert retries
                self.scratch = None;
                self.scratch = Some(self.pool.allocate(self.schema.schema_size())?);
            }
            InsertResult::Collided(existing) => {
                let dst = unsafe { RowMut::from_raw(&self.schema, existing) };
                let src = unsafe { RowRef::from_raw(&self.schema, scratch.as_ptr()) };
                for i in self.schema.num_key_columns()..self.schema.num_columns() {
                    agg::agg_update(dst.cell(i), src.cell(i));
                }
                // scratch stays ours and is re-encoded by the next tuple
            }
        }
        Ok(())
    }

    // encode the tuple into the scratch row, allocating it first if the
    // previous insert lost it to the index (or to a failed allocation)
    fn encode(&mut self, tuple: &Tuple) -> Result<NonNull<u8>, OError> {
        let scratch = match self.scratch {
            Some(p) => p,
            None => {
                let p = self.pool.allocate(self.schema.schema_size())?;
                self.scratch = Some(p);
                p
            }
        };
        let row = unsafe { RowMut::from_raw(&self.schema, scratch.as_ptr()) };
        for (i, slot) in self.slot_descs.iter().enumerate() {
            let value = if tuple.is_null(slot) {
                None
            } else {
                Some(tuple.get_slot(slot))
            };
            agg::consume(row.cell(i), value, &self.pool, &self.objs)?;
        }
        Ok(scratch)
    }

    // drain every retained row, in key order, into the rowset writer.
    // a writer error closes the memtable; the producer discards it.
    pub fn flush(&mut self) -> Result<(), OError> {
        if self.state == State::Closed {
            return Ok(());
        }
        self.state = State::Flushing;
        let start = Instant::now();
        let rows = match self.drain() {
            Ok(n) => n,
            Err(e) => {
                self.state = State::Closed;
                return Err(e);
            }
        };
        METRICS.incr_flush_total();
        METRICS.add_flush_duration_us(start.elapsed().as_micros() as u64);
        debug!(
            "flushed memtable of tablet {}: {} rows, {} bytes",
            self.tablet_id,
            rows,
            self.memory_usage()
        );
        self.state = State::Closed;
        Ok(())
    }

    fn drain(&mut self) -> Result<u64, OError> {
        let mut writer = self.writer.borrow_mut();
        let mut rows = 0u64;
        for ptr in self.table.iter() {
            let row = unsafe { RowMut::from_raw(&self.schema, ptr) };
            for i in 0..self.schema.num_columns() {
                agg::finalize(row.cell(i), &self.pool)?;
            }
            writer.add_row(unsafe { RowRef::from_raw(&self.schema, ptr) })?;
            rows += 1;
        }
        writer.flush()?;
        Ok(rows)
    }

    pub fn close(&mut self) -> Result<(), OError> {
        self.flush()
    }
}

fn validate(
    schema: &Schema,
    tuple_desc: &TupleDescriptor,
    slot_descs: &[SlotDescriptor],
    keys_type: KeysType,
) -> Result<(), OError> {
    if slot_descs.len() != schema.num_columns() {
        return Err(OError::Internal(format!(
            "{} slots for {} columns",
            slot_descs.len(),
            schema.num_columns()
        )));
    }
    for (slot, col) in slot_descs.iter().zip(schema.columns()) {
        if slot.field_type != col.field_type {
            return Err(OError::Internal(format!(
                "slot type {:?} does not match column '{}'",
                slot.field_type, col.name
            )));
        }
        if slot.tuple_offset >= tuple_desc.byte_size {
            return Err(OError::Internal(format!(
                "slot for column '{}' lies outside the tuple",
                col.name
            )));
        }
    }
    for col in schema.columns().iter().skip(schema.num_key_columns()) {
        if keys_type == KeysType::AggKeys && col.agg == AggMethod::None {
            return Err(OError::Internal(format!(
                "value column '{}' of an aggregating table needs an aggregation",
                col.name
            )));
        }
        if col.field_type.is_object() && keys_type != KeysType::AggKeys {
            return Err(OError::Internal(format!(
                "object column '{}' requires an aggregating table",
                col.name
            )));
        }
    }
    Ok(())
}
