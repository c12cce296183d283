use crate::mem::tracker::MemTracker;
use crate::opts::Opts;
use crate::OError;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::cell::RefCell;
use std::ptr::NonNull;
use std::sync::Arc;

const ALIGNMENT: usize = 8;

// bump allocator. everything a memtable writes lives here: row buffers,
// out-of-line string bytes, skiplist nodes. nothing is freed before the
// pool itself drops, which is what makes handing out raw pointers sound.
pub struct MemPool {
    tracker: Arc<MemTracker>,
    inner: RefCell<Inner>,
}

struct Inner {
    chunks: Vec<Chunk>,
    next_chunk_size: usize,
    max_chunk_size: usize,
    total_reserved: usize,
    total_allocated: usize,
}

struct Chunk {
    ptr: NonNull<u8>,
    layout: Layout,
    used: usize,
}

impl Chunk {
    fn remaining(&self) -> usize {
        self.layout.size() - self.used
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

impl MemPool {
    pub fn new(tracker: Arc<MemTracker>, opts: &Opts) -> MemPool {
        MemPool {
            tracker,
            inner: RefCell::new(Inner {
                chunks: vec![],
                next_chunk_size: opts.get_initial_chunk_size(),
                max_chunk_size: opts.get_max_chunk_size(),
                total_reserved: 0,
                total_allocated: 0,
            }),
        }
    }

    // the returned region is zeroed, 8-byte aligned, and valid until the
    // pool drops. addresses are never reused.
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, OError> {
        let size = (size.max(1) + ALIGNMENT - 1) & !(ALIGNMENT - 1);
        let mut inner = self.inner.borrow_mut();
        let need_chunk = match inner.chunks.last() {
            None => true,
            Some(c) => c.remaining() < size,
        };
        if need_chunk {
            let chunk_size = size.max(inner.next_chunk_size);
            self.tracker.try_consume(chunk_size as i64)?;
            let layout = Layout::from_size_align(chunk_size, ALIGNMENT)
                .map_err(|e| OError::Internal(format!("bad chunk layout: {}", e)))?;
            let raw = unsafe { alloc_zeroed(layout) };
            let ptr = match NonNull::new(raw) {
                Some(p) => p,
                None => {
                    self.tracker.release(chunk_size as i64);
                    return Err(OError::MemLimitExceeded(format!(
                        "allocator failed on a {} byte chunk",
                        chunk_size
                    )));
                }
            };
            inner.chunks.push(Chunk {
                ptr,
                layout,
                used: 0,
            });
            inner.total_reserved += chunk_size;
            if inner.next_chunk_size < inner.max_chunk_size {
                inner.next_chunk_size = (inner.next_chunk_size * 2).min(inner.max_chunk_size);
            }
        }
        let chunk = inner.chunks.last_mut().unwrap();
        let offset = chunk.used;
        chunk.used += size;
        let p = unsafe { NonNull::new_unchecked(chunk.ptr.as_ptr().add(offset)) };
        inner.total_allocated += size;
        Ok(p)
    }

    pub fn mem_tracker(&self) -> &Arc<MemTracker> {
        &self.tracker
    }

    // bytes reserved from the tracker, chunk overhead included
    pub fn total_reserved(&self) -> usize {
        self.inner.borrow().total_reserved
    }

    // bytes actually handed out
    pub fn total_allocated(&self) -> usize {
        self.inner.borrow().total_allocated
    }
}

impl Drop for MemPool {
    fn drop(&mut self) {
        let reserved = self.inner.borrow().total_reserved;
        self.tracker.release(reserved as i64);
    }
}
