use crate::compare::RowComparator;
use crate::mem::pool::MemPool;
use crate::schema::KeysType;
use crate::utils::random::Random;
use crate::OError;
use std::cmp::Ordering;
use std::mem::size_of;
use std::ptr;
use std::rc::Rc;

const MAX_HEIGHT: usize = 12;
const BRANCHING: u32 = 4;

// a node is a header plus `height` forward pointers laid out right
// behind it, all in one arena allocation
#[repr(C)]
struct Node {
    key: *mut u8,
}

impl Node {
    fn alloc(pool: &MemPool, key: *mut u8, height: usize) -> Result<*mut Node, OError> {
        let size = size_of::<Node>() + height * size_of::<*mut Node>();
        let mem = pool.allocate(size)?;
        let node = mem.as_ptr() as *mut Node;
        // the pool hands out zeroed memory, so the forward pointers
        // start out null
        unsafe { (*node).key = key };
        Ok(node)
    }

    unsafe fn forward(node: *mut Node, level: usize) -> *mut *mut Node {
        (node.add(1) as *mut *mut Node).add(level)
    }

    unsafe fn next(node: *mut Node, level: usize) -> *mut Node {
        *Self::forward(node, level)
    }

    unsafe fn set_next(node: *mut Node, level: usize, next: *mut Node) {
        *Self::forward(node, level) = next;
    }
}

// what an insert did with the caller's row buffer
pub(crate) enum InsertResult {
    // a fresh node now owns the buffer; hand over a new scratch
    Added,
    // an equal-keyed node had its buffer swapped for this one (unique
    // tables); the old buffer stays in the arena, unreachable
    Replaced,
    // an equal-keyed row already exists (aggregating tables); merge
    // into the returned buffer, the caller keeps its scratch
    Collided(*mut u8),
}

// single-writer skiplist over row-buffer pointers. order comes entirely
// from the comparator; the coin flips only shape the tower heights.
pub(crate) struct SkipList {
    head: *mut Node,
    pool: Rc<MemPool>,
    cmp: RowComparator,
    max_height: usize,
    rnd: Random,
    len: usize,
}

impl SkipList {
    pub(crate) fn new(cmp: RowComparator, pool: Rc<MemPool>) -> Result<SkipList, OError> {
        let head = Node::alloc(&pool, ptr::null_mut(), MAX_HEIGHT)?;
        Ok(SkipList {
            head,
            pool,
            cmp,
            max_height: 1,
            rnd: Random::new(0xdeadbeef),
            len: 0,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    fn random_height(&mut self) -> usize {
        let mut h = 1;
        while h < MAX_HEIGHT && self.rnd.one_in(BRANCHING) {
            h += 1;
        }
        h
    }

    // duplicate tables advance past equal keys so a new row lands after
    // every row it ties with; unique/agg tables stop at the first equal
    // key to inspect it
    fn advances(&self, node_key: *mut u8, key: *mut u8, keys_type: KeysType) -> bool {
        let ord = unsafe { self.cmp.compare_raw(node_key, key) };
        match keys_type {
            KeysType::DupKeys => ord != Ordering::Greater,
            KeysType::UniqueKeys | KeysType::AggKeys => ord == Ordering::Less,
        }
    }

    pub(crate) fn insert(
        &mut self,
        key: *mut u8,
        keys_type: KeysType,
    ) -> Result<InsertResult, OError> {
        let mut prev = [ptr::null_mut::<Node>(); MAX_HEIGHT];
        let mut x = self.head;
        for level in (0..self.max_height).rev() {
            loop {
                let nxt = unsafe { Node::next(x, level) };
                if !nxt.is_null() && self.advances(unsafe { (*nxt).key }, key, keys_type) {
                    x = nxt;
                } else {
                    break;
                }
            }
            prev[level] = x;
        }

        if keys_type != KeysType::DupKeys {
            let nxt = unsafe { Node::next(prev[0], 0) };
            if !nxt.is_null() {
                let existing = unsafe { (*nxt).key };
                if unsafe { self.cmp.compare_raw(existing, key) } == Ordering::Equal {
                    return Ok(match keys_type {
                        KeysType::UniqueKeys => {
                            unsafe { (*nxt).key = key };
                            InsertResult::Replaced
                        }
                        KeysType::AggKeys => InsertResult::Collided(existing),
                        KeysType::DupKeys => unreachable!(),
                    });
                }
            }
        }

        let height = self.random_height();
        if height > self.max_height {
            for p in prev.iter_mut().take(height).skip(self.max_height) {
                *p = self.head;
            }
            self.max_height = height;
        }
        // allocate before splicing so a refused allocation leaves the
        // list untouched
        let node = Node::alloc(&self.pool, key, height)?;
        for (level, p) in prev.iter().enumerate().take(height) {
            unsafe {
                Node::set_next(node, level, Node::next(*p, level));
                Node::set_next(*p, level, node);
            }
        }
        self.len += 1;
        Ok(InsertResult::Added)
    }

    pub(crate) fn iter(&self) -> SkipListIter<'_> {
        SkipListIter {
            node: unsafe { Node::next(self.head, 0) },
            _list: std::marker::PhantomData,
        }
    }
}

// forward scan in key order, yielding each row buffer exactly once
pub(crate) struct SkipListIter<'a> {
    node: *mut Node,
    _list: std::marker::PhantomData<&'a SkipList>,
}

impl<'a> Iterator for SkipListIter<'a> {
    type Item = *mut u8;

    fn next(&mut self) -> Option<Self::Item> {
        if self.node.is_null() {
            return None;
        }
        let key = unsafe { (*self.node).key };
        self.node = unsafe { Node::next(self.node, 0) };
        Some(key)
    }
}

#[cfg(test)]
mod test {
    use super::{InsertResult, SkipList};
    use crate::compare::RowComparator;
    use crate::mem::pool::MemPool;
    use crate::mem::tracker::MemTracker;
    use crate::opts::default_opts;
    use crate::row::{RowMut, RowRef};
    use crate::schema::{AggMethod, ColumnSchema, FieldType, KeysType, Schema};
    use std::rc::Rc;
    use std::sync::Arc;

    fn int_schema() -> Arc<Schema> {
        Arc::new(
            Schema::new(
                vec![
                    ColumnSchema::new("k", FieldType::Int, true, AggMethod::None),
                    ColumnSchema::new("v", FieldType::Int, true, AggMethod::Replace),
                ],
                1,
            )
            .unwrap(),
        )
    }

    fn make_row(pool: &MemPool, schema: &Schema, k: i32, v: i32) -> *mut u8 {
        let buf = pool.allocate(schema.schema_size()).unwrap().as_ptr();
        let row = unsafe { RowMut::from_raw(schema, buf) };
        row.cell(0).set_null(false);
        row.cell(0).put_i32(k);
        row.cell(1).set_null(false);
        row.cell(1).put_i32(v);
        buf
    }

    fn collect(list: &SkipList, schema: &Schema) -> Vec<(i32, i32)> {
        list.iter()
            .map(|p| {
                let r = unsafe { RowRef::from_raw(schema, p) };
                (r.cell(0).get_i32(), r.cell(1).get_i32())
            })
            .collect()
    }

    fn fixture() -> (Arc<Schema>, Rc<MemPool>, SkipList) {
        let schema = int_schema();
        let pool = Rc::new(MemPool::new(MemTracker::root(-1, "t"), &default_opts()));
        let list = SkipList::new(RowComparator::new(schema.clone()), pool.clone()).unwrap();
        (schema, pool, list)
    }

    #[test]
    fn test_sorted_iteration() {
        let (schema, pool, mut list) = fixture();
        // pseudo-shuffled inserts
        let n = 500i32;
        for i in 0..n {
            let k = (i * 377) % n;
            let p = make_row(&pool, &schema, k, k * 2);
            assert!(matches!(
                list.insert(p, KeysType::DupKeys).unwrap(),
                InsertResult::Added
            ));
        }
        let got = collect(&list, &schema);
        assert_eq!(got.len(), n as usize);
        for (i, (k, v)) in got.iter().enumerate() {
            assert_eq!(*k, i as i32);
            assert_eq!(*v, k * 2);
        }
        assert_eq!(list.len(), n as usize);
    }

    #[test]
    fn test_dup_keys_keep_insertion_order() {
        let (schema, pool, mut list) = fixture();
        for (k, v) in [(7, 1), (3, 1), (7, 2), (7, 3), (3, 2)] {
            let p = make_row(&pool, &schema, k, v);
            assert!(matches!(
                list.insert(p, KeysType::DupKeys).unwrap(),
                InsertResult::Added
            ));
        }
        assert_eq!(
            collect(&list, &schema),
            vec![(3, 1), (3, 2), (7, 1), (7, 2), (7, 3)]
        );
    }

    #[test]
    fn test_unique_keys_replace() {
        let (schema, pool, mut list) = fixture();
        let a = make_row(&pool, &schema, 5, 1);
        assert!(matches!(
            list.insert(a, KeysType::UniqueKeys).unwrap(),
            InsertResult::Added
        ));
        let b = make_row(&pool, &schema, 5, 2);
        assert!(matches!(
            list.insert(b, KeysType::UniqueKeys).unwrap(),
            InsertResult::Replaced
        ));
        let c = make_row(&pool, &schema, 4, 9);
        assert!(matches!(
            list.insert(c, KeysType::UniqueKeys).unwrap(),
            InsertResult::Added
        ));
        assert_eq!(collect(&list, &schema), vec![(4, 9), (5, 2)]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_agg_keys_collide() {
        let (schema, pool, mut list) = fixture();
        let a = make_row(&pool, &schema, 5, 1);
        assert!(matches!(
            list.insert(a, KeysType::AggKeys).unwrap(),
            InsertResult::Added
        ));
        let b = make_row(&pool, &schema, 5, 2);
        match list.insert(b, KeysType::AggKeys).unwrap() {
            InsertResult::Collided(existing) => assert_eq!(existing, a),
            _ => panic!("expected a collision"),
        }
        // the colliding row was not added
        assert_eq!(list.len(), 1);
        assert_eq!(collect(&list, &schema), vec![(5, 1)]);
    }

    #[test]
    fn test_node_memory_is_tracked() {
        let schema = int_schema();
        let root = MemTracker::root(-1, "root");
        let pool = Rc::new(MemPool::new(
            MemTracker::child_of(&root, -1, "pool"),
            &default_opts(),
        ));
        let mut list = SkipList::new(RowComparator::new(schema.clone()), pool.clone()).unwrap();
        let before = root.consumption();
        for i in 0..2000 {
            let p = make_row(&pool, &schema, i, i);
            list.insert(p, KeysType::DupKeys).unwrap();
        }
        assert!(root.consumption() > before);
    }
}
