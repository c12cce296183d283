use crate::row::RowRef;
use crate::OError;

pub mod segment;

// sink of a memtable flush. rows arrive in ascending key order, then
// exactly one flush() seals the segment. implementations must copy
// anything they keep: the row view dies with the call.
pub trait RowsetWriter {
    fn add_row(&mut self, row: RowRef<'_>) -> Result<(), OError>;

    fn flush(&mut self) -> Result<(), OError>;
}
