use std::io::Error;

pub mod agg;
pub mod compare;
pub mod io;
pub mod mem;
pub mod memtable;
pub mod metric;
pub mod opts;
pub mod row;
pub mod rowset;
pub mod schema;
pub mod tuple;
pub mod utils;

#[derive(Debug)]
pub enum OError {
    IO(Error),
    // an allocation was refused by the memory tracker tree
    MemLimitExceeded(String),
    // a serialized aggregate object (hll, bitmap) or a segment block failed to decode
    Corruption(String),
    Internal(String),
}

impl From<Error> for OError {
    fn from(e: Error) -> Self {
        Self::IO(e)
    }
}

impl From<snap::Error> for OError {
    fn from(e: snap::Error) -> Self {
        Self::Corruption(format!("snappy: {}", e))
    }
}
