use std::sync::Arc;

pub type Opts = Arc<OptsRaw>;

pub struct OptsRaw {
    // arena chunks start at this size and double up to max_chunk_size
    pub initial_chunk_size: usize,
    pub max_chunk_size: usize,
    // a memtable reports itself full once its arena consumption reaches this
    pub write_buffer_size: usize,
    pub compression: bool,
}

pub fn default_opts() -> Opts {
    Arc::new(OptsRaw::default())
}

impl Default for OptsRaw {
    fn default() -> Self {
        Self {
            initial_chunk_size: 4096,
            max_chunk_size: 512 * 1024,
            write_buffer_size: 100 * 1024 * 1024, // 100mb
            compression: true,
        }
    }
}

impl OptsRaw {
    pub fn get_initial_chunk_size(&self) -> usize {
        if self.initial_chunk_size == 0 {
            4096
        } else {
            self.initial_chunk_size.next_power_of_two()
        }
    }

    pub fn get_max_chunk_size(&self) -> usize {
        if self.max_chunk_size < self.get_initial_chunk_size() {
            self.get_initial_chunk_size()
        } else {
            self.max_chunk_size
        }
    }

    pub fn get_write_buffer_size(&self) -> usize {
        self.write_buffer_size
    }

    pub fn get_compression(&self) -> bool {
        self.compression
    }
}
