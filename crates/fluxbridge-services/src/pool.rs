//! A process-wide pool of reusable byte buffers, so decoding a record for
//! forwarding doesn't allocate a fresh `Vec` per message on the hot path.

use std::sync::Mutex;

/// A free-list of cleared `Vec<u8>` buffers. `get` pops a buffer (or
/// allocates one if the pool is empty); `put` clears and returns it.
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        BufferPool { free: Mutex::new(Vec::new()) }
    }

    pub fn get(&self) -> Vec<u8> {
        self.free.lock().expect("buffer pool mutex poisoned").pop().unwrap_or_default()
    }

    pub fn put(&self, mut buf: Vec<u8>) {
        buf.clear();
        self.free.lock().expect("buffer pool mutex poisoned").push(buf);
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_returned_buffers() {
        let pool = BufferPool::new();
        let mut buf = pool.get();
        buf.extend_from_slice(b"hello");
        let cap = buf.capacity();
        pool.put(buf);

        let buf2 = pool.get();
        assert!(buf2.is_empty());
        assert!(buf2.capacity() >= cap);
    }

    #[test]
    fn get_on_empty_pool_allocates_fresh() {
        let pool = BufferPool::new();
        let buf = pool.get();
        assert!(buf.is_empty());
    }
}
