use std::collections::VecDeque;

/// A buffer pool for subpicture packet assembly.
///
/// Maintains a pool of reusable byte buffers so that packet assembly does
/// not allocate for every subpicture on long menus or subtitle tracks.
#[derive(Debug)]
pub struct BufferPool {
    pool: VecDeque<Vec<u8>>,
    max_size: usize,
    buffer_capacity: usize,
}

impl BufferPool {
    /// Creates a new buffer pool with the specified parameters.
    ///
    /// # Arguments
    ///
    /// * `max_size` - Maximum number of buffers to keep in the pool
    /// * `buffer_capacity` - Initial capacity for each buffer
    pub fn new(max_size: usize, buffer_capacity: usize) -> Self {
        Self {
            pool: VecDeque::with_capacity(max_size),
            max_size,
            buffer_capacity,
        }
    }

    /// Acquires a buffer from the pool or creates a new one if none available.
    pub fn acquire(&mut self) -> Vec<u8> {
        self.pool
            .pop_front()
            .unwrap_or_else(|| Vec::with_capacity(self.buffer_capacity))
    }

    /// Returns a buffer to the pool for reuse.
    pub fn release(&mut self, mut buffer: Vec<u8>) {
        buffer.clear();

        if self.pool.len() < self.max_size {
            self.pool.push_back(buffer);
        }
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

impl Default for BufferPool {
    /// Subpicture packets carry a 16-bit size, so 64 KiB always suffices.
    fn default() -> Self {
        Self::new(4, 64 * 1024)
    }
}

#[test]
fn reuse_released_buffers() {
    let mut pool = BufferPool::new(1, 16);

    let mut first = pool.acquire();
    first.extend_from_slice(b"spu");
    let ptr = first.as_ptr();
    pool.release(first);
    assert_eq!(pool.len(), 1);

    let second = pool.acquire();
    assert!(second.is_empty());
    assert_eq!(second.as_ptr(), ptr);

    pool.release(second);
    pool.release(Vec::new());
    assert_eq!(pool.len(), 1);
}
