//! Shared ring buffer pool
//!
//! A fixed set of equal-sized byte slots shared between the fill side
//! (the engine worker) and every output channel playing from them. Each
//! output channel binds to all slots by index, so one `write` makes a
//! block visible to every device at once.
//!
//! The engine's queue protocol guarantees a slot is never rewritten while
//! any device still has it queued; the per-slot `RwLock` expresses that
//! sharing safely rather than coordinating it.

use std::sync::{Arc, RwLock, RwLockReadGuard};

use crate::error::{Error, Result};

/// One fixed-size byte region of the pool.
#[derive(Debug)]
pub struct Slot {
    bytes: RwLock<Box<[u8]>>,
}

impl Slot {
    fn new(len: usize) -> Self {
        Self {
            bytes: RwLock::new(vec![0u8; len].into_boxed_slice()),
        }
    }

    /// Read access to the slot's current contents.
    pub fn read(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.bytes.read().unwrap()
    }

    /// Slot length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.read().unwrap().len()
    }

    /// True when the slot holds no bytes. Never the case for pool slots.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The slot pool: `slot_count` regions of exactly `slot_len` bytes.
#[derive(Debug)]
pub struct BufferPool {
    slots: Vec<Arc<Slot>>,
    slot_len: usize,
}

impl BufferPool {
    /// Allocate a pool of `slot_count` slots of `slot_len` bytes each.
    pub fn new(slot_count: usize, slot_len: usize) -> Result<Self> {
        if slot_count == 0 {
            return Err(Error::Config("Pool needs at least one slot".to_string()));
        }
        if slot_len == 0 {
            return Err(Error::Config(
                "Pool slot length must be non-zero".to_string(),
            ));
        }
        let slots = (0..slot_count).map(|_| Arc::new(Slot::new(slot_len))).collect();
        Ok(Self { slots, slot_len })
    }

    /// Number of slots in the pool.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Byte length of every slot.
    pub fn slot_len(&self) -> usize {
        self.slot_len
    }

    /// Shared handle to the slot at `index`, for binding by output
    /// channels.
    pub fn slot(&self, index: usize) -> Result<Arc<Slot>> {
        self.slots
            .get(index)
            .cloned()
            .ok_or_else(|| Error::Config(format!("No pool slot at index {}", index)))
    }

    /// Replace the contents of slot `index`.
    ///
    /// The block must be exactly one slot long; anything else points at a
    /// sizing bug upstream and is rejected.
    pub fn write(&self, index: usize, block: &[u8]) -> Result<()> {
        if block.len() != self.slot_len {
            return Err(Error::Config(format!(
                "Block of {} bytes does not fit pool slots of {} bytes",
                block.len(),
                self.slot_len
            )));
        }
        let slot = self.slot(index)?;
        let mut bytes = slot.bytes.write().unwrap();
        bytes.copy_from_slice(block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_allocates_equal_slots() {
        let pool = BufferPool::new(3, 64).unwrap();
        assert_eq!(pool.slot_count(), 3);
        assert_eq!(pool.slot_len(), 64);
        for i in 0..3 {
            assert_eq!(pool.slot(i).unwrap().len(), 64);
        }
    }

    #[test]
    fn test_write_then_read() {
        let pool = BufferPool::new(2, 4).unwrap();
        pool.write(0, &[1, 2, 3, 4]).unwrap();
        pool.write(1, &[5, 6, 7, 8]).unwrap();

        assert_eq!(&**pool.slot(0).unwrap().read(), &[1, 2, 3, 4]);
        assert_eq!(&**pool.slot(1).unwrap().read(), &[5, 6, 7, 8]);

        // Rewrite replaces contents
        pool.write(0, &[9, 9, 9, 9]).unwrap();
        assert_eq!(&**pool.slot(0).unwrap().read(), &[9, 9, 9, 9]);
    }

    #[test]
    fn test_write_wrong_length_is_rejected() {
        let pool = BufferPool::new(2, 4).unwrap();
        assert!(matches!(pool.write(0, &[1, 2]), Err(Error::Config(_))));
        assert!(matches!(
            pool.write(0, &[1, 2, 3, 4, 5]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_out_of_range_slot_is_rejected() {
        let pool = BufferPool::new(2, 4).unwrap();
        assert!(pool.slot(2).is_err());
        assert!(pool.write(2, &[0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_slot_handles_share_contents() {
        let pool = BufferPool::new(1, 4).unwrap();
        let handle = pool.slot(0).unwrap();
        pool.write(0, &[7, 7, 7, 7]).unwrap();
        assert_eq!(&**handle.read(), &[7, 7, 7, 7]);
    }

    #[test]
    fn test_zero_sized_pool_is_rejected() {
        assert!(BufferPool::new(0, 64).is_err());
        assert!(BufferPool::new(2, 0).is_err());
    }
}
