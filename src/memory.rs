use std::collections::VecDeque;

use log::debug;

use crate::error::{Result, VmError};

/// Index of a physical page frame.
pub type Frame = usize;

/// Tracks which frames are available for allocation.
///
/// Free frames are kept in a FIFO queue: the first frame freed is the first
/// one handed out again. Every table in a simulation borrows the same
/// allocator, so it is the only state shared between tasks.
#[derive(Debug, Clone)]
pub struct FrameAllocator {
    total: usize,
    free: VecDeque<Frame>,
}

impl FrameAllocator {
    /// Create a pool of `total` frames, all free, queued in index order
    pub fn new(total: usize) -> Self {
        FrameAllocator {
            total,
            free: (0..total).collect(),
        }
    }

    /// Take the frame at the head of the free queue
    pub fn allocate_one(&mut self) -> Result<Frame> {
        let frame = self.free.pop_front().ok_or(VmError::OutOfMemory {
            requested: 1,
            available: 0,
        })?;
        debug!("allocated frame {frame}");
        Ok(frame)
    }

    /// Reserve `count` frames or none at all
    pub fn allocate_many(&mut self, count: usize) -> Result<Vec<Frame>> {
        if count > self.free.len() {
            return Err(VmError::OutOfMemory {
                requested: count,
                available: self.free.len(),
            });
        }
        let frames: Vec<Frame> = self.free.drain(..count).collect();
        debug!("allocated {} frames {:?}", frames.len(), frames);
        Ok(frames)
    }

    /// Return a frame to the tail of the free queue.
    ///
    /// Freeing a frame that is already free is not detected: the frame is
    /// queued a second time. Use [`FrameAllocator::is_free`] to check first.
    pub fn free(&mut self, frame: Frame) -> Result<()> {
        if frame >= self.total {
            return Err(VmError::InvalidFrame {
                frame,
                total: self.total,
            });
        }
        debug!("freed frame {frame}");
        self.free.push_back(frame);
        Ok(())
    }

    /// Free each frame in order, stopping at the first invalid one
    pub fn free_many(&mut self, frames: &[Frame]) -> Result<()> {
        frames.iter().try_for_each(|&frame| self.free(frame))
    }

    #[inline]
    pub fn available_count(&self) -> usize {
        self.free.len()
    }

    #[inline]
    pub fn total_count(&self) -> usize {
        self.total
    }

    /// Number of frames currently handed out
    #[inline]
    pub fn in_use_count(&self) -> usize {
        self.total.saturating_sub(self.free.len())
    }

    pub fn is_free(&self, frame: Frame) -> bool {
        self.free.contains(&frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_initialization() {
        let frames = FrameAllocator::new(8);
        assert_eq!(frames.total_count(), 8);
        assert_eq!(frames.available_count(), 8);
        assert_eq!(frames.in_use_count(), 0);
        assert!(frames.is_free(0));
        assert!(frames.is_free(7));
    }

    #[test]
    fn test_allocate_one_in_index_order() {
        let mut frames = FrameAllocator::new(4);
        assert_eq!(frames.allocate_one().unwrap(), 0);
        assert_eq!(frames.allocate_one().unwrap(), 1);
        assert_eq!(frames.available_count(), 2);
        assert!(!frames.is_free(0));
    }

    #[test]
    fn test_allocate_one_exhausted() {
        let mut frames = FrameAllocator::new(1);
        frames.allocate_one().unwrap();
        let err = frames.allocate_one().unwrap_err();
        assert!(matches!(err, VmError::OutOfMemory { requested: 1, available: 0 }));
    }

    #[test]
    fn test_free_is_fifo() {
        // The first frame freed is the first reused
        let mut frames = FrameAllocator::new(3);
        let a = frames.allocate_one().unwrap();
        let b = frames.allocate_one().unwrap();
        let c = frames.allocate_one().unwrap();

        frames.free(c).unwrap();
        frames.free(a).unwrap();
        frames.free(b).unwrap();

        assert_eq!(frames.allocate_one().unwrap(), c);
        assert_eq!(frames.allocate_one().unwrap(), a);
        assert_eq!(frames.allocate_one().unwrap(), b);
    }

    #[test]
    fn test_allocate_many_is_all_or_nothing() {
        let mut frames = FrameAllocator::new(4);
        let err = frames.allocate_many(5).unwrap_err();
        assert!(matches!(err, VmError::OutOfMemory { requested: 5, available: 4 }));
        assert_eq!(frames.available_count(), 4);

        let got = frames.allocate_many(3).unwrap();
        assert_eq!(got, vec![0, 1, 2]);
        assert_eq!(frames.available_count(), 1);
    }

    #[test]
    fn test_allocate_many_zero() {
        let mut frames = FrameAllocator::new(2);
        assert!(frames.allocate_many(0).unwrap().is_empty());
        assert_eq!(frames.available_count(), 2);
    }

    #[test]
    fn test_free_invalid_frame() {
        let mut frames = FrameAllocator::new(4);
        let err = frames.free(4).unwrap_err();
        assert!(matches!(err, VmError::InvalidFrame { frame: 4, total: 4 }));
        assert_eq!(frames.available_count(), 4);
    }

    #[test]
    fn test_double_free_is_not_detected() {
        // Known weakness: the frame is simply queued twice
        let mut frames = FrameAllocator::new(2);
        frames.free(0).unwrap();
        assert_eq!(frames.available_count(), 3);
    }

    #[test]
    fn test_free_many_stops_at_first_invalid() {
        let mut frames = FrameAllocator::new(4);
        let held = frames.allocate_many(4).unwrap();
        assert_eq!(held, vec![0, 1, 2, 3]);

        let err = frames.free_many(&[1, 9, 2]).unwrap_err();
        assert!(matches!(err, VmError::InvalidFrame { frame: 9, .. }));
        // Frame 1 went back before the failure, frame 2 did not
        assert_eq!(frames.available_count(), 1);
        assert!(frames.is_free(1));
        assert!(!frames.is_free(2));
    }
}
