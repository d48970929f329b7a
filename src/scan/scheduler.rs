use std::ops::Range;

use crate::config::ConfigError;

/// What happened to the active slot when a frame index was scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotTransition {
    /// First frame of `slot`; no candidate is held yet. `previous` is now complete.
    Entered { slot: usize, previous: Option<usize> },
    /// Still inside `slot`.
    Same(usize),
}

impl SlotTransition {
    pub fn slot(&self) -> usize {
        match *self {
            SlotTransition::Entered { slot, .. } | SlotTransition::Same(slot) => slot,
        }
    }
}

/// Partitions a frame budget into `max_faces` contiguous slots.
///
/// `slot_size = max_frames / max_faces`; the last slot absorbs the remainder.
#[derive(Debug)]
pub struct SlotScheduler {
    max_frames: u64,
    slots: usize,
    slot_size: u64,
    current: Option<usize>,
}

impl SlotScheduler {
    pub fn new(max_frames: u64, max_faces: usize) -> Result<Self, ConfigError> {
        if max_faces == 0 {
            return Err(ConfigError::NoSlots);
        }
        if max_frames > 0 && max_faces as u64 > max_frames {
            return Err(ConfigError::MoreSlotsThanFrames {
                max_frames,
                max_faces,
            });
        }
        Ok(Self {
            max_frames,
            slots: max_faces,
            slot_size: max_frames / max_faces as u64,
            current: None,
        })
    }

    pub fn max_frames(&self) -> u64 {
        self.max_frames
    }

    pub fn slot_count(&self) -> usize {
        self.slots
    }

    pub fn slot_size(&self) -> u64 {
        self.slot_size
    }

    /// Slot owning `frame_index`, or `None` once the budget is spent.
    pub fn slot_for(&self, frame_index: u64) -> Option<usize> {
        if frame_index >= self.max_frames {
            return None;
        }
        let slot = (frame_index / self.slot_size).min(self.slots as u64 - 1);
        Some(slot as usize)
    }

    /// Frame indices belonging to `slot`.
    pub fn slot_range(&self, slot: usize) -> Range<u64> {
        let start = slot as u64 * self.slot_size;
        let end = if slot + 1 >= self.slots {
            self.max_frames
        } else {
            start + self.slot_size
        };
        start..end
    }

    /// Schedule the next frame. Frame indices must be fed in increasing order.
    pub fn advance(&mut self, frame_index: u64) -> Option<SlotTransition> {
        let slot = self.slot_for(frame_index)?;
        match self.current {
            Some(current) if current == slot => Some(SlotTransition::Same(slot)),
            previous => {
                self.current = Some(slot);
                Some(SlotTransition::Entered { slot, previous })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_frames_two_slots() {
        let scheduler = SlotScheduler::new(10, 2).unwrap();
        assert_eq!(scheduler.slot_size(), 5);
        assert_eq!(scheduler.slot_range(0), 0..5);
        assert_eq!(scheduler.slot_range(1), 5..10);
        assert_eq!(scheduler.slot_for(4), Some(0));
        assert_eq!(scheduler.slot_for(5), Some(1));
        assert_eq!(scheduler.slot_for(10), None);
    }

    #[test]
    fn last_slot_absorbs_remainder() {
        let scheduler = SlotScheduler::new(11, 3).unwrap();
        assert_eq!(scheduler.slot_size(), 3);
        assert_eq!(scheduler.slot_for(9), Some(2));
        assert_eq!(scheduler.slot_for(10), Some(2));
        assert_eq!(scheduler.slot_range(2), 6..11);
    }

    #[test]
    fn emits_entry_exactly_on_slot_change() {
        let mut scheduler = SlotScheduler::new(4, 2).unwrap();
        let transitions: Vec<_> = (0..5).map(|i| scheduler.advance(i)).collect();
        assert_eq!(
            transitions,
            vec![
                Some(SlotTransition::Entered {
                    slot: 0,
                    previous: None
                }),
                Some(SlotTransition::Same(0)),
                Some(SlotTransition::Entered {
                    slot: 1,
                    previous: Some(0)
                }),
                Some(SlotTransition::Same(1)),
                None,
            ]
        );
    }

    #[test]
    fn rejects_zero_size_slots() {
        assert_eq!(
            SlotScheduler::new(5, 10).unwrap_err(),
            ConfigError::MoreSlotsThanFrames {
                max_frames: 5,
                max_faces: 10
            }
        );
        assert_eq!(SlotScheduler::new(5, 0).unwrap_err(), ConfigError::NoSlots);
    }

    #[test]
    fn empty_budget_schedules_nothing() {
        let mut scheduler = SlotScheduler::new(0, 3).unwrap();
        assert_eq!(scheduler.advance(0), None);
    }
}
