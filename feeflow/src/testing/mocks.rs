//! Scripted memory probes.

use crate::supervisor::MemoryProbe;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Reports the same sample for every pid.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub u64);

impl MemoryProbe for FixedProbe {
    fn resident_bytes(&self, _pid: u32) -> Option<u64> {
        Some(self.0)
    }
}

/// Replays samples in order, then keeps repeating the last one.
#[derive(Debug, Default)]
pub struct SequenceProbe {
    samples: Mutex<VecDeque<u64>>,
    last: Mutex<Option<u64>>,
}

impl SequenceProbe {
    /// Creates a probe replaying `samples`.
    #[must_use]
    pub fn new(samples: impl IntoIterator<Item = u64>) -> Self {
        Self {
            samples: Mutex::new(samples.into_iter().collect()),
            last: Mutex::new(None),
        }
    }
}

impl MemoryProbe for SequenceProbe {
    fn resident_bytes(&self, _pid: u32) -> Option<u64> {
        let mut last = self.last.lock();
        if let Some(next) = self.samples.lock().pop_front() {
            *last = Some(next);
        }
        *last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_probe_repeats_last() {
        let probe = SequenceProbe::new([10, 20]);
        assert_eq!(probe.resident_bytes(1), Some(10));
        assert_eq!(probe.resident_bytes(1), Some(20));
        assert_eq!(probe.resident_bytes(1), Some(20));
    }

    #[test]
    fn test_empty_sequence_has_no_sample() {
        assert_eq!(SequenceProbe::default().resident_bytes(1), None);
    }
}
