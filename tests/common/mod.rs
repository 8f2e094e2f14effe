use std::sync::Mutex;

use segdl::ProgressSink;

/// Sink recording per-unit byte totals, for asserting that reported
/// progress matches bytes actually written.
pub struct CountingSink {
    per_unit: Mutex<Vec<u64>>,
}

impl CountingSink {
    pub fn new(units: usize) -> Self {
        Self {
            per_unit: Mutex::new(vec![0; units]),
        }
    }

    pub fn unit_total(&self, index: usize) -> u64 {
        self.per_unit.lock().unwrap()[index]
    }

    pub fn total(&self) -> u64 {
        self.per_unit.lock().unwrap().iter().sum()
    }
}

impl ProgressSink for CountingSink {
    fn update(&self, unit_index: usize, bytes: u64) {
        self.per_unit.lock().unwrap()[unit_index] += bytes;
    }
}

/// Deterministic non-repeating test payload.
pub fn patterned_body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
