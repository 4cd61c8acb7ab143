use std::ops::AddAssign;

use serde::Serialize;

/// What one Load/Save (or one bulk worker) moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferCounts {
    pub objects: usize,
    pub bytes: u64,
}

impl TransferCounts {
    pub fn single(bytes: u64) -> Self {
        Self { objects: 1, bytes }
    }

    pub fn record(&mut self, bytes: u64) {
        self.objects += 1;
        self.bytes += bytes;
    }
}

impl AddAssign for TransferCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.objects += rhs.objects;
        self.bytes += rhs.bytes;
    }
}
