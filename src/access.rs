//! Per-column access arbitration.
//!
//! Every column carries a reader/writer counter. Reads push it up, writes
//! push it below zero; overlap trips a debug assertion. The counter stays
//! balanced in release builds, it just stops asserting.

use std::sync::atomic::{AtomicIsize, Ordering};

/// Reader/writer counter attached to one component column.
///
/// State is `+n` for n active readers, `-n` for n active writers, `0` when
/// idle. Mixed reader/writer or writer/writer states are contract
/// violations.
#[derive(Default)]
pub(crate) struct ColumnAccess {
    state: AtomicIsize,
}

impl ColumnAccess {
    pub fn new() -> Self {
        Self {
            state: AtomicIsize::new(0),
        }
    }

    /// Mark a shared read; released when the guard drops.
    pub fn read(&self) -> ReadAccess<'_> {
        let prev = self.state.fetch_add(1, Ordering::AcqRel);
        debug_assert!(
            prev >= 0,
            "component column read while a writer is active"
        );
        ReadAccess { state: &self.state }
    }

    /// Mark an exclusive write; released when the guard drops.
    pub fn write(&self) -> WriteAccess<'_> {
        let prev = self.state.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(
            prev == 0,
            "component column written while other access is active"
        );
        WriteAccess { state: &self.state }
    }
}

pub(crate) struct ReadAccess<'a> {
    state: &'a AtomicIsize,
}

impl Drop for ReadAccess<'_> {
    fn drop(&mut self) {
        self.state.fetch_sub(1, Ordering::AcqRel);
    }
}

pub(crate) struct WriteAccess<'a> {
    state: &'a AtomicIsize,
}

impl Drop for WriteAccess<'_> {
    fn drop(&mut self) {
        self.state.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_reads_and_writes() {
        let access = ColumnAccess::new();
        {
            let _a = access.read();
            let _b = access.read();
        }
        {
            let _w = access.write();
        }
        // Idle again: a fresh write must start from zero.
        let _w = access.write();
    }

    #[test]
    #[should_panic(expected = "writer is active")]
    #[cfg(debug_assertions)]
    fn read_during_write_asserts() {
        let access = ColumnAccess::new();
        let _w = access.write();
        let _r = access.read();
    }

    #[test]
    #[should_panic(expected = "other access is active")]
    #[cfg(debug_assertions)]
    fn write_during_read_asserts() {
        let access = ColumnAccess::new();
        let _r = access.read();
        let _w = access.write();
    }
}
