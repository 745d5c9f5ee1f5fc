//! Frame stacking under a bounded memory budget.

pub(crate) mod calibration;
mod error;
mod stacker;

pub use error::Error;
pub use stacker::{FrameStacker, PartFile};

use strum_macros::Display;

/// Type of frame being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum FrameType {
    /// Dark frames capturing sensor noise and hot pixels
    Dark,
    /// Light frames, the actual science exposures
    Light,
    /// Combined output of a stacking run
    Master,
}

/// Fraction of available memory the default spill budget may use.
///
/// Large enough that bands stay wide (few spill files, sequential I/O),
/// small enough to leave headroom for the rest of the process and the OS.
const MEMORY_PERCENT: u64 = 75;

/// Floor for the default budget so tiny systems still get usable bands.
const MIN_SPILL_BUDGET: u64 = 64 * 1024 * 1024;

/// Default spill-file byte budget derived from available system memory.
///
/// Callers with a known budget pass it to [`FrameStacker::new`] directly;
/// this is the fallback for interactive use.
pub fn default_spill_budget() -> u64 {
    use sysinfo::System;

    let mut sys = System::new();
    sys.refresh_memory();
    let budget = sys.available_memory() * MEMORY_PERCENT / 100;
    budget.max(MIN_SPILL_BUDGET)
}
