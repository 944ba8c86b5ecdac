// src/sim/clock.rs

//! Thread-local view of the virtual clock.
//!
//! The kernel owns the authoritative time; this cell exists so the tracing
//! formatter can stamp event lines without a handle to the running [`Sim`].
//!
//! [`Sim`]: crate::sim::Sim

use std::cell::Cell;
use std::time::Duration;

thread_local! {
    static SIM_NOW: Cell<f64> = const { Cell::new(0.0) };
}

pub(crate) fn set_now(now: Duration) {
    SIM_NOW.with(|cell| cell.set(now.as_secs_f64()));
}

/// Current virtual time in seconds, as last published by the kernel.
pub fn now_secs() -> f64 {
    SIM_NOW.with(|cell| cell.get())
}

/// Current virtual time formatted as `HH:MM:SS` for log lines.
pub fn now_hms() -> String {
    let total = now_secs().max(0.0) as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}
