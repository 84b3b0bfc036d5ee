//! Process-wide secure state: the canary value every buffer is seeded
//! with and the system page size. Built exactly once, immutable after.

use log::warn;
use once_cell::sync::Lazy;

use crate::CANARY_SIZE;

pub(crate) struct Globals {
    pub(crate) canary: [u8; CANARY_SIZE],
    pub(crate) page_size: usize,
}

static GLOBALS: Lazy<Globals> = Lazy::new(|| {
    // Best effort; locked pages are already excluded from dumps.
    if let Err(e) = memsys::disable_core_dumps() {
        warn!("could not disable core dumps: {e}");
    }

    let mut canary = [0u8; CANARY_SIZE];
    // A buffer guarded by an undefined canary protects nothing, so
    // there is no degraded mode to fall back to here.
    getrandom::getrandom(&mut canary)
        .unwrap_or_else(|e| panic!("canary generation failed: {e}"));

    Globals {
        canary,
        page_size: memsys::page_size(),
    }
});

pub(crate) fn get() -> &'static Globals {
    &GLOBALS
}
