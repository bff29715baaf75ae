use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// Debug identifiers handed out by a single construction site.
///
/// Each component type owns one `static Ids`; the numbers only show up in
/// `Display` output and log fields.
#[derive(Debug)]
pub(crate) struct Ids {
    id: CachePadded<AtomicU64>,
}

impl Ids {
    pub(crate) const fn new() -> Self {
        Self {
            id: CachePadded::new(AtomicU64::new(1)),
        }
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.id.fetch_add(1, Ordering::Relaxed)
    }
}
