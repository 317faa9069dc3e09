pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for entity ID allocation.
///
/// Construction failures are fatal: a process holding an out-of-range
/// datacenter or worker ID must not mint IDs, because a duplicated partition
/// silently breaks cross-instance uniqueness. Clock regressions are per-call
/// and transient: the caller may retry after a short backoff once the wall
/// clock has caught up.
#[derive(Clone, Copy, PartialEq, Eq, thiserror::Error, Debug)]
pub enum Error {
    /// A datacenter or worker ID outside its 5-bit range was supplied at
    /// construction.
    #[error("{name} {value} is out of range (expected 0..={max})")]
    Configuration {
        /// Which field was rejected (`"datacenter id"` or `"worker id"`).
        name: &'static str,
        /// The rejected value.
        value: i64,
        /// The largest accepted value for this field.
        max: u64,
    },

    /// The wall clock reported a millisecond earlier than the last issued ID.
    ///
    /// Reusing the stale timestamp could duplicate an already-issued ID, so
    /// the allocator refuses the call instead.
    #[error("clock moved backward by {drift_ms} ms; refusing to allocate an id")]
    ClockMovedBackward {
        /// How far behind the last issued timestamp the clock was observed.
        drift_ms: u64,
    },
}
