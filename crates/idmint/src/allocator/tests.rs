use crate::{EntityId, Error, IdAllocator, TimeSource};
use core::cell::Cell;
use std::collections::HashSet;
use std::sync::Mutex as StdMutex;
use std::thread::scope;

struct MockTime {
    millis: u64,
}

impl TimeSource for MockTime {
    fn current_millis(&self) -> u64 {
        self.millis
    }
}

/// A clock the test advances (or rewinds) explicitly between calls.
struct StepTime {
    millis: Cell<u64>,
}

impl StepTime {
    fn new(millis: u64) -> Self {
        Self {
            millis: Cell::new(millis),
        }
    }

    fn set(&self, millis: u64) {
        self.millis.set(millis);
    }
}

impl TimeSource for &StepTime {
    fn current_millis(&self) -> u64 {
        self.millis.get()
    }
}

/// A clock that replays a scripted sequence of samples, repeating the last
/// one once the script runs out. Each `current_millis` call consumes one
/// sample, so exhaustion spins terminate (or regress) deterministically.
struct ScriptedTime {
    values: Vec<u64>,
    index: Cell<usize>,
}

impl ScriptedTime {
    fn new(values: Vec<u64>) -> Self {
        Self {
            values,
            index: Cell::new(0),
        }
    }
}

impl TimeSource for ScriptedTime {
    fn current_millis(&self) -> u64 {
        let i = self.index.get();
        self.index.set(i + 1);
        self.values[i.min(self.values.len() - 1)]
    }
}

#[test]
fn sequence_increments_within_same_tick() {
    let allocator = IdAllocator::with_clock(0, 0, MockTime { millis: 42 }).unwrap();

    let id1 = allocator.next_id().unwrap();
    let id2 = allocator.next_id().unwrap();
    let id3 = allocator.next_id().unwrap();

    assert_eq!(id1.timestamp(), 42);
    assert_eq!(id2.timestamp(), 42);
    assert_eq!(id3.timestamp(), 42);
    assert_eq!(id1.sequence(), 0);
    assert_eq!(id2.sequence(), 1);
    assert_eq!(id3.sequence(), 2);
    assert!(id1 < id2 && id2 < id3);
}

#[test]
fn sequence_resets_when_tick_advances() {
    let time = StepTime::new(42);
    let allocator = IdAllocator::with_clock(0, 0, &time).unwrap();

    let id1 = allocator.next_id().unwrap();
    let id2 = allocator.next_id().unwrap();
    assert_eq!(id2.sequence(), 1);

    time.set(43);
    let id3 = allocator.next_id().unwrap();
    assert_eq!(id3.timestamp(), 43);
    assert_eq!(id3.sequence(), 0);
    assert!(id1 < id2 && id2 < id3);
}

#[test]
fn sequence_exhaustion_spins_to_next_tick() {
    // 4096 IDs consume one sample each; the 4097th call samples tick 42 once
    // more, finds the sequence exhausted, and its spin then observes tick 43.
    let samples_at_base = EntityId::max_sequence() as usize + 2;
    let mut script = vec![42; samples_at_base];
    script.push(43);
    let time = ScriptedTime::new(script);
    let allocator = IdAllocator::with_clock(0, 0, time).unwrap();

    let mut prev = allocator.next_id().unwrap();
    for _ in 0..EntityId::max_sequence() {
        let id = allocator.next_id().unwrap();
        assert_eq!(id.timestamp(), 42);
        assert!(prev < id);
        prev = id;
    }
    assert_eq!(prev.sequence(), EntityId::max_sequence());

    let rolled = allocator.next_id().unwrap();
    assert_eq!(rolled.timestamp(), 43);
    assert_eq!(rolled.sequence(), 0);
    assert!(prev < rolled);
}

#[test]
fn clock_regression_fails_without_mutating_state() {
    let time = StepTime::new(42);
    let allocator = IdAllocator::with_clock(0, 0, &time).unwrap();

    allocator.next_id().unwrap();
    allocator.next_id().unwrap();

    time.set(37);
    let err = allocator.next_id().unwrap_err();
    assert_eq!(err, Error::ClockMovedBackward { drift_ms: 5 });

    // State was untouched: once the clock catches up, the sequence resumes
    // where it left off.
    time.set(42);
    let id = allocator.next_id().unwrap();
    assert_eq!(id.timestamp(), 42);
    assert_eq!(id.sequence(), 2);
}

#[test]
fn regression_during_spin_fails() {
    // The 4097th call samples tick 42, finds the sequence exhausted, and
    // starts spinning; the next sample reports an earlier millisecond.
    let samples_at_base = EntityId::max_sequence() as usize + 2;
    let mut script = vec![42; samples_at_base];
    script.push(41);
    let time = ScriptedTime::new(script);
    let allocator = IdAllocator::with_clock(0, 0, time).unwrap();

    let seq_capacity = EntityId::max_sequence() + 1;
    for _ in 0..seq_capacity {
        allocator.next_id().unwrap();
    }

    let err = allocator.next_id().unwrap_err();
    assert_eq!(err, Error::ClockMovedBackward { drift_ms: 1 });
}

#[test]
fn configuration_bounds() {
    let err = IdAllocator::with_clock(32, 0, MockTime { millis: 0 }).unwrap_err();
    assert_eq!(
        err,
        Error::Configuration {
            name: "datacenter id",
            value: 32,
            max: EntityId::max_datacenter_id(),
        }
    );

    let err = IdAllocator::with_clock(0, -1, MockTime { millis: 0 }).unwrap_err();
    assert_eq!(
        err,
        Error::Configuration {
            name: "worker id",
            value: -1,
            max: EntityId::max_worker_id(),
        }
    );

    let allocator = IdAllocator::with_clock(31, 31, MockTime { millis: 7 }).unwrap();
    assert_eq!(allocator.datacenter_id(), 31);
    assert_eq!(allocator.worker_id(), 31);
}

#[test]
fn ids_encode_configured_partition() {
    let allocator = IdAllocator::with_clock(3, 7, MockTime { millis: 42 }).unwrap();

    for _ in 0..256 {
        let id = allocator.next_id().unwrap();
        assert_eq!(id.datacenter_id(), 3);
        assert_eq!(id.worker_id(), 7);
    }
}

#[test]
fn monotonic_under_wall_clock() {
    const TOTAL_IDS: usize = 4096 * 4;

    let allocator = IdAllocator::new(1, 1).unwrap();
    let mut prev = allocator.next_id().unwrap();

    for _ in 1..TOTAL_IDS {
        let id = allocator.next_id().unwrap();
        assert!(prev < id);
        if id.timestamp() == prev.timestamp() {
            assert_eq!(id.sequence(), prev.sequence() + 1);
        } else {
            assert_eq!(id.sequence(), 0);
        }
        prev = id;
    }
}

#[test]
fn concurrent_stress_yields_unique_ids() {
    const THREADS: usize = 100;
    const IDS_PER_THREAD: usize = 1_000;
    const TOTAL_IDS: usize = THREADS * IDS_PER_THREAD;

    let allocator = IdAllocator::new(0, 1).unwrap();
    let seen_ids = StdMutex::new(HashSet::with_capacity(TOTAL_IDS));

    scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                let mut minted = Vec::with_capacity(IDS_PER_THREAD);
                for _ in 0..IDS_PER_THREAD {
                    minted.push(allocator.next_id().expect("clock regressed during test"));
                }

                // Per-thread completion order implies strictly increasing IDs.
                for pair in minted.windows(2) {
                    assert!(pair[0] < pair[1]);
                }

                let mut seen_ids = seen_ids.lock().unwrap();
                for id in minted {
                    assert!(seen_ids.insert(id));
                }
            });
        }
    });

    let final_count = seen_ids.lock().unwrap().len();
    assert_eq!(final_count, TOTAL_IDS, "Expected {TOTAL_IDS} unique IDs");
}
