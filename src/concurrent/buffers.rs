// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::collections::TryReserveError;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Map state snapshot for the concurrent maps.
///
/// Two states exist: stable (`old == None`, even version) and rehashing
/// (`old == Some`, odd version). The snapshot is immutable; every transition
/// installs a new one via CAS on [`BuffersCell`].
///
/// The version counter is bumped entering a rehash and jumps to
/// `next_stable_version` leaving it; the next stable version then advances by
/// 2. Reserving the odd intermediate value lets a late-arriving thread tell
/// "my rehash is still running" from "the world moved on" unambiguously.
///
/// The growth threshold travels in the snapshot because it changes exactly
/// when the table does.
pub struct Buffers {
    /// Currently served table (being populated during a rehash).
    pub cur: Arc<[AtomicU64]>,

    /// Previous table; `Some` exactly while a rehash is in flight.
    pub old: Option<Arc<[AtomicU64]>>,

    /// Entry count that triggers the next resize.
    pub threshold: u64,

    /// Current map version.
    pub version: u32,

    /// Version at which the in-flight (or next) rehash settles.
    pub next_stable_version: u32,

    /// Number of threads currently helping the rehash.
    pub resize_workers: u32,
}

impl Buffers {
    pub fn initial(capacity: usize, threshold: u64) -> Result<Self, TryReserveError> {
        Ok(Self {
            cur: new_table(capacity)?,
            old: None,
            threshold,
            version: 0,
            next_stable_version: 2,
            resize_workers: 0,
        })
    }

    /// Enters the rehashing state with a freshly allocated table.
    pub fn begin_resize(&self, table: Arc<[AtomicU64]>, threshold: u64) -> Self {
        Self {
            cur: table,
            old: Some(self.cur.clone()),
            threshold,
            version: self.version + 1,
            // the target stable version does not move until we reach it
            next_stable_version: self.next_stable_version,
            resize_workers: 0,
        }
    }

    /// Same state with a different growth threshold.
    pub fn with_threshold(&self, threshold: u64) -> Self {
        Self {
            cur: self.cur.clone(),
            old: self.old.clone(),
            threshold,
            version: self.version,
            next_stable_version: self.next_stable_version,
            resize_workers: self.resize_workers,
        }
    }

    /// One more thread is helping the rehash.
    pub fn add_worker(&self) -> Self {
        Self {
            cur: self.cur.clone(),
            old: self.old.clone(),
            threshold: self.threshold,
            version: self.version,
            next_stable_version: self.next_stable_version,
            resize_workers: self.resize_workers + 1,
        }
    }

    /// One thread is done helping; the last one out performs the transition
    /// back to the stable state.
    pub fn remove_worker(&self) -> Self {
        if self.resize_workers == 1 {
            Self {
                cur: self.cur.clone(),
                old: None,
                threshold: self.threshold,
                version: self.next_stable_version,
                next_stable_version: self.next_stable_version + 2,
                resize_workers: 0,
            }
        } else {
            Self {
                cur: self.cur.clone(),
                old: self.old.clone(),
                threshold: self.threshold,
                version: self.version,
                next_stable_version: self.next_stable_version,
                resize_workers: self.resize_workers - 1,
            }
        }
    }
}

/// Allocates a zeroed bucket table.
pub fn new_table(capacity: usize) -> Result<Arc<[AtomicU64]>, TryReserveError> {
    let mut table: Vec<AtomicU64> = Vec::new();
    table.try_reserve_exact(capacity)?;
    table.resize_with(capacity, || AtomicU64::new(0));
    Ok(Arc::from(table.into_boxed_slice()))
}

/// Atomic holder for the current [`Buffers`] snapshot.
///
/// Displaced snapshots are retired instead of freed: a reader may still hold
/// a reference obtained before the swap. Their number is bounded by the
/// count of state transitions (a handful per resize), so keeping them until
/// the map drops costs a few kilobytes over its lifetime and needs no epoch
/// machinery.
pub struct BuffersCell {
    live: AtomicPtr<Buffers>,
    retired: Mutex<Vec<Box<Buffers>>>,
}

// Safety: the raw pointer always comes from Box::into_raw and is only freed
// on drop; all access goes through atomics.
unsafe impl Send for BuffersCell {}
unsafe impl Sync for BuffersCell {}

impl BuffersCell {
    pub fn new(buffers: Buffers) -> Self {
        Self {
            live: AtomicPtr::new(Box::into_raw(Box::new(buffers))),
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Returns the current snapshot.
    pub fn load(&self) -> &Buffers {
        // Safety: snapshots are never freed before the cell drops
        unsafe { &*self.live.load(Ordering::Acquire) }
    }

    /// Installs `next` if `expected` is still the live snapshot. Snapshot
    /// identity is pointer identity, exactly like the reference CAS it
    /// replaces.
    pub fn compare_swap(&self, expected: &Buffers, next: Buffers) -> bool {
        let next = Box::into_raw(Box::new(next));
        let expected = std::ptr::from_ref(expected).cast_mut();

        match self
            .live
            .compare_exchange(expected, next, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(prev) => {
                // Safety: prev was installed via Box::into_raw and has just
                // been unlinked; readers may still hold references, so it is
                // retired, not dropped
                self.retired
                    .lock()
                    .expect("lock poisoned")
                    .push(unsafe { Box::from_raw(prev) });
                true
            }
            Err(_) => {
                // Safety: next was never published
                drop(unsafe { Box::from_raw(next) });
                false
            }
        }
    }
}

impl Drop for BuffersCell {
    fn drop(&mut self) {
        // Safety: exclusive access; the live snapshot was installed via
        // Box::into_raw
        drop(unsafe { Box::from_raw(self.live.load(Ordering::Acquire)) });
    }
}

/// Serializes bucket table allocation between racing mutators.
///
/// When several threads cross the growth threshold together, all of them
/// would allocate the same huge table even though only one CAS can win. The
/// gate lets one thread allocate while the others spin-then-yield and
/// re-check whether the resize has started without them.
pub struct AllocationGate(AtomicBool);

impl Default for AllocationGate {
    fn default() -> Self {
        Self(AtomicBool::new(false))
    }
}

impl AllocationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn release(&self) {
        self.0.store(false, Ordering::Release);
    }
}
