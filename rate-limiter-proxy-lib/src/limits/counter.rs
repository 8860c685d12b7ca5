use std::sync::{Mutex, MutexGuard, PoisonError};

use ahash::AHashMap;

const GLOBAL_KEY: &str = "global";

fn bucket_key(bucket: &str) -> String {
    format!("bucket:{bucket}")
}

fn bucket_ip_key(bucket: &str, ip: &str) -> String {
    format!("ip:{bucket}:{ip}")
}

/// In-memory ledger of in-flight requests.
///
/// Three keys move together on every update: the global count, the bucket
/// count and the bucket+client count. Keys whose value drops to zero are
/// removed so the map only holds live entries.
#[derive(Debug, Default)]
pub struct CounterStore {
    counters: Mutex<AHashMap<String, u64>>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// No-op without a bucket.
    pub fn increment(&self, bucket: Option<&str>, ip: &str) {
        if let Some(bucket) = bucket {
            self.change(bucket, ip, |v| v.saturating_add(1));
        }
    }

    /// No-op without a bucket.
    pub fn decrement(&self, bucket: Option<&str>, ip: &str) {
        if let Some(bucket) = bucket {
            self.change(bucket, ip, |v| v.saturating_sub(1));
        }
    }

    pub fn global_count(&self) -> u64 {
        self.read(|view| view.global())
    }

    pub fn bucket_count(&self, bucket: &str) -> u64 {
        self.read(|view| view.bucket(bucket))
    }

    pub fn bucket_ip_count(&self, bucket: &str, ip: &str) -> u64 {
        self.read(|view| view.bucket_ip(bucket, ip))
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Runs `f` against a consistent view of all counters.
    pub fn read<R>(&self, f: impl FnOnce(&CounterView<'_>) -> R) -> R {
        let mut guard = self.lock();
        f(&CounterView { counters: &mut guard })
    }

    /// Runs `f` with exclusive access to the counters.
    ///
    /// Checks made through the view and the increments `f` commits happen
    /// under one lock, so concurrent callers cannot all pass the same check.
    pub fn update<R>(&self, f: impl FnOnce(&mut CounterView<'_>) -> R) -> R {
        let mut guard = self.lock();
        f(&mut CounterView { counters: &mut guard })
    }

    fn change(&self, bucket: &str, ip: &str, op: impl Fn(u64) -> u64) {
        apply(&mut self.lock(), bucket, ip, op);
    }

    fn lock(&self) -> MutexGuard<'_, AHashMap<String, u64>> {
        // Every update completes under the lock, so a poisoned map is still consistent.
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn apply(counters: &mut AHashMap<String, u64>, bucket: &str, ip: &str, op: impl Fn(u64) -> u64) {
    for key in [GLOBAL_KEY.to_string(), bucket_key(bucket), bucket_ip_key(bucket, ip)] {
        let next = op(counters.get(&key).copied().unwrap_or(0));
        if next == 0 {
            counters.remove(&key);
        } else {
            counters.insert(key, next);
        }
    }
}

/// Borrowed view of the counters, valid while the store is locked.
pub struct CounterView<'a> {
    counters: &'a mut AHashMap<String, u64>,
}

impl CounterView<'_> {
    pub fn global(&self) -> u64 {
        self.get(GLOBAL_KEY)
    }

    pub fn bucket(&self, bucket: &str) -> u64 {
        self.get(&bucket_key(bucket))
    }

    pub fn bucket_ip(&self, bucket: &str, ip: &str) -> u64 {
        self.get(&bucket_ip_key(bucket, ip))
    }

    /// Counts one more request for `bucket` and `ip` before the lock is released.
    pub fn increment(&mut self, bucket: &str, ip: &str) {
        apply(self.counters, bucket, ip, |v| v.saturating_add(1));
    }

    fn get(&self, key: &str) -> u64 {
        self.counters.get(key).copied().unwrap_or(0)
    }
}
