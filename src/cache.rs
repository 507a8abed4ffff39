//! Caller-owned transform cache.
//!
//! Keys are the SHA-256 of the composed transformer input plus the persona,
//! namespace and style. Entries are evicted oldest-insertion first once
//! `capacity` is reached. A capacity of 0 stores nothing.
//!
//! The cache is plain state handed to the processor by whoever owns it, so
//! two pipelines never share entries unless their caller passes the same
//! instance.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use narrative_chunker_core::models::{TransformOutput, TransformParams};

#[derive(Default)]
struct Inner {
    entries: HashMap<String, TransformOutput>,
    order: VecDeque<String>,
}

pub struct TransformCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl TransformCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Cache key for a composed input under `params`. Chunk metadata is not
    /// part of the key.
    pub fn key(input: &str, params: &TransformParams) -> String {
        let mut hasher = Sha256::new();
        for part in [
            params.persona.as_str(),
            params.namespace.as_str(),
            params.style.as_str(),
            input,
        ] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<TransformOutput> {
        let guard = self.inner.lock().ok()?;
        guard.entries.get(key).cloned()
    }

    pub fn insert(&self, key: String, output: TransformOutput) {
        if self.capacity == 0 {
            return;
        }
        let Ok(mut guard) = self.inner.lock() else {
            return;
        };
        if guard.entries.contains_key(&key) {
            guard.entries.insert(key, output);
            return;
        }
        while guard.order.len() >= self.capacity {
            match guard.order.pop_front() {
                Some(oldest) => {
                    guard.entries.remove(&oldest);
                }
                None => break,
            }
        }
        guard.order.push_back(key.clone());
        guard.entries.insert(key, output);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
