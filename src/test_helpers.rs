//! Test helper utilities for rulemix tests
//!
//! Evaluator fixtures and call counters shared by the unit tests.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::engine::evaluator::{Predicate, Processor, Transform};

// Test environment mutex to prevent concurrent environment variable modification
pub static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Counts calls across every evaluator it hands out.
#[derive(Clone, Default)]
pub struct CallCounter {
    calls: Arc<AtomicUsize>,
}

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn predicate(&self, outcome: bool) -> Predicate {
        let calls = self.calls.clone();
        Predicate::sync_fn(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(outcome)
        })
    }

    pub fn async_predicate(&self, outcome: bool) -> Predicate {
        let calls = self.calls.clone();
        Predicate::async_fn(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(outcome) }
        })
    }

    /// Identity transform that counts.
    pub fn transform(&self) -> Transform {
        let calls = self.calls.clone();
        Transform::sync_fn(move |value| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(value.clone())
        })
    }

    pub fn async_transform(&self) -> Transform {
        let calls = self.calls.clone();
        Transform::async_fn(move |value| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(value) }
        })
    }

    /// Passthrough processor that counts.
    pub fn processor(&self) -> Processor {
        let calls = self.calls.clone();
        Processor::sync_fn(move |value| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(value.clone()))
        })
    }

    pub fn async_processor(&self) -> Processor {
        let calls = self.calls.clone();
        Processor::async_fn(move |value| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(Some(value)) }
        })
    }
}

pub fn constant(outcome: bool) -> Predicate {
    Predicate::sync_fn(move |_| Ok(outcome))
}

pub fn constant_async(outcome: bool) -> Predicate {
    Predicate::async_fn(move |_| async move { Ok(outcome) })
}

/// Adds `amount` to a numeric input, producing an `f64`.
pub fn add(amount: f64) -> Transform {
    Transform::sync_fn(move |value| Ok(json!(value.as_f64().unwrap_or_default() + amount)))
}

pub fn add_async(amount: f64) -> Transform {
    Transform::async_fn(move |value: Value| async move {
        Ok(json!(value.as_f64().unwrap_or_default() + amount))
    })
}

/// Processor rejecting every input.
pub fn reject_all() -> Processor {
    Processor::sync_fn(|_| Ok(None))
}

/// True when the string input contains `needle`.
pub fn contains(needle: &str) -> Predicate {
    let needle = needle.to_string();
    Predicate::sync_fn(move |value| {
        Ok(value
            .as_str()
            .is_some_and(|text| text.contains(needle.as_str())))
    })
}
