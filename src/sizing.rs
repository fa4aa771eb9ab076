//! Approximate memory footprint estimation.
//!
//! The cache budgets memory against an estimate, not an exact measurement:
//! the contract is monotonic consistency (bigger values report bigger sizes)
//! so eviction pressure tracks real growth.

use serde_json::Value;

/// Conservative estimate used for values whose shape is opaque to the walk.
pub const DEFAULT_OPAQUE_SIZE: usize = 256;

/// Per-slot bookkeeping overhead assumed for collection elements.
const SLOT_OVERHEAD: usize = 16;

/// A value whose approximate in-memory size the cache can account for.
pub trait SizedValue {
    fn size_bytes(&self) -> usize;
}

impl SizedValue for String {
    fn size_bytes(&self) -> usize {
        std::mem::size_of::<String>() + self.len()
    }
}

impl SizedValue for Vec<u8> {
    fn size_bytes(&self) -> usize {
        std::mem::size_of::<Vec<u8>>() + self.len()
    }
}

impl SizedValue for Value {
    fn size_bytes(&self) -> usize {
        estimate_json_size(self)
    }
}

/// Recursive structural estimate for a JSON-shaped value.
///
/// Scalars cost a machine word or their natural width, strings their byte
/// length, and collections the sum of their elements plus per-slot overhead.
/// The enum is closed, so there is no "unknown shape" branch here; opaque
/// callers outside this walk use [`DEFAULT_OPAQUE_SIZE`].
#[must_use]
pub fn estimate_json_size(value: &Value) -> usize {
    match value {
        Value::Null | Value::Bool(_) => std::mem::size_of::<Value>(),
        Value::Number(_) => std::mem::size_of::<Value>() + std::mem::size_of::<f64>(),
        Value::String(s) => std::mem::size_of::<Value>() + s.len(),
        Value::Array(items) => {
            std::mem::size_of::<Value>()
                + items
                    .iter()
                    .map(|v| SLOT_OVERHEAD + estimate_json_size(v))
                    .sum::<usize>()
        }
        Value::Object(map) => {
            std::mem::size_of::<Value>()
                + map
                    .iter()
                    .map(|(k, v)| SLOT_OVERHEAD + k.len() + estimate_json_size(v))
                    .sum::<usize>()
        }
    }
}
