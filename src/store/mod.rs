//! Durable-store and notifier boundaries.
//!
//! The real datastore and broadcast channel live outside this crate; the
//! engine only speaks the trait shapes in [`traits`]. [`memory`] provides a
//! DashMap-backed store for tests and embedded use.

pub mod memory;
pub mod traits;

pub use memory::InMemoryResultStore;
pub use traits::{NotifyError, ResultNotifier, ResultStore, StoreError};
