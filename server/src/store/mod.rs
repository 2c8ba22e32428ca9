//! C3 (durable) and C4 (ephemeral) store abstractions. Every component above
//! depends on the traits, never on a concrete driver, so the in-memory
//! doubles in `memory.rs` / `memory_ephemeral.rs` can stand in for tests.

pub mod durable;
pub mod ephemeral;
pub mod memory;
pub mod memory_ephemeral;
pub mod postgres;
pub mod redis_store;

pub use durable::DurableStore;
pub use ephemeral::EphemeralStore;
