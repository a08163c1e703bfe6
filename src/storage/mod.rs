//! In-memory storage
//!
//! Only the pending-transaction pool lives here. Chain state is held for the
//! lifetime of the process; nothing is written to disk.

pub mod memory_pool;

pub use memory_pool::MemoryPool;
