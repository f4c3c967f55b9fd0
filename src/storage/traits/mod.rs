//! Storage backend traits.

mod storage;
mod transaction;

pub use storage::{PrefixReader, Reader, Storage, Writer};
pub use transaction::{Batch, Transaction};
