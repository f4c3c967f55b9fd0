//! Storage layer.
//!
//! - [`traits`]: The key-value contract (`Reader`, `Writer`, `PrefixReader`,
//!   `Storage`, `Transaction`, `Batch`)
//! - [`sql`]: Implementation over a SQL table

// Allow significant_drop_tightening - holding the connection guard for the
// whole statement is intentional.
#![allow(clippy::significant_drop_tightening)]
// Allow match_same_arms for explicit enum handling.
#![allow(clippy::match_same_arms)]

pub mod sql;
pub mod traits;

pub use sql::{SqlBatch, SqlStorage, SqlTransaction, new_db, new_open_db, recover_db};
pub use traits::{Batch, PrefixReader, Reader, Storage, Transaction, Writer};
