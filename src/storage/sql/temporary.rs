//! Process-wide allocator for temporary namespace names.
//!
//! Temporary tables are named `<base>_<id>`. IDs come from one counter shared
//! by every handle in the process and are never handed out twice, even after
//! the table that used them is dropped. The counter resets only when the
//! process restarts, so a name can still be taken by a table left behind in
//! a file database; callers create temporaries with a strict `CREATE TABLE`
//! and ask for the next name when it fails.
//!
//! Bases too long to take the suffix are truncated so the name stays within
//! [`MAX_TABLE_NAME_LEN`].

use std::sync::Mutex;

use super::connection::acquire_lock;
use super::dialect::MAX_TABLE_NAME_LEN;

/// Monotonic ID generator for temporary tables.
#[derive(Debug)]
pub struct TemporaryTableIds {
    last: Mutex<u64>,
}

impl TemporaryTableIds {
    /// Creates a generator whose first ID is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: Mutex::new(0),
        }
    }

    /// Returns the next ID.
    pub fn next_id(&self) -> u64 {
        let mut last = acquire_lock(&self.last);
        *last += 1;
        *last
    }

    /// Builds the table name for a temporary namespace of `base`.
    pub fn next_table_name(&self, base: &str) -> String {
        let suffix = format!("_{}", self.next_id());
        let mut keep = base.len().min(MAX_TABLE_NAME_LEN.saturating_sub(suffix.len()));
        while !base.is_char_boundary(keep) {
            keep -= 1;
        }
        format!("{}{suffix}", &base[..keep])
    }
}

impl Default for TemporaryTableIds {
    fn default() -> Self {
        Self::new()
    }
}

static TEMPORARY_TABLE_IDS: TemporaryTableIds = TemporaryTableIds::new();

/// Returns the process-wide generator.
pub fn temporary_table_ids() -> &'static TemporaryTableIds {
    &TEMPORARY_TABLE_IDS
}
