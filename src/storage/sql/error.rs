//! Mapping of driver errors onto [`crate::Error`].
//!
//! The driver reports a missing row as an error of its own; every lookup goes
//! through [`query_error`] so callers only ever see [`Error::NotFound`].

use crate::Error;

/// Maps a driver error from a single-row lookup.
///
/// "No rows" becomes [`Error::NotFound`]; anything else is a backend failure.
pub fn query_error(operation: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| match e {
        rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
        other => backend_error(operation)(other),
    }
}

/// Maps a driver error to [`Error::OperationFailed`].
pub fn backend_error(operation: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_rows_is_not_found() {
        let err = query_error("get")(rusqlite::Error::QueryReturnedNoRows);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_other_errors_keep_operation() {
        let err = query_error("get")(rusqlite::Error::InvalidQuery);
        assert!(matches!(
            err,
            Error::OperationFailed { ref operation, .. } if operation == "get"
        ));
    }

    #[test]
    fn test_backend_error_never_not_found() {
        let err = backend_error("fetch_by_prefix")(rusqlite::Error::QueryReturnedNoRows);
        assert!(!err.is_not_found());
    }
}
