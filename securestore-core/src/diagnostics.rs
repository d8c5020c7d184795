//! Per-thread record of the last secure store failure.
//!
//! Every facade call clears the record on entry and sets it at most once, on
//! failure. The record is thread-local, so concurrent callers only ever see
//! the outcome of their own most recent call.

use std::cell::Cell;

use crate::error::{ErrorKind, SecureStoreError, SecureStoreResult};

thread_local! {
    static LAST_ERROR: Cell<Option<SecureStoreError>> = const { Cell::new(None) };
}

/// Clears the calling thread's last error.
pub(crate) fn reset() {
    LAST_ERROR.with(|slot| slot.set(None));
}

/// Records `error` as the calling thread's last error.
pub(crate) fn record(error: SecureStoreError) {
    LAST_ERROR.with(|slot| slot.set(Some(error)));
}

/// Runs one facade call, resetting the record first and recording its failure.
pub(crate) fn track<T>(call: impl FnOnce() -> SecureStoreResult<T>) -> SecureStoreResult<T> {
    reset();
    let result = call();
    if let Err(err) = result.as_ref() {
        record(*err);
    }
    result
}

/// Returns the calling thread's last error, if the most recent call failed.
#[must_use]
pub fn last_error() -> Option<SecureStoreError> {
    LAST_ERROR.with(Cell::get)
}

/// Returns the reason of the calling thread's last failure, or an empty
/// string if the most recent call succeeded.
#[uniffi::export]
#[must_use]
pub fn last_error_message() -> String {
    last_error().map(|err| err.to_string()).unwrap_or_default()
}

/// Returns the taxonomy bucket of the calling thread's last failure.
#[uniffi::export]
#[must_use]
pub fn last_error_kind() -> Option<ErrorKind> {
    last_error().map(SecureStoreError::kind)
}
