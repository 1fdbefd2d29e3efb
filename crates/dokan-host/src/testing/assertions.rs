//! Assertions for status-returning driver requests.

use crate::status::NtStatus;
use std::fmt::Debug;

/// Assert that a status is exactly `expected`, naming both on failure.
pub fn assert_status(actual: NtStatus, expected: NtStatus, context: &str) {
    assert!(
        actual == expected,
        "{context}: expected {expected}, got {actual}"
    );
}

/// Assert that a request failed with `expected`.
pub fn assert_status_err<T: Debug>(result: Result<T, NtStatus>, expected: NtStatus, context: &str) {
    match result {
        Ok(value) => panic!("{context}: expected {expected}, got success with {value:?}"),
        Err(actual) => assert_status(actual, expected, context),
    }
}

/// Assert that a request succeeded and return its value.
pub fn assert_status_ok<T>(result: Result<T, NtStatus>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(status) => panic!("{context}: expected success, got {status}"),
    }
}

/// Assert that a status is one of the named statuses.
pub fn assert_known_status(actual: NtStatus, context: &str) {
    assert!(actual.is_known(), "{context}: unrecognized status {actual}");
}
