//! Sorting raw driver failures into [`ErrorKind`]s.
//!
//! Classification looks at the driver message only, so callers can branch on a
//! kind instead of matching message text themselves.

use crate::error::{DriverError, ErrorKind};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DEADLOCK: Regex = Regex::new(r"(?i)deadlock found").unwrap();
    static ref INCORRECT_STRING_VALUE: Regex = Regex::new(r"(?i)incorrect string value:").unwrap();
    static ref ILLEGAL_MIX_OF_COLLATIONS: Regex =
        Regex::new(r"(?i)illegal mix of collations").unwrap();
    static ref TRANSACTION_ALREADY_ACTIVE: Regex =
        Regex::new(r"(?i)already an active transaction|transaction is already active").unwrap();
}

/// Classifies a driver failure.
///
/// Rules are checked in order and the first match wins, so a deadlock message
/// that happens to mention a collation is still a deadlock.
///
/// # Examples
///
/// ```
/// use sqlx_resilient::{classify, DriverError, ErrorKind};
///
/// let err = DriverError::new("1213 (40001): Deadlock found when trying to get lock");
/// assert_eq!(classify(&err), ErrorKind::Deadlock);
///
/// let err = DriverError::new("1366 (HY000): Incorrect string value: '\\xF0\\x9F' for column 'name' at row 1");
/// assert_eq!(classify(&err), ErrorKind::Collation);
///
/// let err = DriverError::new("1146 (42S02): Table 'shop.orders' doesn't exist");
/// assert_eq!(classify(&err), ErrorKind::Query);
/// ```
pub fn classify(err: &DriverError) -> ErrorKind {
    let message = err.message();
    if DEADLOCK.is_match(message) {
        ErrorKind::Deadlock
    } else if INCORRECT_STRING_VALUE.is_match(message) || ILLEGAL_MIX_OF_COLLATIONS.is_match(message) {
        ErrorKind::Collation
    } else {
        ErrorKind::Query
    }
}

/// Classifies a failure raised while starting a transaction.
///
/// Same as [`classify`], except that a driver complaining about an already open
/// transaction yields [`ErrorKind::TransactionConflict`].
pub fn classify_begin_failure(err: &DriverError) -> ErrorKind {
    match classify(err) {
        ErrorKind::Query if TRANSACTION_ALREADY_ACTIVE.is_match(err.message()) => {
            ErrorKind::TransactionConflict
        }
        kind => kind,
    }
}
