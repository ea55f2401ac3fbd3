use crate::bind::ScalarParams;
use crate::tracker::CallSite;
use std::fmt;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Raw failure reported by a [`Driver`](crate::Driver).
///
/// Carries the driver's message and vendor code verbatim; this crate only reads it.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct DriverError {
    message: String,
    code: Option<String>,
    #[source]
    source: Option<BoxError>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            source: None,
        }
    }

    /// Attaches the vendor error code (SQLSTATE for MySQL).
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

impl From<sqlx::Error> for DriverError {
    fn from(err: sqlx::Error) -> Self {
        let code = err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| code.into_owned());
        Self {
            message: err.to_string(),
            code,
            source: Some(Box::new(err)),
        }
    }
}

/// The closed set of categories a driver failure is sorted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transient lock-ordering conflict; the only kind that is retried.
    Deadlock,
    /// Character set or collation mismatch.
    Collation,
    /// Any other query failure.
    Query,
    /// A transaction was started while another one is still open.
    TransactionConflict,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Deadlock => "deadlock",
            ErrorKind::Collation => "collation mismatch",
            ErrorKind::Query => "query failed",
            ErrorKind::TransactionConflict => "transaction already started",
        };
        f.write_str(label)
    }
}

/// A driver failure re-typed into an [`ErrorKind`], with the statement context attached.
///
/// # Examples
///
/// ```
/// use sqlx_resilient::{ClassifiedError, DriverError, ErrorKind};
///
/// let err = DriverError::new("SQLSTATE[40001]: Deadlock found when trying to get lock")
///     .with_code("40001");
/// let classified = ClassifiedError::classify(err).with_statement("UPDATE t SET a = 1");
///
/// assert_eq!(classified.kind(), ErrorKind::Deadlock);
/// assert_eq!(classified.code(), Some("40001"));
/// assert_eq!(classified.statement(), Some("UPDATE t SET a = 1"));
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    kind: ErrorKind,
    message: String,
    statement: Option<String>,
    values: Option<ScalarParams>,
    code: Option<String>,
    previous_transaction: Option<CallSite>,
    #[source]
    source: Option<DriverError>,
}

impl ClassifiedError {
    /// Wraps a driver error under an already decided kind.
    pub fn from_driver(kind: ErrorKind, err: DriverError) -> Self {
        Self {
            kind,
            message: err.message.clone(),
            statement: None,
            values: None,
            code: err.code.clone(),
            previous_transaction: None,
            source: Some(err),
        }
    }

    /// Classifies `err` with [`classify`](crate::classify::classify) and wraps it.
    pub fn classify(err: DriverError) -> Self {
        let kind = crate::classify::classify(&err);
        Self::from_driver(kind, err)
    }

    /// An error raised by this crate itself, with no driver failure behind it.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            statement: None,
            values: None,
            code: None,
            previous_transaction: None,
            source: None,
        }
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }

    pub fn with_values(mut self, values: ScalarParams) -> Self {
        self.values = Some(values);
        self
    }

    pub(crate) fn with_previous_transaction(mut self, site: Option<CallSite>) -> Self {
        self.previous_transaction = site;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn statement(&self) -> Option<&str> {
        self.statement.as_deref()
    }

    pub fn values(&self) -> Option<&ScalarParams> {
        self.values.as_ref()
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Where the still-open transaction was started.
    ///
    /// Only set on [`ErrorKind::TransactionConflict`] errors.
    pub fn previous_transaction(&self) -> Option<&CallSite> {
        self.previous_transaction.as_ref()
    }

    pub fn driver_error(&self) -> Option<&DriverError> {
        self.source.as_ref()
    }
}

/// Error types for executor and transaction operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Driver failure sorted into an [`ErrorKind`]
    #[error(transparent)]
    Classified(#[from] ClassifiedError),

    /// Commit or rollback requested with no transaction open
    #[error("No active transactions")]
    NoActiveTransaction,

    /// The driver has no insert id to report
    #[error("No last insert id available")]
    MissingInsertId,

    /// The driver reported an insert id that is not a positive integer
    #[error("Last insert id is not a number: {0}")]
    InvalidInsertId(String),
}

impl Error {
    /// The classified kind, if this is a classified database error.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Classified(err) => Some(err.kind()),
            _ => None,
        }
    }

    pub fn is_deadlock(&self) -> bool {
        self.kind() == Some(ErrorKind::Deadlock)
    }
}

/// Result type alias for executor operations
pub type Result<T> = std::result::Result<T, Error>;
