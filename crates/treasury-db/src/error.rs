use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::PoolError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("known request error: {0}")]
    KnownRequest(#[from] KnownRequestError),
    #[error("unknown request error: {0}")]
    UnknownRequest(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("initialization error: {0}")]
    Initialization(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KnownErrorKind {
    UniqueConstraint,
    ForeignKeyConstraint,
    CheckConstraint,
    NullConstraint,
    RecordNotFound,
    PoolTimeout,
    TransactionApi,
    WriteConflict,
}

impl KnownErrorKind {
    /// The stable error code callers match on.
    pub fn code(self) -> &'static str {
        match self {
            Self::UniqueConstraint => "P2002",
            Self::ForeignKeyConstraint => "P2003",
            Self::CheckConstraint => "P2004",
            Self::NullConstraint => "P2011",
            Self::PoolTimeout => "P2024",
            Self::RecordNotFound => "P2025",
            Self::TransactionApi => "P2028",
            Self::WriteConflict => "P2034",
        }
    }
}

#[derive(thiserror::Error, Clone, Debug)]
#[error("{} {}", .kind.code(), .message)]
pub struct KnownRequestError {
    pub kind: KnownErrorKind,
    pub model: Option<&'static str>,
    /// Constraint or column the database blamed, when it named one.
    pub target: Option<String>,
    pub message: String,
}

impl Error {
    pub(crate) fn known(
        kind: KnownErrorKind,
        model: Option<&'static str>,
        message: impl Into<String>,
    ) -> Self {
        Self::KnownRequest(KnownRequestError {
            kind,
            model,
            target: None,
            message: message.into(),
        })
    }

    pub(crate) fn not_found(model: &'static str) -> Self {
        Self::known(
            KnownErrorKind::RecordNotFound,
            Some(model),
            format!("no {model} record found for the given unique key"),
        )
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Classifies a diesel failure, attributing it to `model` when known.
    pub(crate) fn query(err: DieselError, model: Option<&'static str>) -> Self {
        match err {
            DieselError::NotFound => Self::known(
                KnownErrorKind::RecordNotFound,
                model,
                "the record required by the operation was not found",
            ),
            DieselError::DatabaseError(kind, info) => {
                let kind = match kind {
                    DatabaseErrorKind::UniqueViolation => KnownErrorKind::UniqueConstraint,
                    DatabaseErrorKind::ForeignKeyViolation => KnownErrorKind::ForeignKeyConstraint,
                    DatabaseErrorKind::CheckViolation => KnownErrorKind::CheckConstraint,
                    DatabaseErrorKind::NotNullViolation => KnownErrorKind::NullConstraint,
                    DatabaseErrorKind::SerializationFailure => KnownErrorKind::WriteConflict,
                    _ => return Self::UnknownRequest(info.message().to_owned()),
                };
                Self::KnownRequest(KnownRequestError {
                    kind,
                    model,
                    target: info
                        .constraint_name()
                        .or_else(|| info.column_name())
                        .map(str::to_owned),
                    message: info.message().to_owned(),
                })
            }
            DieselError::QueryBuilderError(err) => Self::Validation(err.to_string()),
            other => Self::UnknownRequest(other.to_string()),
        }
    }

    pub fn kind(&self) -> Option<KnownErrorKind> {
        match self {
            Self::KnownRequest(known) => Some(known.kind),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&'static str> {
        self.kind().map(KnownErrorKind::code)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(KnownErrorKind::RecordNotFound)
    }
}

impl From<DieselError> for Error {
    fn from(err: DieselError) -> Self {
        Self::query(err, None)
    }
}

impl From<mobc::Error<PoolError>> for Error {
    fn from(err: mobc::Error<PoolError>) -> Self {
        match err {
            mobc::Error::Timeout => Self::known(
                KnownErrorKind::PoolTimeout,
                None,
                "timed out fetching a new connection from the connection pool",
            ),
            mobc::Error::Inner(PoolError::ConnectionError(err)) => {
                Self::Initialization(err.to_string())
            }
            mobc::Error::Inner(PoolError::QueryError(err)) => err.into(),
            other => Self::UnknownRequest(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Info(&'static str, Option<&'static str>);

    impl diesel::result::DatabaseErrorInformation for Info {
        fn message(&self) -> &str {
            self.0
        }
        fn details(&self) -> Option<&str> {
            None
        }
        fn hint(&self) -> Option<&str> {
            None
        }
        fn table_name(&self) -> Option<&str> {
            None
        }
        fn column_name(&self) -> Option<&str> {
            None
        }
        fn constraint_name(&self) -> Option<&str> {
            self.1
        }
        fn statement_position(&self) -> Option<i32> {
            None
        }
    }

    fn database_error(kind: DatabaseErrorKind, constraint: Option<&'static str>) -> DieselError {
        DieselError::DatabaseError(kind, Box::new(Info("constraint failed", constraint)))
    }

    #[test]
    fn unique_violations_are_known_requests_naming_the_constraint() {
        let err = Error::query(
            database_error(DatabaseErrorKind::UniqueViolation, Some("users_email_key")),
            Some("User"),
        );
        match err {
            Error::KnownRequest(known) => {
                assert_eq!(known.kind, KnownErrorKind::UniqueConstraint);
                assert_eq!(known.kind.code(), "P2002");
                assert_eq!(known.model, Some("User"));
                assert_eq!(known.target.as_deref(), Some("users_email_key"));
            }
            other => panic!("expected known request error, got {other:?}"),
        }
    }

    #[test]
    fn foreign_key_violations_map_to_p2003() {
        let err = Error::from(database_error(DatabaseErrorKind::ForeignKeyViolation, None));
        assert_eq!(err.code(), Some("P2003"));
    }

    #[test]
    fn not_found_is_p2025() {
        let err = Error::query(DieselError::NotFound, Some("Client"));
        assert!(err.is_not_found());
        assert_eq!(err.code(), Some("P2025"));
        assert!(Error::not_found("Client").to_string().contains("P2025"));
    }

    #[test]
    fn unclassified_database_errors_are_unknown_requests() {
        let err = Error::from(database_error(DatabaseErrorKind::ClosedConnection, None));
        assert!(matches!(err, Error::UnknownRequest(_)));
        assert_eq!(err.code(), None);
    }

    #[test]
    fn rollbacks_are_unknown_requests() {
        let err = Error::from(DieselError::RollbackTransaction);
        assert!(matches!(err, Error::UnknownRequest(_)));
    }
}
