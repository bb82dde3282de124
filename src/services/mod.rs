pub mod assignment_service;
pub mod dashboard_service;
pub mod demo_service;
pub mod feedback_service;
pub mod lead_service;
pub mod media_service;
pub mod media_store;
pub mod media_type;
pub mod product_service;
pub mod quota;
pub mod share_link_service;
pub mod share_token;
pub mod storage_service;
pub mod user_service;

pub use assignment_service::AssignmentService;
pub use dashboard_service::DashboardService;
pub use demo_service::DemoService;
pub use feedback_service::FeedbackService;
pub use lead_service::LeadService;
pub use media_service::MediaService;
pub use product_service::ProductService;
pub use share_link_service::ShareLinkService;
pub use storage_service::StorageService;
pub use user_service::UserService;

use thiserror::Error;

use crate::auth::{JwtError, PasswordError};
use crate::database::manager::DatabaseError;
use crate::validation::ValidationErrors;
use media_type::MediaError;
use quota::QuotaError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Quota(#[from] QuotaError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Jwt(#[from] JwtError),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Database(DatabaseError::Sqlx(err))
    }
}

impl ServiceError {
    pub fn not_found(what: &str) -> Self {
        ServiceError::NotFound(format!("{} not found", what))
    }
}

/// Turn a failed permission check into a 403
pub fn ensure(allowed: bool, action: &str) -> Result<(), ServiceError> {
    if allowed {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!("You are not allowed to {}", action)))
    }
}

/// Map a unique-violation into a conflict with the given message
pub(crate) fn conflict_on_unique(err: sqlx::Error, message: &str) -> ServiceError {
    let err = DatabaseError::Sqlx(err);
    if err.is_unique_violation() {
        ServiceError::Conflict(message.to_string())
    } else {
        ServiceError::Database(err)
    }
}

/// Map a foreign-key violation (a referenced row vanished mid-request) into a field error
pub(crate) fn invalid_reference(err: sqlx::Error, field: &str, message: &str) -> ServiceError {
    let err = DatabaseError::Sqlx(err);
    if err.is_foreign_key_violation() {
        ValidationErrors::single(field, message).into()
    } else {
        ServiceError::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use std::fmt;

    /// Postgres error stand-in carrying only a SQLSTATE
    #[derive(Debug)]
    struct SqlState(&'static str);

    impl fmt::Display for SqlState {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "sqlstate {}", self.0)
        }
    }

    impl std::error::Error for SqlState {}

    impl sqlx::error::DatabaseError for SqlState {
        fn message(&self) -> &str {
            "constraint violated"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    fn db_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(SqlState(code)))
    }

    #[test]
    fn unique_violation_becomes_conflict() {
        match conflict_on_unique(db_error("23505"), "duplicate") {
            ServiceError::Conflict(msg) => assert_eq!(msg, "duplicate"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn foreign_key_violation_becomes_field_error() {
        match invalid_reference(db_error("23503"), "product_id", "Product does not exist") {
            ServiceError::Validation(e) => assert!(e.fields.contains_key("product_id")),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            invalid_reference(db_error("23505"), "product_id", "Product does not exist"),
            ServiceError::Database(_)
        ));
    }

    #[test]
    fn ensure_maps_denial_to_forbidden() {
        assert!(ensure(true, "manage products").is_ok());
        match ensure(false, "manage products") {
            Err(ServiceError::Forbidden(msg)) => assert_eq!(msg, "You are not allowed to manage products"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn non_unique_errors_stay_database_errors() {
        let err = conflict_on_unique(sqlx::Error::RowNotFound, "duplicate");
        assert!(matches!(err, ServiceError::Database(_)));
    }
}
