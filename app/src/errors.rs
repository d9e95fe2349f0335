use err_derive::Error;

use infra::ids::{Entity, Id};
use infra::persistence::StorageError;

/// The failures an operator is shown. Anything else is an internal error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CmsError {
    #[error(display = "{}", _0)]
    Validation(String),
    #[error(display = "{}", _0)]
    Conflict(String),
    #[error(display = "{}", _0)]
    Referential(String),
    #[error(display = "{} not found: {}", entity, id)]
    NotFound { entity: &'static str, id: String },
}

impl CmsError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        CmsError::Validation(message.into())
    }

    pub fn not_found<T: Entity>(id: &Id<T>) -> Self {
        CmsError::NotFound {
            entity: T::PREFIX,
            id: id.to_string(),
        }
    }
}

pub(crate) fn translate(err: StorageError) -> anyhow::Error {
    match err {
        StorageError::UniqueViolation { message, .. } => CmsError::Conflict(message).into(),
        StorageError::ForeignKeyViolation { message, .. } => CmsError::Referential(message).into(),
        StorageError::NotFound { table, id } => CmsError::NotFound { entity: table, id }.into(),
        other => other.into(),
    }
}

pub(crate) trait StorageResultExt<T> {
    fn translated(self) -> anyhow::Result<T>;
}

impl<T> StorageResultExt<T> for Result<T, StorageError> {
    fn translated(self) -> anyhow::Result<T> {
        self.map_err(translate)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn referential_message_is_passed_through_verbatim() {
        let message = "update or delete on table \"categories\" violates foreign key constraint";
        let err = translate(StorageError::ForeignKeyViolation {
            table: "categories",
            message: message.to_string(),
        });

        assert_eq!(
            err.downcast_ref::<CmsError>(),
            Some(&CmsError::Referential(message.to_string()))
        );
        assert_eq!(err.to_string(), message);
    }

    #[test]
    fn other_storage_errors_are_not_classified() {
        let err = translate(StorageError::Unavailable("poisoned".to_string()));

        assert!(err.downcast_ref::<CmsError>().is_none());
        assert!(err.downcast_ref::<StorageError>().is_some());
    }
}
