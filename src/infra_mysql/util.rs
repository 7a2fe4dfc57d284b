use sqlx::error::ErrorKind;

/// True for a unique-key violation (`ER_DUP_ENTRY` on MySQL).
pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.kind() == ErrorKind::UniqueViolation)
}
