use turnstile_core::StoreError;

const UNIQUE_VIOLATION: &str = "23505";
const LOCK_NOT_AVAILABLE: &str = "55P03";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
        _ => None,
    }
}

/// Classifies a sqlx error by SQLSTATE.
pub(crate) fn classify(err: sqlx::Error) -> StoreError {
    match sqlstate(&err).as_deref() {
        Some(LOCK_NOT_AVAILABLE) | Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
            StoreError::Conflict(err.to_string())
        }
        Some(UNIQUE_VIOLATION) => StoreError::Duplicate {
            entity: "row",
            key: err.to_string(),
        },
        _ => StoreError::Backend(err.to_string()),
    }
}

/// Like `classify`, but names the entity whose unique key was violated.
pub(crate) fn classify_insert(entity: &'static str, key: String, err: sqlx::Error) -> StoreError {
    if sqlstate(&err).as_deref() == Some(UNIQUE_VIOLATION) {
        return StoreError::Duplicate { entity, key };
    }
    classify(err)
}

/// Like `classify`, but a lock wait that hit `lock_timeout` becomes `LockTimeout`.
pub(crate) fn classify_lock(ticket_type_id: i64, err: sqlx::Error) -> StoreError {
    if sqlstate(&err).as_deref() == Some(LOCK_NOT_AVAILABLE) {
        return StoreError::LockTimeout(ticket_type_id);
    }
    classify(err)
}
