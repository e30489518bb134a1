//! Mapping of driver failures onto [`ErrorKind`].

use pgbridge_core::{DbError, ErrorKind};

/// Classify a SQLSTATE code.
pub fn classify_sqlstate(code: &str) -> ErrorKind {
    match code {
        "57014" => ErrorKind::Timeout,
        "57P01" | "57P02" | "57P03" => ErrorKind::Unavailable,
        _ => match code.get(..2) {
            Some("22") | Some("42") => ErrorKind::InvalidArgument,
            Some("08") | Some("53") => ErrorKind::Unavailable,
            Some("23") | Some("40") => ErrorKind::Conflict,
            _ => ErrorKind::Internal,
        },
    }
}

/// SQLSTATEs after which the server has dropped, or is dropping, the session.
fn is_fatal_sqlstate(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "57P01" | "57P02" | "57P03")
}

/// Convert a sqlx error into a classified [`DbError`].
pub fn db_error(err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.into_owned());
            let kind = code
                .as_deref()
                .map(classify_sqlstate)
                .unwrap_or(ErrorKind::Internal);
            let fatal = code.as_deref().is_some_and(is_fatal_sqlstate);
            DbError {
                kind,
                message: db.message().to_string(),
                code,
                fatal,
            }
        }
        sqlx::Error::Io(e) => DbError::new(ErrorKind::Unavailable, format!("I/O error: {}", e)).fatal(),
        sqlx::Error::Tls(e) => DbError::new(ErrorKind::Unavailable, format!("TLS error: {}", e)).fatal(),
        sqlx::Error::Protocol(msg) => {
            DbError::new(ErrorKind::Internal, format!("protocol error: {}", msg)).fatal()
        }
        pool @ (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) => {
            DbError::new(ErrorKind::Unavailable, pool.to_string())
        }
        sqlx::Error::Encode(e) => {
            DbError::new(ErrorKind::InvalidArgument, format!("cannot encode parameter: {}", e))
        }
        other => DbError::new(ErrorKind::Internal, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlstate_classes() {
        assert_eq!(classify_sqlstate("22P02"), ErrorKind::InvalidArgument);
        assert_eq!(classify_sqlstate("42P01"), ErrorKind::InvalidArgument);
        assert_eq!(classify_sqlstate("42703"), ErrorKind::InvalidArgument);
        assert_eq!(classify_sqlstate("08006"), ErrorKind::Unavailable);
        assert_eq!(classify_sqlstate("53300"), ErrorKind::Unavailable);
        assert_eq!(classify_sqlstate("57P01"), ErrorKind::Unavailable);
        assert_eq!(classify_sqlstate("23505"), ErrorKind::Conflict);
        assert_eq!(classify_sqlstate("40001"), ErrorKind::Conflict);
        assert_eq!(classify_sqlstate("57014"), ErrorKind::Timeout);
        assert_eq!(classify_sqlstate("XX000"), ErrorKind::Internal);
        assert_eq!(classify_sqlstate("P0001"), ErrorKind::Internal);
    }

    #[test]
    fn test_fatal_sqlstates() {
        assert!(is_fatal_sqlstate("08003"));
        assert!(is_fatal_sqlstate("57P01"));
        assert!(!is_fatal_sqlstate("57014"));
        assert!(!is_fatal_sqlstate("23505"));
    }

    #[test]
    fn test_io_error_is_fatal_and_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = db_error(sqlx::Error::Io(io));
        assert_eq!(err.kind, ErrorKind::Unavailable);
        assert!(err.fatal);
    }

    #[test]
    fn test_decode_error_is_internal() {
        let err = db_error(sqlx::Error::ColumnNotFound("x".to_string()));
        assert_eq!(err.kind, ErrorKind::Internal);
        assert!(!err.fatal);
    }
}
