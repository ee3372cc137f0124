//! Event delivery error types.
//!
//! Handlers indicate whether a failure is transient (the relay should
//! redeliver the event) or permanent (redelivery cannot help and the event
//! must be dropped without retrying).

use std::fmt;

/// Delivery error that is either transient or permanent.
#[derive(Debug)]
pub struct HandlerError {
    inner: anyhow::Error,
    transient: bool,
}

impl HandlerError {
    /// A permanent failure: redelivering the same event cannot change the
    /// outcome (e.g. the referenced aggregate no longer exists, or the
    /// payload cannot be deserialized).
    pub fn permanent(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            transient: false,
        }
    }

    /// A transient failure: database/network/storage hiccup. The relay
    /// reschedules the event according to its backoff policy.
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            transient: true,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for HandlerError {
    /// Unclassified errors default to transient so at-least-once delivery
    /// errs on the side of redelivery.
    fn from(err: anyhow::Error) -> Self {
        Self::transient(err)
    }
}

impl From<crate::AppError> for HandlerError {
    fn from(err: crate::AppError) -> Self {
        if err.is_recoverable() {
            Self::transient(err)
        } else {
            Self::permanent(err)
        }
    }
}

/// Extension trait for marking a whole `Result` as a permanent failure.
pub trait HandlerResultExt<T> {
    fn permanent(self) -> Result<T, HandlerError>;
}

impl<T, E: Into<anyhow::Error>> HandlerResultExt<T> for Result<T, E> {
    fn permanent(self) -> Result<T, HandlerError> {
        self.map_err(|e| HandlerError::permanent(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_conversion_is_transient() {
        let err: HandlerError = anyhow::anyhow!("connection reset").into();
        assert!(err.is_transient());
    }

    #[test]
    fn permanent_is_not_transient() {
        let err = HandlerError::permanent(anyhow::anyhow!("song gone"));
        assert!(!err.is_transient());
        assert!(err.to_string().contains("song gone"));
    }

    #[test]
    fn app_error_classification_carries_over() {
        let not_found: HandlerError = crate::AppError::NotFound("x".into()).into();
        assert!(!not_found.is_transient());

        let db: HandlerError = crate::AppError::from(sqlx::Error::PoolClosed).into();
        assert!(db.is_transient());
    }

    #[test]
    fn result_ext_marks_permanent() {
        let result: Result<(), anyhow::Error> = Err(anyhow::anyhow!("bad payload"));
        assert!(!result.permanent().unwrap_err().is_transient());
    }
}
