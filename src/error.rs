// src/error.rs
//! Error handling for the physics core.
//!
//! - Cheap enum discriminants, allocations only on error paths.
//! - Context chaining via [`PhysicsError::context`].
//! - Nothing in here ever crosses the scene step boundary: taint execution logs
//!   these and moves on, only the synchronous setter surface returns them.

use thiserror::Error;

use crate::object::LocalId;

/// Main error type for the physics core. `Send + Sync + 'static`.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PhysicsError {
    /// NaN or infinite input rejected before it reached the queue.
    #[error("object {id}: rejected non-finite {what}")]
    NonFinite { what: &'static str, id: LocalId },

    /// No object registered under this id.
    #[error("unknown object {0}")]
    UnknownObject(LocalId),

    /// The object exists but has no engine body (yet, or any more).
    #[error("object {0} has no physical body")]
    NoPhysicalBody(LocalId),

    /// Engine mutation attempted outside of a taint pass.
    #[error("{0} called outside taint time")]
    NotInTaintTime(&'static str),

    /// Engine handle that the adapter does not know about.
    #[error("invalid engine handle: {0}")]
    InvalidHandle(String),

    /// A collision shape is still waiting on its mesh asset.
    #[error("shape of object {0} is not ready")]
    ShapeNotReady(LocalId),

    /// The engine refused to build a shape (degenerate hull, empty compound...).
    #[error("shape build failed: {0}")]
    ShapeBuild(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Custom(String),

    #[error("{message}: {source}")]
    WithContext {
        message: String,
        #[source]
        source: Box<PhysicsError>,
    },
}

impl PhysicsError {
    #[inline]
    pub fn custom<S: Into<String>>(msg: S) -> Self {
        Self::Custom(msg.into())
    }

    /// Add context to any error (chainable, like `.context()` in anyhow).
    #[inline]
    pub fn context<C: Into<String>>(self, context: C) -> Self {
        Self::WithContext {
            message: context.into(),
            source: Box::new(self),
        }
    }

    #[inline]
    pub fn is_non_finite(&self) -> bool {
        matches!(self, PhysicsError::NonFinite { .. })
    }

    #[inline]
    pub fn is_config(&self) -> bool {
        matches!(self, PhysicsError::Config(_) | PhysicsError::Json(_))
    }

    /// True for errors that describe a transient engine-state mismatch rather than a bug.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PhysicsError::NoPhysicalBody(_) | PhysicsError::UnknownObject(_) | PhysicsError::ShapeNotReady(_)
        )
    }
}

/// Result type for physics operations
pub type PhysicsResult<T> = std::result::Result<T, PhysicsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_wraps_source_message() {
        let err = PhysicsError::NoPhysicalBody(7).context("force position");
        assert_eq!(err.to_string(), "force position: object 7 has no physical body");
        if let PhysicsError::WithContext { source, .. } = err {
            assert!(source.is_transient());
        } else {
            panic!("expected WithContext");
        }
    }

    #[test]
    fn json_errors_count_as_config_errors() {
        let err: PhysicsError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(err.is_config());
        assert!(!err.is_non_finite());
    }
}
