//! Renderer error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::BackendError;

/// Errors raised by creation-time renderer operations.
///
/// Binds and draws of existing buffers never fail. Uploads that grow a buffer
/// and frame boundaries can, since they create or acquire native objects.
#[derive(Error, Debug)]
pub enum RendererError {
    /// A native creation call, the swap chain or the device failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// An image file could not be read or decoded.
    #[error("failed to decode image {path:?}: {message}")]
    ImageDecodeFailed { path: PathBuf, message: String },
    /// A shader source file could not be read.
    #[error("failed to read shader source {path:?}")]
    ShaderSourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A shader failed to parse, validate or lacks a required entry point.
    #[error("shader '{name}' failed to compile: {message}")]
    ShaderCompilationFailed { name: String, message: String },
}

pub type RendererResult<T> = Result<T, RendererError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RendererError::from(BackendError::DeviceLost);
        assert_eq!(err.to_string(), "Device lost");

        let err = RendererError::ShaderCompilationFailed {
            name: "Default".to_string(),
            message: "missing entry point".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "shader 'Default' failed to compile: missing entry point"
        );
    }

    #[test]
    fn test_backend_error_converts() {
        let err: RendererError = BackendError::OutOfMemory.into();
        assert!(matches!(err, RendererError::Backend(BackendError::OutOfMemory)));
    }
}
