//! Renderer error types

use thiserror::Error;

use crate::backend::BackendError;

/// Errors surfaced by the renderer.
///
/// Per-pass problems inside a frame are logged and never reach the caller;
/// these are the failures of startup, baking and cache or settings I/O.
#[derive(Error, Debug)]
pub enum RendererError {
    /// The shader atlas could not be loaded at all
    #[error("shader atlas {path} failed to load: {source}")]
    ShaderAtlas {
        path: String,
        #[source]
        source: BackendError,
    },
    /// A program every frame depends on is absent from the atlas
    #[error("required shader '{0}' is missing from the atlas")]
    MissingShader(&'static str),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("irradiance cache I/O failed: {0}")]
    CacheIo(#[from] std::io::Error),
    #[error("irradiance cache is malformed: {0}")]
    CacheFormat(String),
    #[error("settings file {path} could not be accessed: {source}")]
    SettingsIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("settings could not be (de)serialized: {0}")]
    Settings(#[from] serde_json::Error),
    #[error("probe index {index} out of range ({count} probes)")]
    ProbeIndex { index: usize, count: usize },
}

pub type RendererResult<T> = Result<T, RendererError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RendererError::MissingShader("gbuffer");
        assert_eq!(
            err.to_string(),
            "required shader 'gbuffer' is missing from the atlas"
        );

        let err = RendererError::CacheFormat("expected 40 bytes, got 3".into());
        assert_eq!(
            err.to_string(),
            "irradiance cache is malformed: expected 40 bytes, got 3"
        );
    }
}
