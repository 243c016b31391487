// src/error.rs
// Central error handling for the shadowlab renderer

/// Centralized error type for all renderer operations.
///
/// Construction failures (resources, pipelines) are fatal: constructors
/// return `Err` and callers propagate up to `main`. Nothing in the
/// per-frame path is retryable.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("Device error: {0}")]
    Device(String),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Readback error: {0}")]
    Readback(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Convenience constructors for common error categories
    pub fn device<T: ToString>(msg: T) -> Self {
        RenderError::Device(msg.to_string())
    }

    pub fn resource<T: ToString>(msg: T) -> Self {
        RenderError::Resource(msg.to_string())
    }

    pub fn pipeline<T: ToString>(msg: T) -> Self {
        RenderError::Pipeline(msg.to_string())
    }

    pub fn readback<T: ToString>(msg: T) -> Self {
        RenderError::Readback(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories_in_display() {
        assert!(RenderError::device("no adapter")
            .to_string()
            .starts_with("Device error"));
        assert!(RenderError::resource("stale handle")
            .to_string()
            .starts_with("Resource error"));
        assert!(RenderError::pipeline("bad shader")
            .to_string()
            .starts_with("Pipeline error"));
    }
}
