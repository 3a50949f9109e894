use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    // The opener no longer grants access to the surface (closed, navigated away, or
    // a cross-origin boundary).
    #[error("print surface is not accessible: {0}")]
    AccessDenied(String),
    #[error("print surface is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config is not valid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("sequence store failed: {0}")]
    Store(#[from] StoreError),
    #[error("stored sequence value is not a digit string: {0:?}")]
    InvalidSequence(String),
    #[error("print surface could not be opened")]
    SurfaceBlocked,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("observation loop already started")]
    AlreadyStarted,
}
