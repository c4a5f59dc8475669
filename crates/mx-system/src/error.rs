use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SystemError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Unsupported color: {color}.\nSupported colors are: {supported}")]
    UnsupportedColor { color: String, supported: String },

    #[error("Failed to send {signal} to {pid}: {reason}")]
    Signal {
        pid: u32,
        signal: String,
        reason: String,
    },

    #[error("Console output is already active")]
    SinkAlreadyActive,

    #[error("Can not find a relative path to dependency and path is not absolute: {}", .0.display())]
    NoRelativePath(PathBuf),
}

pub type Result<T> = std::result::Result<T, SystemError>;
