//! Error types shared across the LlamaLink workspace.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlamaLinkError>;

#[derive(Error, Debug)]
pub enum LlamaLinkError {
    /// The native shared library could not be loaded or is missing a symbol.
    #[error("Native library error: {0}")]
    Library(String),

    /// The native initializer returned a non-zero status code.
    #[error("Engine initialization failed (native status code {0})")]
    Init(i32),

    /// A knowledge or query operation was issued before a successful init.
    /// Raised locally; the native layer is never contacted.
    #[error("Engine not initialized. Call init() first")]
    NotInitialized,

    /// An input string could not be converted to a C string.
    #[error("Invalid input string: {0}")]
    Encoding(String),

    /// A native response buffer could not be decoded as text.
    #[error("Invalid response from native library: {0}")]
    Decoding(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
