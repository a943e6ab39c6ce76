use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RawfsError {
    /// A header or signature did not match the structure being decoded.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A seek target fell outside the valid bounds of a stream.
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// A write or truncate was attempted on a read-only structure.
    #[error("Operation not supported: {0}")]
    UnsupportedOperation(String),

    /// Run accounting ran out before the declared content length.
    #[error("Unexpected end of stream: {0}")]
    UnexpectedEndOfStream(String),

    #[error("IO error: {0}")]
    IoError(#[source] io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: Box<RawfsError>,
    },
}

impl RawfsError {
    /// The `io::ErrorKind` this error is reported as when it crosses a
    /// `Read`/`Seek` boundary.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            RawfsError::Unsupported(_) | RawfsError::UnsupportedOperation(_) => {
                io::ErrorKind::Unsupported
            }
            RawfsError::OutOfRange(_) | RawfsError::Configuration(_) => io::ErrorKind::InvalidInput,
            RawfsError::UnexpectedEndOfStream(_) => io::ErrorKind::UnexpectedEof,
            RawfsError::IoError(err) => err.kind(),
            RawfsError::SerializationError(_) => io::ErrorKind::InvalidData,
            RawfsError::Open { source, .. } => source.kind(),
        }
    }

    /// Wrap an error with the path of the volume that failed to open.
    pub fn opening(path: impl Into<PathBuf>, source: RawfsError) -> Self {
        RawfsError::Open {
            path: path.into(),
            source: Box::new(source),
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, RawfsError::Unsupported(_))
    }

    /// Recover the typed error from an `io::Error` raised by a reader
    pub fn from_io(err: io::Error) -> Self {
        err.into()
    }

    pub fn into_io(self) -> io::Error {
        self.into()
    }
}

// An io::Error carrying a RawfsError payload is unwrapped back into the
// typed variant, so `?` on Read/Seek results keeps the taxonomy intact.
impl From<io::Error> for RawfsError {
    fn from(err: io::Error) -> Self {
        let typed = err
            .get_ref()
            .map_or(false, |inner| inner.is::<RawfsError>());
        if !typed {
            return RawfsError::IoError(err);
        }

        let kind = err.kind();
        match err.into_inner() {
            Some(inner) => match inner.downcast::<RawfsError>() {
                Ok(inner) => *inner,
                Err(other) => RawfsError::IoError(io::Error::new(kind, other)),
            },
            None => RawfsError::IoError(io::Error::from(kind)),
        }
    }
}

impl From<RawfsError> for io::Error {
    fn from(err: RawfsError) -> Self {
        match err {
            RawfsError::IoError(inner) => inner,
            other => io::Error::new(other.kind(), other),
        }
    }
}
