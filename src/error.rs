use std::fmt;
use std::io;

/// Errors surfaced to the caller. Degenerate geometry is never one of them, it is rejected silently
/// by the rasterizer.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Obj(obj::ObjError),
    Image(image::ImageError),
    UnknownPipeline(String),
    InvalidArgument(String),
    SingularMatrix(&'static str),
    /// A parallel pass ended with part of its output missing.
    IncompletePass { pass: &'static str, completed: u32, expected: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "i/o error: {}", e),
            Error::Obj(e) => write!(f, "malformed obj file: {}", e),
            Error::Image(e) => write!(f, "image error: {}", e),
            Error::UnknownPipeline(name) => write!(f, "unknown shader pipeline '{}'", name),
            Error::InvalidArgument(message) => write!(f, "invalid argument: {}", message),
            Error::SingularMatrix(what) => write!(f, "{} matrix is not invertible", what),
            Error::IncompletePass { pass, completed, expected } => {
                write!(f, "{} pass stopped after {} of {} rows", pass, completed, expected)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Obj(e) => Some(e),
            Error::Image(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        return Error::Io(e);
    }
}

impl From<obj::ObjError> for Error {
    fn from(e: obj::ObjError) -> Self {
        return Error::Obj(e);
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        return Error::Image(e);
    }
}
