//! Error handling for the http server

use crate::server::Status;

use std::error;
use std::fmt;
use std::io;

/// A Result for internal operations.
pub type Result<T> = ::std::result::Result<T, Error>;

/// All errors which might arise within the application
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Nix(nix::Error),
    /// The connection closed before a request line arrived
    EmptyRequest,
    /// A request or header line exceeded `MAX_LINE_LENGTH`
    LineTooLong,
    /// The request line had no method or no URI token
    MalformedRequestLine,
    /// A header line had no `:` or an empty name
    MalformedHeader,
    /// The request line contained bytes that are not UTF-8
    NotUtf8,
    /// The URI did not resolve to a file beneath the document root
    NotFound,
    /// A handler could not produce any output
    Handler(&'static str),
    /// The response head went out, but the rest of the response didn't
    Truncated(io::Error),
}

impl Error {
    /// The HTTP status the client should see for this error
    pub fn status(&self) -> Status {
        match *self {
            Error::EmptyRequest
            | Error::LineTooLong
            | Error::MalformedRequestLine
            | Error::MalformedHeader
            | Error::NotUtf8 => Status::BadRequest,
            Error::NotFound => Status::NotFound,
            Error::Io(ref e) if e.kind() == io::ErrorKind::NotFound => Status::NotFound,
            Error::Io(_)
            | Error::Nix(_)
            | Error::Handler(_)
            | Error::Truncated(_) => Status::InternalServerError,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "I/O error: {}", e),
            Error::Nix(ref e) => write!(f, "system call failed: {}", e),
            Error::EmptyRequest => f.write_str("connection closed before a request line"),
            Error::LineTooLong => f.write_str("request line or header too long"),
            Error::MalformedRequestLine => f.write_str("malformed request line"),
            Error::MalformedHeader => f.write_str("malformed header line"),
            Error::NotUtf8 => f.write_str("request line is not valid UTF-8"),
            Error::NotFound => f.write_str("no such resource beneath the document root"),
            Error::Handler(what) => write!(f, "handler failed: {}", what),
            Error::Truncated(ref e) => write!(f, "response cut short: {}", e),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            Error::Nix(ref e) => Some(e),
            Error::Truncated(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<nix::Error> for Error {
    fn from(e: nix::Error) -> Error {
        Error::Nix(e)
    }
}
