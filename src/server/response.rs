//! Status lines, response heads and the error page

use std::fmt;
use std::io::{self, Write};

/// The outcomes this server knows how to report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    InternalServerError,
    /// Reserved; nothing dispatches to it.
    #[allow(dead_code)]
    Teapot,
}

impl Status {
    /// Code and reason phrase, as they appear on the status line
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "200 OK",
            Status::BadRequest => "400 Bad Request",
            Status::NotFound => "404 Not Found",
            Status::InternalServerError => "500 Internal Server Error",
            Status::Teapot => "418 I'm A Teapot",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writes the status line, a Content-Type header and the blank line that
/// ends the head. The body is up to the caller.
pub fn write_head<W: Write>(sink: &mut W, status: Status, content_type: &str)
                            -> io::Result<()> {
    write!(sink, "HTTP/1.0 {}\r\n", status)?;
    write!(sink, "Content-Type: {}\r\n", content_type)?;
    sink.write_all(b"\r\n")
}

/// Sends a complete error response for `status`.
///
/// Never fails: if the client has gone away there's nobody left to tell.
pub fn handle_error<W: Write>(sink: &mut W, status: Status) -> Status {
    let result = write_head(sink, status, "text/html")
        .and_then(|_| writeln!(sink, "<strong>{}</strong>", status))
        .and_then(|_| sink.flush());

    if let Err(e) = result {
        debug!("Could not deliver {} to the client: {}", status, e);
    }

    status
}
