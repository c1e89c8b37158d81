//! Reading a request off the wire
//!
//! Only the request line and the header block are consumed; request bodies
//! are never looked at.

use crate::errors::{Error, Result};
use crate::log_util::escape_bytes;

use std::io::{BufRead, Read};
use std::path::PathBuf;
use std::str;

/// Longest request or header line we're willing to buffer
pub const MAX_LINE_LENGTH: u64 = 8192;

/// A single `Name: data` header, in the order it arrived
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub data: String,
}

/// An incoming request from the client
#[derive(Debug, Default)]
pub struct Request {
    pub method: String,
    /// The request target with any query removed
    pub uri: String,
    pub query: Option<String>,
    /// Canonical filesystem path, once resolution has succeeded
    pub path: Option<PathBuf>,
    pub host: String,
    pub port: String,
    pub headers: Vec<Header>,
}

impl Request {
    /// A blank request for a client at `host`:`port`
    pub fn new(host: String, port: String) -> Request {
        Request {
            host,
            port,
            ..Default::default()
        }
    }

    /// Fills in the method, URI, query and headers from `source`.
    ///
    /// On error nothing is recorded; headers gathered before a bad line are
    /// dropped with it.
    pub fn parse<R: BufRead>(&mut self, mut source: R) -> Result<()> {
        let (method, uri, query) = parse_request_line(&mut source)?;
        let headers = parse_headers(&mut source)?;

        debug!("HTTP METHOD: {}", method);
        debug!("HTTP URI:    {}", uri);
        debug!("HTTP QUERY:  {:?}", query);

        self.method = method;
        self.uri = uri;
        self.query = query;
        self.headers = headers;

        Ok(())
    }

    /// The data of the first header called `name`
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name == name)
            .map(|h| &h.data[..])
    }
}

/// Reads one line, including its terminator, refusing to buffer more than
/// `MAX_LINE_LENGTH` bytes of it.
fn read_line<R: BufRead>(source: &mut R, line: &mut Vec<u8>) -> Result<usize> {
    line.clear();
    let read = source.by_ref().take(MAX_LINE_LENGTH).read_until(b'\n', line)?;

    if read as u64 == MAX_LINE_LENGTH && line.last() != Some(&b'\n') {
        return Err(Error::LineTooLong);
    }

    Ok(read)
}

/// Parses `METHOD SP URI[?QUERY] SP HTTP/VERSION`.
///
/// The version, if any, is accepted and ignored.
fn parse_request_line<R: BufRead>(source: &mut R)
                                  -> Result<(String, String, Option<String>)> {
    let mut buffer = Vec::new();
    if read_line(source, &mut buffer)? == 0 {
        return Err(Error::EmptyRequest);
    }

    let line = match str::from_utf8(&buffer) {
        Ok(l) => l,
        Err(_) => {
            debug!("Request line is not UTF-8: {}", escape_bytes(&buffer));
            return Err(Error::NotUtf8);
        }
    };

    let mut tokens = line.split_whitespace();
    let (method, target) = match (tokens.next(), tokens.next()) {
        (Some(m), Some(t)) => (m, t),
        _ => {
            debug!("Bad request line: {}", escape_bytes(&buffer));
            return Err(Error::MalformedRequestLine);
        }
    };

    let (uri, query) = match target.split_once('?') {
        Some((uri, query)) => (uri, Some(String::from(query))),
        None => (target, None),
    };

    Ok((String::from(method), String::from(uri), query))
}

/// Reads `Name: data` lines until a blank line or the end of the stream.
fn parse_headers<R: BufRead>(source: &mut R) -> Result<Vec<Header>> {
    let mut headers = Vec::new();
    let mut buffer = Vec::new();

    loop {
        // Anything this short is "\r\n", "\n" or EOF.
        if read_line(source, &mut buffer)? <= 2 {
            break;
        }

        let line = String::from_utf8_lossy(&buffer);
        let (name, data) = match line.split_once(':') {
            Some((n, d)) if !n.trim().is_empty() => (n.trim(), d.trim()),
            _ => {
                debug!("Bad header: {}", escape_bytes(&buffer));
                return Err(Error::MalformedHeader);
            }
        };

        debug!("HTTP HEADER {} = {}", name, data);
        headers.push(Header {
            name: String::from(name),
            data: String::from(data),
        });
    }

    Ok(headers)
}
