use super::*;
use toml::{Table, Value};

use std::fs::File;
use std::io::{self, Read};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

pub fn parse_file<P: AsRef<Path>>(conf: P) -> Result<Config, Error> {
    let mut toml = String::new();
    {
        let mut f = File::open(conf)?;
        f.read_to_string(&mut toml)?;
    }

    parse_str(&toml)
}

pub fn parse_str(toml: &str) -> Result<Config, Error> {
    match toml.parse::<Table>() {
        Ok(table) => config_from_table(&table),
        Err(e) => Err(Error::Parse(message_from_error(toml, &e))),
    }
}

/// Walks a dotted key like `"listen.port"` through nested tables
fn lookup<'a>(table: &'a Table, key: &str) -> Option<&'a Value> {
    let mut parts = key.split('.');
    let mut value = table.get(parts.next()?)?;
    for part in parts {
        value = value.as_table()?.get(part)?;
    }
    Some(value)
}

fn config_from_table(table: &Table) -> Result<Config, Error> {
    let mut config: Config = Default::default();

    match lookup(table, "listen.address") {
        Some(Value::String(addr)) => match addr.parse::<IpAddr>() {
            Ok(a) => config.address = a,
            Err(_) => return Err(Error::Validation(
                format!("The listen address {:?} is not an IP address", addr)
            )),
        },
        Some(val) => return Err(Error::Validation(
            format!("Expected the listen address to be a string, got a {}",
                    val.type_str())
        )),
        None => ()
    }

    match lookup(table, "listen.port") {
        Some(&Value::Integer(p)) => config.port = validate_port(p)?,
        Some(val) => return Err(Error::Validation(
            format!("Expected the port to be an integer, got a {}",
                    val.type_str())
        )),
        None => ()
    }

    if let Some(path) = path_value(table, "site.root")? {
        config.site.root = path;
    }

    if let Some(path) = path_value(table, "site.mime_types")? {
        config.site.mime_types = path;
    }

    match lookup(table, "site.default_mime_type") {
        Some(Value::String(mimetype)) =>
            config.site.default_mime_type = validate_mime_type(mimetype)?,
        Some(val) => return Err(Error::Validation(
            format!("Expected the default MIME type to be a string, got a {}",
                    val.type_str())
        )),
        None => ()
    }

    match lookup(table, "server.concurrency") {
        Some(Value::String(mode)) =>
            config.concurrency = mode.parse().map_err(Error::Validation)?,
        Some(val) => return Err(Error::Validation(
            format!("Expected the concurrency mode to be a string, got a {}",
                    val.type_str())
        )),
        None => ()
    }

    Ok(config)
}

fn path_value(table: &Table, key: &str) -> Result<Option<PathBuf>, Error> {
    match lookup(table, key) {
        Some(Value::String(path)) => Ok(Some(PathBuf::from(path))),
        Some(val) => Err(Error::Validation(
            format!("Expected {} to be a string, got a {}", key, val.type_str())
        )),
        None => Ok(None)
    }
}

pub fn validate_port(p: i64) -> Result<u16, Error> {
    if p > 0 && p <= u16::MAX as i64 {
        Ok(p as u16)
    } else {
        Err(Error::Validation(format!("The given port {} is out of range", p)))
    }
}

/// Checks that `mimetype` is something we can put in a Content-Type header.
/// Parameters such as a charset are kept as written.
pub fn validate_mime_type(mimetype: &str) -> Result<String, Error> {
    match mimetype.parse::<mime::Mime>() {
        Ok(_) => Ok(mimetype.to_owned()),
        Err(e) => Err(Error::Validation(
            format!("The default MIME type {:?} is invalid: {}", mimetype, e)
        )),
    }
}

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Parse(ErrorMessage),
    Validation(String)
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

/// An owned, rendered version of a TOML syntax error
#[derive(Debug, Clone)]
pub struct ErrorMessage {
    pub desc: String,
    pub line: usize,
    pub column: usize
}

/// Convert a `toml::de::Error` into an `ErrorMessage`
fn message_from_error(source: &str, error: &toml::de::Error) -> ErrorMessage {
    let offset = error.span().map(|s| s.start).unwrap_or(0);
    let before = source.get(..offset).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let column = before.len() - before.rfind('\n').map(|i| i + 1).unwrap_or(0) + 1;

    ErrorMessage {
        desc: error.message().to_owned(),
        line,
        column
    }
}
