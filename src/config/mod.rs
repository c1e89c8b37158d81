pub mod parser;

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::str::FromStr;

/// A holder for app configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to listen on
    pub address: IpAddr,
    /// Port number to listen on
    pub port: u16,
    pub site: SiteConfig,
    pub concurrency: Concurrency,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9898,
            site: Default::default(),
            concurrency: Concurrency::Forking,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Where the files are located on disk
    pub root: PathBuf,
    /// A `mime.types`-style file mapping extensions to content types
    pub mime_types: PathBuf,
    /// Content type for files whose extension isn't mapped
    pub default_mime_type: String,
}

impl Default for SiteConfig {
    fn default() -> SiteConfig {
        SiteConfig {
            root: PathBuf::from("www"),
            mime_types: PathBuf::from("/etc/mime.types"),
            default_mime_type: String::from("text/plain"),
        }
    }
}

/// How accepted connections are handed off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// One forked child process per connection
    Forking,
    /// Every connection served in turn by the accepting process
    Single,
}

impl FromStr for Concurrency {
    type Err = String;

    fn from_str(s: &str) -> Result<Concurrency, String> {
        match s {
            "forking" => Ok(Concurrency::Forking),
            "single" => Ok(Concurrency::Single),
            other => Err(format!("Unknown concurrency mode {:?}", other)),
        }
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Concurrency::Forking => f.write_str("forking"),
            Concurrency::Single => f.write_str("single"),
        }
    }
}
