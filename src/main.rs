//! A forking HTTP/1.0 server for a directory of files and CGI scripts.
//!
//! Call it like this:
//!
//!     cgi-httpd -f config.toml
//!
//! The config file is in the [TOML format][toml]. Here is an example:
//!
//! ```toml
//! [listen]
//! address = "0.0.0.0"
//! port = 9898
//!
//! [site]
//! root = "www"
//! mime_types = "/etc/mime.types"
//! default_mime_type = "text/plain"
//!
//! [server]
//! concurrency = "forking"
//! ```
//!
//! This example also serves as the defaults if no config file is provided,
//! or any given key is not present. Every setting can also be overridden on
//! the command line; see `--help`.
//!
//! Directories get an HTML listing. Regular files are streamed with a
//! Content-Type from the MIME table. Regular files that are executable by
//! others are run as CGI scripts, and whatever they print goes straight back
//! to the client, so they have to print the status line themselves.
//!
//! [toml]: https://github.com/toml-lang/toml

#[macro_use] extern crate log;

mod cgi;
mod config;
mod errors;
mod filesystem;
mod log_util;
mod mime_types;
mod server;

use config::parser::{self, parse_file, validate_mime_type};
use config::{Concurrency, Config};
use server::Server;

use clap::{value_parser, Arg, ArgMatches, Command};
use log::LevelFilter;

use std::env;
use std::io::{stderr, Write};
use std::net::{IpAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::process::exit;

fn main() {
    let mut log_builder = env_logger::Builder::new();
    log_builder.filter_level(LevelFilter::Info);

    if let Ok(var) = env::var("HTTPD_LOG") {
        log_builder.parse_filters(&var);
    }

    if let Err(e) = log_builder.try_init() {
        let _ = writeln!(stderr(),
                         "cgi-httpd: Error when initializing logging: {}", e);
        exit(1);
    }

    let matches = Command::new("cgi-httpd")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Serves files, directory listings and CGI scripts over HTTP/1.0")
        .arg(Arg::new("config_file")
             .short('f')
             .value_name("FILE")
             .help("The TOML file with server configuration")
             .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new("address")
             .short('a')
             .value_name("ADDRESS")
             .help("IP address to listen on")
             .value_parser(value_parser!(IpAddr)))
        .arg(Arg::new("port")
             .short('p')
             .value_name("PORT")
             .help("Port to listen on")
             .value_parser(value_parser!(u16).range(1..)))
        .arg(Arg::new("root")
             .short('d')
             .value_name("DOCROOT")
             .help("Directory to serve")
             .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new("mime_types")
             .short('m')
             .value_name("MIMEPATH")
             .help("mime.types file mapping extensions to content types")
             .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new("default_mime_type")
             .short('M')
             .value_name("DEFAULTMIME")
             .help("Content type for unmapped extensions"))
        .arg(Arg::new("concurrency")
             .short('c')
             .value_name("MODE")
             .help("How to handle connections")
             .value_parser(["forking", "single"]))
        .get_matches();

    let mut config = match matches.get_one::<PathBuf>("config_file") {
        Some(config_file) => load_config(config_file),
        None => Config::default(),
    };

    if let Err(message) = apply_overrides(&mut config, &matches) {
        error!("{}", message);
        exit(1);
    }

    let listener = match TcpListener::bind((config.address, config.port)) {
        Ok(l) => l,
        Err(e) => {
            error!("Unable to listen on {}:{}: {}", config.address, config.port, e);
            exit(1);
        }
    };

    let server = match Server::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("Unable to set up the document root: {}", e);
            exit(1);
        }
    };

    let config = server.config();
    info!("Listening on {}:{}", config.address, config.port);
    info!("Serving {:?} ({} mode)", config.site.root, config.concurrency);

    if let Err(e) = server.serve(listener) {
        error!("{}", e);
        exit(1);
    }
}

fn load_config(config_file: &Path) -> Config {
    match parse_file(config_file) {
        Ok(c) => c,
        Err(parser::Error::Io(e)) => {
            error!("Error opening config file {:?}: {}", config_file, e);
            exit(1);
        },
        Err(parser::Error::Parse(e)) => {
            error!("Config file {:?} error at line {} column {}: {}",
                   config_file, e.line, e.column, e.desc);
            exit(1);
        },
        Err(parser::Error::Validation(message)) => {
            error!("Error in config file: {}", message);
            exit(1);
        }
    }
}

/// Command-line settings win over the config file
fn apply_overrides(config: &mut Config, matches: &ArgMatches) -> Result<(), String> {
    if let Some(&address) = matches.get_one::<IpAddr>("address") {
        config.address = address;
    }
    if let Some(&port) = matches.get_one::<u16>("port") {
        config.port = port;
    }
    if let Some(root) = matches.get_one::<PathBuf>("root") {
        config.site.root = root.clone();
    }
    if let Some(path) = matches.get_one::<PathBuf>("mime_types") {
        config.site.mime_types = path.clone();
    }
    if let Some(mimetype) = matches.get_one::<String>("default_mime_type") {
        config.site.default_mime_type = match validate_mime_type(mimetype) {
            Ok(m) => m,
            Err(parser::Error::Validation(message)) => return Err(message),
            Err(e) => return Err(format!("{:?}", e)),
        };
    }
    if let Some(mode) = matches.get_one::<String>("concurrency") {
        config.concurrency = mode.parse::<Concurrency>()?;
    }

    Ok(())
}
