//! Running executables as CGI/1.1 scripts
//!
//! A script gets the request's metadata through its environment and is
//! trusted to print a complete HTTP response, status line and all, which is
//! relayed to the client byte for byte.

use crate::errors::{Error, Result};
use crate::server::Request;

use nix::errno::Errno;

use std::ffi::{OsStr, OsString};
use std::io::{self, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};

/// Request headers a script gets to see, and the variables they arrive in
pub const FORWARDED_HEADERS: [(&str, &str); 6] = [
    ("Accept", "HTTP_ACCEPT"),
    ("Accept-Encoding", "HTTP_ACCEPT_ENCODING"),
    ("Accept-Language", "HTTP_ACCEPT_LANGUAGE"),
    ("Connection", "HTTP_CONNECTION"),
    ("Host", "HTTP_HOST"),
    ("User-Agent", "HTTP_USER_AGENT"),
];

/// Variables for one script invocation, in the order they should be set.
/// A later entry for the same name wins.
pub type Environment = Vec<(&'static str, OsString)>;

/// Builds the environment for running the script at `req.path`.
pub fn environment(req: &Request, document_root: &Path, server_port: u16) -> Environment {
    let script = req.path.as_deref().unwrap_or_else(|| Path::new(""));

    let mut env: Environment = vec![
        ("DOCUMENT_ROOT", document_root.as_os_str().to_owned()),
        ("SERVER_PORT", OsString::from(server_port.to_string())),
        ("QUERY_STRING", OsString::from(req.query.as_deref().unwrap_or(""))),
        ("REMOTE_ADDR", OsString::from(&req.host)),
        ("REMOTE_PORT", OsString::from(&req.port)),
        ("REQUEST_METHOD", OsString::from(&req.method)),
        ("REQUEST_URI", OsString::from(&req.uri)),
        ("SCRIPT_FILENAME", script.as_os_str().to_owned()),
    ];

    for header in &req.headers {
        let forwarded = FORWARDED_HEADERS
            .iter()
            .find(|&&(name, _)| name.eq_ignore_ascii_case(&header.name));
        if let Some(&(_, var)) = forwarded {
            env.push((var, OsString::from(&header.data)));
        }
    }

    env
}

/// Variables passed through from our own environment
const INHERITED: [&str; 1] = ["PATH"];

/// Interpreter for scripts the kernel won't exec on its own
const SHELL: &str = "/bin/sh";

fn command(program: &OsStr, env: &Environment) -> Command {
    let inherited = INHERITED
        .iter()
        .filter_map(|&name| std::env::var_os(name).map(|value| (name, value)));

    let mut cmd = Command::new(program);
    cmd.env_clear()
        .envs(inherited)
        .envs(env.iter().map(|(k, v)| (*k, v)))
        .stdin(Stdio::null())
        .stdout(Stdio::piped());
    cmd
}

/// Starts `script`, handing it to the shell if it has no `#!` line.
fn launch(script: &Path, env: &Environment) -> io::Result<Child> {
    match command(script.as_os_str(), env).spawn() {
        Err(e) if e.raw_os_error() == Some(Errno::ENOEXEC as i32) => {
            debug!("{:?} is not directly executable, running it with {}", script, SHELL);
            command(OsStr::new(SHELL), env).arg(script).spawn()
        }
        other => other,
    }
}

/// Launches `script` with `env` plus our `PATH` and nothing else, and copies
/// everything it prints to `sink`.
///
/// Failing to launch is a handler failure; nothing has been sent yet.
pub fn run<W: Write>(script: &Path, env: &Environment, sink: &mut W) -> Result<()> {
    let mut child = match launch(script, env) {
        Ok(c) => c,
        Err(e) => {
            error!("Cannot launch CGI script {:?}: {}", script, e);
            return Err(Error::Handler("cannot launch CGI script"));
        }
    };

    let copied = match child.stdout.take() {
        Some(mut stdout) => io::copy(&mut stdout, sink).and_then(|_| sink.flush()),
        None => Ok(()),
    };

    // The pipe is closed by now, so a script still writing gets EPIPE
    // instead of blocking us forever.
    match child.wait() {
        Ok(status) if !status.success() =>
            warn!("CGI script {:?} exited with {}", script, status),
        Ok(_) => (),
        Err(e) => warn!("Cannot reap CGI script {:?}: {}", script, e),
    }

    copied.map_err(Error::Truncated)
}
