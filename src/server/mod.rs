//! Server functionality
//!
//! Every connection gets one request and one response. In the default
//! forking mode each connection is handled by its own child process, which
//! exits once the response is out, so no state is ever shared between
//! requests.

mod browse;
pub mod request;
mod response;
mod static_files;

pub use self::request::Request;
pub use self::response::Status;

use self::response::handle_error;
use crate::cgi;
use crate::config::{Concurrency, Config};
use crate::errors::{Error, Result};
use crate::filesystem::resolve_request_path;
use crate::mime_types::MimeTypes;

use nix::sys::signal::{signal, SigHandler, Signal};
use nix::unistd::{access, fork, AccessFlags, ForkResult};

use std::fs::{self, canonicalize};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process;

/// The "execute by others" permission bit
const S_IXOTH: u32 = 0o001;

/// What a resolved path turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resource {
    Directory,
    Script,
    File,
    /// Sockets, FIFOs, devices: nothing we serve
    Unsupported,
}

/// A document root, ready to serve
pub struct Server {
    config: Config,
    mime_types: MimeTypes,
}

impl Server {
    /// Canonicalizes the document root and loads the MIME table.
    pub fn new(mut config: Config) -> Result<Server> {
        config.site.root = canonicalize(&config.site.root)?;
        let mime_types = MimeTypes::load(&config.site.mime_types,
                                         &config.site.default_mime_type);

        Ok(Server { config, mime_types })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accepts connections on `listener` forever.
    ///
    /// Failed accepts are logged and skipped. The only errors returned come
    /// from setting up signal handling.
    pub fn serve(&self, listener: TcpListener) -> Result<()> {
        if self.config.concurrency == Concurrency::Forking {
            // Have the kernel reap finished workers for us.
            unsafe { signal(Signal::SIGCHLD, SigHandler::SigIgn) }?;
        }

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => match self.config.concurrency {
                    Concurrency::Forking => self.spawn_worker(stream),
                    Concurrency::Single => {
                        if let Err(e) = self.handle_client(stream) {
                            warn!("Error serving a request: {}", e);
                        }
                    }
                },
                Err(e) => warn!("Unable to accept request: {}", e),
            }
        }

        Ok(())
    }

    /// Forks a child to own `stream`; the parent just lets go of it.
    fn spawn_worker(&self, stream: TcpStream) {
        // The acceptor is single-threaded, so the child can't inherit a lock
        // some other thread was holding.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                // Workers wait on their CGI scripts, so they need their
                // children back.
                if let Err(e) = unsafe { signal(Signal::SIGCHLD, SigHandler::SigDfl) } {
                    warn!("Unable to restore SIGCHLD in worker: {}", e);
                }

                let code = match self.handle_client(stream) {
                    Ok(_) => 0,
                    Err(e) => {
                        warn!("Error serving a request: {}", e);
                        1
                    }
                };
                process::exit(code);
            }
            Ok(ForkResult::Parent { child }) => {
                debug!("Handing connection to worker {}", child);
                drop(stream);
            }
            Err(e) => error!("Unable to fork a worker, dropping connection: {}", e),
        }
    }

    /// Runs one connection's whole request lifecycle.
    ///
    /// The returned status is what the client was sent; errors mean the
    /// connection itself misbehaved.
    pub fn handle_client(&self, stream: TcpStream) -> Result<Status> {
        let peer = stream.peer_addr()?;
        info!("Accepted request from {}:{}", peer.ip(), peer.port());

        let mut request = Request::new(peer.ip().to_string(), peer.port().to_string());
        let mut reader = BufReader::new(&stream);
        let mut writer = BufWriter::new(&stream);

        let status = self.handle_request(&mut request, &mut reader, &mut writer);
        writer.flush()?;

        Ok(status)
    }

    /// Parses a request from `reader`, resolves it, and writes the response
    /// to `writer`.
    fn handle_request<R: BufRead, W: Write>(&self, req: &mut Request, reader: R, writer: &mut W)
                                            -> Status {
        if let Err(e) = req.parse(reader) {
            debug!("Failed to parse request: {}", e);
            return handle_error(writer, e.status());
        }
        info!("{} {} from {}:{} ({})", req.method, req.uri, req.host, req.port,
              req.header("User-Agent").unwrap_or("-"));

        let root = &self.config.site.root;
        let path = match resolve_request_path(root, &req.uri) {
            Some(p) => p,
            None => {
                debug!("Couldn't determine path for {}", req.uri);
                return handle_error(writer, Status::NotFound);
            }
        };
        debug!("HTTP REQUEST PATH: {:?}", path);
        req.path = Some(path.clone());

        let outcome = match classify(&path) {
            Ok(Resource::Directory) => browse::serve_listing(&path, &req.uri, writer),
            Ok(Resource::Script) => {
                let env = cgi::environment(req, root, self.config.port);
                cgi::run(&path, &env, writer)
            }
            Ok(Resource::File) => static_files::serve_file(&path, &self.mime_types, writer),
            Ok(Resource::Unsupported) => Err(Error::NotFound),
            Err(e) => Err(e),
        };

        let status = match outcome {
            Ok(()) => Status::Ok,
            Err(Error::Truncated(e)) => {
                warn!("Response for {} cut short: {}", req.uri, e);
                Status::InternalServerError
            }
            Err(e) => {
                debug!("Request for {} failed: {}", req.uri, e);
                handle_error(writer, e.status())
            }
        };

        info!("HTTP REQUEST STATUS: {}", status);
        status
    }
}

/// Decides which handler a resolved path belongs to.
fn classify(path: &Path) -> Result<Resource> {
    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            debug!("Stat error on {:?}: {}", path, e);
            return Err(Error::NotFound);
        }
    };

    let file_type = meta.file_type();
    if file_type.is_dir() {
        Ok(Resource::Directory)
    } else if file_type.is_file() {
        let executable = meta.permissions().mode() & S_IXOTH != 0
            && access(path, AccessFlags::X_OK).is_ok();
        Ok(if executable { Resource::Script } else { Resource::File })
    } else {
        Ok(Resource::Unsupported)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use nix::sys::wait::waitpid;
    use nix::unistd::Pid;

    use std::fs::File;
    use std::io::Read;
    use std::net::{Shutdown, SocketAddr};
    use std::path::PathBuf;
    use std::thread;
    use std::time::Duration;

    const MIME_TYPES: &str = "# test mapping\ntext/html html htm\ntext/plain txt\n";

    /// A document root with a few files in it, plus a mime.types beside it
    fn site() -> (tempfile::TempDir, Server) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("www");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("index.html"), "<h1>hello</h1>\n").unwrap();
        fs::create_dir(root.join("docs")).unwrap();
        fs::write(root.join("docs/a.txt"), "alpha\n").unwrap();
        fs::create_dir(root.join("docs/b")).unwrap();
        fs::write(root.join("data.bin"), [0u8, 1, 2, 255]).unwrap();
        File::create(root.join("empty.txt")).unwrap();
        fs::write(dir.path().join("secret.txt"), "keep out\n").unwrap();
        fs::write(dir.path().join("mime.types"), MIME_TYPES).unwrap();

        let mut config = Config::default();
        config.port = 9898;
        config.site.root = root;
        config.site.mime_types = dir.path().join("mime.types");
        config.site.default_mime_type = String::from("application/octet-stream");

        let server = Server::new(config).unwrap();
        (dir, server)
    }

    fn root(server: &Server) -> PathBuf {
        server.config().site.root.clone()
    }

    /// Sends `raw` over a real socket and returns everything sent back
    fn exchange(server: &Server, raw: &[u8]) -> (Status, Vec<u8>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        thread::scope(|s| {
            let worker = s.spawn(|| {
                let (stream, _) = listener.accept().unwrap();
                server.handle_client(stream).unwrap()
            });

            let mut client = TcpStream::connect(addr).unwrap();
            client.write_all(raw).unwrap();
            client.shutdown(Shutdown::Write).unwrap();
            let mut out = Vec::new();
            client.read_to_end(&mut out).unwrap();

            (worker.join().unwrap(), out)
        })
    }

    fn get(server: &Server, uri: &str) -> (Status, String) {
        let raw = format!("GET {} HTTP/1.0\r\nHost: localhost\r\n\r\n", uri);
        let (status, out) = exchange(server, raw.as_bytes());
        (status, String::from_utf8_lossy(&out).into_owned())
    }

    fn head(status: &str, content_type: &str) -> String {
        format!("HTTP/1.0 {}\r\nContent-Type: {}\r\n\r\n", status, content_type)
    }

    #[test]
    fn classify_sorts_paths_into_handlers() {
        let (_dir, server) = site();
        let root = root(&server);
        let script = root.join("run.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        let private = root.join("private.sh");
        fs::write(&private, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&private, fs::Permissions::from_mode(0o750)).unwrap();
        let fifo = root.join("pipe");
        nix::unistd::mkfifo(&fifo, nix::sys::stat::Mode::S_IRWXU).unwrap();

        assert_eq!(classify(&root).unwrap(), Resource::Directory);
        assert_eq!(classify(&root.join("index.html")).unwrap(), Resource::File);
        assert_eq!(classify(&script).unwrap(), Resource::Script);
        assert_eq!(classify(&private).unwrap(), Resource::File);
        assert_eq!(classify(&fifo).unwrap(), Resource::Unsupported);
        assert!(matches!(classify(&root.join("gone")), Err(Error::NotFound)));
    }

    #[test]
    fn static_file_round_trip() {
        let (_dir, server) = site();
        let (status, out) = get(&server, "/index.html");

        assert_eq!(status, Status::Ok);
        assert_eq!(out, head("200 OK", "text/html") + "<h1>hello</h1>\n");
    }

    #[test]
    fn binary_file_is_byte_identical() {
        let (_dir, server) = site();
        let (status, out) = exchange(&server, b"GET /data.bin HTTP/1.0\r\n\r\n");

        assert_eq!(status, Status::Ok);
        let expected_head = head("200 OK", "application/octet-stream");
        assert_eq!(&out[..expected_head.len()], expected_head.as_bytes());
        assert_eq!(&out[expected_head.len()..], &[0u8, 1, 2, 255][..]);
    }

    #[test]
    fn query_is_ignored_for_static_files() {
        let (_dir, server) = site();
        let (status, out) = get(&server, "/docs/a.txt?download=1");

        assert_eq!(status, Status::Ok);
        assert_eq!(out, head("200 OK", "text/plain") + "alpha\n");
    }

    #[test]
    fn directory_listing() {
        let (_dir, server) = site();
        let (status, out) = get(&server, "/docs");

        assert_eq!(status, Status::Ok);
        assert_eq!(out, head("200 OK", "text/html")
                   + "<ul>\n\
                      <li><a href=\"/docs/..\">..</a></li>\n\
                      <li><a href=\"/docs/a.txt\">a.txt</a></li>\n\
                      <li><a href=\"/docs/b\">b</a></li>\n\
                      </ul>\n");
    }

    #[test]
    fn favicon_gets_the_root_listing() {
        let (_dir, server) = site();
        let (status, out) = get(&server, "/favicon.ico");

        assert_eq!(status, Status::Ok);
        assert!(out.starts_with(&head("200 OK", "text/html")));
        assert!(out.contains("index.html</a>"));
    }

    #[test]
    fn traversal_is_not_found() {
        let (_dir, server) = site();

        for uri in &["/../secret.txt", "/../../etc/passwd", "/docs/../../secret.txt"] {
            let (status, out) = get(&server, uri);
            assert_eq!(status, Status::NotFound, "{}", uri);
            assert_eq!(out, head("404 Not Found", "text/html")
                       + "<strong>404 Not Found</strong>\n");
        }
    }

    #[test]
    fn missing_file_is_not_found() {
        let (_dir, server) = site();
        let (status, _) = get(&server, "/nope.html");

        assert_eq!(status, Status::NotFound);
    }

    #[test]
    fn empty_file_is_a_server_error() {
        let (_dir, server) = site();
        let (status, out) = get(&server, "/empty.txt");

        assert_eq!(status, Status::InternalServerError);
        assert_eq!(out, head("500 Internal Server Error", "text/html")
                   + "<strong>500 Internal Server Error</strong>\n");
    }

    #[test]
    fn special_files_are_not_found() {
        let (_dir, server) = site();
        nix::unistd::mkfifo(&root(&server).join("pipe"), nix::sys::stat::Mode::S_IRWXU)
            .unwrap();
        let (status, _) = get(&server, "/pipe");

        assert_eq!(status, Status::NotFound);
    }

    #[test]
    fn malformed_requests_are_bad_requests() {
        let (_dir, server) = site();

        let inputs: [&[u8]; 4] = [
            b"GARBAGE\r\n",
            b"\r\n",
            b"GET / HTTP/1.0\r\nHost: a\r\nno colon here\r\n",
            b"",
        ];
        for input in &inputs {
            let (status, out) = exchange(&server, input);
            assert_eq!(status, Status::BadRequest);
            assert_eq!(String::from_utf8(out).unwrap(),
                       head("400 Bad Request", "text/html")
                       + "<strong>400 Bad Request</strong>\n");
        }
    }

    #[test]
    fn cgi_scripts_run_with_request_environment() {
        let (_dir, server) = site();
        let root = root(&server);
        let script = root.join("env.cgi");
        fs::write(&script, "#!/bin/sh\n\
                            printf 'HTTP/1.0 200 OK\\r\\nContent-Type: text/plain\\r\\n\\r\\n'\n\
                            echo \"query=$QUERY_STRING\"\n\
                            echo \"method=$REQUEST_METHOD\"\n\
                            echo \"uri=$REQUEST_URI\"\n\
                            echo \"addr=$REMOTE_ADDR\"\n\
                            echo \"port=$SERVER_PORT\"\n\
                            echo \"agent=$HTTP_USER_AGENT\"\n\
                            echo \"root=$DOCUMENT_ROOT\"\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let (status, out) = exchange(
            &server,
            b"GET /env.cgi?name=world HTTP/1.0\r\nUser-Agent: tester/1.0\r\n\r\n");

        assert_eq!(status, Status::Ok);
        assert_eq!(String::from_utf8(out).unwrap(),
                   format!("HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\n\r\n\
                            query=name=world\n\
                            method=GET\n\
                            uri=/env.cgi\n\
                            addr=127.0.0.1\n\
                            port=9898\n\
                            agent=tester/1.0\n\
                            root={}\n", root.display()));
    }

    #[test]
    fn concurrent_requests_are_independent() {
        let (_dir, server) = site();
        let server = &server;
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        thread::scope(|s| {
            s.spawn(move || {
                for _ in 0..2 {
                    let (stream, _) = listener.accept().unwrap();
                    s.spawn(move || {
                        server.handle_client(stream).unwrap();
                    });
                }
            });

            let mut first = TcpStream::connect(addr).unwrap();
            let mut second = TcpStream::connect(addr).unwrap();

            // The second client finishes first while the first one's worker
            // is still waiting on its request line.
            second.write_all(b"GET /docs/a.txt HTTP/1.0\r\n\r\n").unwrap();
            let mut second_out = String::new();
            second.read_to_string(&mut second_out).unwrap();

            first.write_all(b"GET /index.html HTTP/1.0\r\n\r\n").unwrap();
            let mut first_out = String::new();
            first.read_to_string(&mut first_out).unwrap();

            assert_eq!(first_out, head("200 OK", "text/html") + "<h1>hello</h1>\n");
            assert_eq!(second_out, head("200 OK", "text/plain") + "alpha\n");
        });
    }

    /// A forked copy of this process running the accept loop
    struct Acceptor(Pid);

    impl Drop for Acceptor {
        fn drop(&mut self) {
            let _ = nix::sys::signal::kill(self.0, Signal::SIGKILL);
            let _ = waitpid(self.0, None);
        }
    }

    fn start_acceptor(server: &Server) -> (Acceptor, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        match unsafe { fork() }.unwrap() {
            ForkResult::Child => {
                let code = if server.serve(listener).is_ok() { 0 } else { 1 };
                unsafe { nix::libc::_exit(code) };
            }
            ForkResult::Parent { child } => (Acceptor(child), addr),
        }
    }

    /// Processes, zombies included, whose parent is `pid`
    fn children_of(pid: Pid) -> usize {
        let ppid = pid.to_string();
        fs::read_dir("/proc").unwrap()
            .filter_map(|entry| fs::read_to_string(entry.ok()?.path().join("stat")).ok())
            .filter(|stat| {
                // "pid (comm) state ppid ..."; comm may itself hold spaces
                stat.rfind(')')
                    .and_then(|i| stat[i + 1..].split_whitespace().nth(1))
                    == Some(ppid.as_str())
            })
            .count()
    }

    #[test]
    fn forking_acceptor_hands_each_connection_to_a_worker() {
        let (_dir, server) = site();
        assert_eq!(server.config().concurrency, Concurrency::Forking);
        let (acceptor, addr) = start_acceptor(&server);

        // Never sends a request, so a lone in-process worker would be stuck
        // on it.
        let idle = TcpStream::connect(addr).unwrap();

        let cases = [
            ("/index.html", head("200 OK", "text/html") + "<h1>hello</h1>\n"),
            ("/docs/a.txt", head("200 OK", "text/plain") + "alpha\n"),
        ];
        for (uri, expected) in &cases {
            let mut client = TcpStream::connect(addr).unwrap();
            client.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
            write!(client, "GET {} HTTP/1.0\r\n\r\n", uri).unwrap();

            // EOF only arrives once the acceptor has let go of its copy too.
            let mut out = String::new();
            client.read_to_string(&mut out).unwrap();
            assert_eq!(&out, expected);
        }
        drop(idle);

        let mut remaining = children_of(acceptor.0);
        for _ in 0..250 {
            if remaining == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(20));
            remaining = children_of(acceptor.0);
        }
        assert_eq!(remaining, 0, "finished workers were not reaped");
    }
}
