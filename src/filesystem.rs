//! Helpers for filesystem manipulations
//!
//! The document root is the only security boundary this server has: every
//! request URI is glued onto it, canonicalized, and thrown away unless the
//! result still lives beneath the root.

use std::ffi::OsString;
use std::fs::canonicalize;
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};

/// Browsers ask for this unprompted; it is answered with the root listing.
const FAVICON: &str = "/favicon.ico";

/// Maps a query-stripped request URI onto the filesystem.
///
/// `root` must already be canonical. Returns `None` if the URI is not in
/// origin form, has bogus percent-encoding, names nothing that exists, or
/// canonicalizes to somewhere outside of `root`.
pub fn resolve_request_path(root: &Path, uri: &str) -> Option<PathBuf> {
    let uri = if uri == FAVICON { "/" } else { uri };

    let decoded = match decode_path(uri.as_bytes()) {
        Some(d) => d,
        None => {
            debug!("Rejecting URI with bad percent-encoding: {}", uri);
            return None;
        }
    };

    // Plain concatenation; `Path::join` would discard the root when handed
    // an absolute path.
    let mut joined = root.as_os_str().to_owned();
    joined.push(OsString::from_vec(decoded));

    let real = match canonicalize(&joined) {
        Ok(p) => p,
        Err(e) => {
            debug!("Cannot canonicalize {:?}: {}", joined, e);
            return None;
        }
    };

    if !real.starts_with(root) {
        warn!("Request for {:?} escapes the document root", uri);
        return None;
    }

    Some(real)
}

/// Decodes percent-encoded bytes in a request path.
///
/// The path must lead with a `'/'`; otherwise it's not in origin form and we
/// return `None`, as we do for bogus percent-encoding like `b"%bo"`.
fn decode_path(path: &[u8]) -> Option<Vec<u8>> {
    if path.first() != Some(&b'/') {
        return None;
    }

    let mut buffer = Vec::with_capacity(path.len());
    let mut i = 0;

    while i < path.len() {
        match path[i] {
            b'%' => {
                if i + 2 >= path.len() {
                    return None;
                }

                let high = from_hexit(path[i + 1])?;
                let low = from_hexit(path[i + 2])?;
                buffer.push(high << 4 | low);

                i += 3;
            }
            b => {
                buffer.push(b);
                i += 1;
            }
        }
    }

    Some(buffer)
}

/// Converts from a hexadecimal digit to its value
fn from_hexit(x: u8) -> Option<u8> {
    match x {
        b'0'..=b'9' => Some(x - b'0'),
        b'A'..=b'F' => Some(x - b'A' + 10),
        b'a'..=b'f' => Some(x - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::fs::{self, File};

    fn site() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = canonicalize(dir.path()).unwrap();
        fs::create_dir(root.join("docs")).unwrap();
        File::create(root.join("docs/a.txt")).unwrap();
        File::create(root.join("index.html")).unwrap();
        (dir, root)
    }

    #[test]
    fn decode_leaves_plain_paths_alone() {
        assert_eq!(decode_path(b"/foo/bar").unwrap(), b"/foo/bar");
    }

    #[test]
    fn decode_decodes_percents() {
        assert_eq!(decode_path(b"/foo%20bar").unwrap(), b"/foo bar");
        assert_eq!(decode_path(b"/trail%2F").unwrap(), b"/trail/");
    }

    #[test]
    fn decode_errors_on_bogus_percent() {
        assert!(decode_path(b"/bog%us").is_none());
        assert!(decode_path(b"/short%2").is_none());
        assert!(decode_path(b"/short%").is_none());
    }

    #[test]
    fn decode_errors_without_leading_slash() {
        assert!(decode_path(b"bogus").is_none());
        assert!(decode_path(b"").is_none());
    }

    #[test]
    fn from_hexit_works() {
        for x in 0..16u32 {
            let digit = std::char::from_digit(x, 16).unwrap();
            assert_eq!(from_hexit(digit as u8), Some(x as u8));
            assert_eq!(from_hexit(digit.to_ascii_uppercase() as u8), Some(x as u8));
        }
        assert_eq!(from_hexit(b'g'), None);
    }

    #[test]
    fn resolves_files_beneath_the_root() {
        let (_dir, root) = site();
        assert_eq!(resolve_request_path(&root, "/docs/a.txt"),
                   Some(root.join("docs/a.txt")));
        assert_eq!(resolve_request_path(&root, "/"), Some(root.clone()));
    }

    #[test]
    fn favicon_resolves_to_the_root() {
        let (_dir, root) = site();
        assert_eq!(resolve_request_path(&root, "/favicon.ico"), Some(root));
    }

    #[test]
    fn missing_files_do_not_resolve() {
        let (_dir, root) = site();
        assert_eq!(resolve_request_path(&root, "/nope.txt"), None);
    }

    #[test]
    fn traversal_outside_the_root_is_refused() {
        let (_dir, root) = site();
        assert_eq!(resolve_request_path(&root, "/../../etc/passwd"), None);
        assert_eq!(resolve_request_path(&root, "/docs/../../"), None);
        assert_eq!(resolve_request_path(&root, "/%2e%2e/%2e%2e/etc/passwd"), None);
    }

    #[test]
    fn dot_segments_inside_the_root_are_fine() {
        let (_dir, root) = site();
        assert_eq!(resolve_request_path(&root, "/docs/../index.html"),
                   Some(root.join("index.html")));
    }

    #[test]
    fn symlinks_out_of_the_root_are_refused() {
        let (_dir, root) = site();
        std::os::unix::fs::symlink("/", root.join("escape")).unwrap();
        assert_eq!(resolve_request_path(&root, "/escape"), None);
    }

    #[test]
    fn sibling_with_shared_prefix_is_refused() {
        let outer = tempfile::tempdir().unwrap();
        let outer_path = canonicalize(outer.path()).unwrap();
        let root = outer_path.join("www");
        fs::create_dir(&root).unwrap();
        fs::create_dir(outer_path.join("www-private")).unwrap();
        File::create(outer_path.join("www-private/secret")).unwrap();

        assert_eq!(resolve_request_path(&root, "-private/secret"), None);
        assert_eq!(resolve_request_path(&root, "/../www-private/secret"), None);
    }
}
