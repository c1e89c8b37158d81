//! HTML listings for directories

use super::response::{write_head, Status};
use crate::errors::*;

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Names to list for `dir`, sorted bytewise.
///
/// `read_dir` never reports `.` or `..`. Only the parent link is put back,
/// so the listing lets you climb out of a directory.
fn entries(dir: &Path) -> Result<Vec<OsString>> {
    let mut names = vec![OsString::from("..")];
    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name());
    }

    names.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
    Ok(names)
}

/// Writes a 200 response listing `dir`, linking every entry relative to
/// `uri`, the path the client asked for.
pub fn serve_listing<W: Write>(dir: &Path, uri: &str, sink: &mut W) -> Result<()> {
    let names = match entries(dir) {
        Ok(n) => n,
        Err(e) => {
            debug!("Cannot list {:?}: {}", dir, e);
            return Err(Error::NotFound);
        }
    };

    let separator = if uri.ends_with('/') { "" } else { "/" };

    write_head(sink, Status::Ok, "text/html").map_err(Error::Truncated)?;
    write_listing(sink, uri, separator, &names).map_err(Error::Truncated)
}

fn write_listing<W: Write>(sink: &mut W, uri: &str, separator: &str, names: &[OsString])
                           -> std::io::Result<()> {
    sink.write_all(b"<ul>\n")?;
    for name in names {
        let name = name.to_string_lossy();
        writeln!(sink, "<li><a href=\"{}{}{}\">{}</a></li>", uri, separator, name, name)?;
    }
    sink.write_all(b"</ul>\n")
}
