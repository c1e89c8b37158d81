//! Handler for static files

use super::response::{write_head, Status};
use crate::errors::*;
use crate::mime_types::MimeTypes;

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Size of each read from disk
const CHUNK_SIZE: usize = 8192;

/// Streams the file at `path` to `sink` behind a 200 head.
///
/// Opening failures are `NotFound`. A file that yields nothing on the first
/// read is a handler failure, and is reported before any bytes go out.
pub fn serve_file<W: Write>(path: &Path, mime_types: &MimeTypes, sink: &mut W)
                            -> Result<()> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            debug!("Cannot open {:?}: {}", path, e);
            return Err(Error::NotFound);
        }
    };

    let mut buffer = [0u8; CHUNK_SIZE];
    let mut read = file.read(&mut buffer)?;
    if read == 0 {
        return Err(Error::Handler("file produced no data"));
    }

    let mimetype = mime_types.lookup(path);
    debug!("Mimetype: {}", mimetype);
    write_head(sink, Status::Ok, mimetype).map_err(Error::Truncated)?;

    while read > 0 {
        sink.write_all(&buffer[..read]).map_err(Error::Truncated)?;
        read = file.read(&mut buffer).map_err(Error::Truncated)?;
    }

    Ok(())
}
