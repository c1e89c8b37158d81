//! Content-type lookup from a `mime.types`-style mapping file
//!
//! Each non-comment line reads `<mimetype> <ext1> <ext2> ...`. The first line
//! that mentions an extension decides its type.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct MimeTypes {
    by_extension: HashMap<String, String>,
    default: String,
    /// Set when the mapping file could not be read at all
    guess: bool,
}

impl MimeTypes {
    /// Reads the mapping file at `path`.
    ///
    /// A missing or unreadable file is not fatal: lookups then fall back to
    /// `mime_guess` before settling on `default`.
    pub fn load<P: AsRef<Path>>(path: P, default: &str) -> MimeTypes {
        let path = path.as_ref();
        match fs::read(path) {
            Ok(bytes) => {
                let table = MimeTypes::parse(&String::from_utf8_lossy(&bytes), default);
                info!("Loaded {} extensions from {:?}",
                      table.by_extension.len(), path);
                table
            }
            Err(e) => {
                warn!("Cannot read MIME types from {:?} ({}); guessing instead",
                      path, e);
                MimeTypes {
                    by_extension: HashMap::new(),
                    default: String::from(default),
                    guess: true,
                }
            }
        }
    }

    pub fn parse(text: &str, default: &str) -> MimeTypes {
        let mut by_extension = HashMap::new();

        for line in text.lines() {
            if line.starts_with('#') {
                continue;
            }

            let mut tokens = line.split_whitespace();
            let mimetype = match tokens.next() {
                Some(t) => t,
                None => continue,
            };

            for ext in tokens {
                by_extension
                    .entry(String::from(ext))
                    .or_insert_with(|| String::from(mimetype));
            }
        }

        MimeTypes {
            by_extension,
            default: String::from(default),
            guess: false,
        }
    }

    /// The content type to send for the file at `path`
    pub fn lookup(&self, path: &Path) -> &str {
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext,
            None => return &self.default,
        };

        if let Some(mimetype) = self.by_extension.get(ext) {
            return mimetype;
        }

        if self.guess {
            if let Some(guessed) = mime_guess::from_ext(ext).first_raw() {
                return guessed;
            }
        }

        &self.default
    }
}
