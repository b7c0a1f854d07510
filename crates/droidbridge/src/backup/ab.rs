//! Android backup (`.ab`) files produced by `adb backup`.
//!
//! The format is a four-line text header followed by a tar payload:
//!
//! ```text
//! ANDROID BACKUP
//! <version>
//! <compressed: 0 or 1>
//! <encryption: none or AES-256>
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

const MAGIC: &str = "ANDROID BACKUP";

/// Parsed `.ab` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbHeader {
    /// Format version.
    pub version: u32,
    /// Whether the payload is deflate-compressed.
    pub compressed: bool,
    /// Encryption algorithm, `none` when unencrypted.
    pub encryption: String,
}

impl AbHeader {
    /// Whether the payload is encrypted.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        !self.encryption.eq_ignore_ascii_case("none")
    }
}

/// Parse the header, returning it with the payload offset.
///
/// # Errors
///
/// Returns [`Error::InvalidAndroidBackup`] if the magic line or any header
/// field is missing or malformed.
pub fn parse_header(data: &[u8]) -> Result<(AbHeader, usize)> {
    let mut offset = 0;
    let mut fields = Vec::with_capacity(4);
    for _ in 0..4 {
        let rest = &data[offset..];
        let end = rest
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| invalid("truncated header"))?;
        let field = std::str::from_utf8(&rest[..end]).map_err(|_| invalid("header is not text"))?;
        fields.push(field.trim_end_matches('\r'));
        offset += end + 1;
    }

    if fields[0] != MAGIC {
        return Err(invalid("missing ANDROID BACKUP magic"));
    }
    let version = fields[1]
        .parse()
        .map_err(|_| invalid(format!("bad version '{}'", fields[1])))?;
    let compressed = match fields[2] {
        "0" => false,
        "1" => true,
        other => return Err(invalid(format!("bad compression flag '{other}'"))),
    };

    Ok((
        AbHeader {
            version,
            compressed,
            encryption: fields[3].to_string(),
        },
        offset,
    ))
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidAndroidBackup {
        message: message.into(),
    }
}

/// Extract the tar payload of `ab` into `<ab>.tar`.
///
/// # Errors
///
/// Returns [`Error::UnsupportedAndroidBackup`] for encrypted or compressed
/// backups, [`Error::InvalidAndroidBackup`] for a bad header, or an I/O
/// error.
pub fn convert_to_tar(ab: &Path) -> Result<PathBuf> {
    let data = std::fs::read(ab)?;
    let (header, offset) = parse_header(&data)?;

    if header.is_encrypted() {
        return Err(Error::UnsupportedAndroidBackup {
            message: format!("payload is encrypted with {}", header.encryption),
        });
    }
    if header.compressed {
        return Err(Error::UnsupportedAndroidBackup {
            message: "payload is compressed; create it with an uncompressed backup".to_string(),
        });
    }

    let tar = ab.with_extension("tar");
    std::fs::write(&tar, &data[offset..])?;
    info!(tar = %tar.display(), version = header.version, "Converted Android backup");
    Ok(tar)
}
