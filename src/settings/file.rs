//! Reading and decoding INI settings files.

use std::fs;
use std::path::Path;

use encoding_rs::{Encoding, UTF_8};
use ini::Ini;

use super::SettingsError;

/// Look up an `encoding_rs` encoding by WHATWG label.
pub fn encoding_for_label(label: &str) -> Result<&'static Encoding, SettingsError> {
    let normalised = label.trim().to_ascii_lowercase();
    Encoding::for_label(normalised.as_bytes())
        .ok_or_else(|| SettingsError::UnknownEncoding(label.to_owned()))
}

/// Read `path` and parse it as INI, decoding with `encoding` (UTF-8 when
/// `None`).
pub fn load_ini(path: &Path, encoding: Option<&str>) -> Result<Ini, SettingsError> {
    let bytes = fs::read(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let encoding = match encoding {
        Some(label) => encoding_for_label(label)?,
        None => UTF_8,
    };
    let (text, _, had_errors) = encoding.decode(&bytes);
    if had_errors {
        return Err(SettingsError::Decode {
            path: path.to_path_buf(),
            encoding: encoding.name(),
        });
    }
    Ini::load_from_str(&text).map_err(|err| SettingsError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}
