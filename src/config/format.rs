//! File format decoders selected by extension.
//!
//! Decoding overlays the file onto an existing value: the target is turned
//! into a JSON document, the file document is deep merged over it and the
//! result is deserialized back. Keys absent from the file keep their
//! current value.
//!
//! Fields marked `#[serde(skip)]` do not survive the round trip and come
//! back as their default.

use std::path::Path;

use jsonc_parser::ParseOptions;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::LoadError;

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    /// JSON with comments and trailing commas.
    Json,
    Toml,
}

impl Format {
    /// Detect the format from the file extension. Unknown extensions yield `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(Format::Yaml),
            "json" => Some(Format::Json),
            "toml" => Some(Format::Toml),
            _ => None,
        }
    }

    /// Parse file content into a generic document. Blank content yields `None`.
    pub fn parse(self, path: &Path, content: &str) -> Result<Option<Value>, LoadError> {
        if content.trim().is_empty() {
            return Ok(None);
        }

        let document = match self {
            Format::Yaml => serde_yaml::from_str::<Value>(content).map_err(|source| {
                LoadError::Yaml {
                    path: path.to_path_buf(),
                    source,
                }
            })?,
            Format::Json => {
                match jsonc_parser::parse_to_serde_value(content, &ParseOptions::default()) {
                    Ok(Some(value)) => value,
                    Ok(None) => return Ok(None),
                    Err(e) => {
                        return Err(LoadError::Json {
                            path: path.to_path_buf(),
                            message: e.to_string(),
                        })
                    }
                }
            }
            Format::Toml => {
                toml::from_str::<Value>(content).map_err(|source| LoadError::Toml {
                    path: path.to_path_buf(),
                    source,
                })?
            }
        };

        Ok((!document.is_null()).then_some(document))
    }
}

/// Overlay the content of `path` onto `target`.
///
/// Files with an unrecognized extension are ignored.
pub fn decode_onto<C>(target: &mut C, path: &Path, content: &str) -> Result<(), LoadError>
where
    C: Serialize + DeserializeOwned,
{
    let Some(format) = Format::from_path(path) else {
        return Ok(());
    };
    let Some(document) = format.parse(path, content)? else {
        return Ok(());
    };

    let decode_err = |source| LoadError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let base = serde_json::to_value(&*target).map_err(decode_err)?;
    *target = serde_json::from_value(merge(base, document)).map_err(decode_err)?;
    Ok(())
}

/// Deep merge `overlay` over `base`.
///
/// Objects merge key by key with `overlay` winning; any other value in
/// `overlay` replaces the one in `base` wholesale, lists included.
pub fn merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}
