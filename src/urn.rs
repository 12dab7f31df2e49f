//! Model identifier encodings.
//!
//! A selected model is known by its raw item URN
//! (`urn:adsk.wipprod:dm.lineage:...`). The catalog query scopes elements by
//! an exchange id, which is the URL-safe base64 of that URN *with* padding;
//! the model-derivative service expects the same encoding of the URN with
//! its `?version=` suffix removed and *without* padding.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;

/// Model key (exchange id) used to scope catalog queries.
pub fn model_key_from_urn(urn: &str) -> String {
    URL_SAFE.encode(urn.as_bytes())
}

/// Model-derivative URN for manifest lookups.
pub fn derivative_urn(urn: &str) -> String {
    let raw = urn.split('?').next().unwrap_or(urn);
    URL_SAFE_NO_PAD.encode(raw.as_bytes())
}
