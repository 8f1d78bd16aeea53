//! Identity payload carried by registration QR codes.
//!
//! The payload is the JSON object `{"name", "company", "license"}` encoded as
//! UTF-8 and then as standard (padded) base64. Registration produces it and
//! the scanner consumes it; it is the only format the two flows share.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// License value recorded for operatives who registered without one.
pub const NO_LICENSE: &str = "N/A";

/// The identity encoded into a registration QR code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPayload {
    /// Full name of the operative.
    #[serde(default)]
    pub name: String,

    /// Company the operative works for.
    #[serde(default)]
    pub company: String,

    /// License number, or [`NO_LICENSE`].
    #[serde(default)]
    pub license: String,
}

impl IdentityPayload {
    /// Create a payload, substituting [`NO_LICENSE`] when no license is given.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        company: impl Into<String>,
        license: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            company: company.into(),
            license: license.unwrap_or_else(|| NO_LICENSE.to_string()),
        }
    }

    /// Whether a real license number was supplied.
    #[must_use]
    pub fn has_license(&self) -> bool {
        self.license != NO_LICENSE
    }

    /// Encode this payload into the text stored in the QR code.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }

    /// Decode and validate scanned QR text.
    ///
    /// Surrounding whitespace is ignored. Bytes that are not valid UTF-8 are
    /// read as Latin-1, which is what a browser's `btoa` produces for accented
    /// names. The decoded record must carry a non-empty `name` and `license`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPayload`] if the text is not base64, not a
    /// JSON identity record, or lacks a name or license.
    pub fn decode(raw: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(raw.trim())
            .map_err(|e| Error::malformed(format!("not a pulse QR code ({e})")))?;

        let parsed = match std::str::from_utf8(&bytes) {
            Ok(text) => serde_json::from_str::<Self>(text),
            Err(_) => {
                let text: String = bytes.iter().copied().map(char::from).collect();
                serde_json::from_str(&text)
            }
        };
        let payload =
            parsed.map_err(|e| Error::malformed(format!("unreadable identity record ({e})")))?;

        if payload.name.trim().is_empty() {
            return Err(Error::malformed("missing name"));
        }
        if payload.license.trim().is_empty() {
            return Err(Error::malformed("missing license"));
        }

        Ok(payload)
    }
}
