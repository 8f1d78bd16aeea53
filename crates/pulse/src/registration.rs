//! Operative registration: form validation and QR badge rendering.

use std::path::Path;

use qrcode::render::{svg, unicode};
use qrcode::QrCode;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::payload::IdentityPayload;

/// Default file name for a saved badge image.
pub const DEFAULT_BADGE_FILE_NAME: &str = "pulse-qrcode.svg";

/// The form's "Other" choice, which stands for a company still to be typed.
const OTHER_COMPANY: &str = "Other";

/// Companies offered on the registration form.
#[must_use]
pub fn default_companies() -> Vec<String> {
    [
        "Manguard Plus",
        "Securitas",
        "Noonan",
        "Bidvest Noonan",
        "G4S",
        "Eventsec",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Raw registration input, as typed by the operative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    /// Full name.
    pub name: String,
    /// Company, either a preset or a custom name.
    pub company: String,
    /// License number; `None` when the operative has no license with them.
    pub license: Option<String>,
}

impl RegistrationForm {
    /// Validate the form and build the identity payload.
    ///
    /// Fields are trimmed. A company matching one of `companies` ignoring
    /// case takes the preset spelling; any other company is kept as typed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingField`] if the name or company is empty, if
    /// the company is the bare "Other" choice, or if a license was declared
    /// but left empty.
    pub fn into_payload(self, companies: &[String]) -> Result<IdentityPayload> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::MissingField { field: "name" });
        }

        let company = self.company.trim();
        if company.is_empty() || company.eq_ignore_ascii_case(OTHER_COMPANY) {
            return Err(Error::MissingField { field: "company" });
        }
        let company = companies
            .iter()
            .find(|preset| preset.eq_ignore_ascii_case(company))
            .map_or(company, String::as_str);

        let license = match self.license {
            Some(license) => {
                let license = license.trim();
                if license.is_empty() {
                    return Err(Error::MissingField { field: "license" });
                }
                Some(license.to_string())
            }
            None => None,
        };

        Ok(IdentityPayload::new(name, company, license))
    }
}

/// A rendered registration QR code.
#[derive(Debug, Clone)]
pub struct Badge {
    payload: IdentityPayload,
    encoded: String,
    terminal: String,
    svg: String,
}

impl Badge {
    /// Encode the payload and render it as a QR code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QrGenerate`] if the payload cannot be encoded as a
    /// QR symbol.
    pub fn generate(payload: IdentityPayload) -> Result<Self> {
        let encoded = payload.encode()?;
        let code =
            QrCode::new(encoded.as_bytes()).map_err(|e| Error::QrGenerate(e.to_string()))?;

        let terminal = code
            .render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .build();
        let svg = code
            .render::<svg::Color<'_>>()
            .min_dimensions(256, 256)
            .build();

        debug!(width = code.width(), "Rendered QR code for {}", payload.name);
        Ok(Self {
            payload,
            encoded,
            terminal,
            svg,
        })
    }

    /// The identity in this badge.
    #[must_use]
    pub fn payload(&self) -> &IdentityPayload {
        &self.payload
    }

    /// The text stored in the QR code.
    #[must_use]
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// The QR code drawn with unicode half blocks for a terminal.
    #[must_use]
    pub fn terminal(&self) -> &str {
        &self.terminal
    }

    /// The QR code as an SVG document.
    #[must_use]
    pub fn svg(&self) -> &str {
        &self.svg
    }

    /// Write the SVG image to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_svg(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, &self.svg)?;
        info!("Saved QR code to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::NO_LICENSE;

    fn form(name: &str, company: &str, license: Option<&str>) -> RegistrationForm {
        RegistrationForm {
            name: name.to_string(),
            company: company.to_string(),
            license: license.map(String::from),
        }
    }

    #[test]
    fn test_valid_form() {
        let payload = form(" Michael Collins ", "Securitas", Some(" PSA123 "))
            .into_payload(&default_companies())
            .unwrap();
        assert_eq!(payload.name, "Michael Collins");
        assert_eq!(payload.company, "Securitas");
        assert_eq!(payload.license, "PSA123");
    }

    #[test]
    fn test_without_license_uses_sentinel() {
        let payload = form("Michael Collins", "G4S", None)
            .into_payload(&default_companies())
            .unwrap();
        assert_eq!(payload.license, NO_LICENSE);
    }

    #[test]
    fn test_preset_company_is_normalized() {
        let payload = form("Ann", "bidvest noonan", None)
            .into_payload(&default_companies())
            .unwrap();
        assert_eq!(payload.company, "Bidvest Noonan");
    }

    #[test]
    fn test_custom_company_is_kept() {
        let payload = form("Ann", "  Dublin Door Staff ", None)
            .into_payload(&default_companies())
            .unwrap();
        assert_eq!(payload.company, "Dublin Door Staff");
    }

    #[test]
    fn test_missing_name() {
        let err = form("  ", "G4S", None)
            .into_payload(&default_companies())
            .unwrap_err();
        assert!(matches!(err, Error::MissingField { field: "name" }));
    }

    #[test]
    fn test_missing_company() {
        let err = form("Ann", "", None)
            .into_payload(&default_companies())
            .unwrap_err();
        assert!(matches!(err, Error::MissingField { field: "company" }));
    }

    #[test]
    fn test_other_needs_a_company_name() {
        for company in ["Other", " other "] {
            let err = form("Ann", company, None)
                .into_payload(&default_companies())
                .unwrap_err();
            assert!(matches!(err, Error::MissingField { field: "company" }));
        }

        let payload = form("Ann", "Other Security Ltd", None)
            .into_payload(&default_companies())
            .unwrap();
        assert_eq!(payload.company, "Other Security Ltd");
    }

    #[test]
    fn test_declared_but_empty_license() {
        let err = form("Ann", "G4S", Some(" "))
            .into_payload(&default_companies())
            .unwrap_err();
        assert!(matches!(err, Error::MissingField { field: "license" }));
    }

    #[test]
    fn test_badge_generation() {
        let payload = IdentityPayload::new("Ann", "G4S", Some("L9".to_string()));
        let badge = Badge::generate(payload.clone()).unwrap();

        assert_eq!(badge.payload(), &payload);
        assert_eq!(IdentityPayload::decode(badge.encoded()).unwrap(), payload);
        assert!(badge.svg().contains("<svg"));
        assert!(!badge.terminal().is_empty());
    }

    #[test]
    fn test_badge_too_large() {
        let payload = IdentityPayload::new("x".repeat(4000), "G4S", None);
        let err = Badge::generate(payload).unwrap_err();
        assert!(matches!(err, Error::QrGenerate(_)));
    }

    #[test]
    fn test_save_svg() {
        let path = std::env::temp_dir().join(format!("pulse_badge_test_{}.svg", std::process::id()));
        let badge = Badge::generate(IdentityPayload::new("Ann", "G4S", None)).unwrap();

        badge.save_svg(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, badge.svg());

        let _ = std::fs::remove_file(&path);
    }
}
