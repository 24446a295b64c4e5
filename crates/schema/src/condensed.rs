//! # Condensed Certificate Schema
//!
//! Compact, short-tag representation of a certificate's clinical and
//! identity fields, matching the international schema the barcode payload
//! carries. Absent optional fields are omitted entirely rather than encoded
//! as null, keeping the payload minimal.

use serde::{Deserialize, Serialize};

/// Schema version written into the `ver` field.
pub const SCHEMA_VERSION: &str = "1.3.0";

/// The condensed certificate: the value signed and carried in the barcode.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct HealthCertificate {
    /// Schema version.
    pub ver: String,

    /// Subject name.
    pub nam: Name,

    /// Date of birth, `YYYY-MM-DD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,

    /// Vaccination entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v: Option<Vec<VaccinationEntry>>,

    /// Test entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<Vec<TestEntry>>,

    /// Recovery entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r: Option<Vec<RecoveryEntry>>,

    /// Domestic exemption entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<Vec<ExemptionEntry>>,
}

impl HealthCertificate {
    /// The unique certificate identifier carried by the first entry,
    /// whichever kind is present.
    #[must_use]
    pub fn certificate_id(&self) -> Option<&str> {
        if let Some(v) = self.v.as_ref().and_then(|e| e.first()) {
            return Some(&v.ci);
        }
        if let Some(t) = self.t.as_ref().and_then(|e| e.first()) {
            return Some(&t.ci);
        }
        if let Some(r) = self.r.as_ref().and_then(|e| e.first()) {
            return Some(&r.ci);
        }
        if let Some(d) = self.d.as_ref().and_then(|e| e.first()) {
            return Some(&d.ci);
        }
        None
    }
}

/// Subject name, printed and transliterated forms.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Name {
    /// Family name as printed.
    #[serde(rename = "fn", skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,

    /// Family name transliterated for machine-readable zones.
    pub fnt: String,

    /// Given name as printed.
    #[serde(rename = "gn", skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,

    /// Given name transliterated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gnt: Option<String>,
}

/// One vaccination event.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct VaccinationEntry {
    /// Disease target code.
    pub tg: String,

    /// Vaccine or prophylaxis classification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vp: Option<String>,

    /// Authorized product code.
    pub mp: String,

    /// Marketing authorization holder.
    pub ma: String,

    /// Dose number.
    pub dn: u32,

    /// Total doses in the series.
    pub sd: u32,

    /// Date of vaccination, `YYYY-MM-DD`.
    pub dt: String,

    /// Country of vaccination.
    pub co: String,

    /// Certificate issuer.
    pub is: String,

    /// Unique certificate identifier.
    pub ci: String,
}

/// One test result.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TestEntry {
    /// Disease target code.
    pub tg: String,

    /// Test type code.
    pub tt: String,

    /// Sample collection time, RFC 3339.
    pub sc: String,

    /// Result code.
    pub tr: String,

    /// Testing centre.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tc: Option<String>,

    /// Test device identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ma: Option<String>,

    /// Country of test.
    pub co: String,

    /// Certificate issuer.
    pub is: String,

    /// Unique certificate identifier.
    pub ci: String,
}

/// One recovery statement.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct RecoveryEntry {
    /// Disease target code.
    pub tg: String,

    /// Date of first positive test, `YYYY-MM-DD`.
    pub fr: String,

    /// Country of test.
    pub co: String,

    /// Certificate issuer.
    pub is: String,

    /// Certificate valid from, `YYYY-MM-DD`.
    pub df: String,

    /// Certificate valid until, `YYYY-MM-DD`.
    pub du: String,

    /// Unique certificate identifier.
    pub ci: String,
}

/// One domestic exemption.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExemptionEntry {
    /// Disease target code.
    pub tg: String,

    /// Exemption policy code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub po: Option<String>,

    /// Issuing country.
    pub co: String,

    /// Certificate issuer.
    pub is: String,

    /// Certificate valid from, `YYYY-MM-DD`.
    pub df: String,

    /// Certificate valid until, `YYYY-MM-DD`.
    pub du: String,

    /// Unique certificate identifier.
    pub ci: String,
}

/// Transliterate a printed name for the `fnt`/`gnt` fields.
///
/// Follows the machine-readable-zone convention: uppercase, separators as
/// `<`, a small table for common Latin diacritics, everything else dropped.
#[must_use]
pub fn transliterate(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            'a'..='z' => out.push(c.to_ascii_uppercase()),
            'A'..='Z' | '0'..='9' => out.push(c),
            ' ' | '-' => out.push('<'),
            'À' | 'Á' | 'Â' | 'Ã' | 'à' | 'á' | 'â' | 'ã' => out.push('A'),
            'Ä' | 'ä' | 'Æ' | 'æ' => out.push_str("AE"),
            'Å' | 'å' => out.push_str("AA"),
            'Ç' | 'ç' => out.push('C'),
            'È' | 'É' | 'Ê' | 'Ë' | 'è' | 'é' | 'ê' | 'ë' => out.push('E'),
            'Ì' | 'Í' | 'Î' | 'Ï' | 'ì' | 'í' | 'î' | 'ï' => out.push('I'),
            'Ñ' | 'ñ' => out.push('N'),
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'ò' | 'ó' | 'ô' | 'õ' => out.push('O'),
            'Ö' | 'ö' | 'Ø' | 'ø' => out.push_str("OE"),
            'Ù' | 'Ú' | 'Û' | 'ù' | 'ú' | 'û' => out.push('U'),
            'Ü' | 'ü' => out.push_str("UE"),
            'Ý' | 'ý' => out.push('Y'),
            'ß' => out.push_str("SS"),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transliteration() {
        assert_eq!(transliterate("O'Connor-Smith"), "OCONNOR<SMITH");
        assert_eq!(transliterate("Müller"), "MUELLER");
        assert_eq!(transliterate("van der Berg"), "VAN<DER<BERG");
        assert_eq!(transliterate("Ångström"), "AANGSTROEM");
    }

    #[test]
    fn absent_optionals_are_omitted() {
        let cert = HealthCertificate {
            ver: SCHEMA_VERSION.into(),
            nam: Name {
                family: Some("Person".into()),
                fnt: "PERSON".into(),
                given: None,
                gnt: None,
            },
            dob: None,
            v: None,
            t: None,
            r: None,
            d: None,
        };
        let json = serde_json::to_value(&cert).expect("should serialize");
        let map = json.as_object().expect("object");
        assert!(!map.contains_key("dob"));
        assert!(!map.contains_key("v"));
        assert!(!map["nam"].as_object().expect("object").contains_key("gn"));
    }
}
