//! # CWT Claims
//!
//! The integer-keyed claims map signed inside the COSE envelope: issuer,
//! issued-at, expiry, and the condensed health certificate under its
//! registered claim key.

use chrono::{DateTime, Utc};
use ciborium::Value;
use hcert_schema::HealthCertificate;
use thiserror::Error;

/// Claim key: issuer country.
pub const CLAIM_ISSUER: i64 = 1;

/// Claim key: expiration time, epoch seconds.
pub const CLAIM_EXPIRES: i64 = 4;

/// Claim key: issued-at time, epoch seconds.
pub const CLAIM_ISSUED_AT: i64 = 6;

/// Claim key: health certificate container.
pub const CLAIM_HCERT: i64 = -260;

/// Key of the certificate inside the health certificate container.
pub const HCERT_CONTAINER_KEY: i64 = 1;

/// Claims map failures.
#[derive(Debug, Error)]
pub enum CwtError {
    /// The claims payload is not a CBOR map.
    #[error("claims payload is not a CBOR map")]
    NotAMap,

    /// A required claim is absent.
    #[error("missing claim {0}")]
    MissingClaim(i64),

    /// A claim is present with an unusable type or value.
    #[error("claim {0} has an unusable value")]
    InvalidClaim(i64),

    /// The embedded certificate cannot be read or written.
    #[error("certificate payload invalid: {0}")]
    Certificate(String),
}

/// The claims signed into a certificate barcode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CwtClaims {
    /// Issuer country code.
    pub issuer: String,

    /// Issued-at, epoch seconds.
    pub issued_at: i64,

    /// Expiry, epoch seconds.
    pub expires_at: i64,

    /// The condensed certificate.
    pub certificate: HealthCertificate,
}

impl CwtClaims {
    /// Assemble claims for a certificate issued now and expiring at the end
    /// of its validity window.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>,
        certificate: HealthCertificate,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            issued_at: issued_at.timestamp(),
            expires_at: expires_at.timestamp(),
            certificate,
        }
    }

    /// Expiry as a timestamp, when representable.
    #[must_use]
    pub fn expires(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }

    /// Issued-at as a timestamp, when representable.
    #[must_use]
    pub fn issued(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.issued_at, 0)
    }
}

impl TryFrom<&CwtClaims> for Value {
    type Error = CwtError;

    fn try_from(claims: &CwtClaims) -> Result<Self, CwtError> {
        let certificate = Self::serialized(&claims.certificate)
            .map_err(|e| CwtError::Certificate(e.to_string()))?;
        Ok(Self::Map(vec![
            (Self::Integer(CLAIM_ISSUER.into()), Self::Text(claims.issuer.clone())),
            (Self::Integer(CLAIM_EXPIRES.into()), Self::Integer(claims.expires_at.into())),
            (Self::Integer(CLAIM_ISSUED_AT.into()), Self::Integer(claims.issued_at.into())),
            (
                Self::Integer(CLAIM_HCERT.into()),
                Self::Map(vec![(Self::Integer(HCERT_CONTAINER_KEY.into()), certificate)]),
            ),
        ]))
    }
}

impl TryFrom<Value> for CwtClaims {
    type Error = CwtError;

    fn try_from(value: Value) -> Result<Self, CwtError> {
        let Value::Map(entries) = value else {
            return Err(CwtError::NotAMap);
        };

        let mut issuer = None;
        let mut issued_at = None;
        let mut expires_at = None;
        let mut certificate = None;

        for (key, value) in entries {
            let Value::Integer(key) = key else { continue };
            let key = i128::from(key);

            if key == i128::from(CLAIM_ISSUER) {
                issuer = Some(
                    value.into_text().map_err(|_| CwtError::InvalidClaim(CLAIM_ISSUER))?,
                );
            } else if key == i128::from(CLAIM_EXPIRES) {
                expires_at = Some(claim_i64(&value, CLAIM_EXPIRES)?);
            } else if key == i128::from(CLAIM_ISSUED_AT) {
                issued_at = Some(claim_i64(&value, CLAIM_ISSUED_AT)?);
            } else if key == i128::from(CLAIM_HCERT) {
                let Value::Map(container) = value else {
                    return Err(CwtError::InvalidClaim(CLAIM_HCERT));
                };
                for (inner_key, inner) in container {
                    if inner_key == Value::Integer(HCERT_CONTAINER_KEY.into()) {
                        certificate = Some(
                            inner
                                .deserialized()
                                .map_err(|e| CwtError::Certificate(e.to_string()))?,
                        );
                    }
                }
            }
        }

        Ok(Self {
            issuer: issuer.ok_or(CwtError::MissingClaim(CLAIM_ISSUER))?,
            issued_at: issued_at.ok_or(CwtError::MissingClaim(CLAIM_ISSUED_AT))?,
            expires_at: expires_at.ok_or(CwtError::MissingClaim(CLAIM_EXPIRES))?,
            certificate: certificate.ok_or(CwtError::MissingClaim(CLAIM_HCERT))?,
        })
    }
}

fn claim_i64(value: &Value, claim: i64) -> Result<i64, CwtError> {
    value
        .as_integer()
        .and_then(|i| i64::try_from(i).ok())
        .ok_or(CwtError::InvalidClaim(claim))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use hcert_schema::{Name, SCHEMA_VERSION};

    use super::*;

    fn certificate() -> HealthCertificate {
        HealthCertificate {
            ver: SCHEMA_VERSION.into(),
            nam: Name {
                family: Some("Person".into()),
                fnt: "PERSON".into(),
                given: Some("Normal".into()),
                gnt: Some("NORMAL".into()),
            },
            dob: Some("1980-05-17".into()),
            v: None,
            t: None,
            r: None,
            d: None,
        }
    }

    #[test]
    fn claims_value_roundtrip() {
        let issued = Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap();
        let expires = Utc.with_ymd_and_hms(2022, 6, 1, 12, 0, 0).unwrap();
        let claims = CwtClaims::new("GB", issued, expires, certificate());

        let value = Value::try_from(&claims).expect("should render");
        let back = CwtClaims::try_from(value).expect("should parse");
        assert_eq!(back, claims);
        assert_eq!(back.issued(), Some(issued));
        assert_eq!(back.expires(), Some(expires));
    }

    #[test]
    fn missing_expiry_reported() {
        let claims = CwtClaims::new("GB", Utc::now(), Utc::now(), certificate());
        let Value::Map(mut entries) = Value::try_from(&claims).unwrap() else {
            panic!("expected map");
        };
        entries.retain(|(k, _)| *k != Value::Integer(CLAIM_EXPIRES.into()));

        let err = CwtClaims::try_from(Value::Map(entries)).expect_err("should fail");
        assert!(matches!(err, CwtError::MissingClaim(CLAIM_EXPIRES)));
    }

    #[test]
    fn non_map_rejected() {
        let err = CwtClaims::try_from(Value::Text("nope".into())).expect_err("should fail");
        assert!(matches!(err, CwtError::NotAMap));
    }
}
