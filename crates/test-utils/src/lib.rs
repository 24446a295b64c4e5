//! Test fixtures and in-memory providers for the hcert crates.

mod keystore;
mod trust;
mod uvci;

use chrono::{NaiveDate, TimeZone, Utc};
use hcert_core::RegionConfig;
use hcert_schema::{CanonicalRecord, Claim, Recovery, Subject, TestResult, Vaccination};

pub use keystore::{signing_context, TestKeyStore, SIGNING_KEY_1, SIGNING_KEY_2};
pub use trust::{
    default_value_sets, MemoryTrustGateway, StaticSupplemental, StaticValueSets,
};
pub use uvci::MemoryUvciStore;

/// Opaque user hash of the standard test subject.
pub const NORMAL_USER: &str = "d1f0c2aa55e3";

/// The standard test region.
#[must_use]
pub fn region() -> RegionConfig {
    RegionConfig {
        subscription_key_identifier: "region-test".into(),
        issuing_institution: "NHSX".into(),
        uvci_country_code: "GB".into(),
        issuing_country: "GB".into(),
        signing_certificate_identifier: SIGNING_KEY_1.into(),
        default_result_country: "GB".into(),
        allowed_thumbprints: vec!["AA11BB22CC33".into()],
    }
}

/// The standard test subject.
#[must_use]
pub fn subject() -> Subject {
    Subject {
        family_name: "Person".into(),
        given_name: "Normal".into(),
        date_of_birth: NaiveDate::from_ymd_opt(1980, 5, 17),
    }
}

/// A valid dose-2-of-2 vaccination record.
#[must_use]
pub fn vaccination_record() -> CanonicalRecord {
    CanonicalRecord {
        subject: subject(),
        disease: "840539006".into(),
        issuer: "NHS Digital".into(),
        country: "GB".into(),
        valid_from: Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap(),
        valid_until: Utc.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).unwrap(),
        claim: Claim::Vaccination(Vaccination {
            product: "EU/1/20/1507".into(),
            manufacturer: "ORG-100031184".into(),
            prophylaxis: Some("1119349007".into()),
            dose_number: 2,
            series_doses: 2,
            batch: Some("AB1234".into()),
            vaccinated_on: NaiveDate::from_ymd_opt(2021, 5, 20).unwrap(),
            country: "GB".into(),
            site: None,
        }),
    }
}

/// A valid negative PCR test record.
#[must_use]
pub fn test_record() -> CanonicalRecord {
    CanonicalRecord {
        subject: subject(),
        disease: "840539006".into(),
        issuer: "NHS Digital".into(),
        country: "GB".into(),
        valid_from: Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap(),
        valid_until: Utc.with_ymd_and_hms(2021, 6, 3, 0, 0, 0).unwrap(),
        claim: Claim::Test(TestResult {
            test_type: "LP6464-4".into(),
            result: "260415000".into(),
            sampled_at: Utc.with_ymd_and_hms(2021, 5, 31, 18, 30, 0).unwrap(),
            centre: Some("Test Centre 7".into()),
            device: None,
        }),
    }
}

/// A valid recovery record.
#[must_use]
pub fn recovery_record() -> CanonicalRecord {
    CanonicalRecord {
        subject: subject(),
        disease: "840539006".into(),
        issuer: "NHS Digital".into(),
        country: "GB".into(),
        valid_from: Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap(),
        valid_until: Utc.with_ymd_and_hms(2021, 12, 1, 0, 0, 0).unwrap(),
        claim: Claim::Recovery(Recovery {
            first_positive_on: NaiveDate::from_ymd_opt(2021, 5, 10).unwrap(),
        }),
    }
}
