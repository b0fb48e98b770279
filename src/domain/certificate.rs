//! Certificate domain model.
//!
//! `CertificateRecord` is the canonical representation of an X.509
//! certificate read from the directory. It is constructed fully by the parser
//! or not at all; no partially populated records circulate.

use chrono::{DateTime, Utc};
use serde::Serialize;

// ====== Classification ======

/// Certificate classification. Directory placement is authoritative: entries
/// live under a classification container, and import already sorted them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CertClass {
    /// Country signing certificate authority.
    Csca,
    /// Document signer certificate.
    Dsc,
    /// Document signer certificate, non-compliant.
    DscNc,
    /// Master-list signing certificate.
    Mlsc,
    /// Link certificate (CSCA key rollover).
    Link,
}

impl CertClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertClass::Csca => "csca",
            CertClass::Dsc => "dsc",
            CertClass::DscNc => "dscnc",
            CertClass::Mlsc => "mlsc",
            CertClass::Link => "link",
        }
    }

    pub fn parse(s: &str) -> Option<CertClass> {
        match s.to_ascii_lowercase().as_str() {
            "csca" => Some(CertClass::Csca),
            "dsc" => Some(CertClass::Dsc),
            "dscnc" => Some(CertClass::DscNc),
            "mlsc" => Some(CertClass::Mlsc),
            "link" => Some(CertClass::Link),
            _ => None,
        }
    }
}

impl std::fmt::Display for CertClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ====== Distinguished-name components ======

/// Structured split of an X.500 name. Attributes the schema does not model
/// are preserved in `extra` as `(oid, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DnComponents {
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub common_name: Option<String>,
    pub serial_number: Option<String>,
    pub extra: Vec<(String, String)>,
}

// ====== Certificate record ======

/// Canonical domain representation of a parsed X.509 certificate.
///
/// `fingerprint` is always the SHA-256 digest of the exact DER bytes,
/// recomputed locally. `country` and `class` come from directory placement,
/// never from certificate content; `self_signed` comes from certificate
/// content, never from placement.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateRecord {
    pub entry_dn: String,
    pub subject: String,
    pub issuer: String,
    pub common_name: Option<String>,
    pub serial: String,
    pub fingerprint: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub country: Option<String>,
    pub class: Option<CertClass>,
    pub version: u32,
    pub signature_algorithm: String,
    pub public_key_algorithm: String,
    pub key_size_bits: Option<u32>,
    pub curve: Option<String>,
    pub key_usage: Vec<String>,
    pub extended_key_usage: Vec<String>,
    pub is_ca: bool,
    pub path_len_constraint: Option<u32>,
    pub subject_key_id: Option<String>,
    pub authority_key_id: Option<String>,
    pub crl_distribution_points: Vec<String>,
    pub ocsp_url: Option<String>,
    pub self_signed: bool,
    pub subject_components: DnComponents,
    pub issuer_components: DnComponents,
}

// ====== Search ======

/// Criteria for a directory certificate search. `country` and `class` are
/// honored through subtree placement; `fingerprint` through the entry RDN
/// filter; `serial` against the parsed certificate.
#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    pub country: Option<String>,
    pub class: Option<CertClass>,
    pub fingerprint: Option<String>,
    pub serial: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

/// One page of matched certificates plus the total match count across the
/// whole criteria, for pagination UIs.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub records: Vec<CertificateRecord>,
    pub total_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_round_trips_through_str() {
        for class in [
            CertClass::Csca,
            CertClass::Dsc,
            CertClass::DscNc,
            CertClass::Mlsc,
            CertClass::Link,
        ] {
            assert_eq!(CertClass::parse(class.as_str()), Some(class));
        }
        assert_eq!(CertClass::parse("DSC"), Some(CertClass::Dsc));
        assert_eq!(CertClass::parse("unknown"), None);
    }
}
