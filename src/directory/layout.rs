//! Directory tree layout and search-filter synthesis.
//!
//! The directory is organized by country and classification:
//!
//! ```text
//! <root>
//!   c=KR
//!     o=csca    cn=<sha256 fingerprint>  (one entry per certificate)
//!     o=dsc
//!     o=dscnc
//!     o=mlsc
//!     o=link
//!   c=DE
//!     ...
//! ```
//!
//! Country and classification are carried by DN placement, not by searchable
//! attributes, so criteria on them narrow the search base instead of the
//! filter. A wrong base silently returns zero results; the tests pin every
//! resolution case.

use ldap3::{dn_escape, ldap_escape};

use crate::domain::{CertClass, SearchCriteria};

/// Object class marking a certificate-bearing entry.
pub const CERT_OBJECT_CLASS: &str = "pkiUser";
/// Attribute holding the DER payload.
pub const CERT_ATTR: &str = "userCertificate;binary";
/// Fallback attribute name some directories use for the same payload.
pub const CERT_ATTR_PLAIN: &str = "userCertificate";

#[derive(Debug, Clone)]
pub struct DirectoryLayout {
    root: String,
}

impl DirectoryLayout {
    pub fn new(root: impl Into<String>) -> DirectoryLayout {
        DirectoryLayout { root: root.into() }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Search base for the given criteria presence combination. Class
    /// containers nest under country containers, so classification can only
    /// narrow the base when a country is present too; a class-only search
    /// starts at the root and is narrowed by DN post-filtering instead.
    pub fn base_dn(&self, country: Option<&str>, class: Option<CertClass>) -> String {
        match (country, class) {
            (Some(country), Some(class)) => format!(
                "o={},c={},{}",
                class.as_str(),
                dn_escape(country.to_uppercase()),
                self.root
            ),
            (Some(country), None) => {
                format!("c={},{}", dn_escape(country.to_uppercase()), self.root)
            }
            (None, _) => self.root.clone(),
        }
    }

    /// DN of one certificate entry.
    pub fn entry_dn(&self, country: &str, class: CertClass, fingerprint: &str) -> String {
        format!(
            "cn={},{}",
            dn_escape(fingerprint),
            self.base_dn(Some(country), Some(class))
        )
    }

    /// Conjunction of the present non-DN criteria over the object-class
    /// marker. With no criteria the filter matches every certificate entry.
    /// Values are escaped; country/class never appear here (DN placement is
    /// authoritative for both).
    pub fn build_filter(criteria: &SearchCriteria) -> String {
        let marker = format!("(objectClass={CERT_OBJECT_CLASS})");
        let mut terms = Vec::new();
        if let Some(fp) = &criteria.fingerprint {
            terms.push(format!("(cn={})", ldap_escape(fp.to_lowercase())));
        }
        if terms.is_empty() {
            marker
        } else {
            format!("(&{}{})", marker, terms.concat())
        }
    }

    /// Country code from DN placement, uppercased. `None` when the DN sits
    /// above every country container.
    pub fn country_from_dn(dn: &str) -> Option<String> {
        rdn_value(dn, "c").map(|v| v.to_uppercase())
    }

    /// Classification from DN placement. `None` when the DN sits outside any
    /// classification container or the container name is unknown.
    pub fn class_from_dn(dn: &str) -> Option<CertClass> {
        rdn_value(dn, "o").and_then(|v| CertClass::parse(&v))
    }
}

fn rdn_value(dn: &str, attr: &str) -> Option<String> {
    dn.split(',').find_map(|rdn| {
        let (key, value) = rdn.split_once('=')?;
        if key.trim().eq_ignore_ascii_case(attr) {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "dc=data,dc=pkd,dc=example";

    fn layout() -> DirectoryLayout {
        DirectoryLayout::new(ROOT)
    }

    #[test]
    fn base_dn_for_all_presence_combinations() {
        let l = layout();
        assert_eq!(
            l.base_dn(Some("kr"), Some(CertClass::Dsc)),
            format!("o=dsc,c=KR,{ROOT}")
        );
        assert_eq!(l.base_dn(Some("KR"), None), format!("c=KR,{ROOT}"));
        assert_eq!(l.base_dn(None, Some(CertClass::Csca)), ROOT);
        assert_eq!(l.base_dn(None, None), ROOT);
    }

    #[test]
    fn entry_dn_nests_fingerprint_under_class_container() {
        let l = layout();
        assert_eq!(
            l.entry_dn("KR", CertClass::Csca, "deadbeef"),
            format!("cn=deadbeef,o=csca,c=KR,{ROOT}")
        );
    }

    #[test]
    fn filter_without_criteria_matches_the_object_class_marker() {
        assert_eq!(
            DirectoryLayout::build_filter(&SearchCriteria::default()),
            "(objectClass=pkiUser)"
        );
    }

    #[test]
    fn filter_conjunction_contains_only_present_criteria() {
        let criteria = SearchCriteria {
            fingerprint: Some("DEADBEEF".into()),
            ..Default::default()
        };
        assert_eq!(
            DirectoryLayout::build_filter(&criteria),
            "(&(objectClass=pkiUser)(cn=deadbeef))"
        );

        // country/class narrow the base, never the filter
        let criteria = SearchCriteria {
            country: Some("KR".into()),
            class: Some(CertClass::Dsc),
            ..Default::default()
        };
        assert_eq!(
            DirectoryLayout::build_filter(&criteria),
            "(objectClass=pkiUser)"
        );
    }

    #[test]
    fn filter_escapes_request_controlled_values() {
        let criteria = SearchCriteria {
            fingerprint: Some("*)(objectclass=*".into()),
            ..Default::default()
        };
        let filter = DirectoryLayout::build_filter(&criteria);
        assert!(!filter.contains("(objectclass=*)"));
        assert!(filter.to_lowercase().contains("\\2a"), "{filter}");
    }

    #[test]
    fn dn_derivation_recovers_country_and_class() {
        let dn = format!("cn=deadbeef,o=dscnc,c=KR,{ROOT}");
        assert_eq!(DirectoryLayout::country_from_dn(&dn), Some("KR".into()));
        assert_eq!(
            DirectoryLayout::class_from_dn(&dn),
            Some(CertClass::DscNc)
        );

        assert_eq!(DirectoryLayout::country_from_dn(ROOT), None);
        assert_eq!(DirectoryLayout::class_from_dn(ROOT), None);
    }
}
