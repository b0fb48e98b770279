//! Directory-backed certificate repository.
//!
//! Reads treat the directory as the authoritative certificate store: every
//! operation resolves a DN-scoped base from the criteria, fetches binary
//! payloads, and parses them in-process. Writes go through the same layout,
//! so the subtree structure stays consistent with what searches expect.

use std::collections::HashSet;

use ldap3::{Scope, SearchEntry};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::directory::client::{is_already_exists, DirectoryClient};
use crate::directory::layout::{DirectoryLayout, CERT_ATTR, CERT_ATTR_PLAIN, CERT_OBJECT_CLASS};
use crate::directory::parser;
use crate::domain::{CertClass, CertificateRecord, SearchCriteria, SearchResult};
use crate::error::{Result, StoreError};

pub struct CertificateDirectory {
    // One session per repository; the mutex serializes callers because the
    // underlying client is not safe for concurrent operations.
    client: Mutex<DirectoryClient>,
    layout: DirectoryLayout,
}

impl CertificateDirectory {
    pub fn new(client: DirectoryClient, layout: DirectoryLayout) -> CertificateDirectory {
        CertificateDirectory {
            client: Mutex::new(client),
            layout,
        }
    }

    /// Build the repository straight from configuration; the subtree root is
    /// the configured base DN. The session is established lazily on first use.
    pub fn from_config(config: crate::config::DirectoryConfig) -> CertificateDirectory {
        let layout = DirectoryLayout::new(config.base_dn.clone());
        CertificateDirectory::new(DirectoryClient::new(config), layout)
    }

    /// Paginated certificate search. The page is cut client-side from the
    /// deterministically ordered full match, so `total_count` always reflects
    /// the whole criteria match, not the page size.
    pub async fn search(&self, criteria: &SearchCriteria) -> Result<SearchResult> {
        let base = self
            .layout
            .base_dn(criteria.country.as_deref(), criteria.class);
        let filter = DirectoryLayout::build_filter(criteria);
        let entries = {
            let mut client = self.client.lock().await;
            client
                .search(&base, Scope::Subtree, &filter, &[CERT_ATTR, CERT_ATTR_PLAIN])
                .await?
        };
        let raw: Vec<(String, Option<Vec<u8>>)> = entries
            .into_iter()
            .map(|entry| {
                let der = certificate_binary(&entry);
                (entry.dn, der)
            })
            .collect();
        Ok(assemble_page(raw, criteria))
    }

    /// Direct read by identity. Absence is a not-found failure, never a
    /// zero-valued record.
    pub async fn get_by_dn(&self, dn: &str) -> Result<CertificateRecord> {
        let entry = self.read_entry(dn).await?;
        let der = certificate_binary(&entry).ok_or_else(|| {
            StoreError::malformed(format!("entry {dn} has no certificate attribute"))
        })?;
        parser::parse_entry(dn, &der)
    }

    /// Raw DER bytes without parsing, for re-export or external hashing.
    pub async fn get_certificate_binary(&self, dn: &str) -> Result<Vec<u8>> {
        let entry = self.read_entry(dn).await?;
        certificate_binary(&entry).ok_or_else(|| {
            StoreError::malformed(format!("entry {dn} has no certificate attribute"))
        })
    }

    /// Write-through store. The entry DN is derived from the recomputed
    /// fingerprint; malformed input is rejected before anything touches the
    /// directory. Re-storing an existing certificate replaces its binary
    /// attribute. Returns the entry DN.
    pub async fn store(&self, der: &[u8], country: &str, class: CertClass) -> Result<String> {
        let fingerprint = parser::fingerprint(der);
        let dn = self.layout.entry_dn(country, class, &fingerprint);
        parser::parse_entry(&dn, der)?;

        let attrs: Vec<(Vec<u8>, HashSet<Vec<u8>>)> = vec![
            (
                b"objectClass".to_vec(),
                [b"top".to_vec(), CERT_OBJECT_CLASS.as_bytes().to_vec()]
                    .into_iter()
                    .collect(),
            ),
            (
                b"cn".to_vec(),
                [fingerprint.as_bytes().to_vec()].into_iter().collect(),
            ),
            (
                CERT_ATTR.as_bytes().to_vec(),
                [der.to_vec()].into_iter().collect(),
            ),
        ];

        let mut client = self.client.lock().await;
        match client.add(&dn, attrs).await {
            Ok(()) => {
                info!(dn = %dn, "stored certificate entry");
                Ok(dn)
            }
            Err(e) if is_already_exists(&e) => {
                client
                    .replace_attr(&dn, CERT_ATTR.as_bytes(), vec![der.to_vec()])
                    .await?;
                info!(dn = %dn, "replaced certificate binary on existing entry");
                Ok(dn)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove one certificate entry; absent entries are a not-found failure.
    pub async fn remove(&self, dn: &str) -> Result<()> {
        let mut client = self.client.lock().await;
        client.delete(dn).await?;
        info!(dn = %dn, "removed certificate entry");
        Ok(())
    }

    /// Gracefully release the directory session.
    pub async fn close(&self) {
        self.client.lock().await.close().await;
    }

    async fn read_entry(&self, dn: &str) -> Result<SearchEntry> {
        let mut client = self.client.lock().await;
        let entries = client
            .search(dn, Scope::Base, "(objectClass=*)", &[CERT_ATTR, CERT_ATTR_PLAIN])
            .await?;
        entries
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found(format!("directory entry {dn} does not exist")))
    }
}

/// Pull the DER payload out of a search entry, whichever attribute name
/// supplied it.
fn certificate_binary(entry: &SearchEntry) -> Option<Vec<u8>> {
    for attr in [CERT_ATTR, CERT_ATTR_PLAIN] {
        if let Some(values) = entry.bin_attrs.get(attr) {
            if let Some(der) = values.first() {
                return Some(der.clone());
            }
        }
        // Some servers deliver even binary attributes on the string map.
        if let Some(values) = entry.attrs.get(attr) {
            if let Some(der) = values.first() {
                return Some(der.clone().into_bytes());
            }
        }
    }
    None
}

/// Pure page assembly over raw `(dn, payload)` entries: parse, enforce
/// DN-derived criteria, order deterministically by DN, then cut the page.
///
/// Per-entry failures (missing payload, malformed DER) skip that entry with
/// a warning and never abort the page; skipped entries are excluded from
/// `total_count`.
fn assemble_page(
    entries: Vec<(String, Option<Vec<u8>>)>,
    criteria: &SearchCriteria,
) -> SearchResult {
    let mut records: Vec<CertificateRecord> = Vec::with_capacity(entries.len());
    for (dn, payload) in entries {
        let der = match payload {
            Some(der) => der,
            None => {
                warn!(dn = %dn, "skipping entry without certificate attribute");
                continue;
            }
        };
        match parser::parse_entry(&dn, &der) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(dn = %dn, error = %e, "skipping unparsable certificate entry");
            }
        }
    }

    if let Some(class) = criteria.class {
        records.retain(|r| r.class == Some(class));
    }
    if let Some(country) = &criteria.country {
        let country = country.to_uppercase();
        records.retain(|r| r.country.as_deref() == Some(country.as_str()));
    }
    if let Some(serial) = &criteria.serial {
        let serial = serial.to_lowercase();
        records.retain(|r| r.serial == serial);
    }

    records.sort_by(|a, b| a.entry_dn.cmp(&b.entry_dn));
    let total_count = records.len();
    let records = records
        .into_iter()
        .skip(criteria.offset)
        .take(if criteria.limit == 0 {
            usize::MAX
        } else {
            criteria.limit
        })
        .collect();
    SearchResult {
        records,
        total_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::{TEST_CSCA_DER, TEST_DSC_DER};

    const ROOT: &str = "dc=data,dc=pkd,dc=example";

    fn dn(country: &str, class: &str, cn: &str) -> String {
        format!("cn={cn},o={class},c={country},{ROOT}")
    }

    fn mixed_entries() -> Vec<(String, Option<Vec<u8>>)> {
        vec![
            (dn("KR", "dsc", "aaa"), Some(TEST_DSC_DER.to_vec())),
            (dn("KR", "dsc", "bbb"), Some(TEST_DSC_DER.to_vec())),
            (dn("KR", "dsc", "ccc"), Some(TEST_DSC_DER.to_vec())),
            (dn("KR", "csca", "ddd"), Some(TEST_CSCA_DER.to_vec())),
            (dn("DE", "dsc", "eee"), Some(TEST_DSC_DER.to_vec())),
        ]
    }

    #[test]
    fn search_matches_criteria_and_reports_full_total() {
        let criteria = SearchCriteria {
            country: Some("KR".into()),
            class: Some(CertClass::Dsc),
            limit: 10,
            ..Default::default()
        };
        let result = assemble_page(mixed_entries(), &criteria);
        assert_eq!(result.total_count, 3);
        assert_eq!(result.records.len(), 3);
        let expected = parser::fingerprint(TEST_DSC_DER);
        for record in &result.records {
            assert_eq!(record.fingerprint, expected);
            assert_eq!(record.class, Some(CertClass::Dsc));
            assert_eq!(record.country.as_deref(), Some("KR"));
        }
    }

    #[test]
    fn pagination_partitions_the_ordered_match_without_gaps_or_overlap() {
        let entries = mixed_entries();
        let mut seen = Vec::new();
        let limit = 2;
        for step in 0..3 {
            let criteria = SearchCriteria {
                offset: step * limit,
                limit,
                ..Default::default()
            };
            let page = assemble_page(entries.clone(), &criteria);
            assert_eq!(page.total_count, 5);
            assert_eq!(page.records.len(), usize::min(limit, 5 - step * limit));
            seen.extend(page.records.iter().map(|r| r.entry_dn.clone()));
        }
        let unique: std::collections::HashSet<_> = seen.iter().collect();
        assert_eq!(seen.len(), 5);
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn search_skips_malformed_entries_and_keeps_the_rest() {
        let mut entries = mixed_entries();
        entries.push((dn("KR", "dsc", "broken"), Some(vec![0x30, 0x01, 0x00])));
        entries.push((dn("KR", "dsc", "empty"), None));

        let criteria = SearchCriteria {
            country: Some("KR".into()),
            class: Some(CertClass::Dsc),
            limit: 10,
            ..Default::default()
        };
        let result = assemble_page(entries, &criteria);
        assert_eq!(result.total_count, 3);
        assert!(result.records.iter().all(|r| !r.entry_dn.contains("broken")));
    }

    #[test]
    fn serial_criterion_filters_on_parsed_content() {
        let criteria = SearchCriteria {
            serial: Some("66778899AA".into()),
            limit: 10,
            ..Default::default()
        };
        let result = assemble_page(mixed_entries(), &criteria);
        assert_eq!(result.total_count, 4);
        assert!(result.records.iter().all(|r| r.serial == "66778899aa"));
    }

    #[test]
    fn zero_limit_means_no_page_cut() {
        let criteria = SearchCriteria {
            limit: 0,
            ..Default::default()
        };
        let result = assemble_page(mixed_entries(), &criteria);
        assert_eq!(result.records.len(), 5);
        assert_eq!(result.total_count, 5);
    }
}
