//! Binary certificate parsing.
//!
//! Decodes a DER-encoded X.509 certificate into the canonical
//! `CertificateRecord`. Parsing either fully succeeds or fails the entry;
//! no partially populated record is ever produced.
//!
//! Three sourcing rules hold throughout:
//! - classification and country come from DN placement, not certificate
//!   content (directory import already sorted entries by type);
//! - the self-signed flag comes from comparing parsed subject and issuer,
//!   not from DN placement;
//! - the fingerprint is recomputed locally as SHA-256 over the exact DER
//!   bytes, never trusted from a stored attribute.

use sha2::{Digest, Sha256};
use x509_parser::der_parser::oid::Oid;
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

use crate::directory::layout::DirectoryLayout;
use crate::domain::{CertificateRecord, DnComponents};
use crate::error::{Result, StoreError};

/// Parse one directory entry's DER payload into a certificate record.
pub fn parse_entry(entry_dn: &str, der: &[u8]) -> Result<CertificateRecord> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| StoreError::malformed(format!("bad DER for {entry_dn}: {e}")))?;

    let subject = cert.subject().to_string();
    let issuer = cert.issuer().to_string();
    let subject_components = dn_components(cert.subject());
    let issuer_components = dn_components(cert.issuer());

    let not_before = chrono::DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0)
        .ok_or_else(|| StoreError::malformed(format!("invalid notBefore in {entry_dn}")))?;
    let not_after = chrono::DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .ok_or_else(|| StoreError::malformed(format!("invalid notAfter in {entry_dn}")))?;

    let spki = cert.public_key();
    let (public_key_algorithm, key_size_bits, curve) = public_key_info(spki);

    let (is_ca, path_len_constraint) = match cert
        .basic_constraints()
        .map_err(|e| StoreError::malformed(format!("bad basicConstraints in {entry_dn}: {e}")))?
    {
        Some(bc) => (bc.value.ca, bc.value.path_len_constraint),
        None => (false, None),
    };

    let key_usage = cert
        .key_usage()
        .map_err(|e| StoreError::malformed(format!("bad keyUsage in {entry_dn}: {e}")))?
        .map(|ku| key_usage_names(ku.value))
        .unwrap_or_default();

    let extended_key_usage = cert
        .extended_key_usage()
        .map_err(|e| StoreError::malformed(format!("bad extendedKeyUsage in {entry_dn}: {e}")))?
        .map(|eku| extended_key_usage_names(eku.value))
        .unwrap_or_default();

    let mut subject_key_id = None;
    let mut authority_key_id = None;
    let mut crl_distribution_points = Vec::new();
    let mut ocsp_url = None;
    for extension in cert.extensions() {
        match extension.parsed_extension() {
            ParsedExtension::SubjectKeyIdentifier(ki) => {
                subject_key_id = Some(hex::encode(ki.0));
            }
            ParsedExtension::AuthorityKeyIdentifier(aki) => {
                authority_key_id = aki.key_identifier.as_ref().map(|ki| hex::encode(ki.0));
            }
            ParsedExtension::CRLDistributionPoints(points) => {
                for point in &points.points {
                    if let Some(DistributionPointName::FullName(names)) = &point.distribution_point
                    {
                        for name in names {
                            if let GeneralName::URI(uri) = name {
                                crl_distribution_points.push(uri.to_string());
                            }
                        }
                    }
                }
            }
            ParsedExtension::AuthorityInfoAccess(aia) => {
                for desc in &aia.accessdescs {
                    if desc.access_method.to_id_string() == OID_AD_OCSP {
                        if let GeneralName::URI(uri) = &desc.access_location {
                            ocsp_url = Some(uri.to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok(CertificateRecord {
        entry_dn: entry_dn.to_string(),
        common_name: subject_components.common_name.clone(),
        serial: cert.serial.to_str_radix(16),
        fingerprint: fingerprint(der),
        not_before,
        not_after,
        country: DirectoryLayout::country_from_dn(entry_dn),
        class: DirectoryLayout::class_from_dn(entry_dn),
        version: cert.version().0 + 1,
        signature_algorithm: algorithm_name(&cert.signature_algorithm.algorithm),
        public_key_algorithm,
        key_size_bits,
        curve,
        key_usage,
        extended_key_usage,
        is_ca,
        path_len_constraint,
        subject_key_id,
        authority_key_id,
        crl_distribution_points,
        ocsp_url,
        self_signed: subject == issuer,
        subject,
        issuer,
        subject_components,
        issuer_components,
    })
}

/// SHA-256 fingerprint over the exact DER bytes, lowercase hex.
pub fn fingerprint(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

const OID_AD_OCSP: &str = "1.3.6.1.5.5.7.48.1";
const OID_DN_SERIAL_NUMBER: &str = "2.5.4.5";

fn dn_components(name: &X509Name<'_>) -> DnComponents {
    let mut components = DnComponents::default();
    for attribute in name.iter_attributes() {
        let value = match attribute.as_str() {
            Ok(v) => v.to_string(),
            Err(_) => continue,
        };
        let oid = attribute.attr_type().to_id_string();
        match oid.as_str() {
            "2.5.4.6" => components.country = Some(value),
            "2.5.4.8" => components.state = Some(value),
            "2.5.4.7" => components.locality = Some(value),
            "2.5.4.10" => components.organization = Some(value),
            "2.5.4.11" => components.organizational_unit = Some(value),
            "2.5.4.3" => components.common_name = Some(value),
            OID_DN_SERIAL_NUMBER => components.serial_number = Some(value),
            _ => components.extra.push((oid.clone(), value)),
        }
    }
    components
}

fn public_key_info(spki: &SubjectPublicKeyInfo<'_>) -> (String, Option<u32>, Option<String>) {
    let algorithm = algorithm_name(&spki.algorithm.algorithm);
    match spki.parsed() {
        Ok(PublicKey::RSA(rsa)) => (algorithm, Some(rsa.key_size() as u32), None),
        Ok(PublicKey::EC(point)) => {
            let curve = spki
                .algorithm
                .parameters
                .as_ref()
                .and_then(|p| p.as_oid().ok())
                .map(|oid| curve_name(&oid));
            (algorithm, Some(point.key_size() as u32), curve)
        }
        _ => (algorithm, None, None),
    }
}

fn key_usage_names(ku: &KeyUsage) -> Vec<String> {
    let flags: [(&str, bool); 9] = [
        ("digitalSignature", ku.digital_signature()),
        ("nonRepudiation", ku.non_repudiation()),
        ("keyEncipherment", ku.key_encipherment()),
        ("dataEncipherment", ku.data_encipherment()),
        ("keyAgreement", ku.key_agreement()),
        ("keyCertSign", ku.key_cert_sign()),
        ("cRLSign", ku.crl_sign()),
        ("encipherOnly", ku.encipher_only()),
        ("decipherOnly", ku.decipher_only()),
    ];
    flags
        .into_iter()
        .filter(|(_, set)| *set)
        .map(|(name, _)| name.to_string())
        .collect()
}

fn extended_key_usage_names(eku: &ExtendedKeyUsage) -> Vec<String> {
    let mut names = Vec::new();
    if eku.any {
        names.push("anyExtendedKeyUsage".to_string());
    }
    let flags: [(&str, bool); 6] = [
        ("serverAuth", eku.server_auth),
        ("clientAuth", eku.client_auth),
        ("codeSigning", eku.code_signing),
        ("emailProtection", eku.email_protection),
        ("timeStamping", eku.time_stamping),
        ("ocspSigning", eku.ocsp_signing),
    ];
    for (name, set) in flags {
        if set {
            names.push(name.to_string());
        }
    }
    for oid in &eku.other {
        names.push(oid.to_id_string());
    }
    names
}

fn algorithm_name(oid: &Oid<'_>) -> String {
    match oid.to_id_string().as_str() {
        "1.2.840.113549.1.1.1" => "rsaEncryption".to_string(),
        "1.2.840.113549.1.1.5" => "sha1WithRSAEncryption".to_string(),
        "1.2.840.113549.1.1.11" => "sha256WithRSAEncryption".to_string(),
        "1.2.840.113549.1.1.12" => "sha384WithRSAEncryption".to_string(),
        "1.2.840.113549.1.1.13" => "sha512WithRSAEncryption".to_string(),
        "1.2.840.113549.1.1.10" => "rsassaPss".to_string(),
        "1.2.840.10045.2.1" => "id-ecPublicKey".to_string(),
        "1.2.840.10045.4.3.2" => "ecdsa-with-SHA256".to_string(),
        "1.2.840.10045.4.3.3" => "ecdsa-with-SHA384".to_string(),
        "1.2.840.10045.4.3.4" => "ecdsa-with-SHA512".to_string(),
        other => other.to_string(),
    }
}

fn curve_name(oid: &Oid<'_>) -> String {
    match oid.to_id_string().as_str() {
        "1.2.840.10045.3.1.7" => "prime256v1".to_string(),
        "1.3.132.0.34" => "secp384r1".to_string(),
        "1.3.132.0.35" => "secp521r1".to_string(),
        "1.3.36.3.3.2.8.1.1.7" => "brainpoolP256r1".to_string(),
        "1.3.36.3.3.2.8.1.1.11" => "brainpoolP384r1".to_string(),
        "1.3.36.3.3.2.8.1.1.13" => "brainpoolP512r1".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CertClass;
    use crate::test_utils::fixtures::{TEST_CSCA_DER, TEST_DSC_DER};

    const ROOT: &str = "dc=data,dc=pkd,dc=example";
    const CSCA_SHA256: &str =
        "d9a0c42e66dd8e024bf52d86b3a1c35dd84befa7d6c145672aa129bf7e30aa52";
    const DSC_SHA256: &str =
        "7f439d0a4b407f3675a944d7733e66dfb93a63ea10acc4dcfc7d490cc1c17064";

    fn csca_dn() -> String {
        format!("cn={CSCA_SHA256},o=csca,c=KR,{ROOT}")
    }

    fn dsc_dn() -> String {
        format!("cn={DSC_SHA256},o=dsc,c=KR,{ROOT}")
    }

    #[test]
    fn parses_self_signed_csca() {
        let record = parse_entry(&csca_dn(), TEST_CSCA_DER).unwrap();

        assert_eq!(record.common_name.as_deref(), Some("Test CSCA"));
        assert_eq!(record.serial, "1122334455");
        assert_eq!(record.fingerprint, CSCA_SHA256);
        assert_eq!(record.country.as_deref(), Some("KR"));
        assert_eq!(record.class, Some(CertClass::Csca));
        assert_eq!(record.version, 3);
        assert_eq!(record.signature_algorithm, "sha256WithRSAEncryption");
        assert_eq!(record.public_key_algorithm, "rsaEncryption");
        assert_eq!(record.key_size_bits, Some(2048));
        assert_eq!(record.curve, None);
        assert!(record.is_ca);
        assert_eq!(record.path_len_constraint, Some(0));
        assert!(record.key_usage.contains(&"keyCertSign".to_string()));
        assert!(record.key_usage.contains(&"cRLSign".to_string()));
        assert!(record.self_signed);
        assert_eq!(record.subject, record.issuer);
        assert!(record.subject_key_id.is_some());
        assert_eq!(
            record.crl_distribution_points,
            vec!["http://pkd.example.test/crl/csca.crl".to_string()]
        );
        assert_eq!(record.subject_components.country.as_deref(), Some("KR"));
        assert_eq!(
            record.subject_components.serial_number.as_deref(),
            Some("001")
        );
        assert!(record.not_before < record.not_after);
    }

    #[test]
    fn parses_ca_issued_dsc() {
        let record = parse_entry(&dsc_dn(), TEST_DSC_DER).unwrap();

        assert_eq!(record.common_name.as_deref(), Some("Test DSC 01"));
        assert_eq!(record.serial, "66778899aa");
        assert_eq!(record.fingerprint, DSC_SHA256);
        assert_eq!(record.class, Some(CertClass::Dsc));
        assert_eq!(record.public_key_algorithm, "id-ecPublicKey");
        assert_eq!(record.key_size_bits, Some(256));
        assert_eq!(record.curve.as_deref(), Some("prime256v1"));
        assert_eq!(record.signature_algorithm, "sha256WithRSAEncryption");
        assert!(!record.is_ca);
        assert_eq!(record.key_usage, vec!["digitalSignature".to_string()]);
        assert_eq!(
            record.extended_key_usage,
            vec!["clientAuth".to_string()]
        );
        assert_eq!(
            record.ocsp_url.as_deref(),
            Some("http://pkd.example.test/ocsp")
        );
        assert!(!record.self_signed);
        assert_ne!(record.subject, record.issuer);
        assert!(record.authority_key_id.is_some());
        assert_eq!(record.issuer_components.common_name.as_deref(), Some("Test CSCA"));
    }

    #[test]
    fn self_signed_follows_content_not_placement() {
        // Same DSC payload filed under a CSCA container: placement must not
        // make it self-signed, and the class still follows the DN.
        let dn = format!("cn={DSC_SHA256},o=csca,c=KR,{ROOT}");
        let record = parse_entry(&dn, TEST_DSC_DER).unwrap();
        assert!(!record.self_signed);
        assert_eq!(record.class, Some(CertClass::Csca));
    }

    #[test]
    fn fingerprint_is_sha256_of_der_and_attribute_independent() {
        assert_eq!(fingerprint(TEST_CSCA_DER), CSCA_SHA256);
        assert_eq!(fingerprint(TEST_CSCA_DER), fingerprint(TEST_CSCA_DER));
        // DN metadata does not influence the digest.
        let elsewhere = parse_entry("cn=x,o=link,c=DE,o=other", TEST_CSCA_DER).unwrap();
        assert_eq!(elsewhere.fingerprint, CSCA_SHA256);
    }

    #[test]
    fn placement_outside_containers_leaves_country_and_class_absent() {
        let record = parse_entry(ROOT, TEST_CSCA_DER).unwrap();
        assert_eq!(record.country, None);
        assert_eq!(record.class, None);
    }

    #[test]
    fn malformed_der_fails_the_entry() {
        let err = parse_entry("cn=junk,o=dsc,c=KR,dc=x", b"\x30\x03\x02\x01\x01").unwrap_err();
        assert!(matches!(err, StoreError::Malformed(_)));
    }
}
