// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A narrow X.509 reader for certificate-form root keys.
//!
//! Trust pinning needs three things from a root key's certificate: the subject public key, the
//! validity window, and enough of the outer structure to check that the certificate was issued
//! by a pinned CA. This module parses exactly that and nothing more; it does not build chains
//! through intermediates.

use crate::schema::error::{self, Error, Result};
use crate::schema::spki::{self, read_bit_string, read_tlv, TAG_INTEGER, TAG_OID, TAG_SEQUENCE};
use chrono::{DateTime, TimeZone, Utc};
use ring::signature::{self, UnparsedPublicKey};
use untrusted::{Input, Reader};

/// der-encoded 1.2.840.10045.4.3.2 (ecdsa-with-SHA256)
const OID_ECDSA_SHA256: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x02];
/// der-encoded 1.2.840.10045.4.3.3 (ecdsa-with-SHA384)
const OID_ECDSA_SHA384: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x03];
/// der-encoded 1.2.840.113549.1.1.11 (sha256WithRSAEncryption)
const OID_RSA_SHA256: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0b];

const TAG_CONTEXT_0: u8 = 0xa0;
const TAG_UTC_TIME: u8 = 0x17;
const TAG_GENERALIZED_TIME: u8 = 0x18;

/// The signature algorithm a certificate was signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertSignatureAlg {
    /// ecdsa-with-SHA256
    EcdsaSha256,
    /// ecdsa-with-SHA384
    EcdsaSha384,
    /// sha256WithRSAEncryption
    RsaSha256,
}

/// The parts of an X.509 certificate that trust pinning inspects.
#[derive(Debug, Clone)]
pub struct Certificate {
    /// The complete DER bytes of `tbsCertificate`, the portion covered by the signature.
    pub tbs: Vec<u8>,
    /// The algorithm the issuer signed with.
    pub signature_alg: CertSignatureAlg,
    /// The signature bytes.
    pub signature: Vec<u8>,
    /// The complete DER bytes of the subject's `SubjectPublicKeyInfo`.
    pub spki: Vec<u8>,
    /// The DER bytes of the issuer `Name`.
    pub issuer: Vec<u8>,
    /// The DER bytes of the subject `Name`.
    pub subject: Vec<u8>,
    /// Start of the validity window.
    pub not_before: DateTime<Utc>,
    /// End of the validity window.
    pub not_after: DateTime<Utc>,
}

/// Reads one tag-length-value and also returns the full encoding including its header.
fn read_tlv_with_header<'a>(
    r: &mut Reader<'a>,
    tag: u8,
    what: &'static str,
) -> Result<(Input<'a>, Input<'a>)> {
    let start = r.mark();
    let value = read_tlv(r, tag, what)?;
    let end = r.mark();
    let full = r
        .get_input_between_marks(start, end)
        .map_err(|_| Error::SpkiDecode { what })?;
    Ok((full, value))
}

impl Certificate {
    /// Parses a certificate from PEM (`CERTIFICATE` block) or raw DER.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.starts_with(b"-----BEGIN") {
            let pem = pem::parse(bytes).map_err(|_| Error::CertificateParse {
                reason: "invalid PEM wrapper",
            })?;
            Self::parse_der(pem.contents())
        } else {
            Self::parse_der(bytes)
        }
    }

    fn parse_der(der: &[u8]) -> Result<Self> {
        let what = "certificate";
        Input::from(der).read_all(Error::SpkiDecode { what }, |r| {
            let outer = read_tlv(r, TAG_SEQUENCE, what)?;
            let mut outer = Reader::new(outer);

            let (tbs_full, tbs_value) = read_tlv_with_header(&mut outer, TAG_SEQUENCE, what)?;

            let alg_value = read_tlv(&mut outer, TAG_SEQUENCE, what)?;
            let mut alg = Reader::new(alg_value);
            let alg_oid = read_tlv(&mut alg, TAG_OID, what)?;
            let signature_alg = match alg_oid.as_slice_less_safe() {
                oid if oid == OID_ECDSA_SHA256 => CertSignatureAlg::EcdsaSha256,
                oid if oid == OID_ECDSA_SHA384 => CertSignatureAlg::EcdsaSha384,
                oid if oid == OID_RSA_SHA256 => CertSignatureAlg::RsaSha256,
                _ => {
                    return error::KeyUnsupportedSnafu {
                        reason: "unsupported certificate signature algorithm",
                    }
                    .fail()
                }
            };
            let _ = alg.read_bytes_to_end();

            let signature = read_bit_string(&mut outer, what)?;

            // Walk the to-be-signed portion.
            let mut tbs = Reader::new(tbs_value);
            if tbs.peek(TAG_CONTEXT_0) {
                let _version = read_tlv(&mut tbs, TAG_CONTEXT_0, what)?;
            }
            let _serial = read_tlv(&mut tbs, TAG_INTEGER, what)?;
            let _inner_alg = read_tlv(&mut tbs, TAG_SEQUENCE, what)?;
            let (issuer_full, _) = read_tlv_with_header(&mut tbs, TAG_SEQUENCE, what)?;

            let validity = read_tlv(&mut tbs, TAG_SEQUENCE, what)?;
            let mut validity = Reader::new(validity);
            let not_before = read_time(&mut validity)?;
            let not_after = read_time(&mut validity)?;

            let (subject_full, _) = read_tlv_with_header(&mut tbs, TAG_SEQUENCE, what)?;
            let (spki_full, _) = read_tlv_with_header(&mut tbs, TAG_SEQUENCE, what)?;
            let _ = tbs.read_bytes_to_end();

            Ok(Certificate {
                tbs: tbs_full.as_slice_less_safe().to_vec(),
                signature_alg,
                signature: signature.as_slice_less_safe().to_vec(),
                spki: spki_full.as_slice_less_safe().to_vec(),
                issuer: issuer_full.as_slice_less_safe().to_vec(),
                subject: subject_full.as_slice_less_safe().to_vec(),
                not_before,
                not_after,
            })
        })
    }

    /// Checks that `now` falls within the certificate's validity window.
    pub fn check_window(&self, now: DateTime<Utc>) -> Result<()> {
        if now < self.not_before || now > self.not_after {
            return error::CertificateWindowSnafu {
                now,
                not_before: self.not_before,
                not_after: self.not_after,
            }
            .fail();
        }
        Ok(())
    }

    /// Whether this certificate's signature verifies against the given issuer's
    /// `SubjectPublicKeyInfo`. Used to decide whether a root key's certificate was issued by a
    /// pinned CA; a chain of intermediates is not followed.
    pub fn signed_by(&self, issuer_spki: &[u8]) -> bool {
        match self.signature_alg {
            CertSignatureAlg::EcdsaSha256 | CertSignatureAlg::EcdsaSha384 => {
                let (curve, point) = match spki::ecdsa_from_spki(issuer_spki) {
                    Ok(parsed) => parsed,
                    Err(_) => return false,
                };
                let alg: &dyn signature::VerificationAlgorithm =
                    match (self.signature_alg, curve) {
                        (CertSignatureAlg::EcdsaSha256, spki::EcCurve::P256) => {
                            &signature::ECDSA_P256_SHA256_ASN1
                        }
                        (CertSignatureAlg::EcdsaSha384, spki::EcCurve::P384) => {
                            &signature::ECDSA_P384_SHA384_ASN1
                        }
                        _ => return false,
                    };
                UnparsedPublicKey::new(alg, &point)
                    .verify(&self.tbs, &self.signature)
                    .is_ok()
            }
            CertSignatureAlg::RsaSha256 => {
                let rsa_public = match spki::rsa_from_spki(issuer_spki) {
                    Ok(parsed) => parsed,
                    Err(_) => return false,
                };
                UnparsedPublicKey::new(&signature::RSA_PKCS1_2048_8192_SHA256, &rsa_public)
                    .verify(&self.tbs, &self.signature)
                    .is_ok()
            }
        }
    }

    /// Whether this certificate is self-signed (issuer == subject and the signature verifies
    /// against its own key).
    pub fn self_signed(&self) -> bool {
        self.issuer == self.subject && self.signed_by(&self.spki)
    }
}

/// Reads an X.509 `Time`, which is either a `UTCTime` or a `GeneralizedTime`.
fn read_time(r: &mut Reader<'_>) -> Result<DateTime<Utc>> {
    let what = "certificate validity";
    let (tag, value) = if r.peek(TAG_UTC_TIME) {
        (TAG_UTC_TIME, read_tlv(r, TAG_UTC_TIME, what)?)
    } else {
        (TAG_GENERALIZED_TIME, read_tlv(r, TAG_GENERALIZED_TIME, what)?)
    };
    let s = std::str::from_utf8(value.as_slice_less_safe())
        .map_err(|_| Error::SpkiDecode { what })?;
    let s = s.strip_suffix('Z').ok_or(Error::SpkiDecode { what })?;

    let (year, rest) = if tag == TAG_UTC_TIME {
        if s.len() != 12 {
            return error::SpkiDecodeSnafu { what }.fail();
        }
        let yy: i32 = s[..2].parse().map_err(|_| Error::SpkiDecode { what })?;
        // RFC 5280: two-digit years below 50 are in the 2000s.
        (if yy < 50 { 2000 + yy } else { 1900 + yy }, &s[2..])
    } else {
        if s.len() != 14 {
            return error::SpkiDecodeSnafu { what }.fail();
        }
        (
            s[..4].parse().map_err(|_| Error::SpkiDecode { what })?,
            &s[4..],
        )
    };

    let field = |range: std::ops::Range<usize>| -> Result<u32> {
        rest[range].parse().map_err(|_| Error::SpkiDecode { what })
    };
    let (month, day) = (field(0..2)?, field(2..4)?);
    let (hour, minute, second) = (field(4..6)?, field(6..8)?, field(8..10)?);

    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
        .ok_or(Error::SpkiDecode { what })
}

#[cfg(test)]
mod tests {
    use super::Certificate;

    // A throwaway self-signed P-256 certificate generated for these tests:
    //   openssl req -x509 -newkey ec -pkeyopt ec_paramgen_curve:P-256 -nodes \
    //     -subj "/CN=notary-testing" -days 3650
    const SELF_SIGNED: &str = include_str!("../../tests/data/self-signed.pem");

    #[test]
    fn parses_pem_certificate() {
        let cert = Certificate::parse(SELF_SIGNED.as_bytes()).unwrap();
        assert!(!cert.spki.is_empty());
        assert!(cert.not_before < cert.not_after);
    }

    #[test]
    fn self_signed_certificate_verifies() {
        let cert = Certificate::parse(SELF_SIGNED.as_bytes()).unwrap();
        assert!(cert.self_signed());
    }

    #[test]
    fn tampered_tbs_does_not_verify() {
        let mut cert = Certificate::parse(SELF_SIGNED.as_bytes()).unwrap();
        let spki = cert.spki.clone();
        let last = cert.tbs.len() - 1;
        cert.tbs[last] ^= 0xff;
        assert!(!cert.signed_by(&spki));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Certificate::parse(b"not a certificate").is_err());
    }
}
