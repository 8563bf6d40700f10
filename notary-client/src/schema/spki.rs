// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Minimal DER handling for PKIX `SubjectPublicKeyInfo` structures.
//!
//! Metadata carries ECDSA and RSA public keys in SPKI form, while `ring` wants the raw curve
//! point or the bare `RSAPublicKey` sequence. This module walks just enough DER to convert
//! between the two, and builds SPKI wrappers for keys we generate. It is not a general-purpose
//! DER library.

use crate::schema::error::{self, Error, Result};
use untrusted::{Input, Reader};

pub(crate) const TAG_INTEGER: u8 = 0x02;
pub(crate) const TAG_BIT_STRING: u8 = 0x03;
pub(crate) const TAG_OID: u8 = 0x06;
pub(crate) const TAG_SEQUENCE: u8 = 0x30;

/// der-encoded 1.2.840.10045.2.1 (id-ecPublicKey)
const OID_EC_PUBLIC_KEY: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01];
/// der-encoded 1.2.840.10045.3.1.7 (prime256v1)
const OID_P256: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07];
/// der-encoded 1.3.132.0.34 (secp384r1)
const OID_P384: &[u8] = &[0x2b, 0x81, 0x04, 0x00, 0x22];
/// der-encoded 1.2.840.113549.1.1.1 (rsaEncryption)
const OID_RSA_ENCRYPTION: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];

/// The elliptic curves we accept for ECDSA keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    /// NIST P-256, verified with SHA-256.
    P256,
    /// NIST P-384, verified with SHA-384.
    P384,
}

fn fail<T>(what: &'static str) -> Result<T> {
    error::SpkiDecodeSnafu { what }.fail()
}

/// Reads one tag-length-value, returning the value contents. The expected tag must match.
pub(crate) fn read_tlv<'a>(r: &mut Reader<'a>, tag: u8, what: &'static str) -> Result<Input<'a>> {
    let got = r.read_byte().map_err(|_| Error::SpkiDecode { what })?;
    if got != tag {
        return fail(what);
    }
    let length = read_length(r, what)?;
    r.read_bytes(length).map_err(|_| Error::SpkiDecode { what })
}

/// Reads a DER definite length (short or long form).
fn read_length(r: &mut Reader<'_>, what: &'static str) -> Result<usize> {
    let first = r.read_byte().map_err(|_| Error::SpkiDecode { what })?;
    if first & 0x80 == 0 {
        return Ok(first as usize);
    }
    let n = (first & 0x7f) as usize;
    if n == 0 || n > 4 {
        return fail(what);
    }
    let mut length: usize = 0;
    for _ in 0..n {
        let byte = r.read_byte().map_err(|_| Error::SpkiDecode { what })?;
        length = length << 8 | byte as usize;
    }
    Ok(length)
}

/// Reads a BIT STRING value, requiring zero unused bits, and returns the contents.
pub(crate) fn read_bit_string<'a>(
    r: &mut Reader<'a>,
    what: &'static str,
) -> Result<Input<'a>> {
    let value = read_tlv(r, TAG_BIT_STRING, what)?;
    match value.as_slice_less_safe().split_first() {
        // The first octet is the number of unused bits, which must be zero for key material.
        Some((0, payload)) => Ok(Input::from(payload)),
        _ => fail(what),
    }
}

/// Parses an SPKI and returns the curve and the uncompressed point of an ECDSA key.
pub fn ecdsa_from_spki(spki_der: &[u8]) -> Result<(EcCurve, Vec<u8>)> {
    let what = "ecdsa SubjectPublicKeyInfo";
    Input::from(spki_der).read_all(Error::SpkiDecode { what }, |r| {
        let spki = read_tlv(r, TAG_SEQUENCE, what)?;
        let mut spki = Reader::new(spki);
        let alg = read_tlv(&mut spki, TAG_SEQUENCE, what)?;
        let mut alg = Reader::new(alg);
        let alg_oid = read_tlv(&mut alg, TAG_OID, what)?;
        if alg_oid.as_slice_less_safe() != OID_EC_PUBLIC_KEY {
            return fail(what);
        }
        let curve_oid = read_tlv(&mut alg, TAG_OID, what)?;
        let curve = match curve_oid.as_slice_less_safe() {
            oid if oid == OID_P256 => EcCurve::P256,
            oid if oid == OID_P384 => EcCurve::P384,
            _ => {
                return error::KeyUnsupportedSnafu {
                    reason: "unsupported ECDSA curve",
                }
                .fail()
            }
        };
        let point = read_bit_string(&mut spki, what)?;
        Ok((curve, point.as_slice_less_safe().to_vec()))
    })
}

/// Parses an SPKI and returns the bare `RSAPublicKey` DER of an RSA key.
pub fn rsa_from_spki(spki_der: &[u8]) -> Result<Vec<u8>> {
    let what = "rsa SubjectPublicKeyInfo";
    Input::from(spki_der).read_all(Error::SpkiDecode { what }, |r| {
        let spki = read_tlv(r, TAG_SEQUENCE, what)?;
        let mut spki = Reader::new(spki);
        let alg = read_tlv(&mut spki, TAG_SEQUENCE, what)?;
        let mut alg = Reader::new(alg);
        let alg_oid = read_tlv(&mut alg, TAG_OID, what)?;
        if alg_oid.as_slice_less_safe() != OID_RSA_ENCRYPTION {
            return fail(what);
        }
        // rsaEncryption carries a NULL parameter; skip whatever is left of the algorithm.
        let _ = alg.read_bytes_to_end();
        let key = read_bit_string(&mut spki, what)?;
        Ok(key.as_slice_less_safe().to_vec())
    })
}

/// Wraps a bare `RSAPublicKey` DER in a PKIX `SubjectPublicKeyInfo`.
pub fn wrap_rsa_spki(rsa_public_der: &[u8]) -> Vec<u8> {
    let alg = encode_tlv(
        TAG_SEQUENCE,
        &[
            encode_tlv(TAG_OID, &[OID_RSA_ENCRYPTION.to_vec()]),
            vec![0x05, 0x00], // NULL parameters
        ],
    );
    let mut bits = Vec::with_capacity(rsa_public_der.len() + 1);
    bits.push(0); // no unused bits
    bits.extend_from_slice(rsa_public_der);
    let key = encode_tlv(TAG_BIT_STRING, &[bits]);
    encode_tlv(TAG_SEQUENCE, &[alg, key])
}

/// Wraps an uncompressed ECDSA public point in a PKIX `SubjectPublicKeyInfo`.
pub fn wrap_ecdsa_spki(curve: EcCurve, point: &[u8]) -> Vec<u8> {
    let curve_oid = match curve {
        EcCurve::P256 => OID_P256,
        EcCurve::P384 => OID_P384,
    };
    let alg = encode_tlv(
        TAG_SEQUENCE,
        &[
            encode_tlv(TAG_OID, &[OID_EC_PUBLIC_KEY.to_vec()]),
            encode_tlv(TAG_OID, &[curve_oid.to_vec()]),
        ],
    );
    let mut bits = Vec::with_capacity(point.len() + 1);
    bits.push(0); // no unused bits
    bits.extend_from_slice(point);
    let key = encode_tlv(TAG_BIT_STRING, &[bits]);
    encode_tlv(TAG_SEQUENCE, &[alg, key])
}

/// Encodes one tag-length-value from the concatenation of `parts`.
pub(crate) fn encode_tlv(tag: u8, parts: &[Vec<u8>]) -> Vec<u8> {
    let length: usize = parts.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(length + 6);
    out.push(tag);
    if length < 0x80 {
        out.push(length as u8);
    } else {
        let bytes = length.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    for part in parts {
        out.extend_from_slice(part);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{ecdsa_from_spki, wrap_ecdsa_spki, EcCurve};

    #[test]
    fn ecdsa_spki_round_trip() {
        // An uncompressed P-256 point is 65 bytes: 0x04 || x || y.
        let mut point = vec![0x04];
        point.extend_from_slice(&[0x11; 64]);
        let spki = wrap_ecdsa_spki(EcCurve::P256, &point);
        let (curve, parsed) = ecdsa_from_spki(&spki).unwrap();
        assert_eq!(curve, EcCurve::P256);
        assert_eq!(parsed, point);
    }

    #[test]
    fn p384_round_trip() {
        let mut point = vec![0x04];
        point.extend_from_slice(&[0x22; 96]);
        let spki = wrap_ecdsa_spki(EcCurve::P384, &point);
        let (curve, parsed) = ecdsa_from_spki(&spki).unwrap();
        assert_eq!(curve, EcCurve::P384);
        assert_eq!(parsed, point);
    }

    #[test]
    fn truncated_spki_is_rejected() {
        let mut point = vec![0x04];
        point.extend_from_slice(&[0x11; 64]);
        let spki = wrap_ecdsa_spki(EcCurve::P256, &point);
        assert!(ecdsa_from_spki(&spki[..spki.len() - 3]).is_err());
    }

    #[test]
    fn rsa_oid_is_rejected_for_ecdsa() {
        // An RSA SPKI should not parse as ECDSA.
        let alg = super::encode_tlv(
            super::TAG_SEQUENCE,
            &[super::encode_tlv(
                super::TAG_OID,
                &[vec![0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01]],
            )],
        );
        let key = super::encode_tlv(super::TAG_BIT_STRING, &[vec![0, 1, 2, 3]]);
        let spki = super::encode_tlv(super::TAG_SEQUENCE, &[alg, key]);
        assert!(ecdsa_from_spki(&spki).is_err());
    }
}
