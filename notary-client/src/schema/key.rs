// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Public key descriptors as they appear in signed metadata.
//!
//! A key is tagged by `keytype` and carries its public material in `keyval.public`. Root keys may
//! be wrapped in an X.509 certificate (`ecdsa-x509`, `rsa-x509`) so that they can be validated
//! against a pinned certificate authority; the certificate is carried opaquely and the subject
//! public key is extracted when verifying.

use crate::schema::cert::Certificate;
use crate::schema::decoded::{Base64, Decoded, Hex};
use crate::schema::error::{self, Result};
use crate::schema::spki;
use olpc_cjson::CanonicalFormatter;
use ring::digest::{digest, SHA256};
use ring::signature::{self, UnparsedPublicKey};
use serde::{Deserialize, Serialize};
use serde_plain::{forward_display_to_serde, forward_from_str_to_serde};
use snafu::ResultExt;

/// A public key descriptor.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "keytype")]
pub enum Key {
    /// An ECDSA key whose public material is a PKIX `SubjectPublicKeyInfo`.
    #[serde(rename = "ecdsa")]
    Ecdsa {
        /// The public material.
        keyval: KeyVal,
    },

    /// An ECDSA key wrapped in an X.509 certificate (root keys only).
    #[serde(rename = "ecdsa-x509")]
    EcdsaX509 {
        /// The certificate, PEM or DER encoded.
        keyval: KeyVal,
    },

    /// An Ed25519 key whose public material is the raw 32-byte public key.
    #[serde(rename = "ed25519")]
    Ed25519 {
        /// The public material.
        keyval: KeyVal,
    },

    /// An RSA key whose public material is a PKIX `SubjectPublicKeyInfo`.
    #[serde(rename = "rsa")]
    Rsa {
        /// The public material.
        keyval: KeyVal,
    },

    /// An RSA key wrapped in an X.509 certificate (root keys only).
    #[serde(rename = "rsa-x509")]
    RsaX509 {
        /// The certificate, PEM or DER encoded.
        keyval: KeyVal,
    },
}

/// The public (and never the private) material of a key.
///
/// The `private` field is always serialized as `null`; key IDs are digests over this object, so
/// the field must be present for IDs to be stable.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct KeyVal {
    /// Base64-encoded public key material.
    pub public: Decoded<Base64>,

    /// Always `None`. Private material never appears in metadata.
    pub private: Option<Decoded<Base64>>,
}

impl KeyVal {
    /// Creates a `KeyVal` around public material.
    pub fn new(public: Vec<u8>) -> Self {
        Self {
            public: public.into(),
            private: None,
        }
    }
}

/// The signature method recorded alongside each signature.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum SignatureScheme {
    /// ECDSA over NIST P-256 or P-384 with the matching SHA-2, signature as fixed-length `r || s`.
    #[serde(rename = "ecdsa")]
    Ecdsa,

    /// Ed25519.
    #[serde(rename = "ed25519")]
    Ed25519,

    /// RSASSA-PSS with SHA-256.
    #[serde(rename = "rsassa-pss-sha256")]
    RsassaPssSha256,

    /// RSASSA-PKCS1-v1.5 with SHA-256.
    #[serde(rename = "rsapkcs1v15sha256")]
    RsaPkcs1v15Sha256,
}

forward_display_to_serde!(SignatureScheme);
forward_from_str_to_serde!(SignatureScheme);

impl Key {
    /// Calculates the key ID: the hex SHA-256 digest of this object's canonical JSON form.
    ///
    /// The ID is stable across re-serialization because `KeyVal` preserves the original string
    /// encoding of the public material.
    pub fn key_id(&self) -> Result<Decoded<Hex>> {
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, CanonicalFormatter::new());
        self.serialize(&mut ser)
            .context(error::JsonSerializationSnafu { what: "key" })?;
        Ok(Decoded::from(digest(&SHA256, &buf).as_ref().to_vec()))
    }

    /// The raw public material as it appears in metadata.
    pub fn public(&self) -> &[u8] {
        match self {
            Key::Ecdsa { keyval }
            | Key::EcdsaX509 { keyval }
            | Key::Ed25519 { keyval }
            | Key::Rsa { keyval }
            | Key::RsaX509 { keyval } => &keyval.public,
        }
    }

    /// Whether the public material is an X.509 certificate.
    pub fn is_x509(&self) -> bool {
        matches!(self, Key::EcdsaX509 { .. } | Key::RsaX509 { .. })
    }

    /// The default signature method for this key type.
    pub fn scheme(&self) -> SignatureScheme {
        match self {
            Key::Ecdsa { .. } | Key::EcdsaX509 { .. } => SignatureScheme::Ecdsa,
            Key::Ed25519 { .. } => SignatureScheme::Ed25519,
            Key::Rsa { .. } | Key::RsaX509 { .. } => SignatureScheme::RsassaPssSha256,
        }
    }

    /// The certificate wrapping this key, for `*-x509` key types.
    pub fn certificate(&self) -> Result<Option<Certificate>> {
        if !self.is_x509() {
            return Ok(None);
        }
        Certificate::parse(self.public()).map(Some)
    }

    /// The PKIX `SubjectPublicKeyInfo` used for verification. For certificate-form keys this is
    /// the certificate's subject public key; for Ed25519 there is no SPKI wrapper and `None` is
    /// returned.
    fn verification_spki(&self) -> Result<Option<Vec<u8>>> {
        match self {
            Key::Ecdsa { keyval } | Key::Rsa { keyval } => Ok(Some(keyval.public.to_vec())),
            Key::EcdsaX509 { keyval } | Key::RsaX509 { keyval } => {
                Ok(Some(Certificate::parse(&keyval.public)?.spki))
            }
            Key::Ed25519 { .. } => Ok(None),
        }
    }

    /// Verifies `sig` over `msg`, where `sig` was produced with `method`.
    ///
    /// Returns `false` for any mismatch between the method and the key type, for malformed
    /// public material, and for signatures that do not verify. Verification failures are not
    /// errors: callers count valid signatures against a threshold.
    pub fn verify(&self, msg: &[u8], sig: &[u8], method: SignatureScheme) -> bool {
        self.try_verify(msg, sig, method).unwrap_or(false)
    }

    fn try_verify(&self, msg: &[u8], sig: &[u8], method: SignatureScheme) -> Result<bool> {
        let ok = match (self, method) {
            (Key::Ed25519 { keyval }, SignatureScheme::Ed25519) => {
                UnparsedPublicKey::new(&signature::ED25519, keyval.public.as_ref())
                    .verify(msg, sig)
                    .is_ok()
            }
            (Key::Ecdsa { .. }, SignatureScheme::Ecdsa)
            | (Key::EcdsaX509 { .. }, SignatureScheme::Ecdsa) => {
                let spki_der = match self.verification_spki()? {
                    Some(der) => der,
                    None => return Ok(false),
                };
                let (curve, point) = spki::ecdsa_from_spki(&spki_der)?;
                let alg: &dyn signature::VerificationAlgorithm = match curve {
                    spki::EcCurve::P256 => &signature::ECDSA_P256_SHA256_FIXED,
                    spki::EcCurve::P384 => &signature::ECDSA_P384_SHA384_FIXED,
                };
                UnparsedPublicKey::new(alg, &point).verify(msg, sig).is_ok()
            }
            (Key::Rsa { .. }, method) | (Key::RsaX509 { .. }, method) => {
                let alg: &dyn signature::VerificationAlgorithm = match method {
                    SignatureScheme::RsassaPssSha256 => &signature::RSA_PSS_2048_8192_SHA256,
                    SignatureScheme::RsaPkcs1v15Sha256 => {
                        &signature::RSA_PKCS1_2048_8192_SHA256
                    }
                    _ => return Ok(false),
                };
                let spki_der = match self.verification_spki()? {
                    Some(der) => der,
                    None => return Ok(false),
                };
                let rsa_public = spki::rsa_from_spki(&spki_der)?;
                UnparsedPublicKey::new(alg, &rsa_public)
                    .verify(msg, sig)
                    .is_ok()
            }
            _ => false,
        };
        Ok(ok)
    }
}
