// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provides the `Sign` trait, which abstracts over the method of signing with different key
//! types, and local key pairs backed by `ring`.
//!
//! Key stores hand out objects implementing `Sign`; for remote backends the private material
//! never exists on this machine and `sign` is a server round trip.

use crate::error::{self, Result};
use crate::schema::decoded::{Decoded, Hex};
use crate::schema::key::{Key, KeyVal, SignatureScheme};
use crate::schema::spki;
use ring::rand::SecureRandom;
use ring::signature::{EcdsaKeyPair, Ed25519KeyPair, KeyPair as _, RsaKeyPair};
use ring::signature::{ECDSA_P256_SHA256_FIXED_SIGNING, ECDSA_P384_SHA384_FIXED_SIGNING, RSA_PSS_SHA256};
use serde::{Deserialize, Serialize};
use serde_plain::{forward_display_to_serde, forward_from_str_to_serde};
use snafu::ResultExt;
use std::convert::TryFrom;
use std::fmt::Debug;

/// This trait must be implemented for each type of key with which you will sign things.
pub trait Sign: Debug + Send + Sync {
    /// Returns the public key descriptor for this signing key.
    fn tuf_key(&self) -> Key;

    /// The signature method this key produces.
    fn scheme(&self) -> SignatureScheme {
        self.tuf_key().scheme()
    }

    /// Signs the supplied message.
    fn sign(
        &self,
        msg: &[u8],
        rng: &dyn SecureRandom,
    ) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync + 'static>>;
}

/// The algorithms this implementation can generate keys for. RSA keys can be imported and
/// verified but not generated.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum KeyAlgorithm {
    /// ECDSA over NIST P-256.
    #[serde(rename = "ecdsa")]
    Ecdsa,
    /// Ed25519.
    #[serde(rename = "ed25519")]
    Ed25519,
}

forward_display_to_serde!(KeyAlgorithm);
forward_from_str_to_serde!(KeyAlgorithm);

/// A local signing key pair, together with its PKCS#8 document so it can be persisted.
pub enum SigningKey {
    /// An ECDSA P-256 key pair, signing fixed-length `r || s`.
    Ecdsa {
        /// The key pair used to sign.
        pair: EcdsaKeyPair,
        /// The PKCS#8 document backing the key pair.
        pkcs8: Vec<u8>,
    },
    /// An ECDSA P-384 key pair, signing fixed-length `r || s`.
    EcdsaP384 {
        /// The key pair used to sign.
        pair: EcdsaKeyPair,
        /// The PKCS#8 document backing the key pair.
        pkcs8: Vec<u8>,
    },
    /// An Ed25519 key pair.
    Ed25519 {
        /// The key pair used to sign.
        pair: Ed25519KeyPair,
        /// The PKCS#8 document backing the key pair.
        pkcs8: Vec<u8>,
    },
    /// An imported RSA key pair, signing RSASSA-PSS-SHA256.
    Rsa {
        /// The key pair used to sign.
        pair: RsaKeyPair,
        /// The PKCS#8 document backing the key pair.
        pkcs8: Vec<u8>,
    },
}

impl Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print private material.
        let kind = match self {
            SigningKey::Ecdsa { .. } => "ecdsa",
            SigningKey::EcdsaP384 { .. } => "ecdsa-p384",
            SigningKey::Ed25519 { .. } => "ed25519",
            SigningKey::Rsa { .. } => "rsa",
        };
        f.debug_struct("SigningKey").field("kind", &kind).finish()
    }
}

impl SigningKey {
    /// Generates a new key pair of the given algorithm.
    pub fn generate(algorithm: KeyAlgorithm, rng: &dyn SecureRandom) -> Result<Self> {
        match algorithm {
            KeyAlgorithm::Ecdsa => {
                let document = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, rng)
                    .context(error::KeyGenerateSnafu)?;
                let pair =
                    EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, document.as_ref())
                        .context(error::KeyRejectedSnafu)?;
                Ok(SigningKey::Ecdsa {
                    pair,
                    pkcs8: document.as_ref().to_vec(),
                })
            }
            KeyAlgorithm::Ed25519 => {
                let document =
                    Ed25519KeyPair::generate_pkcs8(rng).context(error::KeyGenerateSnafu)?;
                let pair = Ed25519KeyPair::from_pkcs8(document.as_ref())
                    .context(error::KeyRejectedSnafu)?;
                Ok(SigningKey::Ed25519 {
                    pair,
                    pkcs8: document.as_ref().to_vec(),
                })
            }
        }
    }

    /// Parses a PKCS#8 document into a key pair, trying each supported type in turn.
    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self> {
        if let Ok(pair) = Ed25519KeyPair::from_pkcs8_maybe_unchecked(pkcs8) {
            return Ok(SigningKey::Ed25519 {
                pair,
                pkcs8: pkcs8.to_vec(),
            });
        }
        if let Ok(pair) = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8) {
            return Ok(SigningKey::Ecdsa {
                pair,
                pkcs8: pkcs8.to_vec(),
            });
        }
        if let Ok(pair) = EcdsaKeyPair::from_pkcs8(&ECDSA_P384_SHA384_FIXED_SIGNING, pkcs8) {
            return Ok(SigningKey::EcdsaP384 {
                pair,
                pkcs8: pkcs8.to_vec(),
            });
        }
        if let Ok(pair) = RsaKeyPair::from_pkcs8(pkcs8) {
            return Ok(SigningKey::Rsa {
                pair,
                pkcs8: pkcs8.to_vec(),
            });
        }
        error::KeyUnrecognizedSnafu.fail()
    }

    /// The PKCS#8 document for this key, used when persisting it to a store.
    pub fn pkcs8(&self) -> &[u8] {
        match self {
            SigningKey::Ecdsa { pkcs8, .. }
            | SigningKey::EcdsaP384 { pkcs8, .. }
            | SigningKey::Ed25519 { pkcs8, .. }
            | SigningKey::Rsa { pkcs8, .. } => pkcs8,
        }
    }

    /// The key ID derived from this key's public descriptor.
    pub fn key_id(&self) -> Result<Decoded<Hex>> {
        self.tuf_key().key_id().context(error::SchemaSnafu)
    }
}

impl Sign for SigningKey {
    fn tuf_key(&self) -> Key {
        match self {
            SigningKey::Ecdsa { pair, .. } => Key::Ecdsa {
                keyval: KeyVal::new(spki::wrap_ecdsa_spki(
                    spki::EcCurve::P256,
                    pair.public_key().as_ref(),
                )),
            },
            SigningKey::EcdsaP384 { pair, .. } => Key::Ecdsa {
                keyval: KeyVal::new(spki::wrap_ecdsa_spki(
                    spki::EcCurve::P384,
                    pair.public_key().as_ref(),
                )),
            },
            SigningKey::Ed25519 { pair, .. } => Key::Ed25519 {
                keyval: KeyVal::new(pair.public_key().as_ref().to_vec()),
            },
            SigningKey::Rsa { pair, .. } => Key::Rsa {
                keyval: KeyVal::new(spki::wrap_rsa_spki(pair.public_key().as_ref())),
            },
        }
    }

    fn sign(
        &self,
        msg: &[u8],
        rng: &dyn SecureRandom,
    ) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync + 'static>> {
        match self {
            SigningKey::Ecdsa { pair, .. } | SigningKey::EcdsaP384 { pair, .. } => {
                let signature = pair.sign(rng, msg)?;
                Ok(signature.as_ref().to_vec())
            }
            SigningKey::Ed25519 { pair, .. } => Ok(pair.sign(msg).as_ref().to_vec()),
            SigningKey::Rsa { pair, .. } => {
                let mut signature = vec![0; pair.public_modulus_len()];
                pair.sign(&RSA_PSS_SHA256, rng, msg, &mut signature)?;
                Ok(signature)
            }
        }
    }
}

/// Decrypts a PBES2-encrypted PKCS#8 document with the given passphrase.
pub fn decrypt_key(encrypted_der: &[u8], password: &str) -> Result<Vec<u8>> {
    let encrypted = pkcs8::EncryptedPrivateKeyInfo::try_from(encrypted_der)
        .map_err(|source| error::Error::KeyDecrypt {
            source: source.into(),
        })?;
    let document = encrypted
        .decrypt(password.as_bytes())
        .context(error::KeyDecryptSnafu)?;
    Ok(document.as_bytes().to_vec())
}

/// Encrypts a PKCS#8 document with PBES2 (scrypt + AES-256-CBC) under the given passphrase.
pub fn encrypt_key(pkcs8_der: &[u8], password: &str, rng: &dyn SecureRandom) -> Result<Vec<u8>> {
    use pkcs8::pkcs5::{pbes2, scrypt};

    let mut salt = [0u8; 16];
    let mut iv = [0u8; 16];
    rng.fill(&mut salt).context(error::KeyGenerateSnafu)?;
    rng.fill(&mut iv).context(error::KeyGenerateSnafu)?;

    let params = pbes2::Parameters::scrypt_aes256cbc(scrypt::Params::recommended(), &salt, &iv)
        .map_err(|source| error::Error::KeyEncrypt {
            source: source.into(),
        })?;
    let info = pkcs8::PrivateKeyInfo::try_from(pkcs8_der).map_err(|source| {
        error::Error::KeyEncrypt {
            source: source.into(),
        }
    })?;
    let document = info
        .encrypt_with_params(params, password.as_bytes())
        .context(error::KeyEncryptSnafu)?;
    Ok(document.as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::{decrypt_key, encrypt_key, KeyAlgorithm, Sign, SigningKey};
    use ring::rand::SystemRandom;

    #[test]
    fn generated_ecdsa_key_signs_and_verifies() {
        let rng = SystemRandom::new();
        let key = SigningKey::generate(KeyAlgorithm::Ecdsa, &rng).unwrap();
        let tuf_key = key.tuf_key();
        let sig = key.sign(b"hello world", &rng).unwrap();
        assert!(tuf_key.verify(b"hello world", &sig, key.scheme()));
        assert!(!tuf_key.verify(b"hello worle", &sig, key.scheme()));
    }

    #[test]
    fn generated_ed25519_key_signs_and_verifies() {
        let rng = SystemRandom::new();
        let key = SigningKey::generate(KeyAlgorithm::Ed25519, &rng).unwrap();
        let sig = key.sign(b"message", &rng).unwrap();
        assert!(key.tuf_key().verify(b"message", &sig, key.scheme()));
    }

    #[test]
    fn pkcs8_round_trip_preserves_key_id() {
        let rng = SystemRandom::new();
        let key = SigningKey::generate(KeyAlgorithm::Ecdsa, &rng).unwrap();
        let reloaded = SigningKey::from_pkcs8(key.pkcs8()).unwrap();
        assert_eq!(key.key_id().unwrap(), reloaded.key_id().unwrap());
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let rng = SystemRandom::new();
        let key = SigningKey::generate(KeyAlgorithm::Ed25519, &rng).unwrap();
        let encrypted = encrypt_key(key.pkcs8(), "correct horse", &rng).unwrap();
        let decrypted = decrypt_key(&encrypted, "correct horse").unwrap();
        assert_eq!(decrypted, key.pkcs8());
        assert!(decrypt_key(&encrypted, "wrong password").is_err());
    }
}
