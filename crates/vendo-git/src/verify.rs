//! Trust decisions over a set of public keys
//!
//! A signed object is accepted when any key in the trusted set verifies its
//! signature. Key order never matters: the scan stops at the first match.

use std::io::Cursor;

use pgp::types::PublicKeyTrait;
use pgp::{Deserializable, SignedPublicKey, StandaloneSignature};

use crate::signature::SignedObject;
use crate::{Error, Result};

/// A key able to check a detached signature over a payload.
pub trait SignatureCheck {
    /// Parsed form of an armored signature.
    type Signature;

    fn parse_signature(armored: &str) -> std::result::Result<Self::Signature, String>;

    /// Short identifier used in logs.
    fn id(&self) -> String;

    /// Whether this key produced `signature` over `payload`.
    fn verifies(&self, payload: &[u8], signature: &Self::Signature) -> bool;
}

/// An OpenPGP public key with its subkeys.
#[derive(Debug, Clone)]
pub struct PgpPublicKey {
    key: SignedPublicKey,
}

impl PgpPublicKey {
    pub fn new(key: SignedPublicKey) -> Self {
        Self { key }
    }

    /// Parse every key in every ASCII-armored block of `armored`.
    /// `name` labels errors.
    pub fn parse_armored(name: &str, armored: &str) -> Result<Vec<Self>> {
        let invalid = |message: String| Error::InvalidPublicKey {
            name: name.to_string(),
            message,
        };

        let mut blocks = armored_key_blocks(armored);
        if blocks.is_empty() {
            blocks.push(armored);
        }

        let mut parsed = Vec::new();
        for block in blocks {
            let (keys, _) = SignedPublicKey::from_armor_many(Cursor::new(block.as_bytes()))
                .map_err(|e| invalid(e.to_string()))?;
            for key in keys {
                let key = key.map_err(|e| invalid(e.to_string()))?;
                parsed.push(Self::new(key));
            }
        }
        if parsed.is_empty() {
            return Err(invalid("no public key found".to_string()));
        }
        Ok(parsed)
    }
}

const BEGIN_PUBLIC_KEY: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----";
const END_PUBLIC_KEY: &str = "-----END PGP PUBLIC KEY BLOCK-----";

/// Split text holding several concatenated armored public keys into one
/// slice per block. The armor reader stops after the first block.
fn armored_key_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(BEGIN_PUBLIC_KEY) {
        let block = &rest[start..];
        let end = block
            .find(END_PUBLIC_KEY)
            .map_or(block.len(), |i| i + END_PUBLIC_KEY.len());
        blocks.push(&block[..end]);
        rest = &block[end..];
    }
    blocks
}

impl SignatureCheck for PgpPublicKey {
    type Signature = StandaloneSignature;

    fn parse_signature(armored: &str) -> std::result::Result<Self::Signature, String> {
        StandaloneSignature::from_string(armored)
            .map(|(signature, _)| signature)
            .map_err(|e| e.to_string())
    }

    fn id(&self) -> String {
        format!("{:?}", self.key.key_id())
    }

    fn verifies(&self, payload: &[u8], signature: &StandaloneSignature) -> bool {
        if signature.verify(&self.key, payload).is_ok() {
            return true;
        }
        self.key
            .public_subkeys
            .iter()
            .any(|subkey| signature.verify(subkey, payload).is_ok())
    }
}

/// Any-of verifier over a trusted key set.
#[derive(Debug, Clone)]
pub struct Verifier<K = PgpPublicKey> {
    keys: Vec<K>,
}

impl Verifier<PgpPublicKey> {
    /// Build from named armored key texts, e.g. the values of a Secret.
    pub fn from_armored<'a>(texts: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut keys = Vec::new();
        for (name, text) in texts {
            keys.extend(PgpPublicKey::parse_armored(name, text)?);
        }
        Ok(Self::new(keys))
    }
}

impl<K: SignatureCheck> Verifier<K> {
    pub fn new(keys: Vec<K>) -> Self {
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Accept `object` if any trusted key signed it.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedSignature`] if the signature block cannot be parsed
    /// - [`Error::UnknownSigner`] if no trusted key matches
    pub fn verify(&self, object: &SignedObject) -> Result<()> {
        let signature =
            K::parse_signature(&object.signature).map_err(|message| Error::MalformedSignature {
                kind: object.kind,
                message,
            })?;

        match self
            .keys
            .iter()
            .find(|key| key.verifies(&object.payload, &signature))
        {
            Some(key) => {
                tracing::debug!(kind = %object.kind, key = %key.id(), "Signature verified");
                Ok(())
            }
            None => Err(Error::UnknownSigner {
                kind: object.kind,
                checked: self.keys.len(),
            }),
        }
    }
}
