use crate::error::{ChainError, Result};
use data_encoding::HEXLOWER;
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_NAMESPACE: &str = "socialchain";
const DID_SCHEME: &str = "did";

/// A node or account identity: one secp256k1 key and the DID derived from it.
///
/// The secret key never leaves this struct. It is not serializable and its
/// `Debug` output only shows the DID.
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
    public_key: Vec<u8>, // SEC1 compressed point, 33 bytes
    namespace: String,
    did: String,
}

/// The shareable half of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIdentity {
    pub did: String,
    pub public_key: String,
}

impl Identity {
    pub fn generate() -> Identity {
        Self::generate_in(DEFAULT_NAMESPACE)
    }

    pub fn generate_in(namespace: &str) -> Identity {
        let signing_key = SigningKey::random(&mut OsRng);
        Self::from_signing_key(signing_key, namespace)
    }

    /// Import a raw 32-byte secret scalar.
    pub fn from_secret_bytes(secret: &[u8], namespace: &str) -> Result<Identity> {
        let signing_key = SigningKey::from_slice(secret)
            .map_err(|e| ChainError::Crypto(format!("Invalid secp256k1 secret key: {e}")))?;
        Ok(Self::from_signing_key(signing_key, namespace))
    }

    fn from_signing_key(signing_key: SigningKey, namespace: &str) -> Identity {
        let public_key = compressed_public_key(signing_key.verifying_key());
        let did = format_did(namespace, &public_key);
        Identity {
            signing_key,
            public_key,
            namespace: namespace.to_string(),
            did,
        }
    }

    pub fn did(&self) -> &str {
        self.did.as_str()
    }

    pub fn namespace(&self) -> &str {
        self.namespace.as_str()
    }

    pub fn public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn public_key_hex(&self) -> String {
        HEXLOWER.encode(&self.public_key)
    }

    /// ECDSA/SHA-256 signature over `message`, DER encoded, as hex.
    pub fn sign(&self, message: &[u8]) -> String {
        let signature: Signature = self.signing_key.sign(message);
        HEXLOWER.encode(signature.to_der().as_bytes())
    }

    /// Never errors: malformed hex, malformed DER and mismatches all give `false`.
    pub fn verify(&self, message: &[u8], signature_hex: &str) -> bool {
        verify_with_key(self.signing_key.verifying_key(), message, signature_hex)
    }

    pub fn to_public(&self) -> PublicIdentity {
        PublicIdentity {
            did: self.did.clone(),
            public_key: self.public_key_hex(),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity").field("did", &self.did).finish()
    }
}

fn compressed_public_key(verifying_key: &VerifyingKey) -> Vec<u8> {
    verifying_key.to_encoded_point(true).as_bytes().to_vec()
}

fn format_did(namespace: &str, public_key: &[u8]) -> String {
    format!("{DID_SCHEME}:{namespace}:{}", HEXLOWER.encode(public_key))
}

fn verify_with_key(verifying_key: &VerifyingKey, message: &[u8], signature_hex: &str) -> bool {
    let sig_bytes = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let signature = match Signature::from_der(&sig_bytes) {
        Ok(signature) => signature,
        Err(_) => return false,
    };
    // k256 only accepts low-S; other signers may produce either half
    let signature = signature.normalize_s().unwrap_or(signature);
    verifying_key.verify(message, &signature).is_ok()
}

/// Split a DID into its namespace and compressed public key.
///
/// Returns `None` unless the DID is `did:<namespace>:<hex>` and the hex decodes
/// to a valid secp256k1 point.
pub fn parse_did(did: &str) -> Option<(String, Vec<u8>)> {
    let mut parts = did.splitn(3, ':');
    if parts.next()? != DID_SCHEME {
        return None;
    }
    let namespace = parts.next()?;
    let key_hex = parts.next()?;
    if namespace.is_empty() || key_hex.contains(':') {
        return None;
    }
    let public_key = hex::decode(key_hex).ok()?;
    VerifyingKey::from_sec1_bytes(&public_key).ok()?;
    Some((namespace.to_string(), public_key))
}

/// Verify a signature made by whoever owns `did`, without holding their key.
pub fn verify_did_signature(did: &str, message: &[u8], signature_hex: &str) -> bool {
    let Some((_, public_key)) = parse_did(did) else {
        return false;
    };
    match VerifyingKey::from_sec1_bytes(&public_key) {
        Ok(verifying_key) => verify_with_key(&verifying_key, message, signature_hex),
        Err(_) => false,
    }
}
