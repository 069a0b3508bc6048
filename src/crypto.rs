//! Double-SHA256 digests and the ECDSA P-256 provider.
//!
//! Public keys travel as X.509 SubjectPublicKeyInfo DER (the form carried in
//! script-pubkeys), private keys as SEC1 DER, signatures as ASN.1 DER.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePublicKey, EncodePublicKey};
use p256::SecretKey;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::{ChainError, Result};

/// 256-bit digest.
pub type Hash = [u8; 32];

/// Double-SHA256, the digest behind transaction ids, output ids, block
/// hashes, merkle nodes and undo checksums.
pub fn double_sha256(msg: &[u8]) -> Hash {
    Sha256::digest(Sha256::digest(msg)).into()
}

/// Generate a fresh P-256 keypair.
pub fn generate_keypair() -> (SigningKey, VerifyingKey) {
    let signing_key = SigningKey::random(&mut OsRng);
    let verifying_key = VerifyingKey::from(&signing_key);
    (signing_key, verifying_key)
}

/// Encode a public key as SubjectPublicKeyInfo DER.
pub fn pubkey_to_bytes(key: &VerifyingKey) -> Result<Vec<u8>> {
    let document = key
        .to_public_key_der()
        .map_err(|e| ChainError::Key(e.to_string()))?;
    Ok(document.as_bytes().to_vec())
}

/// Parse a public key from SubjectPublicKeyInfo DER.
pub fn pubkey_from_bytes(bytes: &[u8]) -> Result<VerifyingKey> {
    VerifyingKey::from_public_key_der(bytes).map_err(|e| ChainError::Key(e.to_string()))
}

/// Encode a private key as SEC1 DER.
pub fn privkey_to_bytes(key: &SigningKey) -> Result<Vec<u8>> {
    let der = SecretKey::from(key)
        .to_sec1_der()
        .map_err(|e| ChainError::Key(e.to_string()))?;
    Ok(der.as_slice().to_vec())
}

/// Parse a private key from SEC1 DER.
pub fn privkey_from_bytes(bytes: &[u8]) -> Result<SigningKey> {
    let secret = SecretKey::from_sec1_der(bytes).map_err(|e| ChainError::Key(e.to_string()))?;
    Ok(SigningKey::from(secret))
}

/// Sign a message, returning an ASN.1 DER signature. The message is hashed
/// with SHA-256 internally as part of ECDSA.
pub fn sign(msg: &[u8], key: &SigningKey) -> Vec<u8> {
    let signature: Signature = key.sign(msg);
    signature.to_der().as_bytes().to_vec()
}

/// Verify an ASN.1 DER signature over a message. Malformed signatures simply
/// fail verification.
pub fn verify(msg: &[u8], der_signature: &[u8], key: &VerifyingKey) -> bool {
    match Signature::from_der(der_signature) {
        Ok(signature) => key.verify(msg, &signature).is_ok(),
        Err(_) => false,
    }
}
