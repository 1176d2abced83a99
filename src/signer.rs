//! The signing contract consumed by the event layer.
//!
//! Schnorr over secp256k1 with x-only public keys, following the common
//! Bitcoin convention: 32-byte keys, 64-byte signatures, messages that are
//! 32-byte digests. ECDH is exposed for callers that negotiate shared
//! secrets; the store itself never calls it.

use rand::RngCore;
use secp256k1::{
    ecdh::SharedSecret, schnorr::Signature, All, Keypair, Message, Parity, PublicKey, Secp256k1,
    SecretKey, XOnlyPublicKey,
};

use crate::error::{Result, StoreError};
use crate::event::{PUBKEY_LEN, SIGNATURE_LEN};

pub trait Signer {
    /// The 32-byte x-only public key.
    fn public_key(&self) -> [u8; PUBKEY_LEN];

    /// Signs a 32-byte message digest.
    fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LEN]>;

    /// Checks a signature over a 32-byte message digest.
    fn verify(&self, message: &[u8], signature: &[u8; SIGNATURE_LEN]) -> Result<bool>;

    /// Shared secret with another party's x-only public key.
    fn ecdh(&self, pubkey: &[u8; PUBKEY_LEN]) -> Result<[u8; 32]>;
}

/// A [`Signer`] backed by an in-memory secp256k1 keypair.
pub struct KeypairSigner {
    secp: Secp256k1<All>,
    keypair: Keypair,
}

impl KeypairSigner {
    /// Generates a fresh keypair from OS randomness.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        loop {
            let mut secret = [0u8; 32];
            rng.fill_bytes(&mut secret);
            if let Ok(keypair) = Keypair::from_seckey_slice(&secp, &secret) {
                return Self { secp, keypair };
            }
        }
    }

    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self> {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_seckey_slice(&secp, secret)
            .map_err(|err| StoreError::Signature(format!("invalid secret key: {err}")))?;
        Ok(Self { secp, keypair })
    }
}

impl Signer for KeypairSigner {
    fn public_key(&self) -> [u8; PUBKEY_LEN] {
        self.keypair.x_only_public_key().0.serialize()
    }

    fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LEN]> {
        let message = Message::from_digest_slice(message)
            .map_err(|err| StoreError::Signature(format!("invalid message digest: {err}")))?;
        let signature = self.secp.sign_schnorr_no_aux_rand(&message, &self.keypair);
        let mut out = [0u8; SIGNATURE_LEN];
        out.copy_from_slice(signature.as_ref());
        Ok(out)
    }

    fn verify(&self, message: &[u8], signature: &[u8; SIGNATURE_LEN]) -> Result<bool> {
        let message = Message::from_digest_slice(message)
            .map_err(|err| StoreError::Signature(format!("invalid message digest: {err}")))?;
        let Ok(signature) = Signature::from_slice(signature) else {
            return Ok(false);
        };
        let pubkey = self.keypair.x_only_public_key().0;
        Ok(self
            .secp
            .verify_schnorr(&signature, &message, &pubkey)
            .is_ok())
    }

    fn ecdh(&self, pubkey: &[u8; PUBKEY_LEN]) -> Result<[u8; 32]> {
        let x_only = XOnlyPublicKey::from_slice(pubkey)
            .map_err(|err| StoreError::Signature(format!("invalid peer key: {err}")))?;
        let full = PublicKey::from_x_only_public_key(x_only, Parity::Even);
        let secret = SecretKey::from_keypair(&self.keypair);
        Ok(SharedSecret::new(&full, &secret).secret_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_a_digest() {
        let signer = KeypairSigner::generate();
        let digest = [7u8; 32];
        let signature = signer.sign(&digest).unwrap();
        assert!(signer.verify(&digest, &signature).unwrap());
        assert!(!signer.verify(&[8u8; 32], &signature).unwrap());
    }

    #[test]
    fn deterministic_signer_from_secret_bytes() {
        let secret = [0x11u8; 32];
        let a = KeypairSigner::from_secret_bytes(&secret).unwrap();
        let b = KeypairSigner::from_secret_bytes(&secret).unwrap();
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.sign(&[1u8; 32]).unwrap(), b.sign(&[1u8; 32]).unwrap());

        assert!(matches!(
            KeypairSigner::from_secret_bytes(&[0u8; 32]),
            Err(StoreError::Signature(_))
        ));
    }

    #[test]
    fn ecdh_is_symmetric_for_even_parity_keys() {
        // Loop until both generated keys have even parity, so the x-only
        // reconstruction on each side matches the true public key.
        loop {
            let a = KeypairSigner::generate();
            let b = KeypairSigner::generate();
            if a.keypair.x_only_public_key().1 != Parity::Even
                || b.keypair.x_only_public_key().1 != Parity::Even
            {
                continue;
            }
            let ab = a.ecdh(&b.public_key()).unwrap();
            let ba = b.ecdh(&a.public_key()).unwrap();
            assert_eq!(ab, ba);
            break;
        }
    }

    #[test]
    fn invalid_message_length_is_an_error() {
        let signer = KeypairSigner::generate();
        assert!(matches!(
            signer.sign(&[0u8; 31]),
            Err(StoreError::Signature(_))
        ));
    }
}
