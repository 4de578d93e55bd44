//! BIP340 Schnorr verification over 32-byte message digests.

use hashperp_types::XOnlyKey;
use bitcoin::secp256k1::{Message, Secp256k1, VerifyOnly, XOnlyPublicKey, schnorr};
use tracing::debug;

/// Verifies BIP340 signatures against registered x-only keys.
#[derive(Debug, Clone)]
pub struct SchnorrVerifier {
    secp: Secp256k1<VerifyOnly>,
}

impl Default for SchnorrVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SchnorrVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::verification_only(),
        }
    }

    /// Malformed signatures or keys verify as `false`.
    #[must_use]
    pub fn verify(&self, message: &[u8; 32], signature: &[u8], key: &XOnlyKey) -> bool {
        let Ok(sig) = schnorr::Signature::from_slice(signature) else {
            debug!(len = signature.len(), "malformed schnorr signature");
            return false;
        };
        let Ok(pubkey) = XOnlyPublicKey::from_slice(key.as_bytes()) else {
            debug!(key = %key.short(), "malformed x-only key");
            return false;
        };
        let msg = Message::from_digest(*message);
        self.secp.verify_schnorr(&sig, &msg, &pubkey).is_ok()
    }
}

/// Deterministic keys for tests.
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug, Clone)]
pub struct TestSigner {
    keypair: bitcoin::secp256k1::Keypair,
}

#[cfg(any(test, feature = "test-helpers"))]
impl TestSigner {
    /// Secret key `[seed; 32]`; seed 0 is bumped to 1.
    pub fn from_seed(seed: u8) -> Self {
        let secp = Secp256k1::signing_only();
        let secret = [seed.max(1); 32];
        let keypair = bitcoin::secp256k1::Keypair::from_seckey_slice(&secp, &secret)
            .expect("seed bytes are a valid secret key");
        Self { keypair }
    }

    pub fn xonly(&self) -> XOnlyKey {
        XOnlyKey(self.keypair.x_only_public_key().0.serialize())
    }

    pub fn sign(&self, message: &[u8; 32]) -> Vec<u8> {
        let secp = Secp256k1::signing_only();
        let msg = Message::from_digest(*message);
        secp.sign_schnorr_no_aux_rand(&msg, &self.keypair)
            .serialize()
            .to_vec()
    }
}
