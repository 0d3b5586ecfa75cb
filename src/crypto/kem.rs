//! Post-quantum key encapsulation.
//!
//! The link only needs the initiator half of the KEM contract: given the
//! peer's ephemeral public key, produce a ciphertext for the peer and a
//! shared secret for ourselves. The lattice math lives in `pqc_kyber`.

use pqc_kyber::{KYBER_CIPHERTEXTBYTES, KYBER_PUBLICKEYBYTES};
use zeroize::Zeroizing;

use crate::link::LinkError;

/// Result of encapsulating against a peer public key.
pub struct Encapsulation {
    /// Ciphertext to send to the peer.
    pub ciphertext: Vec<u8>,
    /// Shared secret, zeroed on drop.
    pub shared_secret: Zeroizing<[u8; 32]>,
}

/// Key encapsulation collaborator.
pub trait PostQuantumKem: Send + Sync {
    /// Encapsulate a fresh shared secret against `public_key`.
    fn encapsulate(&self, public_key: &[u8]) -> Result<Encapsulation, LinkError>;
}

/// Kyber-512 encapsulation (public key 800 bytes, ciphertext 768 bytes).
pub struct Kyber512;

impl PostQuantumKem for Kyber512 {
    fn encapsulate(&self, public_key: &[u8]) -> Result<Encapsulation, LinkError> {
        if public_key.len() != KYBER_PUBLICKEYBYTES {
            return Err(LinkError::HandshakeProtocol(format!(
                "Kyber public key must be {} bytes, got {}",
                KYBER_PUBLICKEYBYTES,
                public_key.len()
            )));
        }

        let mut rng = rand::rngs::OsRng;
        let (ciphertext, shared_secret) = pqc_kyber::encapsulate(public_key, &mut rng)
            .map_err(|e| LinkError::HandshakeProtocol(format!("encapsulation failed: {e:?}")))?;

        Ok(Encapsulation {
            ciphertext: ciphertext.to_vec(),
            shared_secret: Zeroizing::new(shared_secret),
        })
    }
}

impl Kyber512 {
    /// Ciphertext length on the wire.
    pub const CIPHERTEXT_BYTES: usize = KYBER_CIPHERTEXTBYTES;

    /// Public key length on the wire.
    pub const PUBLIC_KEY_BYTES: usize = KYBER_PUBLICKEYBYTES;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encapsulate_against_generated_keypair() {
        let mut rng = rand::rngs::OsRng;
        let keys = pqc_kyber::keypair(&mut rng).unwrap();

        let enc = Kyber512.encapsulate(&keys.public).unwrap();
        assert_eq!(enc.ciphertext.len(), Kyber512::CIPHERTEXT_BYTES);

        // The peer recovers the same secret from the ciphertext
        let recovered = pqc_kyber::decapsulate(&enc.ciphertext, &keys.secret).unwrap();
        assert_eq!(&recovered, &*enc.shared_secret);
    }

    #[test]
    fn test_encapsulations_are_randomized() {
        let mut rng = rand::rngs::OsRng;
        let keys = pqc_kyber::keypair(&mut rng).unwrap();

        let a = Kyber512.encapsulate(&keys.public).unwrap();
        let b = Kyber512.encapsulate(&keys.public).unwrap();

        assert_ne!(a.ciphertext, b.ciphertext);
        assert_ne!(&*a.shared_secret, &*b.shared_secret);
    }

    #[test]
    fn test_wrong_public_key_length_rejected() {
        let result = Kyber512.encapsulate(&[0u8; 17]);
        assert!(matches!(result, Err(LinkError::HandshakeProtocol(_))));
    }
}
