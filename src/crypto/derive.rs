//! Seed key derivation from a user passphrase.
//!
//! Three strategies turn the out-of-band passphrase into a 32-byte seed
//! key. All of them are deterministic and total: any input yields a key.
//! The seed key never protects traffic directly; the handshake replaces
//! it with a session key derived from a fresh Kyber shared secret.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use argon2::{Algorithm, Argon2, Params, Version};
use sha3::{Digest, Sha3_512};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::link::{PerfCategory, PerfRecord, PerformanceSink};

/// Fixed, non-secret salt for the quantum derivation. Both peers must use
/// the same constant; the later rekey mixes in the real secret.
pub const QUANTUM_SALT: &[u8] = b"quantum_secure_salt";

/// Argon2id cost for the seed derivation: 64 MiB, 2 passes, 4 lanes.
const SEED_M_COST_KIB: u32 = 65536;
const SEED_T_COST: u32 = 2;
const SEED_P_COST: u32 = 4;

/// Argon2id cost for the post-handshake rekey: 100 MiB, 3 passes, 8 lanes.
const REKEY_M_COST_KIB: u32 = 102400;
const REKEY_T_COST: u32 = 3;
const REKEY_P_COST: u32 = 8;

/// Key derivation strategy, chosen once per connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum KeyChoice {
    /// Argon2id over the passphrase with a fixed salt.
    Quantum,
    /// First 32 bytes of SHA3-512 over the passphrase.
    Kyber,
    /// Literal 64-hex-char key, falling back to the kyber derivation.
    Hybrid,
}

impl KeyChoice {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyChoice::Quantum => "quantum",
            KeyChoice::Kyber => "kyber",
            KeyChoice::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for KeyChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 32-byte symmetric key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex SHA3-512 of the key bytes, as exchanged during confirmation.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha3_512::digest(self.0))
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey([redacted])")
    }
}

fn argon2id(m_cost_kib: u32, t_cost: u32, p_cost: u32) -> Argon2<'static> {
    let params = Params::new(m_cost_kib, t_cost, p_cost, Some(32))
        .expect("static Argon2 parameters are valid");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

/// Argon2id over the UTF-8 passphrase bytes with the fixed salt.
pub fn derive_from_quantum_key(passphrase: &str) -> [u8; 32] {
    let mut key = [0u8; 32];
    argon2id(SEED_M_COST_KIB, SEED_T_COST, SEED_P_COST)
        .hash_password_into(passphrase.as_bytes(), QUANTUM_SALT, &mut key)
        .expect("fixed salt and output length are valid");
    key
}

/// First 32 bytes of SHA3-512 over the UTF-8 passphrase bytes.
pub fn derive_from_kyber_key(passphrase: &str) -> [u8; 32] {
    let digest = Sha3_512::digest(passphrase.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest[..32]);
    key
}

/// A 64-char hex passphrase is taken as the literal key; anything else
/// falls back to the kyber derivation.
pub fn derive_from_hybrid_key(passphrase: &str) -> [u8; 32] {
    if passphrase.len() == 64 && passphrase.chars().all(|c| c.is_ascii_hexdigit()) {
        if let Ok(bytes) = hex::decode(passphrase) {
            if bytes.len() == 32 {
                let mut key = [0u8; 32];
                key.copy_from_slice(&bytes);
                return key;
            }
        }
    }
    derive_from_kyber_key(passphrase)
}

/// Replace the seed key after the handshake: Argon2id with the Kyber
/// shared secret as the password and the seed key as the salt.
pub fn rekey_session_key(shared_secret: &[u8], seed: &SessionKey) -> SessionKey {
    let mut key = Zeroizing::new([0u8; 32]);
    argon2id(REKEY_M_COST_KIB, REKEY_T_COST, REKEY_P_COST)
        .hash_password_into(shared_secret, seed.as_bytes(), &mut *key)
        .expect("seed key salt and output length are valid");
    SessionKey::from_bytes(*key)
}

/// Derives seed keys and records a timed event per derivation.
pub struct SeedDeriver {
    choice: KeyChoice,
    sink: Arc<dyn PerformanceSink>,
}

impl SeedDeriver {
    /// Create a deriver for the given strategy.
    pub fn new(choice: KeyChoice, sink: Arc<dyn PerformanceSink>) -> Self {
        Self { choice, sink }
    }

    /// The strategy this deriver applies.
    pub fn choice(&self) -> KeyChoice {
        self.choice
    }

    /// Derive the seed key. Never fails.
    pub fn derive(&self, passphrase: &str) -> SessionKey {
        let started = Instant::now();
        let (operation, key) = match self.choice {
            KeyChoice::Quantum => ("key_generation_quantum", derive_from_quantum_key(passphrase)),
            KeyChoice::Kyber => ("key_generation_kyber", derive_from_kyber_key(passphrase)),
            KeyChoice::Hybrid => ("key_generation_hybrid", derive_from_hybrid_key(passphrase)),
        };
        self.sink.record(PerfRecord::new(
            operation,
            passphrase.len(),
            started.elapsed(),
            self.choice,
            PerfCategory::Message,
        ));
        SessionKey::from_bytes(key)
    }
}
