//! Cryptographic operations: key derivation, AEAD, key encapsulation.

pub mod aead;
pub mod derive;
pub mod kem;

pub use derive::{KeyChoice, SeedDeriver, SessionKey};
pub use kem::{Encapsulation, Kyber512, PostQuantumKem};
