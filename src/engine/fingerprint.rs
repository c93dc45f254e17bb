//! Content address of an `InputSnapshot`.
//!
//! ```text
//! Fingerprint = SHA256(
//!   "WACCFP_V1" ||
//!   len(build_up) || (len(name) || name || bits(value))* ||
//!   len(cost_of_debt) || bits(value)* ||
//!   bits(debt) || bits(equity) || bits(tax_rate) ||
//!   mode_tag
//! )
//! ```
//!
//! Order-sensitive: reordering build-up components yields a different key.
//! Floats are hashed by bit pattern after folding `-0.0` into `0.0`.

use std::fmt;

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use super::input::InputSnapshot;

/// Bump when the canonical encoding changes.
pub const FINGERPRINT_VERSION: &[u8] = b"WACCFP_V1";

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(input: &InputSnapshot) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_VERSION);

        hasher.update((input.build_up.len() as u64).to_le_bytes());
        for component in &input.build_up {
            hasher.update((component.name.len() as u64).to_le_bytes());
            hasher.update(component.name.as_bytes());
            hasher.update(canonical_bits(component.value).to_le_bytes());
        }

        hasher.update((input.cost_of_debt.len() as u64).to_le_bytes());
        for value in &input.cost_of_debt {
            hasher.update(canonical_bits(*value).to_le_bytes());
        }

        hasher.update(canonical_bits(input.weights.debt).to_le_bytes());
        hasher.update(canonical_bits(input.weights.equity).to_le_bytes());
        hasher.update(canonical_bits(input.tax_rate).to_le_bytes());
        hasher.update([input.mode.tag()]);

        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First eight hex digits, for logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

fn canonical_bits(value: f64) -> u64 {
    if value == 0.0 {
        0
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}
