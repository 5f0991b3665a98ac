//! Frame signing capability.
//!
//! Every outbound frame carries a `sig` slot, but the signing protocol —
//! algorithm negotiation and canonicalization over frame bytes — is a future
//! phase the relay does not implement yet. The seam is kept explicit: the
//! connection manager talks to a [`FrameSigner`], and the shipped
//! [`PlaceholderSigner`] generates a real per-connection Ed25519 keypair
//! (its public key is what the relay records at registration) while
//! declining to produce signatures. Swapping in a real signer later changes
//! no call sites.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

/// Produces the public key advertised at registration and, eventually,
/// per-frame signatures.
pub trait FrameSigner: Send + Sync {
    /// Public key string in `<scheme>:<base64>` form.
    fn public_key(&self) -> String;

    /// Signature over the serialized, unsigned frame bytes.
    ///
    /// `None` means "unsigned"; the frame's `sig` field stays null.
    fn sign(&self, frame: &[u8]) -> Option<String>;
}

/// Ed25519 keypair holder that never signs.
///
/// The key is generated fresh per client instance, so the relay can pin it
/// for the lifetime of the connection series.
pub struct PlaceholderSigner {
    key: SigningKey,
}

impl PlaceholderSigner {
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }
}

impl FrameSigner for PlaceholderSigner {
    fn public_key(&self) -> String {
        format!(
            "ed25519:{}",
            BASE64.encode(self.key.verifying_key().to_bytes())
        )
    }

    fn sign(&self, _frame: &[u8]) -> Option<String> {
        // Canonicalization over frame bytes is unspecified upstream; until
        // the relay defines it, frames go out unsigned.
        None
    }
}
