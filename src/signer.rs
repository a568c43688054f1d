use std::fs;
use std::path::Path;

use ed25519_dalek::{Keypair, Signer as _};
use rand::rngs::OsRng;

use crate::error::CoreError;

/// Signs segment bytes under a configured key. Modeled as a trait so the
/// engine's `sign_and_store_segment` never depends on a concrete key
/// backend (spec.md §1 treats "the content-naming and signing library" as
/// an external collaborator; this crate owns the naming, but delegates the
/// actual cryptographic operation through this seam).
pub trait Signer: Send + Sync {
    fn sign(&self, name: &[u8], content: &[u8]) -> Result<Vec<u8>, CoreError>;
}

/// Production signer: an Ed25519 keypair loaded once at startup. The
/// signature covers the segment's hierarchical name concatenated with its
/// content, so a segment's bytes only verify against the name they were
/// published under (spec.md §6: "the name is what the signer binds over, so
/// bytes must be reproducible").
pub struct Ed25519Signer {
    keypair: Keypair,
}

impl Ed25519Signer {
    pub fn from_seed_bytes(seed: &[u8; 32]) -> Self {
        let secret = ed25519_dalek::SecretKey::from_bytes(seed)
            .expect("a 32-byte seed is always a valid ed25519 secret key");
        let public = ed25519_dalek::PublicKey::from(&secret);
        Ed25519Signer {
            keypair: Keypair { secret, public },
        }
    }

    /// Generates a fresh keypair, used by `cmd::setup` when no key file
    /// exists yet and by tests that don't care about key provenance.
    pub fn generate() -> Self {
        let mut rng = OsRng;
        Ed25519Signer {
            keypair: Keypair::generate(&mut rng),
        }
    }

    pub fn seed_bytes(&self) -> [u8; 32] {
        self.keypair.secret.to_bytes()
    }

    /// Loads the seed at `key_path` (spec.md §6's "signing key identifier"),
    /// base64-encoded on disk the way `cmd::setup` writes it.
    pub fn load(key_path: &Path) -> anyhow::Result<Self> {
        let encoded = fs::read_to_string(key_path)
            .map_err(|err| anyhow::anyhow!("reading signing key at {}: {err}", key_path.display()))?;
        let seed_bytes = base64::decode(encoded.trim())
            .map_err(|err| anyhow::anyhow!("signing key at {} is not valid base64: {err}", key_path.display()))?;
        let seed: [u8; 32] = seed_bytes.try_into().map_err(|bytes: Vec<u8>| {
            anyhow::anyhow!("signing key at {} is {} bytes, expected 32", key_path.display(), bytes.len())
        })?;
        Ok(Self::from_seed_bytes(&seed))
    }

    /// Writes this signer's seed to `key_path`, base64-encoded
    /// (`cmd::setup`'s key-provisioning step).
    pub fn write_seed(&self, key_path: &Path) -> anyhow::Result<()> {
        fs::write(key_path, base64::encode(self.seed_bytes()))?;
        Ok(())
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, name: &[u8], content: &[u8]) -> Result<Vec<u8>, CoreError> {
        let mut message = Vec::with_capacity(name.len() + content.len());
        message.extend_from_slice(name);
        message.extend_from_slice(content);
        Ok(self.keypair.sign(&message).to_bytes().to_vec())
    }
}
