//! Node identity
//!
//! Ed25519 signing key of the local node and its on-disk key file. The public key
//! is the node's [`PeerId`].

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{CryptoRng, RngCore};
use tracing::info;

use crate::errors::IdentityError;
use crate::types::PeerId;

// ----------------------------------------------------------------------------
// Identity Key Pair (Ed25519)
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct IdentityKeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl IdentityKeyPair {
    /// Generate a new random identity key pair
    pub fn generate() -> Self {
        let mut rng = rand_core::OsRng;
        Self::generate_with_rng(&mut rng)
    }

    pub fn generate_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut secret_bytes = [0u8; 32];
        rng.fill_bytes(&mut secret_bytes);
        Self::from_bytes(&secret_bytes)
    }

    /// Create from raw private key bytes
    pub fn from_bytes(private_key: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(private_key);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        PeerId::new(self.verifying_key.to_bytes())
    }

    pub fn private_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn sign<T: AsRef<[u8]>>(&self, data: T) -> [u8; 64] {
        self.signing_key.sign(data.as_ref()).to_bytes()
    }

    /// Verify `signature` over `data` against the key behind `peer`
    pub fn verify<D: AsRef<[u8]>>(
        peer: &PeerId,
        data: D,
        signature: &[u8],
    ) -> Result<(), IdentityError> {
        let verifying_key = VerifyingKey::from_bytes(peer.as_bytes()).map_err(|e| {
            IdentityError::InvalidKey {
                reason: e.to_string(),
            }
        })?;
        let signature = Signature::from_slice(signature)
            .map_err(|_| IdentityError::SignatureVerificationFailed)?;

        verifying_key
            .verify(data.as_ref(), &signature)
            .map_err(|_| IdentityError::SignatureVerificationFailed)
    }

    // ------------------------------------------------------------------------
    // Key File
    // ------------------------------------------------------------------------

    /// Load the key stored at `path`, generating and saving a fresh one if the
    /// file does not exist yet
    pub fn load_or_generate(path: &Path) -> Result<Self, IdentityError> {
        match Self::load(path) {
            Ok(identity) => {
                info!("Loaded private key from {}", path.display());
                Ok(identity)
            }
            Err(IdentityError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                info!("No private key at {}, generating a new one", path.display());
                let identity = Self::generate();
                identity.save(path)?;
                info!("Saved private key to {}", path.display());
                Ok(identity)
            }
            Err(e) => Err(e),
        }
    }

    /// Load a hex-encoded private key
    pub fn load(path: &Path) -> Result<Self, IdentityError> {
        let contents = fs::read_to_string(path).map_err(|source| IdentityError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let bytes = hex::decode(contents.trim()).map_err(|e| IdentityError::InvalidKey {
            reason: e.to_string(),
        })?;
        let secret: [u8; 32] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| IdentityError::InvalidKey {
                    reason: format!("expected 32 bytes, got {}", bytes.len()),
                })?;

        Ok(Self::from_bytes(&secret))
    }

    /// Save the private key as hex, readable by the owner only on unix
    pub fn save(&self, path: &Path) -> Result<(), IdentityError> {
        let io_err = |source| IdentityError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, hex::encode(self.private_key_bytes())).map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(io_err)?;
        }

        Ok(())
    }
}
