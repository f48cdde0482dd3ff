//! Privileged key material
//!
//! The admin keypair is the one secret this service holds. It is loaded
//! once, shared behind an `Arc`, and never printed: `Debug` shows only the
//! public key.

use anyhow::{Context, Result};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::path::Path;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Signing authority whose signature the relay adds
#[derive(Clone)]
pub struct AuthorityKeypair {
    keypair: Arc<Keypair>,
}

impl std::fmt::Debug for AuthorityKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorityKeypair")
            .field("pubkey", &self.keypair.pubkey())
            .field("secret", &"<redacted>")
            .finish()
    }
}

fn keypair_from_bytes(bytes: &[u8]) -> Result<Keypair> {
    if bytes.len() != 64 {
        anyhow::bail!("Invalid keypair length: expected 64 bytes, got {}", bytes.len());
    }
    if bytes.iter().all(|&b| b == 0) {
        anyhow::bail!("Invalid keypair: all-zero key rejected");
    }
    Keypair::try_from(bytes).context("Invalid keypair bytes")
}

impl AuthorityKeypair {
    /// Load from a keypair file: either the CLI's JSON array of 64 numbers
    /// or 64 raw bytes.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = Zeroizing::new(
            std::fs::read(path)
                .with_context(|| format!("Failed to read keypair file: {}", path.display()))?,
        );

        let keypair = if contents.len() == 64 {
            keypair_from_bytes(&contents)?
        } else {
            let json: Zeroizing<Vec<u8>> = Zeroizing::new(
                serde_json::from_slice(&contents).context("Failed to parse keypair JSON")?,
            );
            keypair_from_bytes(&json)?
        };

        Ok(Self::from_keypair(keypair))
    }

    /// Load from a JSON array held in an environment variable
    pub fn from_json_env(var: &str) -> Result<Self> {
        let raw = Zeroizing::new(
            std::env::var(var).with_context(|| format!("{var} is not set"))?,
        );
        let json: Zeroizing<Vec<u8>> = Zeroizing::new(
            serde_json::from_str(&raw).with_context(|| format!("{var} is not a JSON byte array"))?,
        );
        Ok(Self::from_keypair(keypair_from_bytes(&json)?))
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn signer(&self) -> &Keypair {
        &self.keypair
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_json_keypair() {
        let keypair = Keypair::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = AuthorityKeypair::from_file(file.path()).unwrap();
        assert_eq!(loaded.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_load_raw_keypair() {
        let keypair = Keypair::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&keypair.to_bytes()).unwrap();

        let loaded = AuthorityKeypair::from_file(file.path()).unwrap();
        assert_eq!(loaded.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_all_zero_key_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 64]).unwrap();
        assert!(AuthorityKeypair::from_file(file.path()).is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let keypair = Keypair::new();
        let secret = bs58::encode(keypair.to_bytes()).into_string();
        let authority = AuthorityKeypair::from_keypair(keypair);

        let rendered = format!("{authority:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains(&authority.pubkey().to_string()));
        assert!(!rendered.contains(&secret));
    }
}
