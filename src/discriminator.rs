//! Instruction and account type tags.
//!
//! A tag is the first eight bytes of `sha256("<namespace>:<name>")`.
//! Instructions use the `global` namespace with the snake_case handler name,
//! accounts use the `account` namespace with the type name.

use sha2::{Digest, Sha256};

pub const DISCRIMINATOR_LEN: usize = 8;

pub type Discriminator = [u8; DISCRIMINATOR_LEN];

/// Tag that prefixes the data of the instruction named `name`.
pub fn instruction_tag(name: &str) -> Discriminator {
    sighash("global", name)
}

/// Tag that prefixes the data of an account of type `name`.
pub fn account_tag(name: &str) -> Discriminator {
    sighash("account", name)
}

/// Split instruction or account data into its tag and payload.
///
/// Returns `None` when the data is shorter than a tag.
pub fn split_tag(data: &[u8]) -> Option<(Discriminator, &[u8])> {
    if data.len() < DISCRIMINATOR_LEN {
        return None;
    }
    let (tag, rest) = data.split_at(DISCRIMINATOR_LEN);
    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(tag);
    Some((out, rest))
}

fn sighash(namespace: &str, name: &str) -> Discriminator {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();

    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&digest[..DISCRIMINATOR_LEN]);
    out
}
