//! Program-derived address helpers.
//!
//! Derivation is a pure function of the program id and an ordered seed tuple.
//! Seeds are checked against the ledger's packing limits before any hashing,
//! so an oversized name fails here instead of in a rejected submission.

use solana_sdk::pubkey::{Pubkey, PubkeyError};
use thiserror::Error;

use crate::constants::{
    CONFIG_SEED, ITEM_SEED, MAX_ITEM_NAME_LEN, MAX_SEEDS, MAX_SEED_LEN, ORDER_SEED, REVIEW_SEED,
    SHOPPER_SEED, STORE_SEED,
};

/// Errors raised while validating seeds or deriving an address
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PdaError {
    /// A single seed exceeds the per-seed limit
    #[error("Seed {index} is {len} bytes (max {max})")]
    SeedTooLarge { index: usize, len: usize, max: usize },

    /// The tuple plus the bump seed exceeds the seed-count limit
    #[error("Too many seeds: {count} (max {max} including bump)")]
    TooManySeeds { count: usize, max: usize },

    /// A human-readable name exceeds the entity's limit
    #[error("{entity} name is {len} bytes (max {max})")]
    NameTooLong {
        entity: &'static str,
        len: usize,
        max: usize,
    },

    /// A human-readable name is empty
    #[error("{entity} name is required")]
    NameRequired { entity: &'static str },

    /// Every bump from 255 down to 0 produced an on-curve point
    #[error("No off-curve address exists for the given seeds")]
    NoViableBump,

    /// Unexpected failure from the address hashing routine
    #[error("Address derivation failed: {0}")]
    Derivation(String),
}

impl PdaError {
    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::SeedTooLarge { .. } | Self::TooManySeeds { .. } => "seed_too_large",
            Self::NameTooLong { .. } | Self::NameRequired { .. } => "name",
            Self::NoViableBump | Self::Derivation(_) => "derivation",
        }
    }
}

/// Ordered seed tuple identifying one derived address.
///
/// Seeds are constant tags, raw public keys or fixed-width little-endian
/// integers. The tuple is a plain value; building it performs no validation,
/// [`derive`] does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Seeds {
    parts: Vec<Vec<u8>>,
}

impl Seeds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw byte seed
    pub fn with(mut self, seed: impl AsRef<[u8]>) -> Self {
        self.parts.push(seed.as_ref().to_vec());
        self
    }

    /// Append a public key seed
    pub fn with_key(self, key: &Pubkey) -> Self {
        self.with(key.as_ref())
    }

    pub fn with_u16_le(self, value: u16) -> Self {
        self.with(value.to_le_bytes())
    }

    pub fn with_i64_le(self, value: i64) -> Self {
        self.with(value.to_le_bytes())
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.parts.iter().map(Vec::as_slice)
    }

    /// Check the tuple against the per-seed and seed-count limits.
    ///
    /// One slot of `MAX_SEEDS` is reserved for the bump byte.
    pub fn validate(&self) -> Result<(), PdaError> {
        if self.parts.len() + 1 > MAX_SEEDS {
            return Err(PdaError::TooManySeeds {
                count: self.parts.len() + 1,
                max: MAX_SEEDS,
            });
        }
        for (index, part) in self.parts.iter().enumerate() {
            if part.len() > MAX_SEED_LEN {
                return Err(PdaError::SeedTooLarge {
                    index,
                    len: part.len(),
                    max: MAX_SEED_LEN,
                });
            }
        }
        Ok(())
    }
}

/// Derive the canonical `(address, bump)` for `seeds` under `program_id`.
///
/// Walks the bump byte down from 255 and returns the first candidate that is
/// off the ed25519 curve. Same inputs always give the same output.
pub fn derive(program_id: &Pubkey, seeds: &Seeds) -> Result<(Pubkey, u8), PdaError> {
    seeds.validate()?;

    let base: Vec<&[u8]> = seeds.iter().collect();
    for bump in (0..=u8::MAX).rev() {
        let bump_seed = [bump];
        let mut candidate_seeds = Vec::with_capacity(base.len() + 1);
        candidate_seeds.extend_from_slice(&base);
        candidate_seeds.push(&bump_seed[..]);

        match Pubkey::create_program_address(&candidate_seeds, program_id) {
            Ok(address) => return Ok((address, bump)),
            // On-curve candidate, try the next bump
            Err(PubkeyError::InvalidSeeds) => continue,
            Err(err) => return Err(PdaError::Derivation(err.to_string())),
        }
    }

    Err(PdaError::NoViableBump)
}

/// Reject empty or oversized display names before they reach a seed or
/// an instruction payload.
pub fn validate_name(entity: &'static str, name: &str, max: usize) -> Result<(), PdaError> {
    if name.trim().is_empty() {
        return Err(PdaError::NameRequired { entity });
    }
    if name.len() > max {
        return Err(PdaError::NameTooLong {
            entity,
            len: name.len(),
            max,
        });
    }
    Ok(())
}

/// Address book for the marketplace program's derived accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramAddresses {
    program_id: Pubkey,
}

impl ProgramAddresses {
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    /// Shared configuration / treasury singleton.
    pub fn config(&self) -> Result<(Pubkey, u8), PdaError> {
        derive(&self.program_id, &Seeds::new().with(CONFIG_SEED))
    }

    pub fn shopper(&self, authority: &Pubkey) -> Result<(Pubkey, u8), PdaError> {
        derive(
            &self.program_id,
            &Seeds::new().with(SHOPPER_SEED).with_key(authority),
        )
    }

    pub fn store(&self, authority: &Pubkey) -> Result<(Pubkey, u8), PdaError> {
        derive(
            &self.program_id,
            &Seeds::new().with(STORE_SEED).with_key(authority),
        )
    }

    /// Listing keyed by store + name. The name is a raw seed, so it is
    /// length-checked first.
    pub fn item(&self, store: &Pubkey, name: &str) -> Result<(Pubkey, u8), PdaError> {
        validate_name("Item", name, MAX_ITEM_NAME_LEN)?;
        derive(
            &self.program_id,
            &Seeds::new().with(ITEM_SEED).with_key(store).with(name),
        )
    }

    /// Purchase keyed by shopper + item + creation timestamp (i64 LE).
    pub fn order(
        &self,
        shopper: &Pubkey,
        item: &Pubkey,
        timestamp: i64,
    ) -> Result<(Pubkey, u8), PdaError> {
        derive(
            &self.program_id,
            &Seeds::new()
                .with(ORDER_SEED)
                .with_key(shopper)
                .with_key(item)
                .with_i64_le(timestamp),
        )
    }

    pub fn review(&self, order: &Pubkey) -> Result<(Pubkey, u8), PdaError> {
        derive(
            &self.program_id,
            &Seeds::new().with(REVIEW_SEED).with_key(order),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addresses() -> ProgramAddresses {
        ProgramAddresses::new(crate::constants::default_program_id())
    }

    #[test]
    fn derive_is_deterministic() {
        let program_id = Pubkey::new_unique();
        let authority = Pubkey::new_unique();
        let seeds = Seeds::new().with(SHOPPER_SEED).with_key(&authority);

        let first = derive(&program_id, &seeds).unwrap();
        let second = derive(&program_id, &seeds).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn derive_matches_ledger_find_program_address() {
        let program_id = Pubkey::new_unique();
        let store = Pubkey::new_unique();
        let seeds = Seeds::new().with(ITEM_SEED).with_key(&store).with("mug");

        let expected = Pubkey::find_program_address(&[ITEM_SEED, store.as_ref(), b"mug"], &program_id);
        assert_eq!(derive(&program_id, &seeds).unwrap(), expected);
    }

    #[test]
    fn derived_address_is_off_curve() {
        let (address, _) = addresses().config().unwrap();
        assert!(!address.is_on_curve());
    }

    #[test]
    fn oversized_seed_is_rejected() {
        let seeds = Seeds::new().with(STORE_SEED).with([7u8; 33]);
        let err = derive(&Pubkey::new_unique(), &seeds).unwrap_err();
        assert_eq!(
            err,
            PdaError::SeedTooLarge {
                index: 1,
                len: 33,
                max: MAX_SEED_LEN
            }
        );
        assert_eq!(err.category(), "seed_too_large");
    }

    #[test]
    fn too_many_seeds_is_rejected() {
        let mut seeds = Seeds::new();
        for _ in 0..MAX_SEEDS {
            seeds = seeds.with([1u8]);
        }
        assert!(matches!(
            derive(&Pubkey::new_unique(), &seeds),
            Err(PdaError::TooManySeeds { .. })
        ));
    }

    #[test]
    fn item_name_over_limit_fails_fast() {
        let store = Pubkey::new_unique();
        let name = "x".repeat(MAX_ITEM_NAME_LEN + 1);
        assert_eq!(
            addresses().item(&store, &name).unwrap_err(),
            PdaError::NameTooLong {
                entity: "Item",
                len: MAX_ITEM_NAME_LEN + 1,
                max: MAX_ITEM_NAME_LEN
            }
        );
        assert!(addresses().item(&store, &"x".repeat(MAX_ITEM_NAME_LEN)).is_ok());
    }

    #[test]
    fn empty_item_name_is_rejected() {
        assert_eq!(
            addresses().item(&Pubkey::new_unique(), "  ").unwrap_err(),
            PdaError::NameRequired { entity: "Item" }
        );
    }

    #[test]
    fn order_timestamp_changes_address() {
        let shopper = Pubkey::new_unique();
        let item = Pubkey::new_unique();
        let a = addresses().order(&shopper, &item, 1_700_000_000).unwrap();
        let b = addresses().order(&shopper, &item, 1_700_000_001).unwrap();
        assert_ne!(a.0, b.0);
    }

    #[test]
    fn shopper_and_store_do_not_collide() {
        let authority = Pubkey::new_unique();
        assert_ne!(
            addresses().shopper(&authority).unwrap().0,
            addresses().store(&authority).unwrap().0
        );
    }

    proptest! {
        #[test]
        fn derive_agrees_with_find_program_address(
            tag in proptest::collection::vec(any::<u8>(), 0..=MAX_SEED_LEN),
            key in any::<[u8; 32]>(),
        ) {
            let program_id = Pubkey::new_from_array([9u8; 32]);
            let key = Pubkey::new_from_array(key);
            let seeds = Seeds::new().with(&tag).with_key(&key);

            let ours = derive(&program_id, &seeds).unwrap();
            let ledger = Pubkey::find_program_address(&[&tag, key.as_ref()], &program_id);
            prop_assert_eq!(ours, ledger);
            prop_assert_eq!(derive(&program_id, &seeds).unwrap(), ours);
        }
    }
}
