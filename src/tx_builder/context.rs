//! Build context: everything compilation needs besides the instructions
//!
//! A context pins the validity anchor and the resolved lookup tables, so
//! compiling the same plan against the same context is reproducible byte for
//! byte.

use solana_sdk::address_lookup_table::AddressLookupTableAccount;

use crate::rpc_manager::ValidityAnchor;

/// Anchor and lookup tables for one assembly
pub struct BuildContext {
    /// Recent blockhash plus the block height after which it expires
    pub anchor: ValidityAnchor,

    /// Resolved lookup tables, in caller order
    pub lookup_tables: Vec<AddressLookupTableAccount>,
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables: Vec<String> = self
            .lookup_tables
            .iter()
            .map(|table| format!("{}({} addresses)", table.key, table.addresses.len()))
            .collect();
        f.debug_struct("BuildContext")
            .field("blockhash", &self.anchor.blockhash)
            .field("last_valid_block_height", &self.anchor.last_valid_block_height)
            .field("lookup_tables", &tables)
            .finish()
    }
}

impl BuildContext {
    pub fn new(anchor: ValidityAnchor, lookup_tables: Vec<AddressLookupTableAccount>) -> Self {
        Self {
            anchor,
            lookup_tables,
        }
    }

    /// Number of addresses available for compaction across all tables
    pub fn compactable_addresses(&self) -> usize {
        self.lookup_tables
            .iter()
            .map(|table| table.addresses.len())
            .sum()
    }
}
