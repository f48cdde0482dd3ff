//! Envelope decoding and instruction whitelisting
//!
//! Trust decisions look at two things only: which program an instruction
//! targets and the 8-byte tag at the start of its data. Arguments and
//! accounts are left to the program.

use bincode::Options;
use solana_sdk::{
    message::VersionedMessage, packet::PACKET_DATA_SIZE, pubkey::Pubkey,
    transaction::VersionedTransaction,
};

use crate::compat;
use crate::discriminator::{instruction_tag, split_tag, Discriminator};
use crate::relay::errors::RejectReason;

/// Instruction names allowed to receive the privileged signature, with
/// their tags recomputed from the names
#[derive(Debug, Clone)]
pub struct InstructionWhitelist {
    program_id: Pubkey,
    allowed: Vec<(String, Discriminator)>,
}

impl InstructionWhitelist {
    pub fn new<I, S>(program_id: Pubkey, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed = names
            .into_iter()
            .map(|name| {
                let name = name.into();
                let tag = instruction_tag(&name);
                (name, tag)
            })
            .collect();
        Self { program_id, allowed }
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(|(name, _)| name.as_str())
    }

    /// Name of the allowed instruction whose tag prefixes `data`
    pub fn match_data(&self, data: &[u8]) -> Result<&str, Option<Discriminator>> {
        let (tag, _) = split_tag(data).ok_or(None)?;
        self.allowed
            .iter()
            .find(|(_, expected)| *expected == tag)
            .map(|(name, _)| name.as_str())
            .ok_or(Some(tag))
    }
}

/// What validation established about an accepted envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    /// Allowed instruction names, in instruction order
    pub matched: Vec<String>,
    /// Signature slot the privileged signer fills
    pub signer_position: usize,
}

/// Decode wire bytes into a transaction, rejecting anything that is not a
/// single well-formed envelope.
pub fn decode_envelope(bytes: &[u8]) -> Result<VersionedTransaction, RejectReason> {
    if bytes.is_empty() {
        return Err(RejectReason::MalformedEnvelope("empty envelope".into()));
    }
    if bytes.len() > PACKET_DATA_SIZE {
        return Err(RejectReason::MalformedEnvelope(format!(
            "envelope is {} bytes (max {PACKET_DATA_SIZE})",
            bytes.len()
        )));
    }

    let tx: VersionedTransaction = bincode::options()
        .with_limit(PACKET_DATA_SIZE as u64)
        .with_fixint_encoding()
        .reject_trailing_bytes()
        .deserialize(bytes)
        .map_err(|e| RejectReason::MalformedEnvelope(e.to_string()))?;

    check_structure(&tx)?;
    Ok(tx)
}

/// Index bounds and signature counts. Anything out of range would make
/// program identification ambiguous.
fn check_structure(tx: &VersionedTransaction) -> Result<(), RejectReason> {
    let malformed = |msg: String| Err(RejectReason::MalformedEnvelope(msg));
    let message = &tx.message;
    let header = compat::get_message_header(message);
    let static_keys = compat::get_static_account_keys(message);
    let required = usize::from(header.num_required_signatures);

    if required == 0 || required > static_keys.len() {
        return malformed(format!(
            "header requires {required} signature(s) over {} static keys",
            static_keys.len()
        ));
    }
    if header.num_readonly_signed_accounts >= header.num_required_signatures {
        return malformed("fee payer must be a writable signer".into());
    }
    if tx.signatures.len() != required {
        return malformed(format!(
            "{} signature(s) present, message requires {required}",
            tx.signatures.len()
        ));
    }

    let loaded = match message {
        VersionedMessage::Legacy(_) => 0,
        VersionedMessage::V0(v0) => v0
            .address_table_lookups
            .iter()
            .map(|lookup| lookup.writable_indexes.len() + lookup.readonly_indexes.len())
            .sum(),
    };
    let total_keys = static_keys.len() + loaded;

    for (index, ix) in compat::get_instructions(message).iter().enumerate() {
        let program_index = usize::from(ix.program_id_index);
        // Index 0 is the fee payer, which can never be the invoked program
        if program_index == 0 || program_index >= static_keys.len() {
            return malformed(format!(
                "instruction {index} program index {program_index} out of range"
            ));
        }
        if let Some(account) = ix.accounts.iter().find(|a| usize::from(**a) >= total_keys) {
            return malformed(format!(
                "instruction {index} account index {account} out of range"
            ));
        }
    }
    Ok(())
}

/// Accept `tx` only if every instruction targeting the whitelisted program
/// carries an allowed tag, at least one does, and `privileged` is among the
/// required signers.
pub fn validate(
    tx: &VersionedTransaction,
    whitelist: &InstructionWhitelist,
    privileged: &Pubkey,
) -> Result<Validation, RejectReason> {
    let message = &tx.message;
    let mut matched = Vec::new();

    for (index, ix) in compat::get_instructions(message).iter().enumerate() {
        let program = compat::program_id_of(message, ix).ok_or_else(|| {
            RejectReason::MalformedEnvelope(format!("instruction {index} has no program"))
        })?;
        if program != whitelist.program_id() {
            continue;
        }
        match whitelist.match_data(&ix.data) {
            Ok(name) => matched.push(name.to_string()),
            Err(tag) => return Err(RejectReason::DisallowedInstruction { index, tag }),
        }
    }

    if matched.is_empty() {
        return Err(RejectReason::NoMatchingInstruction);
    }

    let signer_position = compat::signer_position(message, privileged)
        .ok_or(RejectReason::PrivilegedSignerNotRequired(*privileged))?;

    Ok(Validation {
        matched,
        signer_position,
    })
}
