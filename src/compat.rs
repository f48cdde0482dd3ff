//! Compatibility layer for Solana SDK message types
//!
//! Legacy and V0 messages expose the same information through different
//! fields. The relay and the transaction builder only ever need the header,
//! the static keys and the compiled instructions, so this module gives them a
//! single accessor for each regardless of version.

use solana_sdk::{
    instruction::CompiledInstruction,
    message::{MessageHeader, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};

/// Get the message header from a `VersionedMessage`.
#[inline]
#[must_use]
pub fn get_message_header(message: &VersionedMessage) -> &MessageHeader {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.header,
        VersionedMessage::V0(v0_msg) => &v0_msg.header,
    }
}

/// Get the static account keys from a `VersionedMessage`.
///
/// For V0 messages this excludes addresses loaded from lookup tables, which
/// can never be signers.
#[inline]
#[must_use]
pub fn get_static_account_keys(message: &VersionedMessage) -> &[Pubkey] {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.account_keys,
        VersionedMessage::V0(v0_msg) => &v0_msg.account_keys,
    }
}

/// Get the compiled instructions in execution order.
#[inline]
#[must_use]
pub fn get_instructions(message: &VersionedMessage) -> &[CompiledInstruction] {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.instructions,
        VersionedMessage::V0(v0_msg) => &v0_msg.instructions,
    }
}

/// Get the accounts whose signatures the message requires, in signature
/// slot order.
///
/// Returns an empty slice if the header claims more signers than there are
/// static keys.
#[must_use]
pub fn get_required_signers(message: &VersionedMessage) -> &[Pubkey] {
    let num_required = get_message_header(message).num_required_signatures as usize;
    let keys = get_static_account_keys(message);
    keys.get(..num_required).unwrap_or(&[])
}

#[inline]
#[must_use]
pub fn get_num_required_signatures(message: &VersionedMessage) -> u8 {
    get_message_header(message).num_required_signatures
}

/// Signature slot index of `signer`, if the message requires its signature.
#[must_use]
pub fn signer_position(message: &VersionedMessage, signer: &Pubkey) -> Option<usize> {
    get_required_signers(message)
        .iter()
        .position(|key| key == signer)
}

/// Program invoked by a compiled instruction.
///
/// `None` when the program index points past the static keys. Programs can
/// not be loaded from lookup tables, so the static keys are sufficient.
#[must_use]
pub fn program_id_of<'a>(
    message: &'a VersionedMessage,
    instruction: &CompiledInstruction,
) -> Option<&'a Pubkey> {
    get_static_account_keys(message).get(instruction.program_id_index as usize)
}

/// Signatures present on the transaction that are not the all-zero
/// placeholder.
#[must_use]
pub fn count_present_signatures(tx: &VersionedTransaction) -> usize {
    tx.signatures
        .iter()
        .filter(|sig| **sig != Signature::default())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        hash::Hash,
        instruction::{AccountMeta, Instruction},
        message::{v0, Message},
        signature::{Keypair, Signer},
    };

    fn program_ix(program_id: Pubkey, signer: Pubkey, cosigner: Pubkey) -> Instruction {
        Instruction::new_with_bytes(
            program_id,
            &[1, 2, 3],
            vec![
                AccountMeta::new(signer, true),
                AccountMeta::new(cosigner, true),
            ],
        )
    }

    #[test]
    fn legacy_and_v0_agree_on_header_and_signers() {
        let payer = Keypair::new();
        let admin = Pubkey::new_unique();
        let program_id = Pubkey::new_unique();
        let ix = program_ix(program_id, payer.pubkey(), admin);

        let legacy = VersionedMessage::Legacy(Message::new(&[ix.clone()], Some(&payer.pubkey())));
        let v0 = VersionedMessage::V0(
            v0::Message::try_compile(&payer.pubkey(), &[ix], &[], Hash::default()).unwrap(),
        );

        for message in [&legacy, &v0] {
            assert_eq!(get_num_required_signatures(message), 2);
            assert_eq!(get_required_signers(message), &[payer.pubkey(), admin]);
            assert_eq!(signer_position(message, &admin), Some(1));
            assert_eq!(signer_position(message, &program_id), None);
        }
    }

    #[test]
    fn program_id_of_resolves_static_key() {
        let payer = Pubkey::new_unique();
        let program_id = Pubkey::new_unique();
        let ix = program_ix(program_id, payer, Pubkey::new_unique());
        let message = VersionedMessage::V0(
            v0::Message::try_compile(&payer, &[ix], &[], Hash::default()).unwrap(),
        );

        let compiled = &get_instructions(&message)[0];
        assert_eq!(program_id_of(&message, compiled), Some(&program_id));

        let mut bogus = compiled.clone();
        bogus.program_id_index = 200;
        assert_eq!(program_id_of(&message, &bogus), None);
    }

    #[test]
    fn required_signers_tolerates_inconsistent_header() {
        let payer = Pubkey::new_unique();
        let mut message = Message::new(&[], Some(&payer));
        message.header.num_required_signatures = 9;
        let message = VersionedMessage::Legacy(message);

        assert!(get_required_signers(&message).is_empty());
    }

    #[test]
    fn placeholder_signatures_are_not_counted() {
        let payer = Keypair::new();
        let message = VersionedMessage::Legacy(Message::new(&[], Some(&payer.pubkey())));
        let mut tx = VersionedTransaction {
            signatures: vec![Signature::default()],
            message,
        };
        assert_eq!(count_present_signatures(&tx), 0);

        tx.signatures[0] = payer.sign_message(&tx.message.serialize());
        assert_eq!(count_present_signatures(&tx), 1);
    }
}
