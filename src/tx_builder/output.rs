//! Transaction build output
//!
//! Holds the compiled envelope with one placeholder signature per required
//! signer. Each authority fills in its own slot; nothing else in the envelope
//! changes once it leaves the builder.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use solana_sdk::{
    pubkey::Pubkey, signature::Signature, signer::Signer, transaction::VersionedTransaction,
};

use crate::compat;
use crate::rpc_manager::ValidityAnchor;
use crate::tx_builder::errors::TransactionBuilderError;
use crate::tx_builder::simulate::ResourceBudget;

/// Compiled transaction plus the facts it was compiled against
#[derive(Debug, Clone)]
pub struct TxBuildOutput {
    /// The compiled transaction; unsigned slots hold `Signature::default()`
    pub tx: VersionedTransaction,

    /// Anchor the message was compiled against
    pub anchor: ValidityAnchor,

    /// Budget embedded in the leading compute-budget instructions
    pub budget: ResourceBudget,

    /// Required signers in signature slot order
    pub required_signers: Vec<Pubkey>,
}

impl TxBuildOutput {
    /// Required signers are read from the message header via the compat layer.
    pub fn new(tx: VersionedTransaction, anchor: ValidityAnchor, budget: ResourceBudget) -> Self {
        let required_signers = compat::get_required_signers(&tx.message).to_vec();
        Self {
            tx,
            anchor,
            budget,
            required_signers,
        }
    }

    pub fn tx_ref(&self) -> &VersionedTransaction {
        &self.tx
    }

    pub fn into_tx(self) -> VersionedTransaction {
        self.tx
    }

    pub fn required_signers(&self) -> &[Pubkey] {
        &self.required_signers
    }

    /// Keys whose slot still holds the placeholder signature
    pub fn missing_signers(&self) -> Vec<Pubkey> {
        self.required_signers
            .iter()
            .zip(self.tx.signatures.iter())
            .filter(|(_, sig)| **sig == Signature::default())
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn is_fully_signed(&self) -> bool {
        self.missing_signers().is_empty()
    }

    /// Add `signer`'s signature at its required position.
    pub fn sign_with<S: Signer + ?Sized>(
        &mut self,
        signer: &S,
    ) -> Result<usize, TransactionBuilderError> {
        apply_signature(&mut self.tx, signer)
    }

    /// Wire bytes of the transaction (bincode)
    pub fn serialize(&self) -> Result<Vec<u8>, TransactionBuilderError> {
        bincode::serialize(&self.tx)
            .map_err(|e| TransactionBuilderError::Internal(format!("Serialization failed: {e}")))
    }

    /// Base64 of the wire bytes, the form the relay accepts
    pub fn to_base64(&self) -> Result<String, TransactionBuilderError> {
        Ok(BASE64.encode(self.serialize()?))
    }
}

/// Sign the message of `tx` with `signer` and place the signature in the
/// signer's required slot. Only that slot is written.
pub fn apply_signature<S: Signer + ?Sized>(
    tx: &mut VersionedTransaction,
    signer: &S,
) -> Result<usize, TransactionBuilderError> {
    let pubkey = signer.pubkey();
    let position = compat::signer_position(&tx.message, &pubkey)
        .ok_or(TransactionBuilderError::SignerNotRequired(pubkey))?;

    let slot_count = compat::get_num_required_signatures(&tx.message) as usize;
    if tx.signatures.len() != slot_count {
        return Err(TransactionBuilderError::Signing(format!(
            "Transaction has {} signature slots, message requires {}",
            tx.signatures.len(),
            slot_count
        )));
    }

    let signature = signer
        .try_sign_message(&tx.message.serialize())
        .map_err(|e| TransactionBuilderError::Signing(e.to_string()))?;
    tx.signatures[position] = signature;
    Ok(position)
}
