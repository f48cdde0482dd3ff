//! Marketplace instruction builders
//!
//! Instruction data is the 8-byte type tag followed by the borsh-encoded
//! arguments. Account lists follow the program's declared order.

use borsh::BorshSerialize;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program,
};
use spl_associated_token_account::get_associated_token_address_with_program_id;

use crate::accounts::{AcceptedMint, OrderStatus};
use crate::constants::{MAX_ITEM_NAME_LEN, MAX_REVIEW_TEXT_LEN, MAX_SHOPPER_NAME_LEN, MAX_STORE_NAME_LEN};
use crate::discriminator::instruction_tag;
use crate::pda::{validate_name, ProgramAddresses};
use crate::task_queue::TaskSlot;
use crate::tx_builder::TransactionBuilderError;

pub const INITIALIZE_SHOPPER: &str = "initialize_shopper";
pub const INITIALIZE_STORE: &str = "initialize_store";
pub const LIST_ITEM: &str = "list_item";
pub const CREATE_ORDER: &str = "create_order";
pub const SHIP_ORDER: &str = "ship_order";
pub const CANCEL_ORDER: &str = "cancel_order";
pub const COMPLETE_ORDER: &str = "complete_order";
pub const CREATE_REVIEW: &str = "create_review";
pub const UPDATE_ORDER: &str = "update_order";
pub const UPDATE_ITEM: &str = "update_item";
pub const UNLIST_ITEM: &str = "unlist_item";
pub const WITHDRAW_EARNINGS: &str = "withdraw_earnings";
pub const INITIALIZE_CONFIG: &str = "initialize_config";
pub const UPDATE_CONFIG: &str = "update_config";

/// Every instruction name this crate knows how to build
pub const KNOWN_INSTRUCTIONS: &[&str] = &[
    INITIALIZE_SHOPPER,
    INITIALIZE_STORE,
    LIST_ITEM,
    CREATE_ORDER,
    SHIP_ORDER,
    CANCEL_ORDER,
    COMPLETE_ORDER,
    CREATE_REVIEW,
    UPDATE_ORDER,
    UPDATE_ITEM,
    UNLIST_ITEM,
    WITHDRAW_EARNINGS,
    INITIALIZE_CONFIG,
    UPDATE_CONFIG,
];

/// Basis points in 100%
const MAX_ORDER_FEE_BPS: u16 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct ShopperProfile {
    pub name: String,
    pub image: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct StoreProfile {
    pub name: String,
    pub image: String,
    pub about: String,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct Listing {
    /// Unit price in the payment mint's atomic units
    pub price: u64,
    pub inventory_count: u32,
    pub name: String,
    pub image: String,
    pub description: String,
}

/// Partial listing edit; `None` leaves the field unchanged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, BorshSerialize)]
pub struct ItemUpdate {
    pub price: Option<u64>,
    pub inventory_count: Option<u32>,
}

/// Initial marketplace settings
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct MarketplaceSettings {
    pub admin: Pubkey,
    pub treasury: Pubkey,
    pub order_fee_bps: u16,
    pub accepted_mints: Vec<AcceptedMint>,
}

/// Partial settings edit signed by the current admin
#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize)]
pub struct ConfigUpdate {
    pub new_admin: Option<Pubkey>,
    pub treasury: Option<Pubkey>,
    pub is_paused: Option<bool>,
    pub order_fee_bps: Option<u16>,
    pub accepted_mints: Option<Vec<AcceptedMint>>,
}

#[derive(BorshSerialize)]
struct CreateOrderArgs {
    amount: u32,
    timestamp: i64,
}

#[derive(BorshSerialize)]
struct ShipOrderArgs {
    task_id: u16,
}

#[derive(BorshSerialize)]
struct CreateReviewArgs<'a> {
    text: &'a str,
    rating: u8,
}

/// Accounts shared by the order lifecycle instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderAccounts {
    /// Marketplace admin; the privileged co-signer
    pub admin: Pubkey,
    /// Wallet that placed the order
    pub authority: Pubkey,
    pub shopper: Pubkey,
    pub store: Pubkey,
    pub item: Pubkey,
    pub order: Pubkey,
    pub payment_mint: Pubkey,
    /// Token program that owns `payment_mint`
    pub token_program: Pubkey,
}

/// Inputs for a purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseRequest {
    pub authority: Pubkey,
    pub treasury: Pubkey,
    pub store: Pubkey,
    pub item: Pubkey,
    /// Oracle price account for the payment mint
    pub price_update: Pubkey,
    pub payment_mint: Pubkey,
    pub token_program: Pubkey,
    pub amount: u32,
    /// Unix seconds; also a seed of the order address
    pub timestamp: i64,
}

/// Scheduling accounts embedded in `ship_order`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShipmentSchedule {
    pub task_queue: Pubkey,
    pub task_queue_program: Pubkey,
    pub slot: TaskSlot,
}

/// Builds marketplace instructions against one deployed program
#[derive(Debug, Clone, Copy)]
pub struct InstructionBuilder {
    addresses: ProgramAddresses,
}

fn encode<T: BorshSerialize>(name: &str, args: &T) -> Result<Vec<u8>, TransactionBuilderError> {
    let mut data = instruction_tag(name).to_vec();
    args.serialize(&mut data)
        .map_err(|e| TransactionBuilderError::instruction_failed(name, e.to_string()))?;
    Ok(data)
}

/// Token account of `owner` for `mint`; owners may be derived addresses
pub fn token_account(owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    get_associated_token_address_with_program_id(owner, mint, token_program)
}

impl InstructionBuilder {
    pub fn new(addresses: ProgramAddresses) -> Self {
        Self { addresses }
    }

    pub fn addresses(&self) -> &ProgramAddresses {
        &self.addresses
    }

    fn instruction(&self, data: Vec<u8>, accounts: Vec<AccountMeta>) -> Instruction {
        Instruction {
            program_id: *self.addresses.program_id(),
            accounts,
            data,
        }
    }

    pub fn initialize_shopper(
        &self,
        authority: &Pubkey,
        profile: &ShopperProfile,
    ) -> Result<Instruction, TransactionBuilderError> {
        validate_name("Shopper", &profile.name, MAX_SHOPPER_NAME_LEN)?;
        if profile.address.trim().is_empty() {
            return Err(TransactionBuilderError::instruction_failed(
                INITIALIZE_SHOPPER,
                "shipping address is required",
            ));
        }
        let (shopper, _) = self.addresses.shopper(authority)?;

        Ok(self.instruction(
            encode(INITIALIZE_SHOPPER, profile)?,
            vec![
                AccountMeta::new(*authority, true),
                AccountMeta::new(shopper, false),
                AccountMeta::new_readonly(system_program::id(), false),
            ],
        ))
    }

    pub fn initialize_store(
        &self,
        authority: &Pubkey,
        profile: &StoreProfile,
    ) -> Result<Instruction, TransactionBuilderError> {
        validate_name("Store", &profile.name, MAX_STORE_NAME_LEN)?;
        let (store, _) = self.addresses.store(authority)?;

        Ok(self.instruction(
            encode(INITIALIZE_STORE, profile)?,
            vec![
                AccountMeta::new(*authority, true),
                AccountMeta::new(store, false),
                AccountMeta::new_readonly(system_program::id(), false),
            ],
        ))
    }

    pub fn list_item(
        &self,
        authority: &Pubkey,
        listing: &Listing,
    ) -> Result<Instruction, TransactionBuilderError> {
        validate_name("Item", &listing.name, MAX_ITEM_NAME_LEN)?;
        let (store, _) = self.addresses.store(authority)?;
        let (item, _) = self.addresses.item(&store, &listing.name)?;

        Ok(self.instruction(
            encode(LIST_ITEM, listing)?,
            vec![
                AccountMeta::new(*authority, true),
                AccountMeta::new(item, false),
                AccountMeta::new_readonly(store, false),
                AccountMeta::new_readonly(system_program::id(), false),
            ],
        ))
    }

    /// Edit price or stock of one of the authority's listings
    pub fn update_item(
        &self,
        authority: &Pubkey,
        item_name: &str,
        update: &ItemUpdate,
    ) -> Result<Instruction, TransactionBuilderError> {
        if update.price == Some(0) {
            return Err(TransactionBuilderError::instruction_failed(
                UPDATE_ITEM,
                "price must be positive",
            ));
        }
        let (store, _) = self.addresses.store(authority)?;
        let (item, _) = self.addresses.item(&store, item_name)?;

        Ok(self.instruction(
            encode(UPDATE_ITEM, update)?,
            vec![
                AccountMeta::new_readonly(*authority, true),
                AccountMeta::new(item, false),
                AccountMeta::new_readonly(store, false),
            ],
        ))
    }

    /// Close a listing, returning its rent to the authority
    pub fn unlist_item(
        &self,
        authority: &Pubkey,
        item_name: &str,
    ) -> Result<Instruction, TransactionBuilderError> {
        let (store, _) = self.addresses.store(authority)?;
        let (item, _) = self.addresses.item(&store, item_name)?;

        Ok(self.instruction(
            encode(UNLIST_ITEM, &())?,
            vec![
                AccountMeta::new(*authority, true),
                AccountMeta::new(item, false),
                AccountMeta::new_readonly(store, false),
                AccountMeta::new_readonly(system_program::id(), false),
            ],
        ))
    }

    pub fn create_order(
        &self,
        request: &PurchaseRequest,
    ) -> Result<Instruction, TransactionBuilderError> {
        if request.amount == 0 {
            return Err(TransactionBuilderError::instruction_failed(
                CREATE_ORDER,
                "amount must be at least 1",
            ));
        }
        let (config, _) = self.addresses.config()?;
        let (shopper, _) = self.addresses.shopper(&request.authority)?;
        let (order, _) = self
            .addresses
            .order(&shopper, &request.item, request.timestamp)?;
        let mint = &request.payment_mint;
        let token_program = &request.token_program;

        Ok(self.instruction(
            encode(
                CREATE_ORDER,
                &CreateOrderArgs {
                    amount: request.amount,
                    timestamp: request.timestamp,
                },
            )?,
            vec![
                AccountMeta::new(request.authority, true),
                AccountMeta::new_readonly(request.treasury, false),
                AccountMeta::new_readonly(config, false),
                AccountMeta::new_readonly(shopper, false),
                AccountMeta::new_readonly(request.store, false),
                AccountMeta::new(request.item, false),
                AccountMeta::new(order, false),
                AccountMeta::new_readonly(request.price_update, false),
                AccountMeta::new_readonly(*mint, false),
                AccountMeta::new(token_account(&request.authority, mint, token_program), false),
                AccountMeta::new(token_account(&request.treasury, mint, token_program), false),
                AccountMeta::new(token_account(&order, mint, token_program), false),
                AccountMeta::new_readonly(system_program::id(), false),
                AccountMeta::new_readonly(*token_program, false),
                AccountMeta::new_readonly(spl_associated_token_account::id(), false),
            ],
        ))
    }

    /// Mark an order as shipping and schedule its automatic completion in
    /// the task slot `schedule.slot`.
    pub fn ship_order(
        &self,
        accounts: &OrderAccounts,
        schedule: &ShipmentSchedule,
    ) -> Result<Instruction, TransactionBuilderError> {
        let (config, _) = self.addresses.config()?;
        let mint = &accounts.payment_mint;
        let token_program = &accounts.token_program;

        Ok(self.instruction(
            encode(
                SHIP_ORDER,
                &ShipOrderArgs {
                    task_id: schedule.slot.id,
                },
            )?,
            vec![
                AccountMeta::new(accounts.admin, true),
                AccountMeta::new(accounts.authority, false),
                AccountMeta::new_readonly(config, false),
                AccountMeta::new_readonly(accounts.shopper, false),
                AccountMeta::new_readonly(accounts.store, false),
                AccountMeta::new_readonly(accounts.item, false),
                AccountMeta::new(accounts.order, false),
                AccountMeta::new_readonly(*mint, false),
                AccountMeta::new(token_account(&accounts.order, mint, token_program), false),
                AccountMeta::new(token_account(&accounts.store, mint, token_program), false),
                AccountMeta::new(schedule.task_queue, false),
                AccountMeta::new_readonly(schedule.slot.queue_authority, false),
                AccountMeta::new(schedule.slot.task, false),
                AccountMeta::new_readonly(schedule.task_queue_program, false),
                AccountMeta::new_readonly(system_program::id(), false),
                AccountMeta::new_readonly(*token_program, false),
                AccountMeta::new_readonly(spl_associated_token_account::id(), false),
            ],
        ))
    }

    /// Cancel an order, refunding the escrowed payment to the buyer.
    pub fn cancel_order(
        &self,
        accounts: &OrderAccounts,
    ) -> Result<Instruction, TransactionBuilderError> {
        let (config, _) = self.addresses.config()?;
        let mint = &accounts.payment_mint;
        let token_program = &accounts.token_program;

        Ok(self.instruction(
            encode(CANCEL_ORDER, &())?,
            vec![
                AccountMeta::new(accounts.admin, true),
                AccountMeta::new(accounts.authority, false),
                AccountMeta::new_readonly(config, false),
                AccountMeta::new_readonly(accounts.shopper, false),
                AccountMeta::new(accounts.order, false),
                AccountMeta::new_readonly(*mint, false),
                AccountMeta::new(token_account(&accounts.order, mint, token_program), false),
                AccountMeta::new(token_account(&accounts.authority, mint, token_program), false),
                AccountMeta::new_readonly(system_program::id(), false),
                AccountMeta::new_readonly(*token_program, false),
                AccountMeta::new_readonly(spl_associated_token_account::id(), false),
            ],
        ))
    }

    pub fn complete_order(
        &self,
        accounts: &OrderAccounts,
    ) -> Result<Instruction, TransactionBuilderError> {
        let (config, _) = self.addresses.config()?;
        let mint = &accounts.payment_mint;
        let token_program = &accounts.token_program;

        Ok(self.instruction(
            encode(COMPLETE_ORDER, &())?,
            vec![
                AccountMeta::new(accounts.admin, true),
                AccountMeta::new(accounts.authority, false),
                AccountMeta::new_readonly(config, false),
                AccountMeta::new_readonly(accounts.shopper, false),
                AccountMeta::new_readonly(accounts.store, false),
                AccountMeta::new_readonly(accounts.item, false),
                AccountMeta::new(accounts.order, false),
                AccountMeta::new_readonly(*mint, false),
                AccountMeta::new(token_account(&accounts.order, mint, token_program), false),
                AccountMeta::new(token_account(&accounts.store, mint, token_program), false),
                AccountMeta::new_readonly(system_program::id(), false),
                AccountMeta::new_readonly(*token_program, false),
                AccountMeta::new_readonly(spl_associated_token_account::id(), false),
            ],
        ))
    }

    /// Review an order. Rating is 1 through 5.
    pub fn create_review(
        &self,
        authority: &Pubkey,
        order: &Pubkey,
        text: &str,
        rating: u8,
    ) -> Result<Instruction, TransactionBuilderError> {
        if !(1..=5).contains(&rating) {
            return Err(TransactionBuilderError::instruction_failed(
                CREATE_REVIEW,
                format!("rating must be between 1 and 5, got {rating}"),
            ));
        }
        if text.len() > MAX_REVIEW_TEXT_LEN {
            return Err(TransactionBuilderError::instruction_failed(
                CREATE_REVIEW,
                format!("review text is {} bytes (max {MAX_REVIEW_TEXT_LEN})", text.len()),
            ));
        }
        let (shopper, _) = self.addresses.shopper(authority)?;
        let (review, _) = self.addresses.review(order)?;

        Ok(self.instruction(
            encode(CREATE_REVIEW, &CreateReviewArgs { text, rating })?,
            vec![
                AccountMeta::new(*authority, true),
                AccountMeta::new_readonly(shopper, false),
                AccountMeta::new_readonly(*order, false),
                AccountMeta::new(review, false),
                AccountMeta::new_readonly(system_program::id(), false),
            ],
        ))
    }

    /// Admin override of an order's status. The program refuses orders that
    /// are already cancelled or completed.
    pub fn update_order(
        &self,
        admin: &Pubkey,
        order: &Pubkey,
        status: OrderStatus,
    ) -> Result<Instruction, TransactionBuilderError> {
        let (config, _) = self.addresses.config()?;

        Ok(self.instruction(
            encode(UPDATE_ORDER, &status)?,
            vec![
                AccountMeta::new_readonly(*admin, true),
                AccountMeta::new_readonly(config, false),
                AccountMeta::new(*order, false),
            ],
        ))
    }

    /// Sweep a store's balance of `payment_mint` to its authority
    pub fn withdraw_earnings(
        &self,
        authority: &Pubkey,
        payment_mint: &Pubkey,
        token_program: &Pubkey,
    ) -> Result<Instruction, TransactionBuilderError> {
        let (config, _) = self.addresses.config()?;
        let (store, _) = self.addresses.store(authority)?;

        Ok(self.instruction(
            encode(WITHDRAW_EARNINGS, &())?,
            vec![
                AccountMeta::new(*authority, true),
                AccountMeta::new_readonly(config, false),
                AccountMeta::new_readonly(store, false),
                AccountMeta::new_readonly(*payment_mint, false),
                AccountMeta::new(token_account(&store, payment_mint, token_program), false),
                AccountMeta::new(token_account(authority, payment_mint, token_program), false),
                AccountMeta::new_readonly(system_program::id(), false),
                AccountMeta::new_readonly(*token_program, false),
                AccountMeta::new_readonly(spl_associated_token_account::id(), false),
            ],
        ))
    }

    pub fn initialize_config(
        &self,
        authority: &Pubkey,
        settings: &MarketplaceSettings,
    ) -> Result<Instruction, TransactionBuilderError> {
        validate_fee_bps(INITIALIZE_CONFIG, settings.order_fee_bps)?;
        validate_accepted_mints(INITIALIZE_CONFIG, &settings.accepted_mints)?;
        let (config, _) = self.addresses.config()?;

        Ok(self.instruction(
            encode(INITIALIZE_CONFIG, settings)?,
            vec![
                AccountMeta::new(*authority, true),
                AccountMeta::new(config, false),
                AccountMeta::new_readonly(system_program::id(), false),
            ],
        ))
    }

    pub fn update_config(
        &self,
        admin: &Pubkey,
        update: &ConfigUpdate,
    ) -> Result<Instruction, TransactionBuilderError> {
        if let Some(bps) = update.order_fee_bps {
            validate_fee_bps(UPDATE_CONFIG, bps)?;
        }
        if let Some(mints) = &update.accepted_mints {
            validate_accepted_mints(UPDATE_CONFIG, mints)?;
        }
        let (config, _) = self.addresses.config()?;

        Ok(self.instruction(
            encode(UPDATE_CONFIG, update)?,
            vec![
                AccountMeta::new(*admin, true),
                AccountMeta::new(config, false),
                AccountMeta::new_readonly(system_program::id(), false),
            ],
        ))
    }
}

fn validate_fee_bps(name: &str, bps: u16) -> Result<(), TransactionBuilderError> {
    if bps > MAX_ORDER_FEE_BPS {
        return Err(TransactionBuilderError::instruction_failed(
            name,
            format!("order fee is {bps} bps (max {MAX_ORDER_FEE_BPS})"),
        ));
    }
    Ok(())
}

fn validate_accepted_mints(
    name: &str,
    mints: &[AcceptedMint],
) -> Result<(), TransactionBuilderError> {
    if mints.is_empty() {
        return Err(TransactionBuilderError::instruction_failed(
            name,
            "at least one accepted mint is required",
        ));
    }
    if mints
        .iter()
        .any(|m| m.mint == Pubkey::default() || m.price_update == Pubkey::default())
    {
        return Err(TransactionBuilderError::instruction_failed(
            name,
            "accepted mint and price account must be set",
        ));
    }
    Ok(())
}
