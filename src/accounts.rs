//! Decoding of marketplace program accounts
//!
//! Every account starts with the 8-byte tag `sha256("account:<Name>")[..8]`.
//! Decoding checks the tag first; fields follow in declaration order with
//! little-endian integers.

use chrono::{DateTime, Utc};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::discriminator::{account_tag, split_tag, Discriminator, DISCRIMINATOR_LEN};
use crate::pda::ProgramAddresses;
use crate::rpc_manager::{AccountFilter, LedgerClient, RpcManagerError};

#[derive(Error, Debug)]
pub enum AccountDecodeError {
    #[error("Account data is not a {expected} account")]
    WrongType { expected: &'static str },

    #[error("{account} account truncated at field {field}")]
    Truncated {
        account: &'static str,
        field: &'static str,
    },

    #[error("Unknown order status {0}")]
    UnknownStatus(u8),

    #[error("Marketplace config account {0} not found")]
    ConfigNotFound(Pubkey),

    #[error(transparent)]
    Pda(#[from] crate::pda::PdaError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcManagerError),
}

/// Lifecycle of an order on the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, borsh::BorshSerialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Shipping,
    Cancelled,
    Completed,
}

impl TryFrom<u8> for OrderStatus {
    type Error = AccountDecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Shipping),
            2 => Ok(Self::Cancelled),
            3 => Ok(Self::Completed),
            other => Err(AccountDecodeError::UnknownStatus(other)),
        }
    }
}

/// A purchase held in escrow until completion or cancellation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub shopper: Pubkey,
    pub item: Pubkey,
    /// Unix seconds at creation; also part of the address seeds
    pub timestamp: i64,
    pub status: OrderStatus,
    pub amount: u32,
    pub payment_subtotal: u64,
    pub platform_fee: u64,
    pub payment_mint: Pubkey,
    pub bump: u8,
}

impl Order {
    pub const NAME: &'static str = "Order";
    pub const SHOPPER_OFFSET: usize = DISCRIMINATOR_LEN;
    pub const ITEM_OFFSET: usize = Self::SHOPPER_OFFSET + 32;

    pub fn tag() -> Discriminator {
        account_tag(Self::NAME)
    }

    pub fn decode(data: &[u8]) -> Result<Self, AccountDecodeError> {
        let mut reader = FieldReader::new(Self::NAME, data)?;
        Ok(Self {
            shopper: reader.pubkey("shopper")?,
            item: reader.pubkey("item")?,
            timestamp: i64::from_le_bytes(reader.array("timestamp")?),
            status: OrderStatus::try_from(reader.u8("status")?)?,
            amount: u32::from_le_bytes(reader.array("amount")?),
            payment_subtotal: u64::from_le_bytes(reader.array("payment_subtotal")?),
            platform_fee: u64::from_le_bytes(reader.array("platform_fee")?),
            payment_mint: reader.pubkey("payment_mint")?,
            bump: reader.u8("bump")?,
        })
    }

    /// Subtotal plus platform fee, as escrowed
    pub fn total(&self) -> u64 {
        self.payment_subtotal.saturating_add(self.platform_fee)
    }

    /// Creation time, `None` if the stored timestamp is out of range
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// Payment mint the marketplace accepts, paired with its oracle price account
#[derive(Debug, Clone, Copy, PartialEq, Eq, borsh::BorshSerialize)]
pub struct AcceptedMint {
    pub mint: Pubkey,
    pub price_update: Pubkey,
}

/// Marketplace-wide settings singleton
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketplaceConfig {
    pub treasury: Pubkey,
    pub order_fee_bps: u16,
    pub admin: Pubkey,
    pub is_paused: bool,
    pub bump: u8,
    pub accepted_mints: Vec<AcceptedMint>,
}

impl MarketplaceConfig {
    pub const NAME: &'static str = "Config";

    pub fn decode(data: &[u8]) -> Result<Self, AccountDecodeError> {
        let mut reader = FieldReader::new(Self::NAME, data)?;
        let treasury = reader.pubkey("treasury")?;
        let order_fee_bps = u16::from_le_bytes(reader.array("order_fee_bps")?);
        let admin = reader.pubkey("admin")?;
        let is_paused = reader.u8("is_paused")? != 0;
        let bump = reader.u8("bump")?;
        let count = u32::from_le_bytes(reader.array("accepted_mints")?) as usize;
        let accepted_mints = (0..count)
            .map(|_| {
                Ok::<_, AccountDecodeError>(AcceptedMint {
                    mint: reader.pubkey("accepted_mints")?,
                    price_update: reader.pubkey("accepted_mints")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            treasury,
            order_fee_bps,
            admin,
            is_paused,
            bump,
            accepted_mints,
        })
    }

    pub fn accepts(&self, mint: &Pubkey) -> bool {
        self.price_update_for(mint).is_some()
    }

    /// Oracle account that prices `mint`, if the mint is accepted
    pub fn price_update_for(&self, mint: &Pubkey) -> Option<Pubkey> {
        self.accepted_mints
            .iter()
            .find(|accepted| accepted.mint == *mint)
            .map(|accepted| accepted.price_update)
    }
}

struct FieldReader<'a> {
    account: &'static str,
    rest: &'a [u8],
}

impl<'a> FieldReader<'a> {
    fn new(account: &'static str, data: &'a [u8]) -> Result<Self, AccountDecodeError> {
        match split_tag(data) {
            Some((tag, rest)) if tag == account_tag(account) => Ok(Self { account, rest }),
            _ => Err(AccountDecodeError::WrongType { expected: account }),
        }
    }

    fn take(&mut self, field: &'static str, len: usize) -> Result<&'a [u8], AccountDecodeError> {
        if self.rest.len() < len {
            return Err(AccountDecodeError::Truncated {
                account: self.account,
                field,
            });
        }
        let (head, tail) = self.rest.split_at(len);
        self.rest = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], AccountDecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(field, N)?);
        Ok(out)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, AccountDecodeError> {
        Ok(self.take(field, 1)?[0])
    }

    fn pubkey(&mut self, field: &'static str) -> Result<Pubkey, AccountDecodeError> {
        Ok(Pubkey::new_from_array(self.array(field)?))
    }
}

/// Read-side queries against the marketplace program
#[derive(Clone)]
pub struct AccountReader {
    ledger: Arc<dyn LedgerClient>,
    addresses: ProgramAddresses,
}

impl AccountReader {
    pub fn new(ledger: Arc<dyn LedgerClient>, addresses: ProgramAddresses) -> Self {
        Self { ledger, addresses }
    }

    pub async fn fetch_config(&self) -> Result<MarketplaceConfig, AccountDecodeError> {
        let (address, _) = self.addresses.config()?;
        let account = self
            .ledger
            .get_account(&address)
            .await?
            .ok_or(AccountDecodeError::ConfigNotFound(address))?;
        MarketplaceConfig::decode(&account.data)
    }

    pub async fn fetch_order(&self, address: &Pubkey) -> Result<Option<Order>, AccountDecodeError> {
        match self.ledger.get_account(address).await? {
            Some(account) => Ok(Some(Order::decode(&account.data)?)),
            None => Ok(None),
        }
    }

    pub async fn fetch_orders_by_shopper(
        &self,
        shopper: &Pubkey,
    ) -> Result<Vec<(Pubkey, Order)>, AccountDecodeError> {
        self.fetch_orders(Order::SHOPPER_OFFSET, shopper).await
    }

    pub async fn fetch_orders_by_item(
        &self,
        item: &Pubkey,
    ) -> Result<Vec<(Pubkey, Order)>, AccountDecodeError> {
        self.fetch_orders(Order::ITEM_OFFSET, item).await
    }

    async fn fetch_orders(
        &self,
        offset: usize,
        key: &Pubkey,
    ) -> Result<Vec<(Pubkey, Order)>, AccountDecodeError> {
        let filters = vec![
            AccountFilter::Memcmp {
                offset: 0,
                bytes: Order::tag().to_vec(),
            },
            AccountFilter::Memcmp {
                offset,
                bytes: key.to_bytes().to_vec(),
            },
        ];
        let accounts = self
            .ledger
            .get_program_accounts(self.addresses.program_id(), filters)
            .await?;

        let mut orders = Vec::with_capacity(accounts.len());
        for (address, account) in accounts {
            match Order::decode(&account.data) {
                Ok(order) => orders.push((address, order)),
                Err(err) => warn!(order = %address, error = %err, "Skipping undecodable order"),
            }
        }
        orders.sort_by_key(|(_, order)| std::cmp::Reverse(order.timestamp));
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{order_account, MockLedger};
    use solana_sdk::account::Account;

    fn order(shopper: Pubkey, item: Pubkey, timestamp: i64) -> Order {
        Order {
            shopper,
            item,
            timestamp,
            status: OrderStatus::Pending,
            amount: 2,
            payment_subtotal: 2_000_000,
            platform_fee: 20_000,
            payment_mint: Pubkey::new_unique(),
            bump: 254,
        }
    }

    #[test]
    fn test_order_roundtrip_from_layout() {
        let expected = order(Pubkey::new_unique(), Pubkey::new_unique(), 1_700_000_000);
        let account = order_account(&expected, &Pubkey::new_unique());
        assert_eq!(account.data.len(), 134);
        assert_eq!(Order::decode(&account.data).unwrap(), expected);
        assert_eq!(expected.total(), 2_020_000);
    }

    #[test]
    fn test_created_at() {
        let placed = order(Pubkey::new_unique(), Pubkey::new_unique(), 1_700_000_000);
        assert_eq!(
            placed.created_at().unwrap().to_rfc3339(),
            "2023-11-14T22:13:20+00:00"
        );
        let total = placed.payment_subtotal + placed.platform_fee;
        assert_eq!(placed.total(), total);
    }

    #[test]
    fn test_wrong_tag_and_truncation() {
        let account = order_account(
            &order(Pubkey::new_unique(), Pubkey::new_unique(), 1),
            &Pubkey::new_unique(),
        );
        assert!(matches!(
            MarketplaceConfig::decode(&account.data),
            Err(AccountDecodeError::WrongType { expected: "Config" })
        ));
        assert!(matches!(
            Order::decode(&account.data[..83]),
            Err(AccountDecodeError::Truncated { field: "amount", .. })
        ));
    }

    #[test]
    fn test_unknown_status() {
        let mut data = order_account(
            &order(Pubkey::new_unique(), Pubkey::new_unique(), 1),
            &Pubkey::new_unique(),
        )
        .data;
        data[80] = 9;
        assert!(matches!(
            Order::decode(&data),
            Err(AccountDecodeError::UnknownStatus(9))
        ));
    }

    #[test]
    fn test_config_decode() {
        let treasury = Pubkey::new_unique();
        let admin = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let price_update = Pubkey::new_unique();
        let mut data = account_tag("Config").to_vec();
        data.extend_from_slice(treasury.as_ref());
        data.extend_from_slice(&100u16.to_le_bytes());
        data.extend_from_slice(admin.as_ref());
        data.push(0);
        data.push(255);
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(mint.as_ref());
        data.extend_from_slice(price_update.as_ref());
        data.extend_from_slice(&[0u8; 64]);

        let config = MarketplaceConfig::decode(&data).unwrap();
        assert_eq!(config.treasury, treasury);
        assert_eq!(config.order_fee_bps, 100);
        assert_eq!(config.admin, admin);
        assert!(!config.is_paused);
        assert!(config.accepts(&mint));
        assert_eq!(config.price_update_for(&mint), Some(price_update));
        assert!(!config.accepts(&price_update));
    }

    #[tokio::test]
    async fn test_fetch_orders_by_shopper_filters_and_sorts() {
        let program = Pubkey::new_unique();
        let shopper = Pubkey::new_unique();
        let item = Pubkey::new_unique();
        let ledger = Arc::new(MockLedger::new());

        ledger.put_account(Pubkey::new_unique(), order_account(&order(shopper, item, 10), &program));
        ledger.put_account(Pubkey::new_unique(), order_account(&order(shopper, item, 30), &program));
        ledger.put_account(
            Pubkey::new_unique(),
            order_account(&order(Pubkey::new_unique(), item, 20), &program),
        );
        // Same shopper bytes under another owner are ignored
        ledger.put_account(
            Pubkey::new_unique(),
            order_account(&order(shopper, item, 40), &Pubkey::new_unique()),
        );
        ledger.put_account(
            Pubkey::new_unique(),
            Account {
                lamports: 1,
                data: vec![1; 16],
                owner: program,
                executable: false,
                rent_epoch: 0,
            },
        );

        let reader = AccountReader::new(ledger, ProgramAddresses::new(program));
        let mine = reader.fetch_orders_by_shopper(&shopper).await.unwrap();
        assert_eq!(
            mine.iter().map(|(_, o)| o.timestamp).collect::<Vec<_>>(),
            vec![30, 10]
        );

        let for_item = reader.fetch_orders_by_item(&item).await.unwrap();
        assert_eq!(for_item.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_config() {
        let reader = AccountReader::new(
            Arc::new(MockLedger::new()),
            ProgramAddresses::new(Pubkey::new_unique()),
        );
        assert!(matches!(
            reader.fetch_config().await,
            Err(AccountDecodeError::ConfigNotFound(_))
        ));
    }
}
