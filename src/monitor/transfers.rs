use crate::constants::ZERO_ADDRESS;
use crate::storage::filter::{hex_address, hex_quantity};
use crate::storage::types::{token::StoredTokenTransaction, transaction::TransactionStatus};
use alloy_primitives::{Address, U256};
use alloy_rpc_types::{Log, Transaction};
use mongodb::bson::oid::ObjectId;

/// `transfer(address,uint256)`
const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
/// `transferFrom(address,address,uint256)`
const TRANSFER_FROM_SELECTOR: [u8; 4] = [0x23, 0xb8, 0x72, 0xdd];
/// WETH `deposit()`
const DEPOSIT_SELECTOR: [u8; 4] = [0xd0, 0xe3, 0x0d, 0xb0];
/// WETH `withdraw(uint256)`
const WITHDRAW_SELECTOR: [u8; 4] = [0x2e, 0x1a, 0x7d, 0x4d];

/// An ERC-20 or WETH value movement extracted from a transaction, before the
/// registration tables have been consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TokenTransfer {
    pub contract_address: String,
    pub transaction_log_index: i64,
    pub from_address: String,
    pub to_address: String,
    pub value: String,
    pub status: TransactionStatus,
}

impl TokenTransfer {
    /// Attaches the transfer to its parent transaction row.
    pub(crate) fn into_stored(self, transaction_id: ObjectId) -> StoredTokenTransaction {
        StoredTokenTransaction {
            transaction_id,
            transaction_log_index: self.transaction_log_index,
            contract_address: self.contract_address,
            from_address: self.from_address,
            to_address: self.to_address,
            value: self.value,
            status: self.status,
        }
    }
}

/// Decoded endpoints and value of an ERC-20 `Transfer` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DecodedTransfer {
    pub from_address: String,
    pub to_address: String,
    pub value: String,
}

/// Decodes an ERC-20 `Transfer` log, accepting both the standard indexed
/// form (3 topics, 32 bytes of data) and the legacy non-indexed form
/// (1 topic, the full `(address,address,uint256)` tuple in data).
/// Returns `None` for any other shape.
pub(crate) fn decode_erc20_transfer_log(log: &Log) -> Option<DecodedTransfer> {
    let topics = log.inner.data.topics();
    let data = log.inner.data.data.as_ref();
    if topics.len() == 3 && data.len() == 32 {
        Some(DecodedTransfer {
            from_address: hex_address(Address::from_word(topics[1])),
            to_address: hex_address(Address::from_word(topics[2])),
            value: hex_quantity(U256::from_be_slice(data)),
        })
    } else if topics.len() == 1 && data.len() == 96 {
        Some(DecodedTransfer {
            from_address: hex_address(Address::from_slice(&data[12..32])),
            to_address: hex_address(Address::from_slice(&data[44..64])),
            value: hex_quantity(U256::from_be_slice(&data[64..96])),
        })
    } else {
        None
    }
}

/// Decodes the subject address and value of a WETH `Deposit` or `Withdrawal`
/// log. Returns `None` for unexpected shapes.
pub(crate) fn decode_weth_balance_event(log: &Log) -> Option<(String, String)> {
    let topics = log.inner.data.topics();
    let data = log.inner.data.data.as_ref();
    if topics.len() < 2 || data.len() != 32 {
        return None;
    }
    Some((hex_address(Address::from_word(topics[1])), hex_quantity(U256::from_be_slice(data))))
}

/// Guesses token transfers for a pending transaction from its call data.
///
/// Recognizes ERC-20 `transfer` and `transferFrom` by selector and exact
/// calldata length, plus WETH `deposit`/`withdraw` against the given WETH
/// address. Synthesized entries are unconfirmed and use log index 0.
pub(crate) fn sniff_input_transfers(tx: &Transaction, weth_address: &str) -> Vec<TokenTransfer> {
    let input = tx.input.as_ref();
    if input.is_empty() {
        return Vec::new();
    }

    let from_address = hex_address(tx.from);
    let to_address = tx.to.map_or_else(|| "0x".to_string(), hex_address);
    let mut transfers = Vec::new();

    if (input.starts_with(&TRANSFER_SELECTOR) && input.len() == 68)
        || (input.starts_with(&TRANSFER_FROM_SELECTOR) && input.len() == 100)
    {
        let value = hex_quantity(U256::from_be_slice(&input[input.len() - 32..]));
        let (erc20_from, erc20_to) = if input.starts_with(&TRANSFER_FROM_SELECTOR) {
            (hex_address(Address::from_slice(&input[16..36])), hex_address(Address::from_slice(&input[48..68])))
        } else {
            (from_address, hex_address(Address::from_slice(&input[16..36])))
        };
        transfers.push(TokenTransfer {
            contract_address: to_address,
            transaction_log_index: 0,
            from_address: erc20_from,
            to_address: erc20_to,
            value,
            status: TransactionStatus::Unconfirmed,
        });
    } else if input == DEPOSIT_SELECTOR.as_slice() && to_address == weth_address {
        transfers.push(TokenTransfer {
            contract_address: to_address,
            transaction_log_index: 0,
            from_address: ZERO_ADDRESS.to_string(),
            to_address: from_address,
            value: hex_quantity(tx.value),
            status: TransactionStatus::Unconfirmed,
        });
    } else if input.starts_with(&WITHDRAW_SELECTOR) && input.len() == 36 {
        transfers.push(TokenTransfer {
            contract_address: weth_address.to_string(),
            transaction_log_index: 0,
            from_address,
            to_address: ZERO_ADDRESS.to_string(),
            value: hex_quantity(U256::from_be_slice(&input[4..36])),
            status: TransactionStatus::Unconfirmed,
        });
    }

    transfers
}
