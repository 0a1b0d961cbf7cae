use super::transfers::{self, TokenTransfer};
use crate::constants::{DEPOSIT_TOPIC, TRANSFER_TOPIC, WITHDRAWAL_TOPIC, ZERO_ADDRESS};
use crate::dispatch::Dispatcher;
use crate::error::MonitorError;
use crate::storage::{
    filter::{hex_address, hex_hash, hex_quantity},
    types::transaction::{NewTransaction, StoredTransaction, TransactionStatus},
    MonitorStore,
};
use alloy_rpc_types::{Log, Transaction};
use mongodb::bson::oid::ObjectId;

/// Correlates an observed transaction with any prior record, extracts token
/// transfers, filters by registered interest, persists and emits the update
/// event. Returns the transaction row id when the transaction was interesting.
pub(crate) async fn process_transaction<S: MonitorStore>(
    store: &S,
    dispatcher: &Dispatcher,
    weth_address: &str,
    tx: &Transaction,
    logs: &[Log],
    is_reorg: bool,
) -> Result<Option<ObjectId>, MonitorError> {
    let from_address = hex_address(tx.from);
    // use a valid encoding of "empty" for contract deployments
    let to_address = tx.to.map_or_else(|| "0x".to_string(), hex_address);
    let tx_hash = hex_hash(tx.hash);
    let nonce = tx.nonce as i64;

    let mut db_tx = correlate(store, &from_address, nonce, &tx_hash).await?;

    // A prior record with a different hash means the nonce was reused: the
    // old transaction was overwritten in the mempool. Flag it and treat the
    // new hash as a fresh insert. Errored rows are already dealt with.
    if let Some(prior) = &db_tx {
        if prior.hash != tx_hash && prior.status != TransactionStatus::Error {
            if prior.v.is_some() {
                tracing::warn!(
                    from = %from_address,
                    nonce,
                    old_hash = %prior.hash,
                    new_hash = %tx_hash,
                    "found overwritten transaction"
                );
            }
            dispatcher.update_transaction(prior.id(), TransactionStatus::Error);
            db_tx = None;
        }
    }

    // If reorging and the transaction is already confirmed, only the block it
    // was included in can have changed.
    if is_reorg {
        if let Some(prior) = &db_tx {
            if prior.hash == tx_hash && prior.status == TransactionStatus::Confirmed {
                let Some(blocknumber) = tx.block_number else {
                    tracing::error!(hash = %tx_hash, "unexpectedly got unconfirmed transaction again after reorg");
                    return Ok(Some(prior.id()));
                };
                let blocknumber = blocknumber as i64;
                if prior.blocknumber != Some(blocknumber) {
                    store.set_transaction_block(prior.id(), blocknumber).await?;
                }
                return Ok(Some(prior.id()));
            }
        }
    }

    let mut token_transfers: Vec<TokenTransfer> = Vec::new();
    if tx.block_number.is_some() && !logs.is_empty() {
        for (index, log) in logs.iter().enumerate() {
            let Some(first_topic) = log.inner.data.topics().first() else { continue };
            let contract_address = hex_address(log.inner.address);

            if *first_topic == TRANSFER_TOPIC {
                if !store.is_known_token(&contract_address).await? {
                    continue;
                }
                let Some(decoded) = transfers::decode_erc20_transfer_log(log) else {
                    tracing::warn!(hash = %tx_hash, "got invalid erc20 Transfer event");
                    continue;
                };
                if store.has_token_registration(&[decoded.from_address.as_str(), decoded.to_address.as_str()]).await? {
                    token_transfers.push(TokenTransfer {
                        contract_address,
                        transaction_log_index: index as i64,
                        from_address: decoded.from_address,
                        to_address: decoded.to_address,
                        value: decoded.value,
                        status: TransactionStatus::Confirmed,
                    });
                }
            } else if (*first_topic == DEPOSIT_TOPIC || *first_topic == WITHDRAWAL_TOPIC)
                && contract_address == weth_address
            {
                // WETH is rarely `Transfer`ed but balances still move on
                // deposits and withdrawals.
                let Some((eth_address, value)) = transfers::decode_weth_balance_event(log) else {
                    tracing::warn!(hash = %tx_hash, "got invalid WETH balance event");
                    continue;
                };
                if store.has_token_registration(&[eth_address.as_str()]).await? {
                    let (transfer_from, transfer_to) = if *first_topic == DEPOSIT_TOPIC {
                        (ZERO_ADDRESS.to_string(), eth_address)
                    } else {
                        (eth_address, ZERO_ADDRESS.to_string())
                    };
                    token_transfers.push(TokenTransfer {
                        contract_address,
                        transaction_log_index: index as i64,
                        from_address: transfer_from,
                        to_address: transfer_to,
                        value,
                        status: TransactionStatus::Confirmed,
                    });
                }
            }
        }
    } else if tx.block_number.is_none() && db_tx.is_none() {
        // pending: guess token movements from the call data
        token_transfers = transfers::sniff_input_transfers(tx, weth_address);
    }

    let mut is_interesting =
        db_tx.is_some() || store.has_notification_registration(&[to_address.as_str(), from_address.as_str()]).await?;
    if !is_interesting {
        for transfer in &token_transfers {
            let endpoints = [transfer.to_address.as_str(), transfer.from_address.as_str()];
            if store.has_notification_registration(&endpoints).await?
                || store.has_token_registration(&endpoints).await?
            {
                is_interesting = true;
                break;
            }
        }
    }
    if !is_interesting {
        return Ok(None);
    }

    let transaction_id = match &db_tx {
        Some(prior) => prior.id(),
        None => {
            store
                .insert_transaction(NewTransaction {
                    hash: tx_hash,
                    from_address,
                    to_address,
                    nonce,
                    value: hex_quantity(tx.value),
                    gas: format!("{:#x}", tx.gas),
                    gas_price: format!("{:#x}", tx.gas_price.unwrap_or_default()),
                    data: tx.input.to_string(),
                })
                .await?
        }
    };

    for transfer in token_transfers {
        let endpoints = [transfer.to_address.as_str(), transfer.from_address.as_str()];
        let transfer_is_interesting = store.has_notification_registration(&endpoints).await?
            || store.has_token_registration(&endpoints).await?;
        if transfer_is_interesting {
            store.upsert_token_transaction(transfer.into_stored(transaction_id)).await?;
        }
    }

    let status =
        if tx.block_number.is_some() { TransactionStatus::Confirmed } else { TransactionStatus::Unconfirmed };
    dispatcher.update_transaction(transaction_id, status);
    Ok(Some(transaction_id))
}

/// Finds the prior record for `(from, nonce)`. With several candidate rows,
/// prefers the one sharing the observed hash, then a single non-error row
/// with a different hash; anything more ambiguous is left alone.
async fn correlate<S: MonitorStore>(
    store: &S,
    from_address: &str,
    nonce: i64,
    tx_hash: &str,
) -> Result<Option<StoredTransaction>, MonitorError> {
    let mut rows = store.find_txs_by_from_nonce(from_address, nonce).await?;
    match rows.len() {
        0 => Ok(None),
        1 => Ok(rows.pop()),
        _ => {
            if let Some(row) = store.find_tx_by_from_nonce_hash(from_address, nonce, tx_hash).await? {
                return Ok(Some(row));
            }
            let mut no_error = store.find_txs_by_from_nonce_not_hash_not_error(from_address, nonce, tx_hash).await?;
            if no_error.len() == 1 {
                Ok(no_error.pop())
            } else {
                if !no_error.is_empty() {
                    tracing::warn!(from = %from_address, nonce, "multiple transactions with this nonce in unknown state");
                }
                Ok(None)
            }
        }
    }
}
