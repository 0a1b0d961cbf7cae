use crate::client::EthereumRpc;
use crate::constants::{REORG_BATCH, REORG_MAX_DEPTH};
use crate::error::MonitorError;
use crate::storage::{filter::hex_hash, types::block::StoredBlock, MonitorStore};
use alloy_rpc_types::Block;

/// Walks backward from the high-water mark comparing node and store hashes
/// until the chains agree, then marks everything above the fork stale and
/// rewinds the collectibles cursor. Returns the fork block number, or `None`
/// when no agreement was found within the walk limit.
pub(crate) async fn handle_reorg<N, S>(eth: &N, store: &S, last_block_number: u64) -> Result<Option<u64>, MonitorError>
where
    N: EthereumRpc,
    S: MonitorStore,
{
    tracing::info!(blocknumber = last_block_number, "reorg encountered");

    let mut blocknumber = last_block_number as i64;
    let forked_at = loop {
        let numbers: Vec<u64> =
            (0..REORG_BATCH as i64).filter_map(|i| u64::try_from(blocknumber - i).ok()).collect();
        let node_blocks = eth.blocks_by_number_bulk(&numbers).await?;
        let db_blocks = store.blocks_at_or_below_desc(blocknumber, REORG_BATCH).await?;

        if let Some(forked_at) = find_fork_point(&node_blocks, &db_blocks) {
            break forked_at;
        }

        blocknumber -= REORG_BATCH as i64;
        if blocknumber <= 0 || blocknumber < last_block_number as i64 - REORG_MAX_DEPTH as i64 {
            tracing::error!("unable to find fork point for reorg");
            return Ok(None);
        }
    };

    store.mark_stale_above(forked_at).await?;
    store.clamp_collectibles_last_block(forked_at - 1).await?;
    Ok(Some(forked_at as u64))
}

/// Pairwise comparison of one batch of node blocks against the matching
/// store rows, both ordered by descending block number. Store rows whose
/// number doesn't line up with the next node block are dropped with an error
/// log. Returns the first block number on which the hashes agree.
pub(crate) fn find_fork_point(node_blocks: &[Option<Block>], db_blocks: &[StoredBlock]) -> Option<i64> {
    let mut db_blocks = db_blocks;

    for node_block in node_blocks {
        let Some(node_block) = node_block else { continue };
        let Some(node_number) = node_block.header.number else { continue };
        let node_number = node_number as i64;

        while let Some(db_block) = db_blocks.first() {
            if db_block.blocknumber == node_number {
                break;
            }
            tracing::error!(
                expected = node_number,
                got = db_block.blocknumber,
                "got out of order blocks when handling reorg"
            );
            db_blocks = &db_blocks[1..];
        }

        // out of store rows: everything we know about is on the wrong chain
        let db_block = db_blocks.first()?;

        let node_hash = hex_hash(node_block.header.hash.unwrap_or_default());
        if node_hash == db_block.hash {
            tracing::info!(blocknumber = db_block.blocknumber, "fork found");
            return Some(db_block.blocknumber);
        }

        tracing::info!(
            blocknumber = db_block.blocknumber,
            old = %db_block.hash,
            new = %node_hash,
            "mismatched block"
        );
        db_blocks = &db_blocks[1..];
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::mock::{MemoryStore, MockRpc};
    use alloy_primitives::B256;
    use alloy_rpc_types::Header;

    fn node_block(number: u64, hash: B256) -> Block {
        Block {
            header: Header { number: Some(number), hash: Some(hash), ..Default::default() },
            ..Default::default()
        }
    }

    fn stored_block(number: i64, hash: B256) -> StoredBlock {
        StoredBlock {
            blocknumber: number,
            hash: hex_hash(hash),
            parent_hash: hex_hash(B256::ZERO),
            timestamp: 0,
            stale: false,
        }
    }

    #[test]
    fn test_fork_point_found_on_first_match() {
        // Node and store disagree on 500..=496 and agree on 495.
        let node_blocks: Vec<Option<Block>> =
            (491..=500).rev().map(|n| Some(node_block(n, B256::repeat_byte(n as u8)))).collect();
        let db_blocks: Vec<StoredBlock> = (491..=500)
            .rev()
            .map(|n| if n > 495 { stored_block(n, B256::repeat_byte(0xff)) } else { stored_block(n, B256::repeat_byte(n as u8)) })
            .collect();

        assert_eq!(find_fork_point(&node_blocks, &db_blocks), Some(495));
    }

    #[test]
    fn test_store_gap_drops_out_of_order_rows_and_ends_the_batch() {
        // The store is missing row 499. When the node walk reaches 499 the
        // non-matching store row 498 is dropped, exhausting the batch.
        let node_blocks: Vec<Option<Block>> = vec![
            Some(node_block(500, B256::repeat_byte(0xaa))),
            Some(node_block(499, B256::repeat_byte(0xbb))),
            Some(node_block(498, B256::repeat_byte(0xcc))),
        ];
        let db_blocks =
            vec![stored_block(500, B256::repeat_byte(0x11)), stored_block(498, B256::repeat_byte(0xcc))];

        assert_eq!(find_fork_point(&node_blocks, &db_blocks), None);
    }

    #[test]
    fn test_no_fork_point_when_all_mismatch() {
        let node_blocks: Vec<Option<Block>> =
            (496..=500).rev().map(|n| Some(node_block(n, B256::repeat_byte(0xaa)))).collect();
        let db_blocks: Vec<StoredBlock> =
            (496..=500).rev().map(|n| stored_block(n, B256::repeat_byte(0xbb))).collect();

        assert_eq!(find_fork_point(&node_blocks, &db_blocks), None);
    }

    #[tokio::test]
    async fn test_reorg_marks_stale_and_clamps_collectibles() {
        // Given a store tracking 490..=500 where the node diverges above 495
        let eth = MockRpc::default();
        let store = MemoryStore::default();
        for n in 490..=500u64 {
            let hash = if n > 495 { B256::repeat_byte(0xff) } else { B256::repeat_byte(n as u8) };
            store.seed_block(stored_block(n as i64, hash));
            eth.seed_block(n, node_block(n, B256::repeat_byte(n as u8)));
        }
        store.add_collectible("0xc".to_string(), 500);

        // When
        let forked_at = handle_reorg(&eth, &store, 500).await.unwrap();

        // Then blocks 496..=500 are stale and the collectibles cursor sits at 494
        assert_eq!(forked_at, Some(495));
        for block in store.blocks() {
            assert_eq!(block.stale, block.blocknumber > 495, "block {}", block.blocknumber);
        }
        assert_eq!(store.collectibles(), vec![("0xc".to_string(), 494)]);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(16))]
            // Wherever the node diverged, every block row above the fork
            // point ends up stale and none at or below it does.
            #[test]
            fn prop_rows_above_fork_are_stale(tip in 20u64..60, fork_depth in 1u64..15) {
                let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
                runtime.block_on(async move {
                    let fork = tip - fork_depth;
                    let eth = MockRpc::default();
                    let store = MemoryStore::default();
                    for n in 0..=tip {
                        let node_hash = B256::repeat_byte(n as u8);
                        let store_hash = if n > fork { B256::repeat_byte(0xab) } else { node_hash };
                        store.seed_block(stored_block(n as i64, store_hash));
                        eth.seed_block(n, node_block(n, node_hash));
                    }
                    store.add_collectible("0xc".to_string(), tip as i64);

                    let forked_at = handle_reorg(&eth, &store, tip).await.unwrap();

                    assert_eq!(forked_at, Some(fork));
                    for block in store.blocks() {
                        assert_eq!(block.stale, block.blocknumber > fork as i64, "block {}", block.blocknumber);
                    }
                    assert_eq!(store.collectibles(), vec![("0xc".to_string(), fork as i64 - 1)]);
                });
            }
        }
    }

    #[tokio::test]
    async fn test_reorg_gives_up_past_max_depth() {
        // Node and store never agree.
        let eth = MockRpc::default();
        let store = MemoryStore::default();
        for n in 0..=2000u64 {
            store.seed_block(stored_block(n as i64, B256::repeat_byte(0xbb)));
            eth.seed_block(n, node_block(n, B256::repeat_byte(0xaa)));
        }

        let forked_at = handle_reorg(&eth, &store, 2000).await.unwrap();

        assert_eq!(forked_at, None);
        // nothing was marked stale
        assert!(store.blocks().iter().all(|block| !block.stale));
    }
}
