//! End-to-end scenarios driving the core façade: linear growth, duplicate
//! blocks, forks with and without chain switches, pool admission, template
//! construction and state reconciliation on restart.

extern crate umbra_chain as chain;
extern crate umbra_db as db;
extern crate umbra_serialization as ser;
extern crate umbra_storage as storage;
extern crate umbra_test_data as test_data;
extern crate umbra_verification as verification;

use chain::RawBlock;
use umbra_core::{BlockchainMessage, Core, DeleteTransactionReason, TimeProvider};
use db::{PersistentSegment, Segment, SegmentCache};
use ser::serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use storage::BlockchainStorage;
use test_data::{miner_address, test_currency, ChainBuilder, TransactionBuilder};
use verification::{AddBlockError, AddBlockResult, Checkpoints};

const MOCK_NOW: u64 = 1_514_764_800 + 10_000;

struct MockTime(AtomicU64);

impl TimeProvider for MockTime {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

fn new_core() -> (Arc<Core>, Arc<MockTime>) {
    new_core_with(BlockchainStorage::in_memory(), Segment::InMemory(SegmentCache::new(0, None)))
}

fn new_core_with(storage: BlockchainStorage, root: Segment) -> (Arc<Core>, Arc<MockTime>) {
    let time = Arc::new(MockTime(AtomicU64::new(MOCK_NOW)));
    let core = Arc::new(Core::with_time_provider(
        test_currency(),
        Checkpoints::new(),
        storage,
        root,
        time.clone(),
    ));
    core.load().unwrap();
    (core, time)
}

#[test]
fn linear_append_emits_new_block() {
    let (core, _) = new_core();
    let queue = core.make_queue();

    let mut builder = ChainBuilder::new(test_currency());
    let b1 = builder.generate_block();

    assert_eq!(core.add_block(builder.raw(b1)), Ok(AddBlockResult::AddedToMain));
    assert_eq!(core.top_block_height().unwrap(), 1);
    assert_eq!(core.top_block_hash().unwrap(), builder.hash(b1));

    assert_eq!(
        queue.try_pop(),
        Some(BlockchainMessage::NewBlock {
            height: 1,
            hash: builder.hash(b1),
        })
    );
    assert_eq!(queue.try_pop(), None);

    // invariant: the block is addressable both ways after acceptance
    assert!(core.has_block(&builder.hash(b1)).unwrap());
    assert_eq!(core.block_hash_at(1).unwrap(), Some(builder.hash(b1)));
    assert_eq!(core.block_height(&builder.hash(b1)).unwrap(), Some(1));
}

#[test]
fn duplicate_block_is_reported_without_events() {
    let (core, _) = new_core();
    let mut builder = ChainBuilder::new(test_currency());
    let b1 = builder.generate_block();

    assert_eq!(core.add_block(builder.raw(b1)), Ok(AddBlockResult::AddedToMain));

    let queue = core.make_queue();
    assert_eq!(core.add_block(builder.raw(b1)), Ok(AddBlockResult::AlreadyExists));
    assert_eq!(queue.try_pop(), None);
    assert_eq!(core.top_block_height().unwrap(), 1);
}

#[test]
fn orphaned_block_is_rejected_without_state_change() {
    let (core, _) = new_core();
    let mut builder = ChainBuilder::new(test_currency());
    let _b1 = builder.generate_block();
    let b2 = builder.generate_block();

    assert_eq!(
        core.add_block(builder.raw(b2)),
        Err(AddBlockError::RejectedAsOrphaned)
    );
    assert_eq!(core.top_block_height().unwrap(), 0);
}

#[test]
fn genesis_mismatch_is_rejected() {
    let (core, _) = new_core();
    // a query whose known hashes do not reach our genesis
    assert!(core
        .query_blocks(&[chain::hash::H256::from(9u8)], 0)
        .is_err());
}

/// S3 + S4 with the tie-break in between: a fork of equal cumulative
/// difficulty stays alternative; one more block switches the chain.
#[test]
fn fork_without_then_with_switch() {
    let (core, _) = new_core();
    let mut builder = ChainBuilder::new(test_currency());

    // canonical: G - A1 - A2 - A3; A3 carries a transaction
    let a1 = builder.generate_block();
    let a2 = builder.generate_block();
    let rescue_tx = TransactionBuilder::new()
        .spend_coinbase_largest(&builder, a2, a1)
        .output_rest(1_000, b"rescued")
        .build();
    let a3 = builder.generate_block_at(
        a2,
        vec![rescue_tx.clone()],
        builder.block(a2).timestamp + 120,
    );

    for id in [a1, a2, a3] {
        assert_eq!(core.add_block(builder.raw(id)), Ok(AddBlockResult::AddedToMain));
    }
    assert_eq!(core.top_block_height().unwrap(), 3);

    let queue = core.make_queue();

    // B3 forks off A2 with the same cumulative difficulty as A3: no switch
    let b3 = builder.generate_block_at(a2, Vec::new(), builder.block(a2).timestamp + 60);
    assert_eq!(
        builder.block(b3).cumulative_difficulty,
        builder.block(a3).cumulative_difficulty
    );
    assert_eq!(
        core.add_block(builder.raw(b3)),
        Ok(AddBlockResult::AddedToAlternative)
    );
    assert_eq!(core.top_block_hash().unwrap(), builder.hash(a3));
    assert_eq!(
        queue.try_pop(),
        Some(BlockchainMessage::NewAlternativeBlock {
            height: 3,
            hash: builder.hash(b3),
        })
    );

    // B4 outweighs the canonical chain: switch
    let b4 = builder.generate_block_at(b3, Vec::new(), builder.block(b3).timestamp + 60);
    assert!(
        builder.block(b4).cumulative_difficulty > builder.block(a3).cumulative_difficulty
    );
    assert_eq!(
        core.add_block(builder.raw(b4)),
        Ok(AddBlockResult::AddedToAlternativeAndSwitched)
    );
    assert_eq!(core.top_block_height().unwrap(), 4);
    assert_eq!(core.top_block_hash().unwrap(), builder.hash(b4));

    // the raw store tail matches the new canonical path
    let blocks = core.blocks_in_range(3, 10).unwrap();
    assert_eq!(blocks, vec![builder.raw(b3), builder.raw(b4)]);

    // the abandoned branch's transaction went back to the pool
    let rescued_hash = chain::CachedTransaction::new(rescue_tx).hash();
    assert!(core.pool_transaction_hashes().unwrap().contains(&rescued_hash));

    // the switch event names the full winning branch
    let event = queue.try_pop().unwrap();
    match event {
        BlockchainMessage::ChainSwitch {
            common_root_height,
            hashes_on_new_branch,
        } => {
            assert_eq!(common_root_height, 2);
            assert_eq!(hashes_on_new_branch, vec![builder.hash(b3), builder.hash(b4)]);
        }
        other => panic!("expected a chain switch event, got {:?}", other),
    }

    // cumulative difficulty is monotone along the new chain
    let d3 = core.block_difficulty(3).unwrap();
    let d4 = core.block_difficulty(4).unwrap();
    assert!(d3 > 0 && d4 > 0);
}

#[test]
fn pool_admission_and_double_spend() {
    let (core, _) = new_core();
    let mut builder = ChainBuilder::new(test_currency());
    let b1 = builder.generate_block();
    let b2 = builder.generate_block();
    let b3 = builder.generate_block();
    for id in [b1, b2, b3] {
        core.add_block(builder.raw(id)).unwrap();
    }

    let queue = core.make_queue();

    let t1 = TransactionBuilder::new()
        .spend_coinbase_largest(&builder, b3, b1)
        .output_rest(1_000, b"t1")
        .build();
    let t1_hash = chain::CachedTransaction::new(t1.clone()).hash();
    assert!(core.add_transaction_to_pool(&serialize(&t1)));
    assert_eq!(
        queue.try_pop(),
        Some(BlockchainMessage::AddTransaction {
            hashes: vec![t1_hash],
        })
    );

    // a second spend of the same output carries the same key image
    let t2 = TransactionBuilder::new()
        .spend_coinbase_largest(&builder, b3, b1)
        .output_rest(2_000, b"t2")
        .build();
    assert!(!core.add_transaction_to_pool(&serialize(&t2)));
    assert_eq!(core.pool_transaction_count().unwrap(), 1);
    assert_eq!(queue.try_pop(), None);

    // underpaying transactions that are not fusion are refused
    let cheap = TransactionBuilder::new()
        .spend_coinbase_largest(&builder, b3, b2)
        .output_rest(1, b"cheap")
        .build();
    assert!(!core.add_transaction_to_pool(&serialize(&cheap)));
}

#[test]
fn template_round_trips_through_submit_block() {
    let (core, _) = new_core();
    let mut builder = ChainBuilder::new(test_currency());
    let b1 = builder.generate_block();
    let b2 = builder.generate_block();
    let b3 = builder.generate_block();
    for id in [b1, b2, b3] {
        core.add_block(builder.raw(id)).unwrap();
    }

    let t1 = TransactionBuilder::new()
        .spend_coinbase_largest(&builder, b3, b1)
        .output_rest(1_000, b"pay-1")
        .build();
    let t2 = TransactionBuilder::new()
        .spend_coinbase_largest(&builder, b3, b2)
        .output_rest(2_000, b"pay-2")
        .build();
    assert!(core.add_transaction_to_pool(&serialize(&t1)));
    assert!(core.add_transaction_to_pool(&serialize(&t2)));

    let (template, difficulty, height) = core
        .get_block_template(&miner_address(), b"extra-nonce")
        .unwrap();
    assert_eq!(height, 4);
    assert!(difficulty >= 1);
    assert_eq!(template.transaction_hashes.len(), 2);

    let queue = core.make_queue();

    // the sized template is accepted as-is: the coinbase fixed point and the
    // reward equation agree
    assert_eq!(
        core.submit_block(&serialize(&template)),
        Ok(AddBlockResult::AddedToMain)
    );
    assert_eq!(core.top_block_height().unwrap(), 4);

    // both pool transactions landed in the block and left the pool
    assert_eq!(core.pool_transaction_count().unwrap(), 0);
    match queue.try_pop().unwrap() {
        BlockchainMessage::DeleteTransaction { hashes, reason } => {
            assert_eq!(reason, DeleteTransactionReason::InBlock);
            assert_eq!(hashes.len(), 2);
        }
        other => panic!("expected InBlock deletions, got {:?}", other),
    }
}

#[test]
fn submit_block_requires_pooled_transactions() {
    let (core, _) = new_core();
    let mut builder = ChainBuilder::new(test_currency());
    let b1 = builder.generate_block();
    core.add_block(builder.raw(b1)).unwrap();

    let (mut template, _, _) = core.get_block_template(&miner_address(), &[]).unwrap();
    template.transaction_hashes.push(chain::hash::H256::from(5u8));

    assert!(matches!(
        core.submit_block(&serialize(&template)),
        Err(AddBlockError::Block(
            verification::BlockValidationError::TransactionAbsentInPool
        ))
    ));
}

#[test]
fn cleaner_expires_transactions_on_the_boundary() {
    let (core, time) = new_core();
    let mut builder = ChainBuilder::new(test_currency());
    let b1 = builder.generate_block();
    let b2 = builder.generate_block();
    let b3 = builder.generate_block();
    for id in [b1, b2, b3] {
        core.add_block(builder.raw(id)).unwrap();
    }

    let t1 = TransactionBuilder::new()
        .spend_coinbase_largest(&builder, b3, b1)
        .output_rest(1_000, b"expiring")
        .build();
    assert!(core.add_transaction_to_pool(&serialize(&t1)));

    let queue = core.make_queue();

    // pool lifetime is 100 in the test currency: at expiry - 1 nothing happens
    time.0.store(MOCK_NOW + 99, Ordering::SeqCst);
    core.clean_pool();
    assert_eq!(core.pool_transaction_count().unwrap(), 1);
    assert_eq!(queue.try_pop(), None);

    // at exactly the expiry the transaction is evicted and announced
    time.0.store(MOCK_NOW + 100, Ordering::SeqCst);
    core.clean_pool();
    assert_eq!(core.pool_transaction_count().unwrap(), 0);
    match queue.try_pop().unwrap() {
        BlockchainMessage::DeleteTransaction { reason, .. } => {
            assert_eq!(reason, DeleteTransactionReason::Outdated);
        }
        other => panic!("expected an eviction event, got {:?}", other),
    }

    // an expired transaction cannot come straight back
    assert!(!core.add_transaction_to_pool(&serialize(&t1)));
}

fn storage_at(dir: &Path) -> BlockchainStorage {
    BlockchainStorage::swapped(
        &dir.join("blockindexes.dat"),
        &dir.join("blocks.dat"),
    )
    .unwrap()
}

#[test]
fn save_then_load_preserves_the_chain() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("rootcache.dat");
    let mut builder = ChainBuilder::new(test_currency());

    {
        let root = Segment::Persistent(PersistentSegment::load(&cache_path).unwrap());
        let (core, _) = new_core_with(storage_at(dir.path()), root);
        for _ in 0..5 {
            let id = builder.generate_block();
            core.add_block(builder.raw(id)).unwrap();
        }

        // leave an alternative leaf behind; save() must prune it
        let fork =
            builder.generate_block_at(2, Vec::new(), builder.block(2).timestamp + 60);
        assert_eq!(
            core.add_block(builder.raw(fork)),
            Ok(AddBlockResult::AddedToAlternative)
        );
        assert_eq!(core.alternative_block_count().unwrap(), 1);

        core.save().unwrap();
        assert_eq!(core.alternative_block_count().unwrap(), 0);
    }

    let root = Segment::Persistent(PersistentSegment::load(&cache_path).unwrap());
    let (core, _) = new_core_with(storage_at(dir.path()), root);
    assert_eq!(core.top_block_height().unwrap(), 5);
    assert_eq!(core.top_block_hash().unwrap(), builder.hash(5));
}

#[test]
fn load_replays_storage_into_a_fresh_cache() {
    let dir = tempfile::tempdir().unwrap();
    let mut builder = ChainBuilder::new(test_currency());

    {
        let root = Segment::Persistent(
            PersistentSegment::load(&dir.path().join("rootcache.dat")).unwrap(),
        );
        let (core, _) = new_core_with(storage_at(dir.path()), root);
        for _ in 0..4 {
            let id = builder.generate_block();
            core.add_block(builder.raw(id)).unwrap();
        }
        // no save: only the raw store survives
    }

    let root = Segment::Persistent(
        PersistentSegment::load(&dir.path().join("fresh-rootcache.dat")).unwrap(),
    );
    let (core, _) = new_core_with(storage_at(dir.path()), root);
    assert_eq!(core.top_block_height().unwrap(), 4);
    assert_eq!(core.top_block_hash().unwrap(), builder.hash(4));
}

#[test]
fn load_trims_a_cache_that_is_ahead_of_storage() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("rootcache.dat");
    let mut builder = ChainBuilder::new(test_currency());

    {
        let root = Segment::Persistent(PersistentSegment::load(&cache_path).unwrap());
        let (core, _) = new_core_with(storage_at(dir.path()), root);
        for _ in 0..4 {
            let id = builder.generate_block();
            core.add_block(builder.raw(id)).unwrap();
        }
        core.save().unwrap();
    }

    // a fresh raw store only knows the genesis; the cache must be cut back
    let fresh = tempfile::tempdir().unwrap();
    let root = Segment::Persistent(PersistentSegment::load(&cache_path).unwrap());
    let (core, _) = new_core_with(storage_at(fresh.path()), root);
    assert_eq!(core.top_block_height().unwrap(), 0);
}

#[test]
fn random_outputs_are_unlocked_and_sorted() {
    let (core, _) = new_core();
    let mut builder = ChainBuilder::new(test_currency());
    for _ in 0..8 {
        let id = builder.generate_block();
        core.add_block(builder.raw(id)).unwrap();
    }

    // the leading denomination is the same in every block's coinbase
    let last = builder.block(1).cached.block().base_transaction.outputs.len() - 1;
    let amount = builder.output_amount(1, 0, last);
    let outputs = core.random_outputs(amount, 2).unwrap();
    assert_eq!(outputs.len(), 2);
    assert!(outputs[0].global_index < outputs[1].global_index);
}

/// Invariant: after a switch, the persistent raw store's tail matches the
/// new canonical path. Verified by reimporting the store into a fresh cache.
#[test]
fn switch_rewrites_the_raw_store() {
    let dir = tempfile::tempdir().unwrap();
    let mut builder = ChainBuilder::new(test_currency());

    let (a3, b4) = {
        let root = Segment::Persistent(
            PersistentSegment::load(&dir.path().join("rootcache.dat")).unwrap(),
        );
        let (core, _) = new_core_with(storage_at(dir.path()), root);

        let a1 = builder.generate_block();
        let a2 = builder.generate_block();
        let a3 = builder.generate_block();
        for id in [a1, a2, a3] {
            core.add_block(builder.raw(id)).unwrap();
        }

        let b3 = builder.generate_block_at(a2, Vec::new(), builder.block(a2).timestamp + 60);
        let b4 = builder.generate_block_at(b3, Vec::new(), builder.block(b3).timestamp + 60);
        assert_eq!(
            core.add_block(builder.raw(b3)),
            Ok(AddBlockResult::AddedToAlternative)
        );
        assert_eq!(
            core.add_block(builder.raw(b4)),
            Ok(AddBlockResult::AddedToAlternativeAndSwitched)
        );
        (a3, b4)
        // dropped without save(): only the raw store survives
    };

    let root = Segment::Persistent(
        PersistentSegment::load(&dir.path().join("fresh-rootcache.dat")).unwrap(),
    );
    let (core, _) = new_core_with(storage_at(dir.path()), root);
    assert_eq!(core.top_block_height().unwrap(), 4);
    assert_eq!(core.top_block_hash().unwrap(), builder.hash(b4));
    assert!(!core.has_block(&builder.hash(a3)).unwrap());
}

#[test]
fn sparse_chain_starts_at_top_and_ends_at_genesis() {
    let (core, _) = new_core();
    let mut builder = ChainBuilder::new(test_currency());
    for _ in 0..6 {
        let id = builder.generate_block();
        core.add_block(builder.raw(id)).unwrap();
    }

    let sparse = core.build_sparse_chain().unwrap();
    assert_eq!(sparse.first(), Some(&builder.hash(6)));
    assert_eq!(sparse.last(), Some(&core.block_hash_at(0).unwrap().unwrap()));
}

#[test]
fn query_blocks_returns_the_supplement() {
    let (core, _) = new_core();
    let mut builder = ChainBuilder::new(test_currency());
    for _ in 0..5 {
        let id = builder.generate_block();
        core.add_block(builder.raw(id)).unwrap();
    }

    let genesis_hash = core.block_hash_at(0).unwrap().unwrap();
    let known = vec![builder.hash(2), genesis_hash];
    let result = core.query_blocks(&known, 0).unwrap();

    assert_eq!(result.start_height, 2);
    assert_eq!(result.current_height, 5);
    // timestamp 0 predates the whole chain: every block comes back full
    assert!(result
        .entries
        .iter()
        .skip((result.full_offset - result.start_height) as usize)
        .all(|entry| entry.raw_block.is_some()));
}

#[test]
fn raw_block_serialization_is_identity() {
    let mut builder = ChainBuilder::new(test_currency());
    let rescue_tx = {
        let b1 = builder.generate_block();
        let b2 = builder.generate_block();
        let _ = b2;
        TransactionBuilder::new()
            .spend_coinbase_largest(&builder, b2, b1)
            .output_rest(1_000, b"roundtrip")
            .build()
    };
    let b3 = builder.generate_block_at(
        2,
        vec![rescue_tx],
        builder.block(2).timestamp + 120,
    );

    let raw = builder.raw(b3);
    let bytes = serialize(&raw);
    let restored: RawBlock = ser::deserialize(&bytes).unwrap();
    assert_eq!(restored, raw);
    assert_eq!(serialize(&restored), bytes);
}
