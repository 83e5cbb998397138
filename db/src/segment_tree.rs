//! Forest of chain segments sharing a common root.
//!
//! Segments live in an arena and refer to each other by `SegmentId`; walking
//! towards the root is a loop on handles. `leaves[0]` is always the canonical
//! leaf, and `main_chain` holds every segment on the path from the root to
//! it. The tree performs the cross-segment parts of the cache contract:
//! ancestor spent-set checks, global output numbering across splits, and the
//! chain-wide view handed to validation.

use crate::error::Error;
use crate::segment::Segment;
use crate::segment_cache::{restore_cached_transactions, OutputBaseCounts, OutputLookup, SegmentCache};
use chain::{CachedBlock, CachedTransaction, MultisignatureOutput, RawBlock};
use chain::constants::MAX_BLOCK_NUMBER;
use crypto::KeyImage;
use network::Currency;
use primitives::H256;
use std::collections::HashSet;
use storage::{
    CachedBlockInfo, CachedTransactionInfo, ChainAccess, ExtractOutputsResult, PackedOutputIndex,
    PushedBlockInfo, ValidatorState,
};

pub type SegmentId = usize;

struct SegmentNode {
    segment: Segment,
    parent: Option<SegmentId>,
    children: Vec<SegmentId>,
}

pub struct SegmentTree {
    nodes: Vec<Option<SegmentNode>>,
    /// All current leaves; index 0 is the canonical one.
    leaves: Vec<SegmentId>,
    main_chain: HashSet<SegmentId>,
    root: SegmentId,
}

impl SegmentTree {
    pub fn new(root_segment: Segment) -> Self {
        SegmentTree {
            nodes: vec![Some(SegmentNode {
                segment: root_segment,
                parent: None,
                children: Vec::new(),
            })],
            leaves: vec![0],
            main_chain: vec![0].into_iter().collect(),
            root: 0,
        }
    }

    fn node(&self, id: SegmentId) -> &SegmentNode {
        self.nodes[id]
            .as_ref()
            .expect("segment ids are only handed out for live nodes; qed")
    }

    fn node_mut(&mut self, id: SegmentId) -> &mut SegmentNode {
        self.nodes[id]
            .as_mut()
            .expect("segment ids are only handed out for live nodes; qed")
    }

    fn insert_node(&mut self, node: SegmentNode) -> SegmentId {
        for (id, slot) in self.nodes.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(node);
                return id;
            }
        }
        self.nodes.push(Some(node));
        self.nodes.len() - 1
    }

    pub fn root(&self) -> SegmentId {
        self.root
    }

    pub fn canonical_leaf(&self) -> SegmentId {
        self.leaves[0]
    }

    pub fn leaves(&self) -> &[SegmentId] {
        &self.leaves
    }

    pub fn cache(&self, id: SegmentId) -> &SegmentCache {
        self.node(id).segment.cache()
    }

    pub fn segment(&self, id: SegmentId) -> &Segment {
        &self.node(id).segment
    }

    pub fn parent(&self, id: SegmentId) -> Option<SegmentId> {
        self.node(id).parent
    }

    pub fn child_count(&self, id: SegmentId) -> usize {
        self.node(id).children.len()
    }

    pub fn is_in_main_chain(&self, id: SegmentId) -> bool {
        self.main_chain.contains(&id)
    }

    pub fn segment_ids(&self) -> Vec<SegmentId> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|_| id))
            .collect()
    }

    /// Ids from `from` to the root, inclusive.
    pub fn chain_ids(&self, from: SegmentId) -> Vec<SegmentId> {
        let mut ids = Vec::new();
        let mut current = Some(from);
        while let Some(id) = current {
            ids.push(id);
            current = self.parent(id);
        }
        ids
    }

    /// Ids from `from` up to (and excluding) the first main-chain segment.
    fn alt_chain_ids(&self, from: SegmentId) -> Vec<SegmentId> {
        let mut ids = Vec::new();
        let mut current = Some(from);
        while let Some(id) = current {
            if self.main_chain.contains(&id) {
                break;
            }
            ids.push(id);
            current = self.parent(id);
        }
        ids
    }

    pub fn find_main_segment_with_block(&self, hash: &H256) -> Option<SegmentId> {
        self.chain_ids(self.canonical_leaf())
            .into_iter()
            .find(|id| self.cache(*id).has_block(hash))
    }

    pub fn find_main_segment_with_height(&self, height: u32) -> Option<SegmentId> {
        self.chain_ids(self.canonical_leaf())
            .into_iter()
            .find(|id| self.cache(*id).contains_height(height))
    }

    pub fn find_alternative_segment_with_block(&self, hash: &H256) -> Option<SegmentId> {
        for leaf in self.leaves.iter().skip(1) {
            for id in self.alt_chain_ids(*leaf) {
                if self.cache(id).has_block(hash) {
                    return Some(id);
                }
            }
        }
        None
    }

    /// Returns the first alternative segment owning `height`.
    pub fn find_alternative_segment_with_height(&self, height: u32) -> Option<SegmentId> {
        for leaf in self.leaves.iter().skip(1) {
            for id in self.alt_chain_ids(*leaf) {
                if self.cache(id).contains_height(height) {
                    return Some(id);
                }
            }
        }
        None
    }

    pub fn find_segment_with_block(&self, hash: &H256) -> Option<SegmentId> {
        self.find_main_segment_with_block(hash)
            .or_else(|| self.find_alternative_segment_with_block(hash))
    }

    pub fn find_segment_with_transaction(&self, hash: &H256) -> Option<SegmentId> {
        for id in self.chain_ids(self.canonical_leaf()) {
            if self.cache(id).has_transaction(hash) {
                return Some(id);
            }
        }
        for leaf in self.leaves.iter().skip(1) {
            for id in self.alt_chain_ids(*leaf) {
                if self.cache(id).has_transaction(hash) {
                    return Some(id);
                }
            }
        }
        None
    }

    fn ancestor_key_outputs_total(&self, id: SegmentId, amount: u64) -> u32 {
        let mut current = self.parent(id);
        while let Some(seg) = current {
            if let Some(total) = self.cache(seg).key_outputs_total(amount) {
                return total;
            }
            current = self.parent(seg);
        }
        0
    }

    fn ancestor_multisignature_outputs_total(&self, id: SegmentId, amount: u64) -> u32 {
        let mut current = self.parent(id);
        while let Some(seg) = current {
            if let Some(total) = self.cache(seg).multisignature_outputs_total(amount) {
                return total;
            }
            current = self.parent(seg);
        }
        0
    }

    /// Pushes a validated block onto a segment, checking the spent sets of
    /// every ancestor first and numbering new output amounts where the
    /// ancestor chain left off.
    pub fn push_block_to(
        &mut self,
        id: SegmentId,
        block: &CachedBlock,
        transactions: &[CachedTransaction],
        validator_state: ValidatorState,
        block_size: u64,
        emission_change: i64,
        block_difficulty: u64,
        raw_block: RawBlock,
    ) -> Result<(), Error> {
        if let Some(parent) = self.parent(id) {
            for seg in self.chain_ids(parent) {
                let cache = self.cache(seg);
                for image in &validator_state.spent_key_images {
                    if cache.key_image_spent_height(image).is_some() {
                        return Err(Error::DuplicateSpentEntry);
                    }
                }
                for usage in &validator_state.spent_multisignature_outputs {
                    if cache.multisignature_spent_height(usage.0, usage.1).is_some() {
                        return Err(Error::DuplicateSpentEntry);
                    }
                }
            }
        }

        let mut base_counts = OutputBaseCounts::default();
        {
            let cache = self.cache(id);
            let coinbase_outputs = block.block().base_transaction.outputs.iter();
            let tx_outputs = transactions
                .iter()
                .flat_map(|tx| tx.transaction().outputs.iter());
            for output in coinbase_outputs.chain(tx_outputs) {
                match output.target {
                    chain::TransactionOutputTarget::Key(_) => {
                        if cache.key_outputs_total(output.amount).is_none()
                            && !base_counts.key.contains_key(&output.amount)
                        {
                            base_counts.key.insert(
                                output.amount,
                                self.ancestor_key_outputs_total(id, output.amount),
                            );
                        }
                    }
                    chain::TransactionOutputTarget::Multisignature(_) => {
                        if cache.multisignature_outputs_total(output.amount).is_none()
                            && !base_counts.multisignature.contains_key(&output.amount)
                        {
                            base_counts.multisignature.insert(
                                output.amount,
                                self.ancestor_multisignature_outputs_total(id, output.amount),
                            );
                        }
                    }
                }
            }
        }

        self.node_mut(id).segment.cache_mut().push_block(
            block,
            transactions,
            validator_state,
            block_size,
            emission_change,
            block_difficulty,
            raw_block,
            &base_counts,
        )
    }

    /// Splits `id` at `height`. The upper part becomes a new segment that
    /// inherits all of `id`'s children (they all attach above the split
    /// point); `id` keeps the lower heights and gains the upper as a child.
    pub fn split_segment(&mut self, id: SegmentId, height: u32) -> SegmentId {
        debug!(target: "db", "splitting segment at height {}", height);

        let upper_cache = self.node_mut(id).segment.cache_mut().split(height);
        let moved_children = std::mem::take(&mut self.node_mut(id).children);
        let upper_id = self.insert_node(SegmentNode {
            segment: Segment::InMemory(upper_cache),
            parent: Some(id),
            children: moved_children.clone(),
        });
        for child in moved_children {
            self.node_mut(child).parent = Some(upper_id);
        }
        self.node_mut(id).children.push(upper_id);

        // a childless upper part takes over the lower's leaf slot
        if self.node(upper_id).children.is_empty() {
            if let Some(position) = self.leaves.iter().position(|leaf| *leaf == id) {
                self.leaves[position] = upper_id;
            }
        }
        self.update_main_chain_set();

        upper_id
    }

    /// Creates an empty child segment starting at `start_height`.
    pub fn add_child(&mut self, parent_id: SegmentId, start_height: u32) -> SegmentId {
        let parent_base = self
            .cache(parent_id)
            .info_at(start_height - 1)
            .cloned()
            .expect("children always fork from an existing parent height; qed");

        let child_id = self.insert_node(SegmentNode {
            segment: Segment::InMemory(SegmentCache::new(start_height, Some(parent_base))),
            parent: Some(parent_id),
            children: Vec::new(),
        });
        self.node_mut(parent_id).children.push(child_id);
        self.leaves.push(child_id);
        child_id
    }

    /// Makes the leaf at `leaf_index` canonical.
    pub fn promote_leaf(&mut self, leaf_index: usize) {
        assert!(leaf_index < self.leaves.len());
        self.leaves.swap(0, leaf_index);
        self.update_main_chain_set();
    }

    fn update_main_chain_set(&mut self) {
        self.main_chain = self.chain_ids(self.canonical_leaf()).into_iter().collect();
    }

    /// Removes a leaf segment and its blocks. The parent becomes a leaf
    /// again if this was its only child.
    pub fn delete_leaf(&mut self, leaf_index: usize) {
        assert!(leaf_index < self.leaves.len());
        let leaf = self.leaves[leaf_index];
        let parent = self.parent(leaf);

        if let Some(parent) = parent {
            self.node_mut(parent).children.retain(|child| *child != leaf);
        }

        if leaf_index != 0 {
            if let Some(parent) = parent {
                if self.node(parent).children.is_empty() {
                    self.leaves.push(parent);
                }
            }
            self.leaves.remove(leaf_index);
        } else if let Some(parent) = parent {
            self.leaves[0] = parent;
        } else {
            self.leaves.remove(0);
        }

        self.nodes[leaf] = None;
        self.update_main_chain_set();
    }

    pub fn delete_alternative_chains(&mut self) {
        while self.leaves.len() > 1 {
            self.delete_leaf(1);
        }
    }

    /// Drops heights `>= height` from a childless segment. Load-time only.
    pub fn cut_from(&mut self, id: SegmentId, height: u32) {
        assert_eq!(self.child_count(id), 0);
        let cache = self.node_mut(id).segment.cache_mut();
        match cache.top_height() {
            Some(top) if top >= height => {
                info!(target: "db", "cutting segment from height {}", height);
                let _ = cache.split(height);
            }
            _ => {}
        }
    }

    /// Fuses every main-chain segment back into the root by replaying their
    /// push history bottom-up. Requires all alternative leaves to be gone.
    pub fn merge_main_segments(&mut self) -> Result<(), Error> {
        assert_eq!(self.leaves.len(), 1, "alternative chains must be deleted first");

        let mut path = self.chain_ids(self.canonical_leaf());
        path.reverse();
        assert_eq!(path[0], self.root);

        for id in path.into_iter().skip(1) {
            let pushed: Vec<PushedBlockInfo> = {
                let cache = self.cache(id);
                let start = cache.start_height();
                (start..start + cache.block_count())
                    .map(|height| {
                        cache
                            .pushed_info(height)
                            .expect("heights below block_count are present; qed")
                            .clone()
                    })
                    .collect()
            };

            for info in pushed {
                let block = CachedBlock::from_binary(&info.raw_block.block)?;
                let transactions = restore_cached_transactions(&info.raw_block.transactions)?;
                self.node_mut(self.root).segment.cache_mut().push_block(
                    &block,
                    &transactions,
                    info.validator_state,
                    info.block_size,
                    info.emission_change,
                    info.block_difficulty,
                    info.raw_block,
                    &OutputBaseCounts::default(),
                )?;
            }

            self.nodes[id] = None;
        }

        let root = self.root;
        self.node_mut(root).children.clear();
        self.leaves = vec![root];
        self.update_main_chain_set();
        Ok(())
    }

    /// Chain-wide read view with `tip`'s chain as the visible history.
    pub fn view<'a>(&'a self, tip: SegmentId, currency: &'a Currency) -> ChainView<'a> {
        ChainView {
            tree: self,
            tip,
            currency,
        }
    }

    /// Earliest canonical height whose timestamp is `>= timestamp`.
    pub fn timestamp_lower_bound(&self, timestamp: u64) -> Option<u32> {
        let mut path = self.chain_ids(self.canonical_leaf());
        path.reverse();
        for id in path {
            if let Some(height) = self.cache(id).timestamp_lower_bound(timestamp) {
                return Some(height);
            }
        }
        None
    }

    /// Canonical block hashes `[start_height, start_height + max_count)`.
    pub fn block_hashes(&self, start_height: u32, max_count: usize) -> Vec<H256> {
        let top = match self.cache_top_height() {
            Some(top) => top,
            None => return Vec::new(),
        };
        let mut hashes = Vec::new();
        let mut height = start_height;
        while height <= top && hashes.len() < max_count {
            if let Some(id) = self.find_main_segment_with_height(height) {
                if let Some(hash) = self.cache(id).block_hash_at(height) {
                    hashes.push(hash);
                }
            }
            height += 1;
        }
        hashes
    }

    fn cache_top_height(&self) -> Option<u32> {
        for id in self.chain_ids(self.canonical_leaf()) {
            if let Some(top) = self.cache(id).top_height() {
                return Some(top);
            }
        }
        None
    }
}

/// A full-chain read view rooted at one segment, implementing the access
/// contract validation runs against.
pub struct ChainView<'a> {
    tree: &'a SegmentTree,
    tip: SegmentId,
    currency: &'a Currency,
}

impl<'a> ChainView<'a> {
    fn chain(&self) -> Vec<SegmentId> {
        self.tree.chain_ids(self.tip)
    }

    /// Segments whose heights may intersect `..=up_to`, tip-first.
    fn chain_at_or_below(&self, up_to_height: u32) -> Vec<SegmentId> {
        self.chain()
            .into_iter()
            .filter(|id| self.tree.cache(*id).start_height() <= up_to_height)
            .collect()
    }

    fn segment_for_height(&self, height: u32) -> Option<SegmentId> {
        self.chain()
            .into_iter()
            .find(|id| self.tree.cache(*id).contains_height(height))
    }

    fn top_entry(&self) -> (SegmentId, u32) {
        for id in self.chain() {
            if let Some(top) = self.tree.cache(id).top_height() {
                return (id, top);
            }
        }
        panic!("a chain view always covers at least the genesis; qed");
    }

    fn last_units<F>(&self, count: usize, from_height: u32, use_genesis: bool, f: F) -> Vec<u64>
    where
        F: Fn(&CachedBlockInfo) -> u64,
    {
        if count == 0 {
            return Vec::new();
        }
        let low = if use_genesis { 0i64 } else { 1i64 };
        let start = std::cmp::max(i64::from(from_height) + 1 - count as i64, low);
        if start > i64::from(from_height) {
            return Vec::new();
        }

        let mut units = Vec::with_capacity((i64::from(from_height) - start + 1) as usize);
        for height in (start as u32)..=from_height {
            match self.block_info_at(height) {
                Some(info) => units.push(f(&info)),
                None => return Vec::new(),
            }
        }
        units
    }
}

impl<'a> ChainAccess for ChainView<'a> {
    fn top_height(&self) -> u32 {
        self.top_entry().1
    }

    fn top_hash(&self) -> H256 {
        let (id, top) = self.top_entry();
        self.tree
            .cache(id)
            .block_hash_at(top)
            .expect("top height is owned by its segment; qed")
    }

    fn top_cumulative_difficulty(&self) -> u64 {
        let (id, top) = self.top_entry();
        self.tree
            .cache(id)
            .info_at(top)
            .expect("top height is owned by its segment; qed")
            .cumulative_difficulty
    }

    fn has_block(&self, hash: &H256) -> bool {
        self.block_height(hash).is_some()
    }

    fn block_height(&self, hash: &H256) -> Option<u32> {
        self.chain()
            .into_iter()
            .find_map(|id| self.tree.cache(id).block_height(hash))
    }

    fn block_hash_at(&self, height: u32) -> Option<H256> {
        self.segment_for_height(height)
            .and_then(|id| self.tree.cache(id).block_hash_at(height))
    }

    fn block_info_at(&self, height: u32) -> Option<CachedBlockInfo> {
        self.segment_for_height(height)
            .and_then(|id| self.tree.cache(id).info_at(height).cloned())
    }

    fn has_transaction(&self, hash: &H256) -> bool {
        self.chain()
            .into_iter()
            .any(|id| self.tree.cache(id).has_transaction(hash))
    }

    fn is_key_image_spent(&self, image: &KeyImage, up_to_height: u32) -> bool {
        for id in self.chain() {
            if let Some(height) = self.tree.cache(id).key_image_spent_height(image) {
                return height <= up_to_height;
            }
        }
        false
    }

    fn is_multisignature_spent(&self, amount: u64, output_index: u32, up_to_height: u32) -> bool {
        for id in self.chain() {
            if let Some(height) = self
                .tree
                .cache(id)
                .multisignature_spent_height(amount, output_index)
            {
                return height <= up_to_height;
            }
        }
        false
    }

    fn multisignature_output(
        &self,
        amount: u64,
        output_index: u32,
        up_to_height: u32,
    ) -> Option<(MultisignatureOutput, u64)> {
        for id in self.chain_at_or_below(up_to_height) {
            let cache = self.tree.cache(id);
            match cache.multisignature_output_lookup(amount, output_index, up_to_height) {
                OutputLookup::Found(packed) => return cache.multisignature_output_at(packed),
                OutputLookup::Missing => return None,
                OutputLookup::AskParent => continue,
            }
        }
        None
    }

    fn extract_key_outputs(
        &self,
        amount: u64,
        up_to_height: u32,
        global_indexes: &[u32],
        visitor: &mut dyn FnMut(&CachedTransactionInfo, PackedOutputIndex, u32) -> ExtractOutputsResult,
    ) -> ExtractOutputsResult {
        let segments = self.chain_at_or_below(up_to_height);
        for global_index in global_indexes {
            let mut resolved = false;
            for id in &segments {
                let cache = self.tree.cache(*id);
                match cache.key_output_lookup(amount, *global_index, up_to_height) {
                    OutputLookup::Found(packed) => {
                        let (info, _) = match cache.resolve_output(packed) {
                            Some(found) => found,
                            None => return ExtractOutputsResult::InvalidGlobalIndex,
                        };
                        let result = visitor(info, packed, *global_index);
                        if result != ExtractOutputsResult::Success {
                            return result;
                        }
                        resolved = true;
                        break;
                    }
                    OutputLookup::Missing => return ExtractOutputsResult::InvalidGlobalIndex,
                    OutputLookup::AskParent => continue,
                }
            }
            if !resolved {
                return ExtractOutputsResult::InvalidGlobalIndex;
            }
        }

        ExtractOutputsResult::Success
    }

    fn key_outputs_count(&self, amount: u64, up_to_height: u32) -> u32 {
        for id in self.chain_at_or_below(up_to_height) {
            if let Some(count) = self
                .tree
                .cache(id)
                .key_outputs_count_limited(amount, up_to_height)
            {
                return count;
            }
        }
        0
    }

    fn last_timestamps(&self, count: usize, from_height: u32, use_genesis: bool) -> Vec<u64> {
        self.last_units(count, from_height, use_genesis, |info| info.timestamp)
    }

    fn last_block_sizes(&self, count: usize, from_height: u32, use_genesis: bool) -> Vec<u64> {
        self.last_units(count, from_height, use_genesis, |info| info.block_size)
    }

    fn last_cumulative_difficulties(
        &self,
        count: usize,
        from_height: u32,
        use_genesis: bool,
    ) -> Vec<u64> {
        self.last_units(count, from_height, use_genesis, |info| {
            info.cumulative_difficulty
        })
    }

    fn already_generated_coins(&self, height: u32) -> u64 {
        self.block_info_at(height)
            .map(|info| info.already_generated_coins)
            .unwrap_or(0)
    }

    fn is_spend_time_unlocked(&self, unlock_time: u64, height: u32, now: u64) -> bool {
        if unlock_time < MAX_BLOCK_NUMBER {
            u64::from(height) + u64::from(self.currency.locked_tx_allowed_delta_blocks())
                >= unlock_time
        } else {
            now + self.currency.locked_tx_allowed_delta_seconds() >= unlock_time
        }
    }
}
