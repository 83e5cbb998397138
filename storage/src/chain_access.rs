//! The read contract a chain view offers to validation and the core.
//!
//! A view covers a full chain from genesis to the tip of one segment;
//! implementations walk segment ancestors internally. All methods that take
//! a height treat it as an inclusive upper bound, so validation against an
//! historic parent sees exactly the chain as of that parent.

use crate::types::{CachedBlockInfo, CachedTransactionInfo, PackedOutputIndex};
use chain::{MultisignatureOutput, TransactionOutputTarget};
use crypto::{KeyImage, PublicKey};
use primitives::H256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractOutputsResult {
    Success,
    InvalidGlobalIndex,
    OutputLocked,
}

pub trait ChainAccess {
    fn top_height(&self) -> u32;
    fn top_hash(&self) -> H256;
    fn top_cumulative_difficulty(&self) -> u64;

    fn has_block(&self, hash: &H256) -> bool;
    fn block_height(&self, hash: &H256) -> Option<u32>;
    fn block_hash_at(&self, height: u32) -> Option<H256>;
    fn block_info_at(&self, height: u32) -> Option<CachedBlockInfo>;
    fn has_transaction(&self, hash: &H256) -> bool;

    fn is_key_image_spent(&self, image: &KeyImage, up_to_height: u32) -> bool;
    fn is_multisignature_spent(&self, amount: u64, output_index: u32, up_to_height: u32) -> bool;
    fn multisignature_output(
        &self,
        amount: u64,
        output_index: u32,
        up_to_height: u32,
    ) -> Option<(MultisignatureOutput, u64)>;

    /// Resolves each global index of `amount` and feeds it to `visitor`;
    /// stops and returns the first non-success result.
    fn extract_key_outputs(
        &self,
        amount: u64,
        up_to_height: u32,
        global_indexes: &[u32],
        visitor: &mut dyn FnMut(&CachedTransactionInfo, PackedOutputIndex, u32) -> ExtractOutputsResult,
    ) -> ExtractOutputsResult;

    fn key_outputs_count(&self, amount: u64, up_to_height: u32) -> u32;

    /// Last `count` per-block units ending at `from_height` inclusive, in
    /// ascending height order. `use_genesis` controls whether the window may
    /// reach down to height 0.
    fn last_timestamps(&self, count: usize, from_height: u32, use_genesis: bool) -> Vec<u64>;
    fn last_block_sizes(&self, count: usize, from_height: u32, use_genesis: bool) -> Vec<u64>;
    fn last_cumulative_difficulties(
        &self,
        count: usize,
        from_height: u32,
        use_genesis: bool,
    ) -> Vec<u64>;

    fn already_generated_coins(&self, height: u32) -> u64;

    /// Height-based locks compare against the next block height, time-based
    /// locks against the injected clock.
    fn is_spend_time_unlocked(&self, unlock_time: u64, height: u32, now: u64) -> bool;
}

/// Resolves `global_indexes` of `amount` into output keys, verifying each
/// referenced output is unlocked at `up_to_height`.
pub fn extract_key_output_keys(
    view: &dyn ChainAccess,
    amount: u64,
    up_to_height: u32,
    global_indexes: &[u32],
    now: u64,
) -> Result<Vec<PublicKey>, ExtractOutputsResult> {
    let mut keys = Vec::with_capacity(global_indexes.len());
    let result = view.extract_key_outputs(
        amount,
        up_to_height,
        global_indexes,
        &mut |info, packed, _global_index| {
            if !view.is_spend_time_unlocked(info.unlock_time, up_to_height, now) {
                return ExtractOutputsResult::OutputLocked;
            }
            match info.outputs.get(packed.output_index as usize).map(|o| &o.target) {
                Some(TransactionOutputTarget::Key(output)) => {
                    keys.push(output.key);
                    ExtractOutputsResult::Success
                }
                _ => ExtractOutputsResult::InvalidGlobalIndex,
            }
        },
    );

    match result {
        ExtractOutputsResult::Success => Ok(keys),
        failure => Err(failure),
    }
}
