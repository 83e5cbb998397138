use crate::checkpoints::Checkpoints;
use crate::error::{AddBlockError, BlockValidationError, TransactionValidationError};
use crate::work::median_value;
use chain::constants::{BLOCK_MAJOR_VERSION_2, MAX_PARENT_BLOCK_SIZE};
use chain::{
    absolute_output_offsets, CachedBlock, CachedTransaction, Transaction, TransactionInput,
    TransactionOutputTarget,
};
use crypto::{check_key, check_ring_signature, check_signature};
use network::{Currency, UpgradeManager};
use storage::{extract_key_output_keys, ChainAccess, ExtractOutputsResult, ValidatorState};
use std::collections::{BTreeSet, HashSet};

/// Stateless checks of a transaction alone: output domains, input shapes,
/// overflow-free sums. Returns the fee.
pub fn validate_semantic(transaction: &Transaction) -> Result<u64, TransactionValidationError> {
    if transaction.inputs.is_empty() {
        return Err(TransactionValidationError::EmptyInputs);
    }

    let mut output_amount: u64 = 0;
    for output in &transaction.outputs {
        if output.amount == 0 {
            return Err(TransactionValidationError::OutputZeroAmount);
        }

        match &output.target {
            TransactionOutputTarget::Key(target) => {
                if !check_key(&target.key) {
                    return Err(TransactionValidationError::OutputInvalidKey);
                }
            }
            TransactionOutputTarget::Multisignature(target) => {
                if target.required_signatures as usize > target.keys.len() {
                    return Err(
                        TransactionValidationError::OutputInvalidRequiredSignaturesCount,
                    );
                }
                for key in &target.keys {
                    if !check_key(key) {
                        return Err(TransactionValidationError::OutputInvalidKey);
                    }
                }
            }
        }

        output_amount = output_amount
            .checked_add(output.amount)
            .ok_or(TransactionValidationError::OutputsAmountOverflow)?;
    }

    let mut input_amount: u64 = 0;
    let mut key_images = HashSet::new();
    let mut output_usages = BTreeSet::new();
    for input in &transaction.inputs {
        let amount = match input {
            TransactionInput::Key(input) => {
                if !key_images.insert(input.key_image) {
                    return Err(TransactionValidationError::InputIdenticalKeyImages);
                }
                if input.output_offsets.is_empty() {
                    return Err(TransactionValidationError::InputEmptyOutputUsage);
                }
                // offsets are deltas: the first is absolute and may be zero,
                // the rest may not
                if input.output_offsets.iter().skip(1).any(|offset| *offset == 0) {
                    return Err(TransactionValidationError::InputIdenticalOutputIndexes);
                }
                input.amount
            }
            TransactionInput::Multisignature(input) => {
                if !output_usages.insert((input.amount, input.output_index)) {
                    return Err(TransactionValidationError::InputIdenticalOutputIndexes);
                }
                input.amount
            }
            TransactionInput::Coinbase { .. } => {
                return Err(TransactionValidationError::InputUnexpectedType);
            }
        };

        input_amount = input_amount
            .checked_add(amount)
            .ok_or(TransactionValidationError::InputsAmountOverflow)?;
    }

    if output_amount > input_amount {
        return Err(TransactionValidationError::WrongAmount);
    }

    if transaction.signatures.len() != transaction.inputs.len() {
        return Err(TransactionValidationError::InputInvalidSignatures);
    }

    Ok(input_amount - output_amount)
}

/// Full contextual validation of one transaction against the chain as of
/// `block_height`, accumulating its spends into `state`. Inside the
/// checkpoint zone key-input resolution and ring signatures are skipped;
/// the double-spend and multisignature checks always run.
pub fn validate_transaction(
    transaction: &CachedTransaction,
    state: &mut ValidatorState,
    view: &dyn ChainAccess,
    checkpoints: &Checkpoints,
    block_height: u32,
    now: u64,
) -> Result<u64, TransactionValidationError> {
    let fee = validate_semantic(transaction.transaction())?;

    let tx = transaction.transaction();
    for (input_index, input) in tx.inputs.iter().enumerate() {
        match input {
            TransactionInput::Key(input) => {
                if !state.spent_key_images.insert(input.key_image) {
                    return Err(TransactionValidationError::InputKeyImageAlreadySpent);
                }

                if !checkpoints.is_in_checkpoint_zone(block_height + 1) {
                    if view.is_key_image_spent(&input.key_image, block_height) {
                        return Err(TransactionValidationError::InputKeyImageAlreadySpent);
                    }

                    let global_indexes = absolute_output_offsets(&input.output_offsets);
                    let output_keys = extract_key_output_keys(
                        view,
                        input.amount,
                        block_height,
                        &global_indexes,
                        now,
                    )
                    .map_err(|failure| match failure {
                        ExtractOutputsResult::OutputLocked => {
                            TransactionValidationError::InputSpendLockedOut
                        }
                        _ => TransactionValidationError::InputInvalidGlobalIndex,
                    })?;

                    if !check_ring_signature(
                        &transaction.prefix_hash(),
                        &input.key_image,
                        &output_keys,
                        &tx.signatures[input_index],
                    ) {
                        return Err(TransactionValidationError::InputInvalidSignatures);
                    }
                }
            }
            TransactionInput::Multisignature(input) => {
                if !state
                    .spent_multisignature_outputs
                    .insert((input.amount, input.output_index))
                {
                    return Err(TransactionValidationError::InputMultisignatureAlreadySpent);
                }

                let (output, unlock_time) = view
                    .multisignature_output(input.amount, input.output_index, block_height)
                    .ok_or(TransactionValidationError::InputInvalidGlobalIndex)?;

                if view.is_multisignature_spent(input.amount, input.output_index, block_height)
                {
                    return Err(TransactionValidationError::InputMultisignatureAlreadySpent);
                }

                if !view.is_spend_time_unlocked(unlock_time, block_height, now) {
                    return Err(TransactionValidationError::InputSpendLockedOut);
                }

                if output.required_signatures != input.signature_count {
                    return Err(TransactionValidationError::InputWrongSignaturesCount);
                }

                // greedy in-order matching: walk output keys forward, each
                // signature must verify against some not-yet-passed key
                let signatures = &tx.signatures[input_index];
                let mut signature_index = 0;
                let mut key_index = 0;
                while signature_index < input.signature_count as usize {
                    if key_index == output.keys.len() {
                        return Err(TransactionValidationError::InputInvalidSignatures);
                    }

                    let signature = signatures
                        .get(signature_index)
                        .ok_or(TransactionValidationError::InputInvalidSignatures)?;
                    if check_signature(
                        &transaction.prefix_hash(),
                        &output.keys[key_index],
                        signature,
                    ) {
                        signature_index += 1;
                    }
                    key_index += 1;
                }
            }
            TransactionInput::Coinbase { .. } => {
                return Err(TransactionValidationError::InputUnexpectedType);
            }
        }
    }

    Ok(fee)
}

/// Block-level checks 1-8: version, parent block, timestamps, coinbase
/// shape and outputs, cumulative size. Returns the declared miner reward
/// (the coinbase output sum); the reward equation itself is checked by the
/// caller once fees are known.
pub fn validate_block(
    block: &CachedBlock,
    view: &dyn ChainAccess,
    previous_height: u32,
    cumulative_block_size: usize,
    currency: &Currency,
    upgrades: &UpgradeManager,
    now: u64,
) -> Result<u64, AddBlockError> {
    let template = block.block();
    let height = previous_height + 1;

    // 1: the upgrade schedule dictates the major version
    if upgrades.block_major_version_at(height) != template.major_version {
        return Err(BlockValidationError::WrongVersion.into());
    }

    // 2: merge-mining stub constraints for versioned blocks
    if template.major_version >= BLOCK_MAJOR_VERSION_2 {
        let parent_version = template
            .parent_block
            .as_ref()
            .map(|parent| parent.major_version)
            .unwrap_or(u8::max_value());
        if template.major_version == BLOCK_MAJOR_VERSION_2 && parent_version > 1 {
            warn!(
                target: "verification",
                "parent block of {} has wrong major version {}",
                block.hash(),
                parent_version
            );
            return Err(BlockValidationError::ParentBlockWrongVersion.into());
        }

        if block.parent_block_binary_size() > MAX_PARENT_BLOCK_SIZE {
            return Err(BlockValidationError::ParentBlockSizeTooBig.into());
        }
    }

    // 3: timestamp upper bound against the local clock
    if template.timestamp > now + currency.block_future_time_limit() {
        return Err(BlockValidationError::TimestampTooFarInFuture.into());
    }

    // 4: timestamp lower bound against the recent median
    let timestamps =
        view.last_timestamps(currency.timestamp_check_window(), previous_height, true);
    if timestamps.len() >= currency.timestamp_check_window()
        && template.timestamp < median_value(&timestamps)
    {
        return Err(BlockValidationError::TimestampTooFarInPast.into());
    }

    // 5: exactly one coinbase input carrying this block's height
    if template.base_transaction.inputs.len() != 1 {
        return Err(TransactionValidationError::InputWrongCount.into());
    }
    match template.base_transaction.inputs[0] {
        TransactionInput::Coinbase {
            height: coinbase_height,
        } => {
            if coinbase_height != height {
                return Err(TransactionValidationError::BaseInputWrongBlockIndex.into());
            }
        }
        _ => return Err(TransactionValidationError::InputUnexpectedType.into()),
    }

    // 6: mined money unlocks after the fixed window
    if template.base_transaction.unlock_time
        != u64::from(height) + u64::from(currency.mined_money_unlock_window())
    {
        return Err(TransactionValidationError::WrongTransactionUnlockTime.into());
    }

    // 7: coinbase outputs are well-formed and sum without overflow
    let mut miner_reward: u64 = 0;
    for output in &template.base_transaction.outputs {
        if output.amount == 0 {
            return Err(TransactionValidationError::OutputZeroAmount.into());
        }
        match &output.target {
            TransactionOutputTarget::Key(target) => {
                if !check_key(&target.key) {
                    return Err(TransactionValidationError::OutputInvalidKey.into());
                }
            }
            TransactionOutputTarget::Multisignature(target) => {
                if target.required_signatures as usize > target.keys.len() {
                    return Err(
                        TransactionValidationError::OutputInvalidRequiredSignaturesCount.into(),
                    );
                }
                for key in &target.keys {
                    if !check_key(key) {
                        return Err(TransactionValidationError::OutputInvalidKey.into());
                    }
                }
            }
        }
        miner_reward = miner_reward
            .checked_add(output.amount)
            .ok_or(TransactionValidationError::OutputsAmountOverflow)?;
    }

    // 8: cumulative size cap for this height
    if cumulative_block_size > currency.max_block_cumulative_size(height) {
        return Err(BlockValidationError::CumulativeBlockSizeTooBig.into());
    }

    Ok(miner_reward)
}

#[cfg(test)]
mod tests {
    use super::{validate_semantic, validate_transaction};
    use crate::checkpoints::Checkpoints;
    use crate::error::TransactionValidationError;
    use chain::{
        KeyInput, KeyOutput, MultisignatureInput, Transaction, TransactionInput,
        TransactionOutput, TransactionOutputTarget,
    };
    use crypto::{generate_keys, KeyImage, PublicKey};

    fn key_output(amount: u64) -> TransactionOutput {
        let (_, key) = generate_keys(b"semantic-out");
        TransactionOutput {
            amount,
            target: TransactionOutputTarget::Key(KeyOutput { key }),
        }
    }

    fn key_input(amount: u64, image: KeyImage) -> TransactionInput {
        TransactionInput::Key(KeyInput {
            amount,
            output_offsets: vec![0],
            key_image: image,
        })
    }

    fn base_tx() -> Transaction {
        Transaction {
            inputs: vec![key_input(100, KeyImage([1; 32]))],
            outputs: vec![key_output(90)],
            signatures: vec![vec![Default::default()]],
            ..Default::default()
        }
    }

    #[test]
    fn semantic_accepts_and_returns_fee() {
        assert_eq!(validate_semantic(&base_tx()), Ok(10));
    }

    #[test]
    fn semantic_rejects_empty_inputs() {
        let tx = Transaction {
            inputs: vec![],
            signatures: vec![],
            ..base_tx()
        };
        assert_eq!(
            validate_semantic(&tx),
            Err(TransactionValidationError::EmptyInputs)
        );
    }

    #[test]
    fn semantic_rejects_zero_output() {
        let mut tx = base_tx();
        tx.outputs[0].amount = 0;
        assert_eq!(
            validate_semantic(&tx),
            Err(TransactionValidationError::OutputZeroAmount)
        );
    }

    #[test]
    fn semantic_rejects_invalid_output_key() {
        let mut tx = base_tx();
        tx.outputs[0].target = TransactionOutputTarget::Key(KeyOutput {
            key: PublicKey([0xff; 32]),
        });
        assert!(matches!(
            validate_semantic(&tx),
            Err(TransactionValidationError::OutputInvalidKey)
        ));
    }

    #[test]
    fn semantic_rejects_identical_key_images() {
        let mut tx = base_tx();
        tx.inputs.push(key_input(50, KeyImage([1; 32])));
        tx.signatures.push(vec![Default::default()]);
        assert_eq!(
            validate_semantic(&tx),
            Err(TransactionValidationError::InputIdenticalKeyImages)
        );
    }

    #[test]
    fn semantic_rejects_zero_offsets_after_first() {
        let mut tx = base_tx();
        tx.inputs[0] = TransactionInput::Key(KeyInput {
            amount: 100,
            output_offsets: vec![3, 0],
            key_image: KeyImage([1; 32]),
        });
        assert_eq!(
            validate_semantic(&tx),
            Err(TransactionValidationError::InputIdenticalOutputIndexes)
        );
    }

    #[test]
    fn semantic_rejects_empty_output_usage() {
        let mut tx = base_tx();
        tx.inputs[0] = TransactionInput::Key(KeyInput {
            amount: 100,
            output_offsets: vec![],
            key_image: KeyImage([1; 32]),
        });
        assert_eq!(
            validate_semantic(&tx),
            Err(TransactionValidationError::InputEmptyOutputUsage)
        );
    }

    #[test]
    fn semantic_rejects_outputs_above_inputs() {
        let mut tx = base_tx();
        tx.outputs[0].amount = 200;
        assert_eq!(
            validate_semantic(&tx),
            Err(TransactionValidationError::WrongAmount)
        );
    }

    #[test]
    fn semantic_rejects_duplicate_multisignature_usage() {
        let mut tx = base_tx();
        let usage = MultisignatureInput {
            amount: 10,
            output_index: 4,
            signature_count: 1,
        };
        tx.inputs = vec![
            TransactionInput::Multisignature(usage.clone()),
            TransactionInput::Multisignature(usage),
        ];
        tx.signatures = vec![vec![Default::default()], vec![Default::default()]];
        assert_eq!(
            validate_semantic(&tx),
            Err(TransactionValidationError::InputIdenticalOutputIndexes)
        );
    }

    #[test]
    fn semantic_rejects_overflowing_sums() {
        let mut tx = base_tx();
        tx.inputs = vec![
            key_input(u64::max_value(), KeyImage([1; 32])),
            key_input(1, KeyImage([2; 32])),
        ];
        tx.signatures = vec![vec![Default::default()], vec![Default::default()]];
        assert_eq!(
            validate_semantic(&tx),
            Err(TransactionValidationError::InputsAmountOverflow)
        );
    }

    #[test]
    fn semantic_rejects_coinbase_input_in_transfer() {
        let mut tx = base_tx();
        tx.inputs = vec![TransactionInput::Coinbase { height: 5 }];
        tx.signatures = vec![vec![]];
        assert_eq!(
            validate_semantic(&tx),
            Err(TransactionValidationError::InputUnexpectedType)
        );
    }

    // contextual duplicate detection works even without a chain behind it:
    // the working state catches intra-group double spends
    #[test]
    fn contextual_duplicate_in_working_state() {
        use network::CurrencyBuilder;
        use storage::ValidatorState;

        let currency = CurrencyBuilder::new().build();
        let mut checkpoints = Checkpoints::new();
        // checkpoint far above the test horizon skips ring resolution
        checkpoints.add_checkpoint_hash(1_000_000, Default::default());

        let tree = umbra_db::SegmentTree::new(umbra_db::Segment::InMemory(
            umbra_db::SegmentCache::new(0, None),
        ));
        // height 0 only exists once a genesis is pushed; a bare root is
        // enough here because the checkpoint zone skips chain resolution
        let view = tree.view(tree.canonical_leaf(), &currency);

        let mut state = ValidatorState::default();
        let tx: chain::CachedTransaction = base_tx().into();
        assert!(validate_transaction(&tx, &mut state, &view, &checkpoints, 5, 1000).is_ok());

        let mut second = base_tx();
        second.outputs[0].amount = 80;
        let second: chain::CachedTransaction = second.into();
        assert_eq!(
            validate_transaction(&second, &mut state, &view, &checkpoints, 5, 1000),
            Err(TransactionValidationError::InputKeyImageAlreadySpent)
        );
    }
}
