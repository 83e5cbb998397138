use crate::chain_builder::ChainBuilder;
use chain::{
    append_extra_field, extra_nonce_with_payment_id, ExtraField, KeyInput, KeyOutput, Transaction,
    TransactionInput, TransactionOutput, TransactionOutputTarget,
};
use crypto::{
    derive_output_key_pair, generate_keys, generate_ring_signature, key_image, PublicKey,
    SecretKey,
};
use primitives::{Bytes, H256};

struct PlannedInput {
    amount: u64,
    global_index: u32,
    output_public: PublicKey,
    output_secret: SecretKey,
}

/// Builds transactions that really validate: key images and ring signatures
/// are produced from the spent outputs' derived secrets. Spending the same
/// output through two builders naturally yields the same key image, which is
/// how double-spend rejections are exercised.
pub struct TransactionBuilder {
    inputs: Vec<PlannedInput>,
    outputs: Vec<TransactionOutput>,
    unlock_time: u64,
    payment_id: Option<H256>,
}

impl TransactionBuilder {
    pub fn new() -> TransactionBuilder {
        TransactionBuilder {
            inputs: Vec::new(),
            outputs: Vec::new(),
            unlock_time: 0,
            payment_id: None,
        }
    }

    /// Spends the largest denomination of the coinbase of `block`. The
    /// leading chunk is stable across blocks, unlike the dust piece at
    /// output 0.
    pub fn spend_coinbase_largest(
        self,
        chain: &ChainBuilder,
        tip: usize,
        block: usize,
    ) -> TransactionBuilder {
        let outputs = chain
            .block(block)
            .cached
            .block()
            .base_transaction
            .outputs
            .len();
        assert!(outputs > 0);
        self.spend_coinbase(chain, tip, block, outputs - 1)
    }

    /// Spends output `output_index` of the coinbase of `block`, resolving
    /// its global index on the chain ending at `tip`.
    pub fn spend_coinbase(
        mut self,
        chain: &ChainBuilder,
        tip: usize,
        block: usize,
        output_index: usize,
    ) -> TransactionBuilder {
        let built = chain.block(block);
        let amount = chain.output_amount(block, 0, output_index);
        let global_index = chain.global_index_of(tip, block, 0, output_index);

        let (output_secret, output_public) = derive_output_key_pair(
            &crate::miner_address().spend_public_key,
            u64::from(built.height),
            output_index as u64,
        );

        self.inputs.push(PlannedInput {
            amount,
            global_index,
            output_public,
            output_secret,
        });
        self
    }

    pub fn output(mut self, amount: u64, seed: &[u8]) -> TransactionBuilder {
        let (_, key) = generate_keys(seed);
        self.outputs.push(TransactionOutput {
            amount,
            target: TransactionOutputTarget::Key(KeyOutput { key }),
        });
        self
    }

    /// Sends the inputs' total minus `fee` to one fresh output.
    pub fn output_rest(self, fee: u64, seed: &[u8]) -> TransactionBuilder {
        let total: u64 = self.inputs.iter().map(|input| input.amount).sum();
        assert!(total > fee, "the change output may not be zero");
        self.output(total - fee, seed)
    }

    pub fn unlock_time(mut self, unlock_time: u64) -> TransactionBuilder {
        self.unlock_time = unlock_time;
        self
    }

    pub fn payment_id(mut self, payment_id: H256) -> TransactionBuilder {
        self.payment_id = Some(payment_id);
        self
    }

    pub fn build(self) -> Transaction {
        let mut extra = Bytes::new();
        if let Some(payment_id) = self.payment_id {
            append_extra_field(
                &mut extra,
                &ExtraField::Nonce(extra_nonce_with_payment_id(&payment_id)),
            );
        }

        let mut transaction = Transaction {
            version: 1,
            unlock_time: self.unlock_time,
            inputs: self
                .inputs
                .iter()
                .map(|input| {
                    TransactionInput::Key(KeyInput {
                        amount: input.amount,
                        output_offsets: vec![input.global_index],
                        key_image: key_image(&input.output_secret, &input.output_public),
                    })
                })
                .collect(),
            outputs: self.outputs,
            extra,
            signatures: Vec::new(),
        };

        let prefix_hash = chain::CachedTransaction::new(transaction.clone()).prefix_hash();
        transaction.signatures = self
            .inputs
            .iter()
            .map(|input| {
                let image = key_image(&input.output_secret, &input.output_public);
                generate_ring_signature(
                    &prefix_hash,
                    &image,
                    &[input.output_public],
                    &input.output_secret,
                    0,
                )
            })
            .collect();

        transaction
    }
}
