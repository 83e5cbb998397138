use crate::transaction::Transaction;
use crypto::fast_hash;
use once_cell::sync::OnceCell;
use primitives::{Bytes, H256};
use ser::{deserialize, serialize, Error as SerError, Stream};

/// A transaction with lazily memoized derivatives: binary encoding,
/// transaction hash, prefix hash (all fields except signatures) and fee.
#[derive(Debug, Clone)]
pub struct CachedTransaction {
    transaction: Transaction,
    binary: OnceCell<Bytes>,
    hash: OnceCell<H256>,
    prefix_hash: OnceCell<H256>,
    fee: OnceCell<u64>,
}

impl CachedTransaction {
    pub fn new(transaction: Transaction) -> Self {
        CachedTransaction {
            transaction,
            binary: OnceCell::new(),
            hash: OnceCell::new(),
            prefix_hash: OnceCell::new(),
            fee: OnceCell::new(),
        }
    }

    pub fn from_binary(binary: &[u8]) -> Result<Self, SerError> {
        let transaction = deserialize::<Transaction>(binary)?;
        let cached = CachedTransaction::new(transaction);
        let _ = cached.binary.set(binary.into());
        Ok(cached)
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn into_transaction(self) -> Transaction {
        self.transaction
    }

    pub fn binary(&self) -> &Bytes {
        self.binary.get_or_init(|| serialize(&self.transaction))
    }

    pub fn size(&self) -> usize {
        self.binary().len()
    }

    pub fn hash(&self) -> H256 {
        *self.hash.get_or_init(|| fast_hash(self.binary()))
    }

    pub fn prefix_hash(&self) -> H256 {
        *self.prefix_hash.get_or_init(|| {
            let mut stream = Stream::new();
            self.transaction.serialize_prefix(&mut stream);
            fast_hash(&stream.out())
        })
    }

    /// Inputs minus outputs; zero for the coinbase.
    pub fn fee(&self) -> u64 {
        *self.fee.get_or_init(|| {
            let inputs = self.transaction.input_amount();
            let outputs = self.transaction.output_amount();
            inputs.saturating_sub(outputs)
        })
    }
}

impl From<Transaction> for CachedTransaction {
    fn from(transaction: Transaction) -> Self {
        CachedTransaction::new(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::CachedTransaction;
    use crate::transaction::{
        KeyInput, KeyOutput, Transaction, TransactionInput, TransactionOutput,
        TransactionOutputTarget,
    };
    use crypto::generate_keys;

    fn transfer(amount_in: u64, amount_out: u64) -> Transaction {
        let (_, key) = generate_keys(b"dest");
        Transaction {
            inputs: vec![TransactionInput::Key(KeyInput {
                amount: amount_in,
                output_offsets: vec![0],
                key_image: Default::default(),
            })],
            outputs: vec![TransactionOutput {
                amount: amount_out,
                target: TransactionOutputTarget::Key(KeyOutput { key }),
            }],
            signatures: vec![vec![Default::default()]],
            ..Default::default()
        }
    }

    #[test]
    fn fee_is_input_minus_output() {
        let cached = CachedTransaction::new(transfer(100, 80));
        assert_eq!(cached.fee(), 20);
    }

    #[test]
    fn prefix_hash_ignores_signatures() {
        let mut tx = transfer(100, 80);
        let a = CachedTransaction::new(tx.clone());
        let (secret, public) = generate_keys(b"signer");
        tx.signatures = vec![vec![crypto::generate_signature(
            &a.prefix_hash(),
            &public,
            &secret,
        )]];
        let b = CachedTransaction::new(tx);

        assert_eq!(a.prefix_hash(), b.prefix_hash());
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn binary_round_trip() {
        let cached = CachedTransaction::new(transfer(5, 5));
        let restored = CachedTransaction::from_binary(cached.binary()).unwrap();
        assert_eq!(restored.hash(), cached.hash());
        assert_eq!(restored.transaction(), cached.transaction());
    }
}
