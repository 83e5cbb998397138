use crate::constants::{
    INPUT_TAG_COINBASE, INPUT_TAG_KEY, INPUT_TAG_MULTISIGNATURE, OUTPUT_TAG_KEY,
    OUTPUT_TAG_MULTISIGNATURE,
};
use crypto::{KeyImage, PublicKey, Signature};
use primitives::Bytes;
use ser::{Deserializable, Error as SerError, Reader, Serializable, Stream};

#[derive(Debug, Clone, PartialEq)]
pub struct KeyInput {
    pub amount: u64,
    /// Global output indexes, delta-encoded: the first is absolute, the rest
    /// are non-zero offsets from the previous one.
    pub output_offsets: Vec<u32>,
    pub key_image: KeyImage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultisignatureInput {
    pub amount: u64,
    pub output_index: u32,
    pub signature_count: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransactionInput {
    Coinbase { height: u32 },
    Key(KeyInput),
    Multisignature(MultisignatureInput),
}

impl TransactionInput {
    /// Number of signatures the wire format carries for this input.
    pub fn signature_count(&self) -> usize {
        match self {
            TransactionInput::Coinbase { .. } => 0,
            TransactionInput::Key(input) => input.output_offsets.len(),
            TransactionInput::Multisignature(input) => input.signature_count as usize,
        }
    }

    pub fn amount(&self) -> u64 {
        match self {
            TransactionInput::Coinbase { .. } => 0,
            TransactionInput::Key(input) => input.amount,
            TransactionInput::Multisignature(input) => input.amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyOutput {
    pub key: PublicKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultisignatureOutput {
    pub required_signatures: u8,
    pub keys: Vec<PublicKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransactionOutputTarget {
    Key(KeyOutput),
    Multisignature(MultisignatureOutput),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionOutput {
    pub amount: u64,
    pub target: TransactionOutputTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub version: u8,
    pub unlock_time: u64,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub extra: Bytes,
    /// One signature group per input, parallel to `inputs`.
    pub signatures: Vec<Vec<Signature>>,
}

impl Default for Transaction {
    fn default() -> Self {
        Transaction {
            version: 1,
            unlock_time: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
            extra: Bytes::new(),
            signatures: Vec::new(),
        }
    }
}

impl Transaction {
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && matches!(self.inputs[0], TransactionInput::Coinbase { .. })
    }

    pub fn output_amount(&self) -> u64 {
        self.outputs.iter().map(|output| output.amount).sum()
    }

    pub fn input_amount(&self) -> u64 {
        self.inputs.iter().map(|input| input.amount()).sum()
    }

    /// Serializes the prefix only (everything except signatures).
    pub fn serialize_prefix(&self, stream: &mut Stream) {
        stream.append(&self.version);
        stream.append(&self.unlock_time);
        stream.append_list(&self.inputs);
        stream.append_list(&self.outputs);
        stream.append(&self.extra);
    }
}

/// Expands delta-encoded output offsets to absolute global indexes.
pub fn absolute_output_offsets(offsets: &[u32]) -> Vec<u32> {
    let mut absolute = Vec::with_capacity(offsets.len());
    let mut current = 0u32;
    for (i, offset) in offsets.iter().enumerate() {
        current = if i == 0 {
            *offset
        } else {
            current.wrapping_add(*offset)
        };
        absolute.push(current);
    }
    absolute
}

/// Compresses absolute global indexes back to delta encoding.
pub fn relative_output_offsets(absolute: &[u32]) -> Vec<u32> {
    let mut offsets = Vec::with_capacity(absolute.len());
    for (i, index) in absolute.iter().enumerate() {
        offsets.push(if i == 0 {
            *index
        } else {
            index - absolute[i - 1]
        });
    }
    offsets
}

impl Serializable for TransactionInput {
    fn serialize(&self, stream: &mut Stream) {
        match self {
            TransactionInput::Coinbase { height } => {
                stream.append(&INPUT_TAG_COINBASE);
                stream.append(height);
            }
            TransactionInput::Key(input) => {
                stream.append(&INPUT_TAG_KEY);
                stream.append(&input.amount);
                stream.append_list(&input.output_offsets);
                stream.append(&input.key_image);
            }
            TransactionInput::Multisignature(input) => {
                stream.append(&INPUT_TAG_MULTISIGNATURE);
                stream.append(&input.amount);
                stream.append(&input.output_index);
                stream.append(&input.signature_count);
            }
        }
    }
}

impl Deserializable for TransactionInput {
    fn deserialize(reader: &mut Reader) -> Result<Self, SerError> {
        match reader.read::<u8>()? {
            INPUT_TAG_COINBASE => Ok(TransactionInput::Coinbase {
                height: reader.read()?,
            }),
            INPUT_TAG_KEY => Ok(TransactionInput::Key(KeyInput {
                amount: reader.read()?,
                output_offsets: reader.read_list()?,
                key_image: reader.read()?,
            })),
            INPUT_TAG_MULTISIGNATURE => Ok(TransactionInput::Multisignature(MultisignatureInput {
                amount: reader.read()?,
                output_index: reader.read()?,
                signature_count: reader.read()?,
            })),
            _ => Err(SerError::InvalidValue),
        }
    }
}

impl Serializable for TransactionOutput {
    fn serialize(&self, stream: &mut Stream) {
        stream.append(&self.amount);
        match &self.target {
            TransactionOutputTarget::Key(output) => {
                stream.append(&OUTPUT_TAG_KEY);
                stream.append(&output.key);
            }
            TransactionOutputTarget::Multisignature(output) => {
                stream.append(&OUTPUT_TAG_MULTISIGNATURE);
                stream.append(&output.required_signatures);
                stream.append_list(&output.keys);
            }
        }
    }
}

impl Deserializable for TransactionOutput {
    fn deserialize(reader: &mut Reader) -> Result<Self, SerError> {
        let amount = reader.read()?;
        let target = match reader.read::<u8>()? {
            OUTPUT_TAG_KEY => TransactionOutputTarget::Key(KeyOutput {
                key: reader.read()?,
            }),
            OUTPUT_TAG_MULTISIGNATURE => {
                TransactionOutputTarget::Multisignature(MultisignatureOutput {
                    required_signatures: reader.read()?,
                    keys: reader.read_list()?,
                })
            }
            _ => return Err(SerError::InvalidValue),
        };

        Ok(TransactionOutput { amount, target })
    }
}

impl Serializable for Transaction {
    fn serialize(&self, stream: &mut Stream) {
        self.serialize_prefix(stream);
        // signature counts are implied by the inputs, no redundant prefix
        for group in &self.signatures {
            for signature in group {
                stream.append(signature);
            }
        }
    }
}

impl Deserializable for Transaction {
    fn deserialize(reader: &mut Reader) -> Result<Self, SerError> {
        let version = reader.read()?;
        let unlock_time = reader.read()?;
        let inputs: Vec<TransactionInput> = reader.read_list()?;
        let outputs = reader.read_list()?;
        let extra = reader.read()?;

        let mut signatures = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let mut group = Vec::with_capacity(input.signature_count());
            for _ in 0..input.signature_count() {
                group.push(reader.read()?);
            }
            signatures.push(group);
        }

        Ok(Transaction {
            version,
            unlock_time,
            inputs,
            outputs,
            extra,
            signatures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto::generate_keys;
    use ser::{deserialize, serialize};

    fn sample_transaction() -> Transaction {
        let (_, key) = generate_keys(b"out");
        Transaction {
            version: 1,
            unlock_time: 11,
            inputs: vec![
                TransactionInput::Key(KeyInput {
                    amount: 70_000,
                    output_offsets: vec![4, 1, 2],
                    key_image: Default::default(),
                }),
                TransactionInput::Multisignature(MultisignatureInput {
                    amount: 30_000,
                    output_index: 2,
                    signature_count: 2,
                }),
            ],
            outputs: vec![TransactionOutput {
                amount: 90_000,
                target: TransactionOutputTarget::Key(KeyOutput { key }),
            }],
            extra: vec![0u8; 4].into(),
            signatures: vec![vec![Default::default(); 3], vec![Default::default(); 2]],
        }
    }

    #[test]
    fn transaction_round_trip() {
        let tx = sample_transaction();
        let bytes = serialize(&tx);
        assert_eq!(deserialize::<Transaction>(&bytes).unwrap(), tx);
    }

    #[test]
    fn coinbase_round_trip() {
        let tx = Transaction {
            inputs: vec![TransactionInput::Coinbase { height: 42 }],
            signatures: vec![vec![]],
            ..Default::default()
        };
        let bytes = serialize(&tx);
        assert_eq!(deserialize::<Transaction>(&bytes).unwrap(), tx);
    }

    #[test]
    fn offset_round_trip() {
        let absolute = vec![4, 5, 7, 100];
        let relative = relative_output_offsets(&absolute);
        assert_eq!(relative, vec![4, 1, 2, 93]);
        assert_eq!(absolute_output_offsets(&relative), absolute);
    }

    #[test]
    fn unknown_input_tag_rejected() {
        let bytes = [0x77u8];
        assert!(deserialize::<TransactionInput>(&bytes).is_err());
    }
}
