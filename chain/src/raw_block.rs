use primitives::Bytes;
use ser::{Deserializable, Error as SerError, Reader, Serializable, Stream};

/// The persisted unit: an opaque block-template blob plus the ordered blobs
/// of the included non-coinbase transactions.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RawBlock {
    pub block: Bytes,
    pub transactions: Vec<Bytes>,
}

impl Serializable for RawBlock {
    fn serialize(&self, stream: &mut Stream) {
        stream.append(&self.block);
        stream.append_list(&self.transactions);
    }
}

impl Deserializable for RawBlock {
    fn deserialize(reader: &mut Reader) -> Result<Self, SerError> {
        Ok(RawBlock {
            block: reader.read()?,
            transactions: reader.read_list()?,
        })
    }
}
