use crate::varint;
use byteorder::{ByteOrder, LittleEndian};
use primitives::{Bytes, H256};
use std::fmt;

/// Deserializes `T` from `data`, requiring the whole input to be consumed.
/// Trailing bytes would allow two distinct blobs to decode to the same
/// object, breaking hash canonicity.
pub fn deserialize<T>(data: &[u8]) -> Result<T, Error>
where
    T: Deserializable,
{
    let mut reader = Reader::new(data);
    let result = reader.read()?;
    if !reader.is_finished() {
        return Err(Error::TrailingBytes);
    }

    Ok(result)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    UnexpectedEnd,
    NonCanonicalVarint,
    VarintOverflow,
    TrailingBytes,
    /// Value is syntactically valid but out of the type's domain.
    InvalidValue,
    /// Collection length prefix exceeds the remaining input.
    OversizedLength,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnexpectedEnd => write!(f, "unexpected end of input"),
            Error::NonCanonicalVarint => write!(f, "non-canonical varint encoding"),
            Error::VarintOverflow => write!(f, "varint does not fit 64 bits"),
            Error::TrailingBytes => write!(f, "input has trailing bytes"),
            Error::InvalidValue => write!(f, "value out of domain"),
            Error::OversizedLength => write!(f, "length prefix exceeds input"),
        }
    }
}

impl std::error::Error for Error {}

pub trait Deserializable: Sized {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error>;
}

/// Input binary stream.
pub struct Reader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, position: 0 }
    }

    pub fn read<T>(&mut self) -> Result<T, Error>
    where
        T: Deserializable,
    {
        T::deserialize(self)
    }

    pub fn read_varint(&mut self) -> Result<u64, Error> {
        let (value, consumed) = varint::read(&self.data[self.position..])?;
        self.position += consumed;
        Ok(value)
    }

    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < len {
            return Err(Error::UnexpectedEnd);
        }
        let slice = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    pub fn read_list<T>(&mut self) -> Result<Vec<T>, Error>
    where
        T: Deserializable,
    {
        let len = self.read_varint()? as usize;
        // every element takes at least one byte
        if len > self.remaining() {
            return Err(Error::OversizedLength);
        }
        let mut result = Vec::with_capacity(len);
        for _ in 0..len {
            result.push(self.read()?);
        }
        Ok(result)
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_finished(&self) -> bool {
        self.position == self.data.len()
    }
}

impl Deserializable for u8 {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        Ok(reader.read_slice(1)?[0])
    }
}

impl Deserializable for u16 {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        let value = reader.read_varint()?;
        if value > u64::from(u16::max_value()) {
            return Err(Error::InvalidValue);
        }
        Ok(value as u16)
    }
}

impl Deserializable for u32 {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        let value = reader.read_varint()?;
        if value > u64::from(u32::max_value()) {
            return Err(Error::InvalidValue);
        }
        Ok(value as u32)
    }
}

impl Deserializable for u64 {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        reader.read_varint()
    }
}

impl Deserializable for bool {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        match reader.read_slice(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(Error::InvalidValue),
        }
    }
}

impl Deserializable for H256 {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        Ok(H256::from_slice(reader.read_slice(32)?))
    }
}

impl Deserializable for Bytes {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        let len = reader.read_varint()? as usize;
        if len > reader.remaining() {
            return Err(Error::OversizedLength);
        }
        Ok(reader.read_slice(len)?.into())
    }
}

impl<T> Deserializable for Vec<T>
where
    T: Deserializable,
{
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        reader.read_list()
    }
}

impl<'a> Reader<'a> {
    pub fn read_u64_le(&mut self) -> Result<u64, Error> {
        let slice = self.read_slice(8)?;
        Ok(LittleEndian::read_u64(slice))
    }
}

#[cfg(test)]
mod tests {
    use super::{deserialize, Error};
    use crate::stream::serialize;
    use primitives::{Bytes, H256};

    #[test]
    fn integers_round_trip() {
        for value in &[0u64, 1, 127, 128, 1 << 40, u64::max_value()] {
            let bytes = serialize(value);
            assert_eq!(deserialize::<u64>(&bytes).unwrap(), *value);
        }
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes: Vec<u8> = serialize(&5u64).into();
        bytes.push(0);
        assert_eq!(deserialize::<u64>(&bytes), Err(Error::TrailingBytes));
    }

    #[test]
    fn vectors_round_trip() {
        let hashes = vec![H256::from(1u8), H256::from(2u8)];
        let bytes = serialize(&hashes);
        assert_eq!(deserialize::<Vec<H256>>(&bytes).unwrap(), hashes);
    }

    #[test]
    fn oversized_length_rejected() {
        // claims 200 elements but provides none
        let bytes = serialize(&200u64);
        assert_eq!(deserialize::<Vec<u8>>(&bytes), Err(Error::OversizedLength));
    }

    #[test]
    fn blob_round_trip() {
        let blob = Bytes::from(vec![1, 2, 3, 4]);
        let bytes = serialize(&blob);
        assert_eq!(deserialize::<Bytes>(&bytes).unwrap(), blob);
    }
}
