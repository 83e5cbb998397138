use crate::varint;
use byteorder::{LittleEndian, WriteBytesExt};
use primitives::{Bytes, H256};

pub fn serialize<T>(t: &T) -> Bytes
where
    T: Serializable,
{
    let mut stream = Stream::new();
    stream.append(t);
    stream.out()
}

pub fn serialized_size<T>(t: &T) -> usize
where
    T: Serializable,
{
    serialize(t).len()
}

pub trait Serializable {
    fn serialize(&self, stream: &mut Stream);
}

/// Output binary stream.
#[derive(Default)]
pub struct Stream {
    buffer: Vec<u8>,
}

impl Stream {
    pub fn new() -> Self {
        Stream::default()
    }

    pub fn append<T>(&mut self, t: &T) -> &mut Self
    where
        T: Serializable,
    {
        t.serialize(self);
        self
    }

    pub fn append_varint(&mut self, value: u64) -> &mut Self {
        varint::write(value, &mut self.buffer);
        self
    }

    pub fn append_slice(&mut self, bytes: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(bytes);
        self
    }

    pub fn append_list<T>(&mut self, list: &[T]) -> &mut Self
    where
        T: Serializable,
    {
        self.append_varint(list.len() as u64);
        for item in list {
            item.serialize(self);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn out(self) -> Bytes {
        self.buffer.into()
    }
}

impl Serializable for u8 {
    fn serialize(&self, stream: &mut Stream) {
        stream.buffer.push(*self);
    }
}

impl Serializable for u16 {
    fn serialize(&self, stream: &mut Stream) {
        stream.append_varint(u64::from(*self));
    }
}

impl Serializable for u32 {
    fn serialize(&self, stream: &mut Stream) {
        stream.append_varint(u64::from(*self));
    }
}

impl Serializable for u64 {
    fn serialize(&self, stream: &mut Stream) {
        stream.append_varint(*self);
    }
}

impl Serializable for bool {
    fn serialize(&self, stream: &mut Stream) {
        stream.buffer.push(*self as u8);
    }
}

impl Serializable for H256 {
    fn serialize(&self, stream: &mut Stream) {
        stream.append_slice(self.as_bytes());
    }
}

impl Serializable for Bytes {
    fn serialize(&self, stream: &mut Stream) {
        stream.append_varint(self.len() as u64);
        stream.append_slice(self);
    }
}

impl<T> Serializable for Vec<T>
where
    T: Serializable,
{
    fn serialize(&self, stream: &mut Stream) {
        stream.append_list(self);
    }
}

/// Fixed-width little-endian append, for on-disk index records that are not
/// part of the consensus encoding.
impl Stream {
    pub fn append_u64_le(&mut self, value: u64) -> &mut Self {
        self.buffer
            .write_u64::<LittleEndian>(value)
            .expect("writing to in-memory buffer never fails; qed");
        self
    }
}
