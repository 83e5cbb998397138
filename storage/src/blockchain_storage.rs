//! Persistent append-only sequence of raw blocks keyed by height.
//!
//! Two backends share one contract: a plain in-memory vector (used for the
//! carved-off tails of chain splits and in tests) and a swapped store that
//! keeps an index of `(offset, length)` pairs in a file-mapped vector next
//! to an append-only blob file.

use crate::error::Error;
use crate::file_mapped_vector::{FileMappedVector, FixedRecord, OpenMode};
use chain::RawBlock;
use ser::{deserialize, serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRecord {
    pub offset: u64,
    pub length: u64,
}

impl FixedRecord for IndexRecord {
    const SIZE: usize = 16;

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.length.to_le_bytes());
    }

    fn read_from(bytes: &[u8]) -> IndexRecord {
        let mut offset = [0u8; 8];
        let mut length = [0u8; 8];
        offset.copy_from_slice(&bytes[..8]);
        length.copy_from_slice(&bytes[8..16]);
        IndexRecord {
            offset: u64::from_le_bytes(offset),
            length: u64::from_le_bytes(length),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlockchainStorage {
    blocks: Vec<RawBlock>,
}

impl MemoryBlockchainStorage {
    pub fn new() -> Self {
        MemoryBlockchainStorage::default()
    }
}

pub struct SwappedBlockchainStorage {
    index: FileMappedVector<IndexRecord>,
    data: File,
    data_path: PathBuf,
    data_len: u64,
}

impl SwappedBlockchainStorage {
    pub fn open(index_path: &Path, data_path: &Path) -> Result<Self, Error> {
        let index: FileMappedVector<IndexRecord> =
            FileMappedVector::open(index_path, OpenMode::OpenOrCreate, 0)?;
        let data = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(data_path)?;

        // the index is authoritative; blob bytes past the last entry are
        // garbage from an interrupted append
        let data_len = match index.last() {
            Some(record) => record.offset + record.length,
            None => 0,
        };
        let actual_len = data.metadata()?.len();
        if actual_len < data_len {
            return Err(Error::Internal(format!(
                "blob file {} is shorter than the index claims",
                data_path.display()
            )));
        }

        Ok(SwappedBlockchainStorage {
            index,
            data,
            data_path: data_path.to_path_buf(),
            data_len,
        })
    }

    fn read_block(&mut self, record: IndexRecord) -> Result<RawBlock, Error> {
        self.data.seek(SeekFrom::Start(record.offset))?;
        let mut buffer = vec![0u8; record.length as usize];
        self.data.read_exact(&mut buffer)?;
        Ok(deserialize(&buffer)?)
    }
}

/// The raw block store behind the core: `push`, `pop`, `get`, `count` and
/// `split_at`. Splitting moves the tail into a fresh in-memory store; the
/// remaining lower part keeps its backend.
pub enum BlockchainStorage {
    Memory(MemoryBlockchainStorage),
    Swapped(SwappedBlockchainStorage),
}

impl BlockchainStorage {
    pub fn in_memory() -> Self {
        BlockchainStorage::Memory(MemoryBlockchainStorage::new())
    }

    pub fn swapped(index_path: &Path, data_path: &Path) -> Result<Self, Error> {
        Ok(BlockchainStorage::Swapped(SwappedBlockchainStorage::open(
            index_path, data_path,
        )?))
    }

    pub fn push_block(&mut self, raw_block: RawBlock) -> Result<(), Error> {
        match self {
            BlockchainStorage::Memory(storage) => {
                storage.blocks.push(raw_block);
                Ok(())
            }
            BlockchainStorage::Swapped(storage) => {
                let blob = serialize(&raw_block);
                storage.data.seek(SeekFrom::Start(storage.data_len))?;
                storage.data.write_all(&blob)?;
                storage.data.sync_data()?;

                let record = IndexRecord {
                    offset: storage.data_len,
                    length: blob.len() as u64,
                };
                storage.index.push(record)?;
                storage.data_len += record.length;
                Ok(())
            }
        }
    }

    pub fn pop_block(&mut self) -> Result<(), Error> {
        match self {
            BlockchainStorage::Memory(storage) => {
                storage
                    .blocks
                    .pop()
                    .ok_or_else(|| Error::Internal("pop from empty block storage".into()))?;
                Ok(())
            }
            BlockchainStorage::Swapped(storage) => {
                let record = storage
                    .index
                    .pop()?
                    .ok_or_else(|| Error::Internal("pop from empty block storage".into()))?;
                storage.data_len = record.offset;
                storage.data.set_len(record.offset)?;
                storage.data.sync_data()?;
                Ok(())
            }
        }
    }

    pub fn block_at(&mut self, height: u32) -> Result<RawBlock, Error> {
        match self {
            BlockchainStorage::Memory(storage) => storage
                .blocks
                .get(height as usize)
                .cloned()
                .ok_or_else(|| Error::Internal(format!("no block at height {}", height))),
            BlockchainStorage::Swapped(storage) => {
                let record = storage
                    .index
                    .get(u64::from(height))
                    .ok_or_else(|| Error::Internal(format!("no block at height {}", height)))?;
                storage.read_block(record)
            }
        }
    }

    pub fn block_count(&self) -> u32 {
        match self {
            BlockchainStorage::Memory(storage) => storage.blocks.len() as u32,
            BlockchainStorage::Swapped(storage) => storage.index.len() as u32,
        }
    }

    /// Moves heights `[height, count)` into a new in-memory store. For the
    /// swapped backend only the index shrinks; blob bytes of the moved tail
    /// become garbage that the next push overwrites.
    pub fn split_at(&mut self, height: u32) -> Result<BlockchainStorage, Error> {
        let count = self.block_count();
        assert!(height <= count);
        trace!(target: "storage", "splitting raw store at height {}, {} blocks move", height, count - height);

        let mut upper = MemoryBlockchainStorage::new();
        for moved in height..count {
            upper.blocks.push(self.block_at(moved)?);
        }
        for _ in height..count {
            self.pop_block()?;
        }

        Ok(BlockchainStorage::Memory(upper))
    }

    /// Best-effort reclamation of index slack after bulk pops.
    pub fn shrink_to_fit(&mut self) -> Result<(), Error> {
        if let BlockchainStorage::Swapped(storage) = self {
            storage.index.shrink_to_fit()?;
        }
        Ok(())
    }

    pub fn data_path(&self) -> Option<&Path> {
        match self {
            BlockchainStorage::Memory(_) => None,
            BlockchainStorage::Swapped(storage) => Some(&storage.data_path),
        }
    }
}
