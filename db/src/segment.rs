//! The two segment kinds: plain in-memory segments for alternative chains
//! and carved-off tails, and the persistent root segment that saves its push
//! history as one compact file.

use crate::error::Error;
use crate::segment_cache::SegmentCache;
use ser::{deserialize, Stream};
use std::fs;
use std::path::{Path, PathBuf};
use storage::PushedBlockInfo;

pub struct PersistentSegment {
    cache: SegmentCache,
    path: PathBuf,
}

impl PersistentSegment {
    /// Opens the root segment file, rebuilding all indexes by replaying the
    /// stored push history. A missing file yields an empty root.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let cache = if path.exists() {
            let contents = fs::read(path).map_err(storage::Error::from)?;
            let pushed: Vec<PushedBlockInfo> = deserialize(&contents)?;
            debug!(target: "db", "restoring root segment from {} stored blocks", pushed.len());
            SegmentCache::from_pushed(0, pushed)?
        } else {
            SegmentCache::new(0, None)
        };

        Ok(PersistentSegment {
            cache,
            path: path.to_path_buf(),
        })
    }

    pub fn save(&self) -> Result<(), Error> {
        let mut stream = Stream::new();
        let count = self.cache.block_count();
        stream.append_varint(u64::from(count));
        for height in 0..count {
            stream.append(
                self.cache
                    .pushed_info(height)
                    .expect("heights below block_count are present; qed"),
            );
        }

        let tmp = self.path.with_extension("write");
        fs::write(&tmp, stream.out().as_ref()).map_err(storage::Error::from)?;
        fs::rename(&tmp, &self.path).map_err(storage::Error::from)?;
        debug!(target: "db", "saved root segment, {} blocks", count);
        Ok(())
    }
}

pub enum Segment {
    InMemory(SegmentCache),
    Persistent(PersistentSegment),
}

impl Segment {
    pub fn cache(&self) -> &SegmentCache {
        match self {
            Segment::InMemory(cache) => cache,
            Segment::Persistent(segment) => &segment.cache,
        }
    }

    pub fn cache_mut(&mut self) -> &mut SegmentCache {
        match self {
            Segment::InMemory(cache) => cache,
            Segment::Persistent(segment) => &mut segment.cache,
        }
    }

    /// Flushes the segment if it has a backing file.
    pub fn save(&self) -> Result<(), Error> {
        match self {
            Segment::InMemory(_) => Ok(()),
            Segment::Persistent(segment) => segment.save(),
        }
    }
}
