use api_types::rollup::Block;
use async_trait::async_trait;
use client_common::prover::BlockRange;
use dashmap::DashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlockSourceError {
    #[error("block {height} is not available")]
    Missing { height: u64 },
    #[error("block source unavailable: {0}")]
    Unavailable(String),
}

/// Read access to finalized blocks owned by the host runtime.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Returns every block of `range` in ascending height order.
    async fn get_block_range(&self, range: BlockRange) -> Result<Vec<Block>, BlockSourceError>;
}

/// In-memory store of blocks delivered through the HTTP hook.
#[derive(Debug, Default)]
pub struct BlockBuffer {
    blocks: DashMap<u64, Block>,
}

impl BlockBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `block`, replacing any previous block at the same height.
    /// Returns `true` when the height was not buffered before.
    pub fn insert(&self, block: Block) -> bool {
        self.blocks.insert(block.height, block).is_none()
    }

    /// Drops every block at or below `height`.
    pub fn prune_through(&self, height: u64) -> usize {
        let before = self.blocks.len();
        self.blocks.retain(|buffered, _| *buffered > height);
        before - self.blocks.len()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[async_trait]
impl BlockSource for BlockBuffer {
    async fn get_block_range(&self, range: BlockRange) -> Result<Vec<Block>, BlockSourceError> {
        (range.from()..=range.to())
            .map(|height| {
                self.blocks
                    .get(&height)
                    .map(|entry| entry.value().clone())
                    .ok_or(BlockSourceError::Missing { height })
            })
            .collect()
    }
}
