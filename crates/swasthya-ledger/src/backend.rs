//! Block storage behind the ledger

use crate::block::Block;

/// Storage for sealed blocks.
///
/// The ledger holds its backend inside its own critical section, so
/// implementations need no internal locking. A persistent or distributed
/// store can replace [`MemoryBackend`] without changing the ledger's API.
pub trait LedgerBackend: Send {
    /// Append a sealed block; blocks are never removed
    fn push(&mut self, block: Block);

    /// All sealed blocks in chain order
    fn blocks(&self) -> &[Block];

    fn last(&self) -> Option<&Block> {
        self.blocks().last()
    }

    fn len(&self) -> usize {
        self.blocks().len()
    }

    fn is_empty(&self) -> bool {
        self.blocks().is_empty()
    }
}

/// Process-resident block storage
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    blocks: Vec<Block>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from a previously taken chain snapshot
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }
}

impl LedgerBackend for MemoryBackend {
    fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    fn blocks(&self) -> &[Block] {
        &self.blocks
    }
}
