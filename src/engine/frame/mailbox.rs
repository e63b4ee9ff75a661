//! ### English
//! Packing of the mailbox word.
//!
//! Layout (low to high bits): 2-bit slot index, 1 dirty bit, 61-bit buffer generation.
//!
//! ### 中文
//! 邮箱字的打包格式。
//!
//! 布局（由低到高）：2 位槽位索引、1 位 dirty 标记、61 位缓冲代号。

const SLOT_INDEX_BITS: u64 = 2;
const SLOT_INDEX_MASK: u64 = (1 << SLOT_INDEX_BITS) - 1;
const DIRTY_BIT: u64 = 1 << SLOT_INDEX_BITS;
const GENERATION_SHIFT: u64 = SLOT_INDEX_BITS + 1;

/// ### English
/// Decoded mailbox word: which buffer of which generation, and whether it has not been
/// consumed yet.
///
/// ### 中文
/// 解码后的邮箱字：哪一代的哪个缓冲，以及它是否尚未被消费。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MailboxWord {
    pub generation: u64,
    pub dirty: bool,
    pub slot: usize,
}

impl MailboxWord {
    pub const fn clean(generation: u64, slot: usize) -> Self {
        Self {
            generation,
            dirty: false,
            slot,
        }
    }

    pub const fn dirty(generation: u64, slot: usize) -> Self {
        Self {
            generation,
            dirty: true,
            slot,
        }
    }

    #[inline]
    pub const fn pack(self) -> u64 {
        (self.generation << GENERATION_SHIFT)
            | if self.dirty { DIRTY_BIT } else { 0 }
            | (self.slot as u64 & SLOT_INDEX_MASK)
    }

    #[inline]
    pub const fn unpack(packed: u64) -> Self {
        Self {
            generation: packed >> GENERATION_SHIFT,
            dirty: packed & DIRTY_BIT != 0,
            slot: (packed & SLOT_INDEX_MASK) as usize,
        }
    }
}
