use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use parking_lot::Mutex;

use crate::engine::cache::pad_after;

use super::generation::GenerationShared;
use super::mailbox::MailboxWord;
use super::INITIAL_MAILBOX_SLOT;

const ATOMIC_U64_PAD_BYTES: usize = pad_after::<AtomicU64>();

/// ### English
/// Shared hand-off state for one session.
///
/// The per-frame path (`publish` / `take_latest`) touches only the mailbox word and the fences of
/// the buffer involved. The generation table behind a mutex is only consulted when buffers are
/// reallocated.
///
/// ### 中文
/// 单个会话的共享交接状态。
///
/// 每帧路径（`publish` / `take_latest`）只访问邮箱字以及相关缓冲的 fence。
/// 受互斥锁保护的代记录表只在缓冲重新分配时访问。
#[repr(C)]
pub struct SharedFrameState {
    mailbox: MailboxCell,
    /// ### English
    /// Highest generation the consumer has switched to. Older generations can be destroyed.
    ///
    /// ### 中文
    /// 消费者已切换到的最高代号。比它更旧的代可以被销毁。
    acknowledged: AckCell,
    generations: Mutex<Vec<Arc<GenerationShared>>>,
}

#[repr(C, align(64))]
struct MailboxCell {
    /// Packed [`MailboxWord`].
    word: AtomicU64,
    _pad: [u8; ATOMIC_U64_PAD_BYTES],
}

#[repr(C, align(64))]
struct AckCell {
    generation: AtomicU64,
    _pad: [u8; ATOMIC_U64_PAD_BYTES],
}

impl SharedFrameState {
    /// ### English
    /// Creates an empty state. The mailbox holds a clean placeholder word of generation 0; real
    /// generations start at 1, so the first publish always looks like a generation switch.
    ///
    /// ### 中文
    /// 创建空状态。邮箱中放置 0 代的 clean 占位字；真实代号从 1 开始，
    /// 因此第一次发布总会被视为一次代切换。
    pub fn new() -> Self {
        Self {
            mailbox: MailboxCell {
                word: AtomicU64::new(MailboxWord::clean(0, INITIAL_MAILBOX_SLOT).pack()),
                _pad: [0; ATOMIC_U64_PAD_BYTES],
            },
            acknowledged: AckCell {
                generation: AtomicU64::new(0),
                _pad: [0; ATOMIC_U64_PAD_BYTES],
            },
            generations: Mutex::new(Vec::with_capacity(2)),
        }
    }

}

impl Default for SharedFrameState {
    fn default() -> Self {
        Self::new()
    }
}

mod acquire;
mod generations;
mod publish;
