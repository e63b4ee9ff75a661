//! ### English
//! Consumer side of the mailbox.
//!
//! ### 中文
//! 邮箱的消费者侧。

use std::sync::atomic::Ordering;

use super::super::mailbox::MailboxWord;
use super::SharedFrameState;

impl SharedFrameState {
    /// ### English
    /// Takes the latest published frame, handing `front` back to the producer.
    ///
    /// Drain-only: when the mailbox is not dirty nothing changes and `None` is returned, so the
    /// caller keeps showing `front`. Otherwise a single `swap` exchanges the words; if the
    /// producer published in between the load and the swap, the swap simply returns that newer
    /// frame.
    ///
    /// #### Parameters
    /// - `front`: Word of the buffer the consumer currently owns.
    ///
    /// ### 中文
    /// 取出最新发布的帧，并把 `front` 交还给生产者。
    ///
    /// 仅在有新帧时交换：邮箱未被标记 dirty 时不做任何修改并返回 `None`，调用者继续显示 `front`。
    /// 否则用一次 `swap` 交换；若生产者在读取与交换之间又发布了新帧，`swap` 会直接返回那一帧。
    ///
    /// #### 参数
    /// - `front`：消费者当前持有缓冲的字。
    pub fn take_latest(&self, front: MailboxWord) -> Option<MailboxWord> {
        let current = MailboxWord::unpack(self.mailbox.word.load(Ordering::Acquire));
        if !current.dirty {
            return None;
        }
        let handed_back = MailboxWord::clean(front.generation, front.slot).pack();
        let taken = MailboxWord::unpack(self.mailbox.word.swap(handed_back, Ordering::AcqRel));
        // Only the consumer clears the dirty bit, so a dirty load stays dirty until this swap.
        debug_assert!(taken.dirty);
        Some(taken)
    }

    /// ### English
    /// Records that the consumer switched to `generation`; every older generation may now be
    /// destroyed by the producer.
    ///
    /// ### 中文
    /// 记录消费者已切换到 `generation`；生产者此后可以销毁所有更旧的代。
    pub fn acknowledge_generation(&self, generation: u64) {
        self.acknowledged.generation.fetch_max(generation, Ordering::AcqRel);
    }

    #[inline]
    pub fn acknowledged_generation(&self) -> u64 {
        self.acknowledged.generation.load(Ordering::Acquire)
    }
}
