//! ### English
//! Producer side of the mailbox.
//!
//! ### 中文
//! 邮箱的生产者侧。

use std::sync::atomic::Ordering;

use super::super::mailbox::MailboxWord;
use super::SharedFrameState;

impl SharedFrameState {
    /// ### English
    /// Publishes `slot` of `generation` as the latest frame and returns the word it displaced.
    ///
    /// One `swap`: the producer never waits. The returned word is the producer's next back buffer
    /// when it belongs to the same generation; a word of an older generation is a stale token the
    /// producer must drop.
    ///
    /// The slot's fence must be stored before calling this (Release via `AcqRel`).
    ///
    /// #### Parameters
    /// - `generation`: Generation the rendered buffer belongs to.
    /// - `slot`: Index of the rendered buffer.
    ///
    /// ### 中文
    /// 把 `generation` 代的 `slot` 发布为最新帧，并返回被换出的字。
    ///
    /// 单次 `swap`：生产者从不等待。若返回的字属于同一代，它就是生产者的下一个后缓冲；
    /// 更旧代的字是过期令牌，生产者必须丢弃。
    ///
    /// 调用前必须先写入该槽位的 fence（通过 `AcqRel` 完成 Release）。
    ///
    /// #### 参数
    /// - `generation`：被渲染缓冲所属的代。
    /// - `slot`：被渲染缓冲的索引。
    pub fn publish(&self, generation: u64, slot: usize) -> MailboxWord {
        let published = MailboxWord::dirty(generation, slot).pack();
        MailboxWord::unpack(self.mailbox.word.swap(published, Ordering::AcqRel))
    }
}
