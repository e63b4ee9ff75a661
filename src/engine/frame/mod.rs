/// ### English
/// Frame hand-off state shared between a session's render thread (producer) and the host
/// compositor's populate call (consumer).
///
/// The hand-off is a mailbox: one atomic word names the most recently published buffer. The
/// producer swaps its freshly rendered back buffer in; the consumer swaps its front buffer in
/// only when the word is marked dirty. Neither side ever waits for the other.
///
/// ### 中文
/// 会话渲染线程（生产者）与宿主合成器 populate 调用（消费者）之间共享的帧交接状态。
///
/// 交接方式为邮箱：一个原子字记录最近发布的缓冲。生产者把刚渲染完的后缓冲换入；
/// 消费者仅在该字被标记为 dirty 时才换入自己的前缓冲。双方互不等待。
mod generation;
mod mailbox;
mod shared_state;

pub use generation::{GenerationShared, SlotShared};
pub use mailbox::MailboxWord;
pub use shared_state::SharedFrameState;

/// ### English
/// Buffers per generation (triple buffering: one back, one in the mailbox, one front).
///
/// ### 中文
/// 每代缓冲数量（三缓冲：一个后缓冲、一个在邮箱中、一个前缓冲）。
pub const TRIPLE_BUFFER_COUNT: usize = 3;

/// Slot the producer starts rendering into.
pub(crate) const INITIAL_BACK_SLOT: usize = 0;
/// Slot parked in the mailbox before anything is published.
pub(crate) const INITIAL_MAILBOX_SLOT: usize = 1;
/// Slot the consumer starts out owning.
pub(crate) const INITIAL_FRONT_SLOT: usize = 2;
