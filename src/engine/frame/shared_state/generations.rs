//! ### English
//! Generation table: which buffer generations are alive.
//!
//! ### 中文
//! 代记录表：记录当前存活的缓冲代。

use std::sync::Arc;

use super::super::generation::GenerationShared;
use super::SharedFrameState;

impl SharedFrameState {
    /// ### English
    /// Makes a generation visible to the consumer. Must happen before its first publish.
    ///
    /// ### 中文
    /// 让消费者可见一个新的代。必须在其首次发布之前调用。
    pub fn install_generation(&self, generation: Arc<GenerationShared>) {
        self.generations.lock().push(generation);
    }

    /// ### English
    /// Looks up a live generation by number.
    ///
    /// ### 中文
    /// 按代号查找存活的代。
    pub fn generation(&self, generation: u64) -> Option<Arc<GenerationShared>> {
        self.generations
            .lock()
            .iter()
            .find(|entry| entry.generation() == generation)
            .cloned()
    }

    /// ### English
    /// Drops a generation from the table after the producer destroyed its buffers.
    ///
    /// ### 中文
    /// 生产者销毁某代缓冲后，将其从代记录表中移除。
    pub fn remove_generation(&self, generation: u64) {
        self.generations
            .lock()
            .retain(|entry| entry.generation() != generation);
    }

    pub fn clear_generations(&self) {
        self.generations.lock().clear();
    }

    pub fn live_generations(&self) -> usize {
        self.generations.lock().len()
    }
}
