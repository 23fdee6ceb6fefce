//! 任务上下文

use crate::config::CONTEXT_WORDS;

/// 任务被换出时保存的寄存器状态
///
/// 对调度器而言是一块不透明的定长内存：时钟中断路径把被打断的陷入帧整体拷入，
/// 主动切换路径交给 [`ContextOps::switch`](crate::ContextOps::switch) 读写。
/// 两条路径必须使用同一种布局，这由架构层保证。
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskContext {
    regs: [usize; CONTEXT_WORDS],
}

impl TaskContext {
    /// 全零的上下文
    pub const fn zeroed() -> Self {
        Self {
            regs: [0; CONTEXT_WORDS],
        }
    }

    /// 以字数组的形式读取
    pub fn as_words(&self) -> &[usize; CONTEXT_WORDS] {
        &self.regs
    }

    /// 以字数组的形式修改
    pub fn as_words_mut(&mut self) -> &mut [usize; CONTEXT_WORDS] {
        &mut self.regs
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::zeroed()
    }
}
