//! 任务
//!
//! 任务存放在定长的 [`TaskTable`] 中，以 [`TaskId`]（槽位下标 + 代数）引用。
//! 句柄不拥有任务：槽位被回收并重新分配后代数会变化，旧句柄随之失效，
//! 查询时返回 `None` 而不会访问到别的任务。

mod table;

pub use table::{Task, TaskInner, TaskRef, TaskTable};

use core::fmt;
use core::num::{NonZeroU32, NonZeroU64};

use sync::TaskHandle;

/// 任务句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId {
    index: u32,
    generation: NonZeroU32,
}

impl TaskId {
    pub(crate) const fn new(index: u32, generation: NonZeroU32) -> Self {
        Self { index, generation }
    }

    /// 槽位下标
    pub const fn index(&self) -> usize {
        self.index as usize
    }

    /// 槽位代数
    pub const fn generation(&self) -> u32 {
        self.generation.get()
    }

    /// 编码为 sync 使用的不透明句柄：高 32 位为下标，低 32 位为代数
    pub fn into_handle(self) -> TaskHandle {
        TaskHandle::new(NonZeroU64::from(self.generation) | ((self.index as u64) << 32))
    }

    /// 从 [`into_handle`](Self::into_handle) 的编码还原
    pub fn from_handle(handle: TaskHandle) -> Option<Self> {
        let raw = handle.as_raw();
        let generation = NonZeroU32::new(raw as u32)?;
        Some(Self::new((raw >> 32) as u32, generation))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.index, self.generation)
    }
}

/// 任务调度状态
///
/// ```text
/// Ready ──run_next/tick 选中──> Running ──时间片耗尽/让出──> Ready
///                                  │
///                                  ├──进入等待队列──> Blocked ──notify/signal──> Ready
///                                  └──退出──> Zombie ──回收──> (槽位释放)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// 在就绪队列中（或刚创建，等待加入）
    Ready,
    /// 正在某个 CPU 上运行
    Running,
    /// 在等待队列中睡眠
    Blocked,
    /// 已退出，等待回收
    Zombie,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_encoding() {
        let id = TaskId::new(3, NonZeroU32::new(7).unwrap());
        let handle = id.into_handle();
        assert_eq!(handle.as_raw(), (3u64 << 32) | 7);
        assert_eq!(TaskId::from_handle(handle), Some(id));
        assert_eq!(std::format!("{id}"), "3.7");
    }

    #[test]
    fn test_handle_with_zero_generation_is_rejected() {
        let handle = TaskHandle::from_raw(5u64 << 32).unwrap();
        assert!(TaskId::from_handle(handle).is_none());
    }
}
