//! 任务相关操作的 Mock 实现
//!
//! 代替调度器告诉锁“当前任务是谁”，并记录每个任务的抢占禁用计数。
//! 任务用原始 u64 句柄表示。

use alloc::collections::BTreeMap;
use core::cell::{Cell, RefCell};

std::thread_local! {
    static CURRENT: Cell<Option<u64>> = const { Cell::new(None) };
    static COUNTS: RefCell<BTreeMap<u64, usize>> = const { RefCell::new(BTreeMap::new()) };
    static DISABLE_CALLS: RefCell<BTreeMap<u64, usize>> = const { RefCell::new(BTreeMap::new()) };
}

/// Mock 任务操作
pub struct MockTaskOps;

impl MockTaskOps {
    pub const fn new() -> Self {
        Self
    }

    /// 清空当前线程的全部记录，回到“启动早期”
    pub fn reset(&self) {
        CURRENT.with(|c| c.set(None));
        COUNTS.with(|c| c.borrow_mut().clear());
        DISABLE_CALLS.with(|c| c.borrow_mut().clear());
    }

    pub fn set_current_task(&self, task: Option<u64>) {
        CURRENT.with(|c| c.set(task));
    }

    pub fn current_task(&self) -> Option<u64> {
        CURRENT.with(|c| c.get())
    }

    pub fn preempt_disable(&self, task: u64) {
        COUNTS.with(|c| *c.borrow_mut().entry(task).or_insert(0) += 1);
        DISABLE_CALLS.with(|c| *c.borrow_mut().entry(task).or_insert(0) += 1);
    }

    pub fn preempt_enable(&self, task: u64) {
        COUNTS.with(|c| {
            let mut counts = c.borrow_mut();
            let count = counts.entry(task).or_insert(0);
            assert!(*count > 0, "preempt_enable underflow for task {task:#x}");
            *count -= 1;
        });
    }

    pub fn preempt_count(&self, task: u64) -> usize {
        COUNTS.with(|c| c.borrow().get(&task).copied().unwrap_or(0))
    }

    /// 任务累计被 preempt_disable 的次数（包括已经归还的）
    pub fn disable_calls(&self, task: u64) -> usize {
        DISABLE_CALLS.with(|c| c.borrow().get(&task).copied().unwrap_or(0))
    }
}

impl Default for MockTaskOps {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_TASK_OPS: MockTaskOps = MockTaskOps::new();
