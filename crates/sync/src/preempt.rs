//! 抢占控制
//!
//! 调度器只会在当前任务的抢占禁用计数为 0 时因时间片耗尽而换出它。
//! 本模块提供修改该计数的协议，[`InterruptibleSpinLock`](crate::InterruptibleSpinLock)
//! 就建立在它之上。
//!
//! 计数是每个任务私有的，只由该任务作为当前任务时所在的 CPU 修改。
//! 启动早期没有当前任务，此时这些函数什么也不做。

use crate::{TaskHandle, current_task, task_ops};

/// 禁止当前任务被抢占
///
/// 返回被记账的任务；启动早期返回 `None`。返回值必须原样交给 [`preempt_enable`]。
#[must_use = "the returned handle must be passed to preempt_enable"]
pub fn preempt_disable() -> Option<TaskHandle> {
    let ops = task_ops()?;
    let task = ops.current_task()?;
    ops.preempt_disable(task);
    Some(task)
}

/// 撤销一次 [`preempt_disable`]
pub fn preempt_enable(task: Option<TaskHandle>) {
    if let (Some(ops), Some(task)) = (task_ops(), task) {
        ops.preempt_enable(task);
    }
}

/// 当前任务的抢占禁用计数；没有当前任务时为 0
pub fn preempt_count() -> usize {
    match (task_ops(), current_task()) {
        (Some(ops), Some(task)) => ops.preempt_count(task),
        _ => 0,
    }
}

/// 抢占保护器
///
/// 创建时禁止当前任务被抢占，离开作用域时恢复。与 [`IntrGuard`](crate::IntrGuard)
/// 不同，它不屏蔽中断。访问 CPU 本地数据时用它防止任务在读写之间被换出。
pub struct PreemptGuard {
    task: Option<TaskHandle>,
}

impl PreemptGuard {
    /// 禁止抢占
    pub fn new() -> Self {
        Self {
            task: preempt_disable(),
        }
    }
}

impl Default for PreemptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PreemptGuard {
    fn drop(&mut self) {
        preempt_enable(self.task.take());
    }
}
