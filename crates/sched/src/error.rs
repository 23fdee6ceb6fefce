//! 调度器错误类型
//!
//! 可通过 [`SchedError::to_errno()`] 转换为系统调用错误码。

use core::fmt;

/// 调度器错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    // 等待相关
    /// 等待被信号打断 (-EINTR)
    Interrupted,
    /// 无法为等待者分配内存 (-ENOMEM)
    NoMemory,

    // 任务相关
    /// 任务表已满 (-EAGAIN)
    NoFreeSlot,
    /// 任务句柄已失效或不存在 (-ESRCH)
    InvalidTask,
    /// 任务当前状态不允许该操作 (-EINVAL)
    InvalidState,
    /// 没有当前任务（仍处于启动早期）(-EPERM)
    NoCurrentTask,

    // 初始化相关
    /// 调度器尚未初始化 (-EBUSY)
    NotInitialized,
    /// 调度器重复初始化 (-EINVAL)
    AlreadyInitialized,

    // 中断相关
    /// 中断号超出范围 (-EINVAL)
    InvalidIrq,
    /// 中断号已被占用 (-EBUSY)
    IrqBusy,
}

impl SchedError {
    /// 转换为系统调用错误码（负数）
    pub fn to_errno(&self) -> isize {
        match self {
            SchedError::NoCurrentTask => -1,
            SchedError::InvalidTask => -3,
            SchedError::Interrupted => -4,
            SchedError::NoFreeSlot => -11,
            SchedError::NoMemory => -12,
            SchedError::NotInitialized | SchedError::IrqBusy => -16,
            SchedError::InvalidState
            | SchedError::AlreadyInitialized
            | SchedError::InvalidIrq => -22,
        }
    }
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SchedError::Interrupted => "wait interrupted by signal",
            SchedError::NoMemory => "out of memory",
            SchedError::NoFreeSlot => "task table full",
            SchedError::InvalidTask => "no such task",
            SchedError::InvalidState => "invalid task state",
            SchedError::NoCurrentTask => "no current task",
            SchedError::NotInitialized => "scheduler not initialized",
            SchedError::AlreadyInitialized => "scheduler already initialized",
            SchedError::InvalidIrq => "irq number out of range",
            SchedError::IrqBusy => "irq already registered",
        };
        f.write_str(msg)
    }
}
