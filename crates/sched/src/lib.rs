//! 任务调度核心
//!
//! 提供内核任务的调度与等待机制：
//! - [`TaskTable`] / [`TaskId`]：定长任务表，以“下标 + 代数”的句柄引用任务；
//! - [`Scheduler`]：每个 CPU 一个的时间片轮转调度器；
//! - [`WaitQueue`]：FIFO 等待队列，支持被信号打断；
//! - [`IrqTable`]：中断分发，时钟中断驱动 [`Scheduler::tick`]；
//! - [`Reaper`]：回收已退出任务的槽位。
//!
//! # 架构依赖
//!
//! 上下文的保存与切换通过 [`ContextOps`] 抽象，使用前必须调用
//! [`register_context_ops`] 注册实现；锁依赖的 `sync::ArchOps` 也要先注册。
//! [`init`] 会向 sync 注册 `TaskOps`，从此 `InterruptibleSpinLock`
//! 按当前任务记账抢占计数。
//!
//! # 锁顺序
//!
//! 同一条执行路径上需要嵌套获取多把锁时，按下表从高到低获取：
//!
//! | 层级（高→低） | 锁 | 类型 | 备注 |
//! |---|---|---|---|
//! | 1 | 任务表分配锁 | `InterruptibleSpinLock` | 只在任务上下文中创建/回收任务 |
//! | 2 | 等待队列条目 | `SpinLock` | notify 可能在中断上下文中调用 |
//! | 3 | 回收者的 Zombie 队列 | `SpinLock` | 在回收者的等待条件中获取 |
//! | 4 | 调度器就绪队列 | `SpinLock` | 时钟中断中访问 |
//! | 5 | 单个任务的可变状态 | `SpinLock` | 总是最后获取 |
//!
//! 注意：
//! - 中断处理程序只能获取 `SpinLock`；
//! - 持有任何自旋锁时都不能等待或主动切换。

#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

pub mod config;
mod context;
mod error;
mod global;
mod irq;
mod ops;
mod percpu;
mod reaper;
mod scheduler;
mod task;
mod wait_queue;

#[cfg(test)]
mod test_util;

pub use context::TaskContext;
pub use error::SchedError;
pub use global::{
    current_scheduler, current_task, exit_current, exit_task, handle_irq, idle_loop, init,
    irq_table, reap_zombies, reaper_main, scheduler_of, send_signal, spawn, spawn_reaper,
    task_table, try_current_scheduler, yield_now,
};
pub use irq::{IrqHandler, IrqTable};
pub use ops::{ContextOps, context_ops, register_context_ops};
pub use percpu::PerCpu;
pub use reaper::Reaper;
pub use scheduler::{BootPhase, Scheduler};
pub use task::{Task, TaskId, TaskInner, TaskRef, TaskState, TaskTable};
pub use wait_queue::{Prepared, WaitQueue};
