//! 可中断自旋锁
//!
//! 只能在任务上下文中使用的自旋锁：加锁期间**不屏蔽中断**，
//! 而是递增持有者的抢占禁用计数，使调度器不会在持锁期间把持有者换出。
//! 设备中断因此可以在临界区内照常得到服务。
//!
//! 中断处理程序绝不能获取可中断自旋锁：被打断的任务可能正持有它，
//! 在单核上这会直接死锁。中断上下文请使用 [`SpinLock`](crate::SpinLock)。

use crate::{TaskHandle, task_ops};
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// 可中断的原始自旋锁。
///
/// `owner` 记录持有者任务的句柄；启动早期（还没有当前任务）获取时为 0，
/// 此时不记账抢占计数。
///
/// 抢占计数在 CAS **之前**递增：任务一旦决定尝试获取锁，直到真正拿到锁之间
/// 都不会被换出，代价是失败的 `try_lock` 也要付出一次加一减一。
#[derive(Debug)]
pub struct RawInterruptibleSpinLock {
    state: AtomicBool,
    owner: AtomicU64,
}

impl RawInterruptibleSpinLock {
    /// 创建一个新的可中断自旋锁
    pub const fn new() -> Self {
        Self {
            state: AtomicBool::new(false),
            owner: AtomicU64::new(0),
        }
    }

    /// 尝试获取锁，成功返回 true
    pub fn try_lock(&self) -> bool {
        let ops = task_ops();
        let current = ops.and_then(|ops| ops.current_task());
        if let (Some(ops), Some(task)) = (ops, current) {
            ops.preempt_disable(task);
        }

        if self
            .state
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            if let (Some(ops), Some(task)) = (ops, current) {
                ops.preempt_enable(task);
            }
            return false;
        }

        self.owner
            .store(current.map_or(0, TaskHandle::as_raw), Ordering::Relaxed);
        true
    }

    /// 获取锁，直到成功为止（不触碰中断状态）
    pub fn lock(&self) {
        while !self.try_lock() {
            while self.state.load(Ordering::Relaxed) {
                crate::arch_ops().cpu_relax();
            }
        }
    }

    /// 释放锁，并归还持有者的抢占禁用计数
    ///
    /// # Safety
    /// 调用者必须是当前持有者
    pub unsafe fn unlock(&self) {
        debug_assert!(
            self.state.load(Ordering::Relaxed),
            "InterruptibleSpinLock: unlock of an unlocked lock"
        );
        // state 写回 false 之后 owner 可能立即被新持有者覆盖，必须先读出
        let owner = TaskHandle::from_raw(self.owner.load(Ordering::Relaxed));
        debug_assert!(
            owner.is_none() || owner == crate::current_task(),
            "InterruptibleSpinLock: unlocked by a task that does not own it"
        );
        self.state.store(false, Ordering::Release);
        if let (Some(ops), Some(task)) = (task_ops(), owner) {
            ops.preempt_enable(task);
        }
    }

    /// 检查锁是否被占用 (仅用于调试/测试)
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed)
    }

    /// 当前持有者；未加锁或在启动早期加锁时为 `None`
    pub fn owner(&self) -> Option<TaskHandle> {
        if !self.is_locked() {
            return None;
        }
        TaskHandle::from_raw(self.owner.load(Ordering::Relaxed))
    }
}

impl Default for RawInterruptibleSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: 与 RawSpinLock 相同，state 保证互斥
unsafe impl lock_api::RawMutex for RawInterruptibleSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawInterruptibleSpinLock::new();

    // 归还的是持有者任务的抢占计数，守卫必须留在持有者手里
    type GuardMarker = lock_api::GuardNoSend;

    fn lock(&self) {
        RawInterruptibleSpinLock::lock(self)
    }

    fn try_lock(&self) -> bool {
        RawInterruptibleSpinLock::try_lock(self)
    }

    unsafe fn unlock(&self) {
        unsafe { RawInterruptibleSpinLock::unlock(self) }
    }

    fn is_locked(&self) -> bool {
        RawInterruptibleSpinLock::is_locked(self)
    }
}

/// 提供对数据互斥访问的可中断自旋锁
///
/// 用于中断处理程序永远不会触碰的数据；持锁期间中断照常到来，但持有者不会被抢占。
pub type InterruptibleSpinLock<T> = lock_api::Mutex<RawInterruptibleSpinLock, T>;

/// InterruptibleSpinLock 的 RAII 保护器
pub type InterruptibleSpinLockGuard<'a, T> =
    lock_api::MutexGuard<'a, RawInterruptibleSpinLock, T>;
