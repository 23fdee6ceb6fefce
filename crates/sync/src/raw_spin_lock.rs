//! 屏蔽中断的自旋锁
//!
//! 基于原子操作实现自旋锁机制，加锁期间禁用本地中断，
//! 因此可以同时在中断处理程序和任务上下文中使用。

use crate::arch_ops;
use core::sync::atomic::{AtomicBool, Ordering};

/// 屏蔽中断的原始自旋锁。
///
/// - 加锁：先读取并禁用本地中断，再用 Acquire 顺序把 `state` 从 `false` CAS 为 `true`；
/// - 解锁：用 Release 顺序写回 `false`，仅当加锁前中断是启用的才重新开中断。
///
/// 加锁前的中断状态保存在锁实例自身（而不是栈上），所以它不可重入：
/// 同一持有者不能在持锁期间再次获取同一把锁。
///
/// 一般通过 [`SpinLock`](crate::SpinLock) 使用；直接使用时需要手动配对
/// [`lock`](Self::lock) / [`unlock`](Self::unlock)。
///
/// # 示例
/// ```ignore
/// let lock = RawSpinLock::new();
/// lock.lock(); // 获取锁，禁用中断
/// // 临界区代码
/// unsafe { lock.unlock() }; // 释放锁并恢复中断状态
/// ```
#[derive(Debug)]
pub struct RawSpinLock {
    state: AtomicBool,
    irq_was_enabled: AtomicBool,
}

impl RawSpinLock {
    /// 创建一个新的 RawSpinLock 实例。
    pub const fn new() -> Self {
        RawSpinLock {
            state: AtomicBool::new(false),
            irq_was_enabled: AtomicBool::new(false),
        }
    }

    /// 尝试获取自旋锁，成功返回 true。
    ///
    /// 无论成败都会先禁用本地中断；失败时只有在调用前中断是启用的情况下才恢复。
    pub fn try_lock(&self) -> bool {
        // SAFETY: 失败路径和 unlock 都会按这里读到的状态恢复中断
        let was_enabled = unsafe { arch_ops().read_and_disable_interrupts() };

        if self
            .state
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            if was_enabled {
                // SAFETY: 调用前中断就是启用的
                unsafe { arch_ops().enable_interrupts() };
            }
            return false;
        }

        self.irq_was_enabled.store(was_enabled, Ordering::Relaxed);
        true
    }

    /// 获取自旋锁，直到成功为止。
    ///
    /// 等待期间只用 Relaxed 读取 `state`，避免 CAS 流量争抢缓存行；
    /// 每次 `try_lock` 失败都会恢复中断，因此自旋等待时本地中断仍可以到来。
    pub fn lock(&self) {
        while !self.try_lock() {
            while self.state.load(Ordering::Relaxed) {
                arch_ops().cpu_relax();
            }
        }
    }

    /// 释放自旋锁并恢复加锁前的中断状态。
    ///
    /// # Safety
    /// 调用者必须是当前持有者（成功调用了 `lock`/`try_lock` 且尚未解锁）
    pub unsafe fn unlock(&self) {
        debug_assert!(
            self.state.load(Ordering::Relaxed),
            "RawSpinLock: unlock of an unlocked lock"
        );
        let was_enabled = self.irq_was_enabled.load(Ordering::Relaxed);
        self.state.store(false, Ordering::Release);
        if was_enabled {
            // SAFETY: 加锁前中断是启用的
            unsafe { arch_ops().enable_interrupts() };
        }
    }

    /// 检查锁是否被占用 (仅用于调试/测试)
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed)
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: try_lock/lock 成功后 state 为 true，直到 unlock 写回 false 之前
// 其他上下文都无法获取，满足互斥要求。
unsafe impl lock_api::RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSpinLock::new();

    // 解锁时恢复的是本 CPU 的中断状态，守卫不能跨 CPU 传递
    type GuardMarker = lock_api::GuardNoSend;

    fn lock(&self) {
        RawSpinLock::lock(self)
    }

    fn try_lock(&self) -> bool {
        RawSpinLock::try_lock(self)
    }

    unsafe fn unlock(&self) {
        unsafe { RawSpinLock::unlock(self) }
    }

    fn is_locked(&self) -> bool {
        RawSpinLock::is_locked(self)
    }
}

#[cfg(test)]
mod tests {
    extern crate test_support;

    use super::*;
    use crate::interrupts_enabled;
    use test_support::mock::arch::MOCK_ARCH_OPS;

    #[test]
    fn test_lock_disables_interrupts_until_unlock() {
        MOCK_ARCH_OPS.reset();
        let lock = RawSpinLock::new();

        lock.lock();
        assert!(lock.is_locked());
        assert!(!interrupts_enabled());

        unsafe { lock.unlock() };
        assert!(!lock.is_locked());
        assert!(interrupts_enabled());
    }

    #[test]
    fn test_unlock_keeps_interrupts_disabled_if_they_were() {
        MOCK_ARCH_OPS.reset();
        MOCK_ARCH_OPS.set_interrupts_enabled(false);
        let lock = RawSpinLock::new();

        lock.lock();
        unsafe { lock.unlock() };
        assert!(!interrupts_enabled());

        MOCK_ARCH_OPS.reset();
    }

    #[test]
    fn test_failed_try_lock_restores_interrupts() {
        MOCK_ARCH_OPS.reset();
        let lock = RawSpinLock::new();
        lock.lock();

        // 模拟另一上下文：先开中断再尝试获取
        MOCK_ARCH_OPS.set_interrupts_enabled(true);
        assert!(!lock.try_lock());
        assert!(interrupts_enabled());

        // 关中断时尝试失败，不应顺手打开中断
        MOCK_ARCH_OPS.set_interrupts_enabled(false);
        assert!(!lock.try_lock());
        assert!(!interrupts_enabled());

        unsafe { lock.unlock() };
        MOCK_ARCH_OPS.reset();
    }

    #[test]
    fn test_try_lock_success_records_state() {
        MOCK_ARCH_OPS.reset();
        let lock = RawSpinLock::new();

        assert!(lock.try_lock());
        assert!(!interrupts_enabled());
        assert!(!lock.try_lock());
        unsafe { lock.unlock() };

        assert!(interrupts_enabled());
        assert!(lock.try_lock());
        unsafe { lock.unlock() };
    }
}
