//! 中断保护器
//!
//! 基于 RAII 实现中断保护，在创建时禁用中断，销毁时恢复。
//!
//! 注意：禁用中断只能阻止**本地 CPU** 的“任务 vs 本地中断”并发，
//! 并不能阻止其他 CPU 的并行访问；多核共享数据仍需要配合自旋锁等原语。

use crate::arch_ops;
use core::ops::Drop;

/// 中断保护器，基于 RAII 实现中断保护。
///
/// 在创建时原子地禁用中断并保存之前的状态；
/// 在销毁时，仅当进入前中断是启用的才重新启用。
///
/// 调度器的 `run_next` 用它包住“选择下一个任务 + 上下文切换”：
/// 切换回来之后，保护器在被换回的任务自己的栈上析构，恢复的是该任务当初的中断状态。
///
/// # 示例
/// ```ignore
/// {
///     let guard = IntrGuard::new(); // 禁用中断
///     // 临界区代码
/// } // 离开作用域，自动恢复中断状态
/// ```
pub struct IntrGuard {
    was_enabled: bool,
}

impl IntrGuard {
    /// 原子地禁用中断并返回一个 IntrGuard 实例。
    ///
    /// 该实例在离开作用域时会自动恢复中断状态。
    pub fn new() -> Self {
        // SAFETY: 保存的状态会在 Drop 时原样恢复，
        // 保护器之间按作用域嵌套，因此恢复顺序正确。
        let was_enabled = unsafe { arch_ops().read_and_disable_interrupts() };
        IntrGuard { was_enabled }
    }

    /// 检查进入临界区前，中断是否处于启用状态。
    pub fn was_enabled(&self) -> bool {
        self.was_enabled
    }
}

impl Default for IntrGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IntrGuard {
    /// 当 IntrGuard 离开作用域时，自动恢复中断状态。
    fn drop(&mut self) {
        if self.was_enabled {
            // SAFETY: 进入前中断是启用的，恢复为启用不会破坏外层临界区。
            unsafe { arch_ops().enable_interrupts() };
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate test_support;

    use super::*;
    use test_support::mock::arch::MOCK_ARCH_OPS;

    #[test]
    fn test_guard_disables_and_restores() {
        MOCK_ARCH_OPS.reset();
        assert!(crate::interrupts_enabled());
        {
            let guard = IntrGuard::new();
            assert!(guard.was_enabled());
            assert!(!crate::interrupts_enabled());
        }
        assert!(crate::interrupts_enabled());
    }

    #[test]
    fn test_nested_guards_restore_outermost_state() {
        MOCK_ARCH_OPS.reset();
        {
            let _outer = IntrGuard::new();
            {
                let inner = IntrGuard::new();
                assert!(!inner.was_enabled());
            }
            // 内层析构不能提前开中断
            assert!(!crate::interrupts_enabled());
        }
        assert!(crate::interrupts_enabled());
    }

    #[test]
    fn test_guard_keeps_interrupts_disabled_if_they_were() {
        MOCK_ARCH_OPS.reset();
        MOCK_ARCH_OPS.set_interrupts_enabled(false);
        drop(IntrGuard::new());
        assert!(!crate::interrupts_enabled());
        MOCK_ARCH_OPS.reset();
    }
}
