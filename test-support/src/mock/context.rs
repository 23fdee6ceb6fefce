//! 上下文切换的 Mock 实现
//!
//! 宿主机上无法真的切换栈，`switch` 只记录次数并立即“返回”，
//! 相当于被换出的任务马上又被换了回来。
//!
//! 测试可以用 [`MockContextOps::push_switch_hook`] 排入回调，
//! 模拟“被换出期间其它任务或中断做了什么”：每次切换弹出一个回调执行。
//! 回调内部再触发的切换不会继续弹出回调。

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use core::cell::{Cell, RefCell};

type Hook = Box<dyn FnOnce()>;

std::thread_local! {
    static HOOKS: RefCell<VecDeque<Hook>> = RefCell::new(VecDeque::new());
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
    static SWITCHES: Cell<usize> = const { Cell::new(0) };
    static WFI: Cell<usize> = const { Cell::new(0) };
    static LAST_WFI_INTERRUPTS: Cell<Option<bool>> = const { Cell::new(None) };
}

/// Mock 上下文切换操作
pub struct MockContextOps;

impl MockContextOps {
    pub const fn new() -> Self {
        Self
    }

    pub fn reset(&self) {
        HOOKS.with(|h| h.borrow_mut().clear());
        IN_HOOK.with(|f| f.set(false));
        SWITCHES.with(|s| s.set(0));
        WFI.with(|w| w.set(0));
        LAST_WFI_INTERRUPTS.with(|l| l.set(None));
    }

    /// 排入一个在下一次切换时执行的回调
    pub fn push_switch_hook(&self, hook: impl FnOnce() + 'static) {
        HOOKS.with(|h| h.borrow_mut().push_back(Box::new(hook)));
    }

    /// 尚未执行的回调数量
    pub fn pending_hooks(&self) -> usize {
        HOOKS.with(|h| h.borrow().len())
    }

    /// 当前线程累计的切换次数
    pub fn switch_count(&self) -> usize {
        SWITCHES.with(|s| s.get())
    }

    /// 由被测 crate 的 `wait_for_interrupt` 实现调用，记录当时的中断状态
    pub fn on_wait_for_interrupt(&self, interrupts_enabled: bool) {
        WFI.with(|w| w.set(w.get() + 1));
        LAST_WFI_INTERRUPTS.with(|l| l.set(Some(interrupts_enabled)));
    }

    /// 当前线程等待中断的次数
    pub fn wfi_count(&self) -> usize {
        WFI.with(|w| w.get())
    }

    /// 最近一次等待中断时中断是否开启
    pub fn last_wfi_interrupts(&self) -> Option<bool> {
        LAST_WFI_INTERRUPTS.with(|l| l.get())
    }

    /// 由被测 crate 的 `switch` 实现调用
    pub fn on_switch(&self) {
        SWITCHES.with(|s| s.set(s.get() + 1));
        if IN_HOOK.with(|f| f.get()) {
            return;
        }
        // 先弹出再执行，执行期间不持有 RefCell 借用
        let Some(hook) = HOOKS.with(|h| h.borrow_mut().pop_front()) else {
            return;
        };
        IN_HOOK.with(|f| f.set(true));
        hook();
        IN_HOOK.with(|f| f.set(false));
    }
}

impl Default for MockContextOps {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_CONTEXT_OPS: MockContextOps = MockContextOps::new();
