//! 等待队列
//!
//! 任务在条件不满足时把自己挂到等待队列上睡眠，由其它任务或中断处理程序唤醒。
//!
//! 条件检查与入队都在队列锁内完成，唤醒方修改条件后再调用 notify，
//! 因此不会丢失唤醒。被唤醒的任务总是重新检查条件，虚假唤醒是安全的。
//!
//! # 示例
//! ```ignore
//! static DATA_READY: AtomicBool = AtomicBool::new(false);
//! static WQ: WaitQueue = WaitQueue::new();
//!
//! // 等待方
//! WQ.wait(current_scheduler(), || DATA_READY.load(Ordering::Acquire))?;
//!
//! // 唤醒方（可以在中断上下文中）
//! DATA_READY.store(true, Ordering::Release);
//! WQ.notify_one(current_scheduler());
//! ```

use alloc::collections::VecDeque;

use sync::SpinLock;

use crate::{SchedError, Scheduler, TaskId};

/// [`WaitQueue::prepare_to_wait`] 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prepared {
    /// 条件已经满足，无需等待
    Satisfied,
    /// 已入队并标记为 Blocked，调用者应当切换出去
    Blocked(TaskId),
}

/// 等待队列
///
/// 条目按 FIFO 顺序排列；每个条目只会被移除一次：要么被 notify 弹出，
/// 要么在被信号打断、虚假唤醒后由等待者自己移除。
pub struct WaitQueue {
    entries: SpinLock<VecDeque<TaskId>>,
}

impl WaitQueue {
    /// 创建空的等待队列
    pub const fn new() -> Self {
        Self {
            entries: SpinLock::new(VecDeque::new()),
        }
    }

    /// 等待直到 `cond` 返回 true
    ///
    /// `cond` 在队列锁内、关中断状态下求值，不能阻塞，也不能获取锁顺序中
    /// 排在等待队列之前的锁。
    ///
    /// # Errors
    /// - [`SchedError::Interrupted`]：等待前或等待中当前任务收到了信号；
    /// - [`SchedError::NoMemory`]：无法为等待条目分配内存；
    /// - [`SchedError::NoCurrentTask`]：仍处于启动早期。
    pub fn wait<F>(&self, sched: &Scheduler, mut cond: F) -> Result<(), SchedError>
    where
        F: FnMut() -> bool,
    {
        loop {
            match self.prepare_to_wait(sched, &mut cond)? {
                Prepared::Satisfied => return Ok(()),
                Prepared::Blocked(id) => {
                    sched.run_next();
                    self.finish_wait(sched, id)?;
                }
            }
        }
    }

    /// 等待的前半段：检查条件，不满足则入队并把当前任务标记为 Blocked
    ///
    /// 顺序是条件、信号、分配、入队。条件已满足时即使有待处理的信号也返回
    /// `Satisfied`。
    pub fn prepare_to_wait<F>(&self, sched: &Scheduler, cond: &mut F) -> Result<Prepared, SchedError>
    where
        F: FnMut() -> bool,
    {
        let current = sched
            .current_task_null_if_during_boot()
            .ok_or(SchedError::NoCurrentTask)?;
        let task = sched.tasks().get(current).ok_or(SchedError::InvalidTask)?;

        let mut entries = self.entries.lock();
        if cond() {
            return Ok(Prepared::Satisfied);
        }
        if task.signal_pending() {
            return Err(SchedError::Interrupted);
        }
        entries
            .try_reserve(1)
            .map_err(|_| SchedError::NoMemory)?;
        entries.push_back(current);
        // 锁顺序：等待队列 -> 任务
        sched.block_current()?;
        Ok(Prepared::Blocked(current))
    }

    /// 等待的后半段：任务被换回之后调用
    ///
    /// 条目如果还在队列里（虚假唤醒或信号唤醒），由任务自己移除。
    /// 收到信号时返回 [`SchedError::Interrupted`]；如果这次唤醒其实来自
    /// notify_one，它会被转交给下一个等待者。
    pub fn finish_wait(&self, sched: &Scheduler, id: TaskId) -> Result<(), SchedError> {
        let task = sched.tasks().get(id).ok_or(SchedError::InvalidTask)?;
        let still_queued = {
            let mut entries = self.entries.lock();
            match entries.iter().position(|&w| w == id) {
                Some(pos) => {
                    entries.remove(pos);
                    true
                }
                None => false,
            }
        };
        if task.signal_pending() {
            if !still_queued {
                self.notify_one(sched);
            }
            return Err(SchedError::Interrupted);
        }
        Ok(())
    }

    /// 按 FIFO 顺序唤醒一个等待者，返回被唤醒的任务
    ///
    /// 已失效或已不在睡眠的条目会被跳过并丢弃。可以在中断上下文中调用。
    pub fn notify_one(&self, sched: &Scheduler) -> Option<TaskId> {
        let mut entries = self.entries.lock();
        while let Some(id) = entries.pop_front() {
            if sched.unblock(id) {
                return Some(id);
            }
        }
        None
    }

    /// 唤醒所有当前的等待者，返回唤醒数量
    pub fn notify_all(&self, sched: &Scheduler) -> usize {
        let mut entries = self.entries.lock();
        let mut woken = 0;
        while let Some(id) = entries.pop_front() {
            if sched.unblock(id) {
                woken += 1;
            }
        }
        woken
    }

    /// 队列中的条目数量
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// 队列是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskState;
    use crate::test_util::{leak, leak_sched, spawn};
    use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use test_support::mock::context::MOCK_CONTEXT_OPS;

    const SLICE: u32 = 10;

    fn current(sched: &Scheduler) -> TaskId {
        sched.current_task_null_if_during_boot().unwrap()
    }

    // 三个任务依次进入等待，唤醒顺序与进入顺序一致
    #[test]
    fn test_fifo_wake_order() {
        let sched = leak_sched(SLICE);
        let wq = WaitQueue::new();
        let a = spawn(sched, "a");
        let b = spawn(sched, "b");
        let c = spawn(sched, "c");
        sched.run_next();

        for expected in [a, b, c] {
            assert_eq!(current(sched), expected);
            let prepared = wq.prepare_to_wait(sched, &mut || false).unwrap();
            assert_eq!(prepared, Prepared::Blocked(expected));
            sched.run_next();
        }
        assert_eq!(current(sched), sched.idle_task());
        assert_eq!(wq.len(), 3);

        assert_eq!(wq.notify_one(sched), Some(a));
        assert_eq!(wq.notify_one(sched), Some(b));
        assert_eq!(wq.notify_all(sched), 1);
        assert!(wq.is_empty());
        assert_eq!(wq.notify_one(sched), None);

        for expected in [a, b, c] {
            sched.run_next();
            assert_eq!(current(sched), expected);
            wq.finish_wait(sched, expected).unwrap();
            sched.block_current().unwrap();
        }
    }

    #[test]
    fn test_satisfied_condition_does_not_block() {
        let sched = leak_sched(SLICE);
        let wq = WaitQueue::new();
        let a = spawn(sched, "a");
        sched.run_next();

        assert_eq!(wq.wait(sched, || true), Ok(()));
        assert_eq!(current(sched), a);
        assert!(wq.is_empty());
        assert_eq!(MOCK_CONTEXT_OPS.switch_count(), 1);
    }

    #[test]
    fn test_wait_during_boot_fails() {
        let sched = leak_sched(SLICE);
        let wq = WaitQueue::new();
        assert_eq!(wq.wait(sched, || false), Err(SchedError::NoCurrentTask));
    }

    // 第一次唤醒时条件仍不满足，任务必须重新入队等待
    #[test]
    fn test_spurious_wakeup_rechecks_condition() {
        let sched = leak_sched(SLICE);
        let wq: &'static WaitQueue = leak(WaitQueue::new());
        let ready: &'static AtomicBool = leak(AtomicBool::new(false));
        let checks: &'static AtomicUsize = leak(AtomicUsize::new(0));
        let a = spawn(sched, "a");
        sched.run_next();

        MOCK_CONTEXT_OPS.push_switch_hook(move || {
            assert_eq!(wq.notify_one(sched), Some(a));
            sched.run_next();
        });
        MOCK_CONTEXT_OPS.push_switch_hook(move || {
            ready.store(true, Ordering::Release);
            assert_eq!(wq.notify_one(sched), Some(a));
            sched.run_next();
        });

        let res = wq.wait(sched, || {
            checks.fetch_add(1, Ordering::Relaxed);
            ready.load(Ordering::Acquire)
        });
        assert_eq!(res, Ok(()));
        assert_eq!(checks.load(Ordering::Relaxed), 3);
        assert_eq!(current(sched), a);
        assert!(wq.is_empty());
        assert_eq!(MOCK_CONTEXT_OPS.pending_hooks(), 0);
    }

    // 不是通过 notify 的唤醒（例如直接 unblock）不能留下重复条目
    #[test]
    fn test_wakeup_without_notify_removes_entry() {
        let sched = leak_sched(SLICE);
        let wq: &'static WaitQueue = leak(WaitQueue::new());
        let ready: &'static AtomicBool = leak(AtomicBool::new(false));
        let a = spawn(sched, "a");
        sched.run_next();

        MOCK_CONTEXT_OPS.push_switch_hook(move || {
            assert!(sched.unblock(a));
            sched.run_next();
        });
        MOCK_CONTEXT_OPS.push_switch_hook(move || {
            assert_eq!(wq.len(), 1);
            ready.store(true, Ordering::Release);
            wq.notify_all(sched);
            sched.run_next();
        });

        assert_eq!(wq.wait(sched, || ready.load(Ordering::Acquire)), Ok(()));
        assert!(wq.is_empty());
    }

    #[test]
    fn test_signal_interrupts_wait() {
        let sched = leak_sched(SLICE);
        let wq: &'static WaitQueue = leak(WaitQueue::new());
        let a = spawn(sched, "a");
        sched.run_next();

        MOCK_CONTEXT_OPS.push_switch_hook(move || {
            sched.signal(a).unwrap();
            sched.run_next();
        });

        assert_eq!(wq.wait(sched, || false), Err(SchedError::Interrupted));
        assert_eq!(current(sched), a);
        assert!(wq.is_empty());

        // 信号保持待处理，再次等待立即失败
        assert_eq!(wq.wait(sched, || false), Err(SchedError::Interrupted));
        assert!(sched.tasks().get(a).unwrap().clear_signal());
    }

    // a 被 notify_one 选中的同时收到信号：这次唤醒应转交给 b
    #[test]
    fn test_interrupted_waiter_passes_wakeup_on() {
        let sched = leak_sched(SLICE);
        let wq = WaitQueue::new();
        let a = spawn(sched, "a");
        let b = spawn(sched, "b");
        sched.run_next();

        assert_eq!(wq.prepare_to_wait(sched, &mut || false), Ok(Prepared::Blocked(a)));
        sched.run_next();
        assert_eq!(wq.prepare_to_wait(sched, &mut || false), Ok(Prepared::Blocked(b)));
        sched.run_next();
        assert_eq!(current(sched), sched.idle_task());

        assert_eq!(wq.notify_one(sched), Some(a));
        sched.signal(a).unwrap();
        sched.run_next();
        assert_eq!(current(sched), a);

        assert_eq!(wq.finish_wait(sched, a), Err(SchedError::Interrupted));
        assert!(wq.is_empty());
        assert_eq!(sched.tasks().get(b).unwrap().state(), TaskState::Ready);
        assert_eq!(sched.ready_len(), 1);
    }

    // 中断处理程序中的 notify：任务在关中断状态下被唤醒
    #[test]
    fn test_notify_from_interrupt_context() {
        use test_support::mock::arch::MOCK_ARCH_OPS;

        let sched = leak_sched(SLICE);
        let wq = WaitQueue::new();
        let a = spawn(sched, "a");
        sched.run_next();
        wq.prepare_to_wait(sched, &mut || false).unwrap();
        sched.run_next();

        MOCK_ARCH_OPS.set_interrupts_enabled(false);
        assert_eq!(wq.notify_one(sched), Some(a));
        assert!(!sync::interrupts_enabled());
        MOCK_ARCH_OPS.reset();
        assert_eq!(sched.ready_len(), 1);
    }
}
