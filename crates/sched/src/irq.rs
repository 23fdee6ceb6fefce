//! 中断分发
//!
//! 把中断号映射到处理程序。时钟中断交给调度器的 [`Scheduler::tick`]，
//! 设备中断调用驱动注册的函数。处理程序总是在关中断状态下运行，
//! 只能使用 [`SpinLock`]，不能获取 `InterruptibleSpinLock`，也不能等待。

use core::sync::atomic::{AtomicUsize, Ordering};

use sync::{IntrGuard, SpinLock};

use crate::config::MAX_IRQS;
use crate::{SchedError, Scheduler, TaskContext};

/// 中断处理程序
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IrqHandler {
    /// 时钟中断，驱动调度器的时间片
    Timer,
    /// 设备中断，参数为中断号
    Device(fn(usize)),
}

/// 中断分发表
pub struct IrqTable {
    handlers: [SpinLock<Option<IrqHandler>>; MAX_IRQS],
    counts: [AtomicUsize; MAX_IRQS],
    spurious: AtomicUsize,
}

impl IrqTable {
    /// 创建空的分发表
    pub const fn new() -> Self {
        Self {
            handlers: [const { SpinLock::new(None) }; MAX_IRQS],
            counts: [const { AtomicUsize::new(0) }; MAX_IRQS],
            spurious: AtomicUsize::new(0),
        }
    }

    /// 为中断号注册处理程序
    pub fn register(&self, irq: usize, handler: IrqHandler) -> Result<(), SchedError> {
        let mut slot = self.handlers.get(irq).ok_or(SchedError::InvalidIrq)?.lock();
        if slot.is_some() {
            return Err(SchedError::IrqBusy);
        }
        *slot = Some(handler);
        log::debug!("irq: registered {:?} on irq {}", handler, irq);
        Ok(())
    }

    /// 注销中断号的处理程序，返回原来的处理程序
    pub fn unregister(&self, irq: usize) -> Result<Option<IrqHandler>, SchedError> {
        let mut slot = self.handlers.get(irq).ok_or(SchedError::InvalidIrq)?.lock();
        Ok(slot.take())
    }

    /// 分发一次中断
    ///
    /// `frame` 是被打断的执行流的陷入帧；时钟中断可能把它换成下一个任务的上下文。
    /// 没有处理程序的中断计为伪中断。
    pub fn dispatch(&self, irq: usize, sched: &Scheduler, frame: &mut TaskContext) {
        let _guard = IntrGuard::new();
        let handler = match self.handlers.get(irq) {
            // 先取出处理程序再调用，调用期间不持有表项锁
            Some(slot) => *slot.lock(),
            None => None,
        };
        let Some(handler) = handler else {
            let n = self.spurious.fetch_add(1, Ordering::Relaxed) + 1;
            log::warn!("irq: spurious interrupt {} (total {})", irq, n);
            return;
        };
        self.counts[irq].fetch_add(1, Ordering::Relaxed);
        match handler {
            IrqHandler::Timer => sched.tick(frame),
            IrqHandler::Device(handle) => handle(irq),
        }
    }

    /// 中断号被分发的次数
    pub fn count(&self, irq: usize) -> usize {
        self.counts
            .get(irq)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// 伪中断次数
    pub fn spurious_count(&self) -> usize {
        self.spurious.load(Ordering::Relaxed)
    }
}

impl Default for IrqTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{leak_sched, spawn};
    use core::cell::Cell;

    std::thread_local! {
        static LAST_IRQ: Cell<Option<(usize, bool)>> = const { Cell::new(None) };
    }

    fn record_irq(irq: usize) {
        LAST_IRQ.with(|l| l.set(Some((irq, sync::interrupts_enabled()))));
    }

    #[test]
    fn test_register_errors() {
        crate::test_util::setup();
        let table = IrqTable::new();
        assert_eq!(
            table.register(MAX_IRQS, IrqHandler::Timer),
            Err(SchedError::InvalidIrq)
        );
        table.register(1, IrqHandler::Timer).unwrap();
        assert_eq!(
            table.register(1, IrqHandler::Device(record_irq)),
            Err(SchedError::IrqBusy)
        );
        assert!(matches!(table.unregister(1), Ok(Some(IrqHandler::Timer))));
        assert!(matches!(table.unregister(1), Ok(None)));
        assert_eq!(table.unregister(MAX_IRQS), Err(SchedError::InvalidIrq));
    }

    #[test]
    fn test_device_handler_runs_with_interrupts_masked() {
        let sched = leak_sched(10);
        let table = IrqTable::new();
        table.register(7, IrqHandler::Device(record_irq)).unwrap();

        LAST_IRQ.with(|l| l.set(None));
        let mut frame = TaskContext::zeroed();
        table.dispatch(7, sched, &mut frame);
        assert_eq!(LAST_IRQ.with(|l| l.get()), Some((7, false)));
        assert!(sync::interrupts_enabled());
        assert_eq!(table.count(7), 1);
    }

    #[test]
    fn test_timer_drives_tick() {
        let sched = leak_sched(2);
        let table = IrqTable::new();
        table.register(5, IrqHandler::Timer).unwrap();
        let a = spawn(sched, "a");
        let b = spawn(sched, "b");
        sched.run_next();

        let mut frame = TaskContext::zeroed();
        table.dispatch(5, sched, &mut frame);
        assert_eq!(sched.current_task_null_if_during_boot(), Some(a));
        table.dispatch(5, sched, &mut frame);
        assert_eq!(sched.current_task_null_if_during_boot(), Some(b));
        assert_eq!(table.count(5), 2);
    }

    #[test]
    fn test_spurious_interrupt() {
        let sched = leak_sched(10);
        let table = IrqTable::new();
        let mut frame = TaskContext::zeroed();
        table.dispatch(3, sched, &mut frame);
        table.dispatch(MAX_IRQS + 1, sched, &mut frame);
        assert_eq!(table.spurious_count(), 2);
        assert_eq!(table.count(3), 0);
    }
}
