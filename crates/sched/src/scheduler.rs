//! 调度器
//!
//! 每个 CPU 一个 [`Scheduler`]，维护 FIFO 就绪队列和当前任务，实现时间片轮转。
//!
//! 有两条切换路径：
//! - 主动切换 [`Scheduler::run_next`]：在关中断状态下选出下一个任务，
//!   调用 [`ContextOps::switch`](crate::ContextOps::switch) 换栈；
//! - 时钟中断 [`Scheduler::tick`]：把被打断的陷入帧存入当前任务，时间片耗尽
//!   且抢占计数为 0 时，把下一个任务的上下文写回陷入帧，由中断返回路径恢复执行。
//!
//! 就绪队列可能在中断上下文中被访问（时钟中断、设备中断里的 notify），
//! 因此由屏蔽中断的 [`SpinLock`] 保护。

use alloc::collections::VecDeque;
use core::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};

use sync::{IntrGuard, SpinLock};

use crate::config::{DEFAULT_TIME_SLICE, MAX_TASKS};
use crate::{SchedError, TaskContext, TaskId, TaskRef, TaskState, TaskTable, context_ops};

/// 启动阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BootPhase {
    /// 第一次 `run_next` 之前，没有当前任务
    Early = 0,
    /// 已开始调度
    Scheduling = 1,
}

/// 单个 CPU 的调度器
pub struct Scheduler {
    cpu: usize,
    tasks: &'static TaskTable,
    idle: TaskId,
    time_slice: u32,
    phase: AtomicU8,
    /// 当前任务句柄的原始编码，0 表示启动早期
    current: AtomicU64,
    ready: SpinLock<VecDeque<TaskId>>,
    switches: AtomicUsize,
}

impl Scheduler {
    /// 创建调度器，并在任务表中为它创建 idle 任务
    ///
    /// 就绪队列预留 `MAX_TASKS` 的容量，之后入队不会再分配内存。
    pub fn new(cpu: usize, tasks: &'static TaskTable) -> Result<Self, SchedError> {
        let mut ready = VecDeque::new();
        ready
            .try_reserve(MAX_TASKS)
            .map_err(|_| SchedError::NoMemory)?;
        let idle = tasks.create_idle("idle")?;
        log::info!("sched: cpu{} scheduler created, idle task {}", cpu, idle);
        Ok(Self {
            cpu,
            tasks,
            idle,
            time_slice: DEFAULT_TIME_SLICE,
            phase: AtomicU8::new(BootPhase::Early as u8),
            current: AtomicU64::new(0),
            ready: SpinLock::new(ready),
            switches: AtomicUsize::new(0),
        })
    }

    /// 设置时间片长度（至少 1 个 tick）
    pub fn with_time_slice(mut self, ticks: u32) -> Self {
        self.time_slice = ticks.max(1);
        self
    }

    /// 所属 CPU
    pub fn cpu(&self) -> usize {
        self.cpu
    }

    /// idle 任务
    pub fn idle_task(&self) -> TaskId {
        self.idle
    }

    /// 时间片长度
    pub fn time_slice(&self) -> u32 {
        self.time_slice
    }

    /// 使用的任务表
    pub fn tasks(&self) -> &'static TaskTable {
        self.tasks
    }

    /// 当前启动阶段
    pub fn phase(&self) -> BootPhase {
        match self.phase.load(Ordering::Acquire) {
            0 => BootPhase::Early,
            _ => BootPhase::Scheduling,
        }
    }

    /// 就绪队列长度
    pub fn ready_len(&self) -> usize {
        self.ready.lock().len()
    }

    /// 累计的上下文切换次数
    pub fn switch_count(&self) -> usize {
        self.switches.load(Ordering::Relaxed)
    }

    /// 当前任务；第一次 `run_next` 之前返回 `None`
    ///
    /// 不加锁、不分配内存，可以在任何上下文中调用。
    pub fn current_task_null_if_during_boot(&self) -> Option<TaskId> {
        sync::TaskHandle::from_raw(self.current.load(Ordering::Acquire))
            .and_then(TaskId::from_handle)
    }

    fn current_ref(&self) -> Result<TaskRef<'static>, SchedError> {
        let id = self
            .current_task_null_if_during_boot()
            .ok_or(SchedError::NoCurrentTask)?;
        self.tasks.get(id).ok_or(SchedError::InvalidTask)
    }

    fn idle_ref(&self) -> TaskRef<'static> {
        match self.tasks.get(self.idle) {
            Some(idle) => idle,
            None => panic!("sched: cpu{} idle task vanished", self.cpu),
        }
    }

    /// 把任务加入就绪队列尾部
    ///
    /// 失效的句柄返回 `InvalidTask`；正在运行、正在等待、已退出、已在队列中的任务
    /// 以及 idle 任务返回 `InvalidState`。等待中的任务只能由 notify 或信号唤醒。
    pub fn add_task(&self, id: TaskId) -> Result<(), SchedError> {
        let task = self.tasks.get(id).ok_or(SchedError::InvalidTask)?;
        let mut ready = self.ready.lock();
        let mut inner = task.inner();
        if inner.idle
            || inner.on_rq
            || matches!(
                inner.state,
                TaskState::Running | TaskState::Blocked | TaskState::Zombie
            )
        {
            return Err(SchedError::InvalidState);
        }
        inner.state = TaskState::Ready;
        inner.on_rq = true;
        ready.push_back(id);
        Ok(())
    }

    /// 选出下一个任务并更新当前任务，返回需要进行的切换 `(from, to)`
    ///
    /// 仍处于 Running 的前一个任务回到队尾（idle 除外）；就绪队列为空时选 idle。
    /// 选中的就是前一个任务时返回 `None`。调用者必须已经关中断。
    fn pick_next(&self) -> Option<(TaskRef<'static>, TaskRef<'static>)> {
        let idle = self.idle_ref();
        let prev = match self.current_task_null_if_during_boot() {
            Some(id) => self.tasks.get(id).unwrap_or_else(|| {
                log::error!("sched: current task {} vanished", id);
                idle
            }),
            None => {
                // 启动流程的上下文将被保存进 idle 任务
                self.phase
                    .store(BootPhase::Scheduling as u8, Ordering::Release);
                log::info!("sched: cpu{} starts scheduling", self.cpu);
                idle
            }
        };

        let mut ready = self.ready.lock();
        {
            let mut inner = prev.inner();
            if inner.state == TaskState::Running {
                inner.state = TaskState::Ready;
                if !inner.idle {
                    inner.on_rq = true;
                    ready.push_back(prev.id());
                }
            }
        }

        let next = loop {
            let Some(id) = ready.pop_front() else {
                break idle;
            };
            let Some(task) = self.tasks.get(id) else {
                log::error!("sched: stale task {} in ready queue", id);
                continue;
            };
            let mut inner = task.inner();
            inner.on_rq = false;
            if inner.state == TaskState::Ready {
                break task;
            }
            log::warn!("sched: task {} queued in state {:?}", id, inner.state);
        };

        let switching = next.id() != prev.id();
        {
            let mut inner = next.inner();
            inner.state = TaskState::Running;
            inner.ticks_remaining = self.time_slice;
            if switching {
                inner.run_count += 1;
            }
        }
        self.current
            .store(next.id().into_handle().as_raw(), Ordering::Release);
        drop(ready);

        switching.then_some((prev, next))
    }

    /// 主动切换到下一个任务
    ///
    /// 在关中断状态下完成选择与切换；当前任务被换回后，中断状态恢复为调用前的样子。
    /// 第一次调用时启动流程成为 idle 任务。
    pub fn run_next(&self) {
        let _guard = IntrGuard::new();
        let Some((from, to)) = self.pick_next() else {
            return;
        };
        self.switches.fetch_add(1, Ordering::Relaxed);
        log::trace!("sched: switch {} -> {}", from.id(), to.id());
        // SAFETY: 两个上下文都属于有效的任务槽位，且中断已关闭
        unsafe { context_ops().switch(from.context_ptr(), to.context_ptr()) };
    }

    /// 让出 CPU，当前任务回到就绪队列尾部
    pub fn yield_now(&self) {
        self.run_next();
    }

    /// 时钟中断处理
    ///
    /// `frame` 是被打断的执行流的陷入帧。需要切换时，函数返回后 `frame`
    /// 中已经是下一个任务的上下文。
    pub fn tick(&self, frame: &mut TaskContext) {
        let Ok(current) = self.current_ref() else {
            return;
        };
        let (expired, idle, exiting) = {
            let mut inner = current.inner();
            inner.context = *frame;
            inner.ticks_remaining = inner.ticks_remaining.saturating_sub(1);
            (
                inner.ticks_remaining == 0,
                inner.idle,
                inner.state == TaskState::Zombie,
            )
        };

        // 时间片耗尽但抢占被禁用时，计数保持为 0，抢占重新启用后的第一个 tick 就会切换。
        // 正在退出的任务还没交给回收者，由它自己调用 run_next 离开
        let preempt = if idle {
            self.ready_len() > 0
        } else {
            expired && !exiting && current.preempt_count() == 0
        };
        if !preempt {
            return;
        }

        if let Some((from, to)) = self.pick_next() {
            *frame = to.inner().context;
            self.switches.fetch_add(1, Ordering::Relaxed);
            log::trace!("sched: preempt {} -> {}", from.id(), to.id());
        }
    }

    /// 把当前任务标记为 Blocked，但不切换
    ///
    /// 调用者随后应调用 [`run_next`](Self::run_next)。在这两步之间被唤醒是允许的：
    /// 任务会变回 Ready 并留在就绪队列中。
    pub fn block_current(&self) -> Result<TaskId, SchedError> {
        let task = self.current_ref()?;
        debug_assert_eq!(
            task.preempt_count(),
            0,
            "sched: blocking with preemption disabled"
        );
        let mut inner = task.inner();
        if inner.idle || inner.state != TaskState::Running {
            return Err(SchedError::InvalidState);
        }
        inner.state = TaskState::Blocked;
        Ok(task.id())
    }

    /// 唤醒一个 Blocked 任务，返回是否真的唤醒了
    pub fn unblock(&self, id: TaskId) -> bool {
        let Some(task) = self.tasks.get(id) else {
            return false;
        };
        let mut ready = self.ready.lock();
        let mut inner = task.inner();
        if inner.state != TaskState::Blocked {
            return false;
        }
        inner.state = TaskState::Ready;
        if !inner.on_rq {
            inner.on_rq = true;
            ready.push_back(id);
        }
        true
    }

    /// 向任务发送信号：标记待处理并唤醒它
    ///
    /// 正在等待的任务会从等待中返回 [`SchedError::Interrupted`]。
    pub fn signal(&self, id: TaskId) -> Result<(), SchedError> {
        let task = self.tasks.get(id).ok_or(SchedError::InvalidTask)?;
        task.raise_signal();
        self.unblock(id);
        Ok(())
    }

    /// 把当前任务标记为 Zombie，它不会再进入就绪队列
    ///
    /// 调用者负责把任务交给回收者，然后调用 [`run_next`](Self::run_next)。
    pub fn exit_current(&self) -> Result<TaskId, SchedError> {
        let task = self.current_ref()?;
        let mut inner = task.inner();
        if inner.idle {
            return Err(SchedError::InvalidState);
        }
        inner.state = TaskState::Zombie;
        log::debug!("sched: task {} ({}) exited", task.id(), inner.name);
        Ok(task.id())
    }
}
