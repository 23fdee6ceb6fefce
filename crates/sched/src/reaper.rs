//! 任务回收
//!
//! 任务退出时不能释放自己的槽位（它还在自己的栈上运行），
//! 所以退出路径只把任务标记为 Zombie 并交给回收者。
//! 回收者是一个普通的内核任务，在等待队列上睡眠，直到有 Zombie 需要处理，
//! 然后释放它们的槽位（以及架构层绑定在上下文上的资源）。

use alloc::collections::VecDeque;

use sync::SpinLock;

use crate::config::MAX_TASKS;
use crate::{SchedError, Scheduler, TaskId, TaskTable, WaitQueue};

/// Zombie 回收者
pub struct Reaper {
    zombies: SpinLock<VecDeque<TaskId>>,
    wq: WaitQueue,
}

impl Reaper {
    /// 创建回收者，Zombie 队列预留 `MAX_TASKS` 的容量
    pub fn new() -> Result<Self, SchedError> {
        let mut zombies = VecDeque::new();
        zombies
            .try_reserve(MAX_TASKS)
            .map_err(|_| SchedError::NoMemory)?;
        Ok(Self {
            zombies: SpinLock::new(zombies),
            wq: WaitQueue::new(),
        })
    }

    /// 登记一个已退出的任务，并唤醒回收者
    pub fn enqueue(&self, id: TaskId, sched: &Scheduler) {
        self.zombies.lock().push_back(id);
        self.wq.notify_one(sched);
    }

    /// 待回收的任务数量
    pub fn pending(&self) -> usize {
        self.zombies.lock().len()
    }

    /// 立即回收所有已登记的任务，返回成功回收的数量
    pub fn reap_pending(&self, tasks: &TaskTable) -> usize {
        let mut reaped = 0;
        // 一次只取一个，释放槽位时不持有 Zombie 队列的锁
        loop {
            let Some(id) = self.zombies.lock().pop_front() else {
                break;
            };
            match tasks.release(id) {
                Ok(()) => reaped += 1,
                Err(e) => log::error!("reaper: failed to release task {}: {}", id, e),
            }
        }
        reaped
    }

    /// 等待直到有 Zombie，然后回收它们
    pub fn run_once(&self, sched: &Scheduler) -> Result<usize, SchedError> {
        // 锁顺序：等待队列 -> Zombie 队列
        self.wq
            .wait(sched, || !self.zombies.lock().is_empty())?;
        let reaped = self.reap_pending(sched.tasks());
        log::debug!("reaper: reaped {} task(s)", reaped);
        Ok(reaped)
    }
}
