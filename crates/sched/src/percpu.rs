//! Per-CPU 数据

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::SchedError;
use crate::config::MAX_CPUS;

/// 每个 CPU 一份的数据
///
/// 通过 [`get`](Self::get) 访问当前 CPU 的那一份。访问期间如果可能被迁移到
/// 其它 CPU，调用者需要先进入 [`sync::PreemptGuard`]。
pub struct PerCpu<T> {
    data: Box<[T]>,
}

impl<T> PerCpu<T> {
    /// 为每个 CPU 调用 `init` 构造一份数据
    pub fn try_new<F>(mut init: F) -> Result<Self, SchedError>
    where
        F: FnMut(usize) -> Result<T, SchedError>,
    {
        let mut data = Vec::new();
        data.try_reserve_exact(MAX_CPUS)
            .map_err(|_| SchedError::NoMemory)?;
        for cpu in 0..MAX_CPUS {
            data.push(init(cpu)?);
        }
        Ok(Self {
            data: data.into_boxed_slice(),
        })
    }

    /// 当前 CPU 的数据
    ///
    /// # Panics
    /// 当前 CPU 编号超出 `MAX_CPUS` 时 panic
    pub fn get(&self) -> &T {
        &self.data[sync::cpu_id()]
    }

    /// 指定 CPU 的数据
    pub fn get_of(&self, cpu: usize) -> Option<&T> {
        self.data.get(cpu)
    }

    /// 遍历所有 CPU 的数据
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::setup;

    #[test]
    fn test_per_cpu_init_and_get() {
        setup();
        let per_cpu = PerCpu::try_new(|cpu| Ok(cpu * 10 + 1)).unwrap();
        assert_eq!(*per_cpu.get(), 1);
        assert_eq!(per_cpu.get_of(0), Some(&1));
        assert_eq!(per_cpu.get_of(MAX_CPUS), None);
        assert_eq!(per_cpu.iter().count(), MAX_CPUS);
    }

    #[test]
    fn test_per_cpu_init_error() {
        let res = PerCpu::<usize>::try_new(|_| Err(SchedError::NoFreeSlot));
        assert!(matches!(res, Err(SchedError::NoFreeSlot)));
    }
}
