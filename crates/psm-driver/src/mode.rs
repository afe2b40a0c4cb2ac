//! 运行模式定义
//!
//! 区分真实硬件与仿真运行。仿真模式下耦合切换与接合动作直接跳过，
//! 不向 PID 控制器发出任何耦合相关请求。

use std::sync::atomic::{AtomicU8, Ordering};

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RunMode {
    /// 真实硬件（默认）
    #[default]
    Hardware = 0,

    /// 仿真
    ///
    /// 没有真实的执行器与编码器，硬件确认永远不会到达，
    /// 因此耦合切换与接合必须显式短路。
    Simulated = 1,
}

impl RunMode {
    /// 从 u8 转换
    ///
    /// 如果值无效，返回 Hardware 模式。
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Simulated,
            _ => Self::Hardware,
        }
    }

    /// 转换为 u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 是否为仿真模式
    pub fn is_simulated(self) -> bool {
        self == Self::Simulated
    }
}

/// 运行模式（原子版本，用于线程间共享）
///
/// # 示例
///
/// ```rust
/// use psm_driver::mode::{AtomicRunMode, RunMode};
/// use std::sync::atomic::Ordering;
///
/// let mode = AtomicRunMode::new(RunMode::Hardware);
/// mode.set(RunMode::Simulated, Ordering::Relaxed);
/// assert!(mode.get(Ordering::Relaxed).is_simulated());
/// ```
#[derive(Debug)]
pub struct AtomicRunMode {
    inner: AtomicU8,
}

impl AtomicRunMode {
    /// 创建新的原子模式
    pub fn new(mode: RunMode) -> Self {
        Self {
            inner: AtomicU8::new(mode.as_u8()),
        }
    }

    /// 获取当前模式
    pub fn get(&self, ordering: Ordering) -> RunMode {
        RunMode::from_u8(self.inner.load(ordering))
    }

    /// 设置模式
    pub fn set(&self, mode: RunMode, ordering: Ordering) {
        self.inner.store(mode.as_u8(), ordering);
    }
}

impl Default for AtomicRunMode {
    fn default() -> Self {
        Self::new(RunMode::default())
    }
}

impl Clone for AtomicRunMode {
    fn clone(&self) -> Self {
        Self::new(self.get(Ordering::Relaxed))
    }
}
