//! Loop Runner - 控制循环包装器
//!
//! 以固定频率驱动 [`Psm::tick`]，直到停止条件成立或达到最大迭代次数。
//!
//! # 时间
//!
//! 传给 `tick` 的时间戳是虚拟时钟（每周期前进一个标称周期），因此仿真结果与墙钟无关；
//! `realtime` 打开时用 `spin_sleep` 按绝对时间锚点睡眠，保证实际频率。
//!
//! # 示例
//!
//! ```rust,ignore
//! use psm_client::control::{LoopConfig, run_loop};
//! use psm_client::ArmState;
//!
//! let config = LoopConfig {
//!     frequency_hz: 1000.0,
//!     max_iterations: Some(10_000),
//!     realtime: false,
//! };
//! let outcome = run_loop(&mut psm, &config, |status| status.current_state == ArmState::Ready)?;
//! ```

use std::time::{Duration, Instant};

use spin_sleep::SpinSleeper;
use tracing::{debug, warn};

use crate::error::PsmError;
use crate::observer::PsmStatus;
use crate::psm::Psm;

/// 控制循环配置
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// 控制频率（Hz）
    pub frequency_hz: f64,

    /// 最大迭代次数（None 表示无限循环）
    pub max_iterations: Option<u64>,

    /// 是否按墙钟睡眠（关闭时尽快执行，用于仿真与测试）
    pub realtime: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        LoopConfig {
            frequency_hz: 1000.0,
            max_iterations: None,
            realtime: true,
        }
    }
}

impl LoopConfig {
    /// 标称周期
    ///
    /// # 错误
    ///
    /// 频率不是正有限值时返回 `PsmError::InvalidLoopConfig`。
    pub fn period(&self) -> Result<Duration, PsmError> {
        // ✅ 输入验证
        if !self.frequency_hz.is_finite() || self.frequency_hz <= 0.0 {
            return Err(PsmError::InvalidLoopConfig(format!(
                "Invalid frequency_hz: {} (must be > 0)",
                self.frequency_hz
            )));
        }
        if self.frequency_hz > 10000.0 {
            warn!(
                "Very high control frequency: {} Hz. This may cause performance issues.",
                self.frequency_hz
            );
        }
        Duration::try_from_secs_f64(1.0 / self.frequency_hz).map_err(|e| {
            PsmError::InvalidLoopConfig(format!(
                "Invalid frequency_hz: {} ({})",
                self.frequency_hz, e
            ))
        })
    }
}

/// 停止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 停止条件成立
    Predicate,
    /// 达到最大迭代次数
    MaxIterations,
}

/// 循环结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOutcome {
    pub iterations: u64,
    pub reason: StopReason,
}

/// 运行控制循环
///
/// 每个周期结束后用最新状态快照调用 `should_stop`。`tick` 返回错误时立即停止并返回该错误
/// （状态机已切到回退状态）。
pub fn run_loop<F>(psm: &mut Psm, config: &LoopConfig, mut should_stop: F) -> Result<LoopOutcome, PsmError>
where
    F: FnMut(&PsmStatus) -> bool,
{
    let period = config.period()?;
    let sleeper = SpinSleeper::default();

    let mut now = psm.now();
    let mut next_tick = Instant::now();
    let mut iteration = 0u64;

    loop {
        if let Some(max_iter) = config.max_iterations
            && iteration >= max_iter
        {
            debug!(iteration, "Control loop reached max iterations");
            return Ok(LoopOutcome {
                iterations: iteration,
                reason: StopReason::MaxIterations,
            });
        }

        now += period;
        psm.tick(now)?;
        iteration += 1;

        if should_stop(&psm.status()) {
            return Ok(LoopOutcome {
                iterations: iteration,
                reason: StopReason::Predicate,
            });
        }

        if config.realtime {
            // 绝对时间锚点，消除累积漂移
            next_tick += period;
            let wall = Instant::now();
            if next_tick > wall {
                sleeper.sleep(next_tick - wall);
            } else {
                // ⚠️ 超时：重置锚点，避免后续累积延迟
                next_tick = wall;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_frequency() {
        for frequency_hz in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e-300] {
            let config = LoopConfig {
                frequency_hz,
                ..LoopConfig::default()
            };
            assert!(matches!(config.period(), Err(PsmError::InvalidLoopConfig(_))));
        }
    }

    #[test]
    fn test_period() {
        let config = LoopConfig {
            frequency_hz: 500.0,
            ..LoopConfig::default()
        };
        assert_eq!(config.period().unwrap(), Duration::from_millis(2));
        assert!(LoopConfig::default().realtime);
    }
}
