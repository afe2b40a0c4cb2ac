//! # PSM Client
//!
//! PSM 器械耦合与接合子系统的高层客户端。
//!
//! ## 模块
//!
//! - `state`: 表驱动状态机与手臂状态
//! - `control`: 安全包络、耦合切换、接合动作、轨迹生成、控制循环
//! - `psm`: 组合以上部件的接合状态机 [`Psm`]
//! - `messages`: 操作员状态/警告/错误消息
//! - `observer`: 无锁状态快照
//!
//! ## 快速开始
//!
//! ```rust,ignore
//! use psm_client::{ArmState, Psm, PsmHardware, PsmOptions};
//! use psm_client::control::{LoopConfig, run_loop};
//! use psm_tools::ArmConfig;
//!
//! let config = ArmConfig::load_from_file("configs/psm-tool.toml")?;
//! let mut psm = Psm::new(config, hardware, PsmOptions::new("PSM1"))?;
//! psm.mark_homed()?;
//! psm.set_desired_state(ArmState::Ready)?;
//! run_loop(&mut psm, &LoopConfig::default(), |s| s.current_state == ArmState::Ready)?;
//! ```

pub mod control;
pub mod error;
pub mod messages;
pub mod observer;
pub mod psm;
pub mod state;

// 重新导出常用类型
pub use error::PsmError;
pub use messages::{MessageLevel, OperatorMessage, OperatorMessages};
pub use observer::{PsmStatus, StatusObserver};
pub use psm::{Psm, PsmHardware, PsmOptions};
pub use state::{ArmState, NeedEngageFlags, PresenceFlags};
