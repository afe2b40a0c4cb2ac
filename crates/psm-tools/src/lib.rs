//! # PSM Tools - 共享配置与安全数据
//!
//! **依赖原则**: 只依赖 `psm-protocol`，避免依赖 `psm-client`
//!
//! ## 包含模块
//!
//! - `config` - 器械配置文件（TOML）加载与校验
//! - `safety` - 关节/力矩限位集合与跟踪误差容差档位（只读结构）

pub mod config;
pub mod safety;

// 重新导出常用类型
pub use config::{ArmConfig, ConfigError, EngageSettings, RawArmConfig, TrajectorySettings};
pub use safety::{LimitSet, ToleranceProfile, TrackingProfile};
