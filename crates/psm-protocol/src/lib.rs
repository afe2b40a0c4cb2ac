//! # PSM Protocol
//!
//! 手术臂（PSM）器械耦合相关的纯数据类型（无硬件依赖）
//!
//! ## 模块
//!
//! - `joints`: 关节向量、关节使能位向量、关节索引常量
//! - `coupling`: 执行器到关节的耦合矩阵
//! - `mapper`: 运动学关节 ↔ PID 关节映射（含蛇形器械）
//! - `units`: 配置单位（度/毫米）到 SI 单位（弧度/米）的转换
//!
//! ## 关节约定
//!
//! PID 侧始终为 7 个关节：
//!
//! ```text
//! 0, 1   外部偏航/俯仰（旋转）
//! 2      插入（平移，米）
//! 3      器械轴旋转
//! 4, 5   腕部
//! 6      夹爪（jaw）
//! ```

pub mod coupling;
pub mod error;
pub mod joints;
pub mod mapper;
pub mod units;

// 重新导出常用类型
pub use coupling::CouplingMatrix;
pub use error::ProtocolError;
pub use joints::*;
pub use mapper::{JointMapper, SNAKE_CONSTRAINT_TOLERANCE, ToolKind};
pub use units::{JointKind, PSM_JOINT_KINDS};
