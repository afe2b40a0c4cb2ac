//! 运动学关节 ↔ PID 关节映射
//!
//! 运动学求解器使用的关节向量长度取决于器械类型：
//!
//! - 标准器械：6 个关节，直接拷贝到 PID 的前 6 个关节
//! - 蛇形器械：8 个关节，两对冗余关节以差动方式合并到 PID 关节 4、5
//!
//! ```text
//! pid[4] = k[4] + k[7]
//! pid[5] = k[5] + k[6]
//! ```
//!
//! 反向映射把每个 PID 值平均分配给对应的一对运动学关节。
//! 夹爪（PID 关节 6）不经过此映射，由单独维护的夹爪目标直接设置。

use crate::error::ProtocolError;
use crate::joints::{JointVector, NUM_PID_JOINTS};

/// 蛇形器械冗余关节对的允许偏差
pub const SNAKE_CONSTRAINT_TOLERANCE: f64 = 1e-5;

/// 器械类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ToolKind {
    /// 标准 6 自由度器械
    #[default]
    Standard,
    /// 蛇形冗余器械（8 个运动学关节）
    SnakeLike,
}

impl ToolKind {
    /// 根据配置中的 `snake_like` 字段选择
    pub fn from_snake_like(snake_like: bool) -> Self {
        if snake_like {
            ToolKind::SnakeLike
        } else {
            ToolKind::Standard
        }
    }

    /// 运动学关节数
    pub const fn kinematic_joints(self) -> usize {
        match self {
            ToolKind::Standard => 6,
            ToolKind::SnakeLike => 8,
        }
    }
}

/// 关节目标映射器
#[derive(Debug, Clone, Copy, Default)]
pub struct JointMapper {
    tool: ToolKind,
}

impl JointMapper {
    /// 创建映射器
    pub const fn new(tool: ToolKind) -> Self {
        Self { tool }
    }

    /// 器械类型
    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    /// 期望的运动学关节数
    pub fn kinematic_joints(&self) -> usize {
        self.tool.kinematic_joints()
    }

    /// 运动学关节 → PID 关节（7 个，夹爪位置为 0）
    ///
    /// # 错误
    ///
    /// 输入长度不等于 6（标准）或 8（蛇形）时返回 `ProtocolError::DimensionMismatch`。
    pub fn to_joints_pid(&self, kinematic: &[f64]) -> Result<JointVector, ProtocolError> {
        self.check_len(kinematic.len(), self.kinematic_joints())?;

        let mut pid = JointVector::zeros(NUM_PID_JOINTS);
        match self.tool {
            ToolKind::Standard => {
                pid[..6].copy_from_slice(kinematic);
            },
            ToolKind::SnakeLike => {
                pid[..4].copy_from_slice(&kinematic[..4]);
                pid[4] = kinematic[4] + kinematic[7];
                pid[5] = kinematic[5] + kinematic[6];
            },
        }
        Ok(pid)
    }

    /// PID 关节 → 运动学关节
    ///
    /// # 错误
    ///
    /// 输入长度不等于 7 时返回 `ProtocolError::DimensionMismatch`。
    pub fn to_joints_kinematics(&self, pid: &[f64]) -> Result<JointVector, ProtocolError> {
        self.check_len(pid.len(), NUM_PID_JOINTS)?;

        let kinematic = match self.tool {
            ToolKind::Standard => JointVector::from_slice(&pid[..6]),
            ToolKind::SnakeLike => {
                let half4 = pid[4] / 2.0;
                let half5 = pid[5] / 2.0;
                JointVector::from([pid[0], pid[1], pid[2], pid[3], half4, half5, half5, half4])
            },
        };
        Ok(kinematic)
    }

    /// 蛇形器械的等式约束偏差：`max(|k4 - k7|, |k5 - k6|)`
    ///
    /// 标准器械或长度不符时返回 `None`。
    pub fn snake_constraint_error(&self, kinematic: &[f64]) -> Option<f64> {
        if self.tool != ToolKind::SnakeLike || kinematic.len() != 8 {
            return None;
        }
        Some(
            (kinematic[4] - kinematic[7])
                .abs()
                .max((kinematic[5] - kinematic[6]).abs()),
        )
    }

    fn check_len(&self, actual: usize, expected: usize) -> Result<(), ProtocolError> {
        if actual != expected {
            return Err(ProtocolError::DimensionMismatch { expected, actual });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_to_pid() {
        let mapper = JointMapper::new(ToolKind::Standard);
        let pid = mapper
            .to_joints_pid(&[0.1, 0.2, 0.12, 0.4, 0.5, 0.6])
            .unwrap();
        assert_eq!(pid.as_slice(), &[0.1, 0.2, 0.12, 0.4, 0.5, 0.6, 0.0]);
    }

    #[test]
    fn test_standard_roundtrip() {
        let mapper = JointMapper::default();
        let kinematic = [0.3, -0.2, 0.1, 1.0, -0.7, 0.25];
        let pid = mapper.to_joints_pid(&kinematic).unwrap();
        let back = mapper.to_joints_kinematics(&pid).unwrap();
        assert_eq!(back.as_slice(), &kinematic);
    }

    #[test]
    fn test_snake_merge() {
        let mapper = JointMapper::new(ToolKind::SnakeLike);
        let pid = mapper
            .to_joints_pid(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8])
            .unwrap();
        assert_eq!(pid[0..4], [0.1, 0.2, 0.3, 0.4]);
        assert!((pid[4] - 1.3).abs() < 1e-12);
        assert!((pid[5] - 1.3).abs() < 1e-12);
        assert_eq!(pid[6], 0.0);
    }

    #[test]
    fn test_snake_split() {
        let mapper = JointMapper::new(ToolKind::SnakeLike);
        let kinematic = mapper
            .to_joints_kinematics(&[0.0, 0.0, 0.1, 0.0, 1.0, -0.5, 0.3])
            .unwrap();
        assert_eq!(kinematic.len(), 8);
        assert_eq!(kinematic[4], 0.5);
        assert_eq!(kinematic[7], 0.5);
        assert_eq!(kinematic[5], -0.25);
        assert_eq!(kinematic[6], -0.25);
        assert_eq!(mapper.snake_constraint_error(&kinematic), Some(0.0));
    }

    #[test]
    fn test_dimension_mismatch() {
        let standard = JointMapper::new(ToolKind::Standard);
        assert_eq!(
            standard.to_joints_pid(&[0.0; 8]),
            Err(ProtocolError::DimensionMismatch {
                expected: 6,
                actual: 8
            })
        );

        let snake = JointMapper::new(ToolKind::SnakeLike);
        assert_eq!(
            snake.to_joints_pid(&[0.0; 6]),
            Err(ProtocolError::DimensionMismatch {
                expected: 8,
                actual: 6
            })
        );
        assert!(snake.to_joints_kinematics(&[0.0; 6]).is_err());
    }

    #[test]
    fn test_tool_kind() {
        assert_eq!(ToolKind::from_snake_like(true), ToolKind::SnakeLike);
        assert_eq!(ToolKind::from_snake_like(false).kinematic_joints(), 6);
        assert_eq!(
            JointMapper::new(ToolKind::Standard).snake_constraint_error(&[0.0; 8]),
            None
        );
    }
}
