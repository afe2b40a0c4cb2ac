//! # 器械配置
//!
//! 从 TOML 文件加载器械相关配置，并转换为 SI 单位。
//!
//! ## 必需字段
//!
//! - `coupling`：7×7 执行器到关节耦合矩阵
//! - `tool_engage_position.{lower,upper}`：器械接合时最后 4 个关节的摆动位置
//! - `tool_joint_limit.{lower,upper}`：器械关节限位
//! - `tool_torque_limit.{lower,upper}`：器械力矩限位
//!
//! 缺少任一必需字段时加载失败，手臂不得继续初始化。
//!
//! ## 单位
//!
//! 配置文件中角度使用度、插入深度使用毫米，加载时转换为弧度/米；力矩不转换。

use psm_protocol::units::{MM, psm_to_si};
use psm_protocol::{CouplingMatrix, JointVector, NUM_ACTUATORS, NUM_PID_JOINTS, ProtocolError, ToolKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::safety::{LimitSet, TorqueLimits};

/// 内置示例配置（与 `configs/psm-tool.toml` 一致）
pub const EXAMPLE_TOML: &str = r#"
snake_like = false
coupling = [
    [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, -1.5632, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.0, 1.0186, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.0, -0.8306, 0.6089, 0.6089],
    [0.0, 0.0, 0.0, 0.0, 0.0, -1.2177, 1.2177],
]

[tool_engage_position]
lower = [0.0, 0.0, 0.0, -170.0, -45.0, -45.0, 10.0]
upper = [0.0, 0.0, 0.0, 170.0, 45.0, 45.0, 60.0]

[tool_joint_limit]
lower = [-91.0, -53.0, 0.0, -260.0, -80.0, -80.0, -20.0]
upper = [91.0, 53.0, 240.0, 260.0, 80.0, 80.0, 80.0]

[tool_torque_limit]
lower = [-3.0, -3.0, -3.0, -0.2, -0.2, -0.2, -0.2]
upper = [3.0, 3.0, 3.0, 0.2, 0.2, 0.2, 0.2]
"#;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 读取文件失败
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML 解析失败（包括缺少必需字段）
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// 向量长度错误
    #[error("\"{field}\" must contain {expected} elements, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// 耦合矩阵无效
    #[error("Invalid \"coupling\": {0}")]
    Coupling(#[from] ProtocolError),

    /// 数值无效
    #[error("Invalid value for \"{field}\": {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// 下限/上限向量对（配置单位）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowerUpper {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// 接合流程参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngageSettings {
    /// 插入关节超过此深度（毫米）时认为器械已手动插过耦合点，无需接合
    pub tool_insertion_threshold_mm: f64,
    /// 等待硬件确认（关节使能/耦合矩阵）的超时（秒），0 表示不限
    pub ack_timeout_s: f64,
    /// 轨迹超过预计完成时间多久（秒）视为失败，0 表示不限
    pub trajectory_overrun_s: f64,
}

impl Default for EngageSettings {
    fn default() -> Self {
        Self {
            tool_insertion_threshold_mm: 50.0,
            ack_timeout_s: 5.0,
            trajectory_overrun_s: 5.0,
        }
    }
}

/// 轨迹生成参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectorySettings {
    /// 前两个旋转关节最大速度（度/秒）
    pub base_velocity_deg_s: f64,
    /// 插入关节最大速度（毫米/秒）
    pub insertion_velocity_mm_s: f64,
    /// 最后 4 个关节最大速度（度/秒）
    pub engage_velocity_deg_s: f64,
    /// 旋转关节到达判定容差（度）
    pub goal_tolerance_deg: f64,
    /// 插入关节到达判定容差（毫米）
    pub goal_tolerance_mm: f64,
}

impl Default for TrajectorySettings {
    fn default() -> Self {
        Self {
            base_velocity_deg_s: 180.0,
            insertion_velocity_mm_s: 200.0,
            engage_velocity_deg_s: 3.0 * 360.0,
            goal_tolerance_deg: 3.0,
            goal_tolerance_mm: 1.0,
        }
    }
}

/// 配置文件原始结构（配置单位）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArmConfig {
    /// 蛇形器械
    #[serde(default)]
    pub snake_like: bool,
    /// 器械耦合矩阵
    pub coupling: Vec<Vec<f64>>,
    /// 器械接合摆动位置
    pub tool_engage_position: LowerUpper,
    /// 器械关节限位
    pub tool_joint_limit: LowerUpper,
    /// 器械力矩限位
    pub tool_torque_limit: LowerUpper,
    /// 无器械关节限位（可选，缺省使用内置值）
    #[serde(default)]
    pub no_tool_joint_limit: Option<LowerUpper>,
    #[serde(default)]
    pub engage: EngageSettings,
    #[serde(default)]
    pub trajectory: TrajectorySettings,
}

/// 校验后的配置（SI 单位）
#[derive(Debug, Clone)]
pub struct ArmConfig {
    /// 器械类型（决定运动学关节数）
    pub tool: ToolKind,
    /// 器械耦合矩阵
    pub tool_coupling: CouplingMatrix,
    /// 器械接合下摆位置
    pub tool_engage_lower: JointVector,
    /// 器械接合上摆位置
    pub tool_engage_upper: JointVector,
    /// 器械限位
    pub tool_limits: LimitSet,
    /// 无器械限位
    pub no_tool_limits: LimitSet,
    /// 器械免接合插入深度阈值（米）
    pub tool_insertion_threshold: f64,
    /// 硬件确认超时
    pub ack_timeout: Option<Duration>,
    /// 轨迹超时余量
    pub trajectory_overrun: Option<Duration>,
    /// 每个 PID 关节的轨迹最大速度（SI）
    pub trajectory_max_velocity: JointVector,
    /// 每个 PID 关节的轨迹到达容差（SI）
    pub trajectory_goal_tolerance: JointVector,
}

impl ArmConfig {
    /// 从文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// 从 TOML 字符串加载配置
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawArmConfig = toml::from_str(content)?;
        Self::from_raw(raw)
    }

    /// 内置示例配置
    pub fn example() -> Result<Self, ConfigError> {
        Self::from_toml_str(EXAMPLE_TOML)
    }

    /// 校验并转换为 SI 单位
    pub fn from_raw(raw: RawArmConfig) -> Result<Self, ConfigError> {
        let tool_coupling = CouplingMatrix::from_rows(&raw.coupling)?;
        if tool_coupling.dim() != NUM_ACTUATORS {
            return Err(ConfigError::InvalidLength {
                field: "coupling",
                expected: NUM_ACTUATORS,
                actual: tool_coupling.dim(),
            });
        }

        let tool_engage_lower = joint_vector("tool_engage_position.lower", &raw.tool_engage_position.lower)?;
        let tool_engage_upper = joint_vector("tool_engage_position.upper", &raw.tool_engage_position.upper)?;

        let tool_limits = LimitSet {
            joint_lower: joint_vector("tool_joint_limit.lower", &raw.tool_joint_limit.lower)?,
            joint_upper: joint_vector("tool_joint_limit.upper", &raw.tool_joint_limit.upper)?,
            torque: Some(TorqueLimits {
                lower: torque_vector("tool_torque_limit.lower", &raw.tool_torque_limit.lower)?,
                upper: torque_vector("tool_torque_limit.upper", &raw.tool_torque_limit.upper)?,
            }),
        };

        let no_tool_limits = match &raw.no_tool_joint_limit {
            Some(limits) => LimitSet {
                joint_lower: joint_vector("no_tool_joint_limit.lower", &limits.lower)?,
                joint_upper: joint_vector("no_tool_joint_limit.upper", &limits.upper)?,
                torque: None,
            },
            None => LimitSet::no_tool_default(),
        };

        let engage = &raw.engage;
        if !(engage.tool_insertion_threshold_mm.is_finite() && engage.tool_insertion_threshold_mm > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "engage.tool_insertion_threshold_mm",
                reason: format!("{} (must be > 0)", engage.tool_insertion_threshold_mm),
            });
        }

        let trajectory = &raw.trajectory;
        let velocities = [
            ("trajectory.base_velocity_deg_s", trajectory.base_velocity_deg_s),
            ("trajectory.insertion_velocity_mm_s", trajectory.insertion_velocity_mm_s),
            ("trajectory.engage_velocity_deg_s", trajectory.engage_velocity_deg_s),
        ];
        for (field, value) in velocities {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("{} (must be > 0)", value),
                });
            }
        }
        let base = trajectory.base_velocity_deg_s;
        let engage_velocity = trajectory.engage_velocity_deg_s;
        let trajectory_max_velocity: JointVector = psm_to_si(&[
            base,
            base,
            trajectory.insertion_velocity_mm_s,
            engage_velocity,
            engage_velocity,
            engage_velocity,
            engage_velocity,
        ])
        .into();

        let tolerances = [
            ("trajectory.goal_tolerance_deg", trajectory.goal_tolerance_deg),
            ("trajectory.goal_tolerance_mm", trajectory.goal_tolerance_mm),
        ];
        for (field, value) in tolerances {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("{} (must be >= 0)", value),
                });
            }
        }
        let deg = trajectory.goal_tolerance_deg;
        let trajectory_goal_tolerance: JointVector =
            psm_to_si(&[deg, deg, trajectory.goal_tolerance_mm, deg, deg, deg, deg]).into();

        Ok(Self {
            tool: ToolKind::from_snake_like(raw.snake_like),
            tool_coupling,
            tool_engage_lower,
            tool_engage_upper,
            tool_limits,
            no_tool_limits,
            tool_insertion_threshold: engage.tool_insertion_threshold_mm * MM,
            ack_timeout: optional_duration("engage.ack_timeout_s", engage.ack_timeout_s)?,
            trajectory_overrun: optional_duration(
                "engage.trajectory_overrun_s",
                engage.trajectory_overrun_s,
            )?,
            trajectory_max_velocity,
            trajectory_goal_tolerance,
        })
    }
}

/// 关节量：检查长度并转换为 SI 单位
fn joint_vector(field: &'static str, values: &[f64]) -> Result<JointVector, ConfigError> {
    check_len(field, values)?;
    Ok(psm_to_si(values).into())
}

/// 力矩量：只检查长度
fn torque_vector(field: &'static str, values: &[f64]) -> Result<JointVector, ConfigError> {
    check_len(field, values)?;
    Ok(JointVector::from_slice(values))
}

fn check_len(field: &'static str, values: &[f64]) -> Result<(), ConfigError> {
    if values.len() != NUM_PID_JOINTS {
        return Err(ConfigError::InvalidLength {
            field,
            expected: NUM_PID_JOINTS,
            actual: values.len(),
        });
    }
    Ok(())
}

fn optional_duration(field: &'static str, seconds: f64) -> Result<Option<Duration>, ConfigError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("{} (must be >= 0)", seconds),
        });
    }
    if seconds == 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(seconds)
        .map(Some)
        .map_err(|e| ConfigError::InvalidValue {
            field,
            reason: format!("{} ({})", seconds, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_example_config_loads() {
        let config = ArmConfig::example().unwrap();
        assert_eq!(config.tool, ToolKind::Standard);
        assert_eq!(config.tool_coupling.dim(), NUM_ACTUATORS);
        assert!(!config.tool_coupling.is_identity());
        assert!((config.tool_insertion_threshold - 0.05).abs() < 1e-12);
        assert_eq!(config.ack_timeout, Some(Duration::from_secs(5)));
        assert!(config.tool_limits.torque.is_some());
        assert!(config.no_tool_limits.torque.is_none());
    }

    #[test]
    fn test_units_are_converted() {
        let config = ArmConfig::example().unwrap();
        assert!((config.tool_engage_lower[3] + 170.0_f64.to_radians()).abs() < 1e-12);
        assert!((config.tool_limits.joint_upper[2] - 0.24).abs() < 1e-12);
        // 力矩不转换
        let torque = config.tool_limits.torque.unwrap();
        assert_eq!(torque.upper[0], 3.0);
        assert!((config.trajectory_max_velocity[2] - 0.2).abs() < 1e-12);
        assert!((config.trajectory_max_velocity[0] - std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn test_missing_required_field() {
        let content = EXAMPLE_TOML.replace("[tool_torque_limit]", "[unrelated]");
        let err = ArmConfig::from_toml_str(&content).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "{}", err);
        assert!(format!("{}", err).contains("tool_torque_limit"));
    }

    #[test]
    fn test_wrong_vector_length() {
        let content = EXAMPLE_TOML.replace(
            "lower = [0.0, 0.0, 0.0, -170.0, -45.0, -45.0, 10.0]",
            "lower = [0.0, 0.0, 0.0, -170.0]",
        );
        match ArmConfig::from_toml_str(&content) {
            Err(ConfigError::InvalidLength {
                field,
                expected,
                actual,
            }) => {
                assert_eq!(field, "tool_engage_position.lower");
                assert_eq!(expected, 7);
                assert_eq!(actual, 4);
            },
            other => panic!("Expected InvalidLength, got {:?}", other),
        }
    }

    #[test]
    fn test_non_square_coupling() {
        let content = EXAMPLE_TOML.replace(
            "[0.0, 0.0, 0.0, 0.0, 0.0, -1.2177, 1.2177],",
            "[0.0, 0.0, 0.0, 0.0, 0.0, -1.2177],",
        );
        let err = ArmConfig::from_toml_str(&content).unwrap_err();
        assert!(matches!(err, ConfigError::Coupling(ProtocolError::NotSquare { .. })));
    }

    #[test]
    fn test_zero_timeout_disables_bound() {
        let content = format!("{}\n[engage]\nack_timeout_s = 0.0\n", EXAMPLE_TOML);
        let config = ArmConfig::from_toml_str(&content).unwrap();
        assert_eq!(config.ack_timeout, None);
        assert_eq!(config.trajectory_overrun, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_oversized_timeout_is_rejected() {
        let content = format!("{}\n[engage]\nack_timeout_s = 1e20\n", EXAMPLE_TOML);
        match ArmConfig::from_toml_str(&content) {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "engage.ack_timeout_s"),
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_goal_tolerance_per_joint_units() {
        let config = ArmConfig::example().unwrap();
        let tolerance = &config.trajectory_goal_tolerance;
        assert_eq!(tolerance.len(), NUM_PID_JOINTS);
        assert!((tolerance[0] - 3.0_f64.to_radians()).abs() < 1e-12);
        // 插入关节按毫米换算
        assert!((tolerance[2] - 0.001).abs() < 1e-12);

        let content = format!("{}\n[trajectory]\ngoal_tolerance_mm = -1.0\n", EXAMPLE_TOML);
        assert!(matches!(
            ArmConfig::from_toml_str(&content),
            Err(ConfigError::InvalidValue {
                field: "trajectory.goal_tolerance_mm",
                ..
            })
        ));
    }

    #[test]
    fn test_snake_like_and_no_tool_override() {
        let content = EXAMPLE_TOML.replace("snake_like = false", "snake_like = true")
            + "\n[no_tool_joint_limit]\nlower = [-1.0, -1.0, 0.0, -1.0, -1.0, -1.0, -1.0]\nupper = [1.0, 1.0, 10.0, 1.0, 1.0, 1.0, 1.0]\n";
        let config = ArmConfig::from_toml_str(&content).unwrap();
        assert_eq!(config.tool, ToolKind::SnakeLike);
        assert!((config.no_tool_limits.joint_upper[2] - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(EXAMPLE_TOML.as_bytes()).unwrap();
        let config = ArmConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.tool_engage_upper.len(), NUM_PID_JOINTS);

        let err = ArmConfig::load_from_file("/nonexistent/psm.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
