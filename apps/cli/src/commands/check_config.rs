//! 配置校验命令
//!
//! 加载并校验器械配置文件，打印换算到 SI 单位后的摘要。

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use psm_protocol::units::MM;
use psm_tools::{ArmConfig, LimitSet};

/// 配置校验命令参数
#[derive(Args, Debug)]
pub struct CheckConfigCommand {
    /// 配置文件路径（TOML）
    pub file: PathBuf,
}

impl CheckConfigCommand {
    pub fn execute(&self) -> Result<()> {
        let config = ArmConfig::load_from_file(&self.file)
            .with_context(|| format!("Invalid configuration: {}", self.file.display()))?;

        println!("✅ {} is valid", self.file.display());
        print!("{}", summary(&config));
        Ok(())
    }
}

/// 配置摘要（SI 单位）
pub fn summary(config: &ArmConfig) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "tool: {:?} ({} kinematic joints)\n",
        config.tool,
        config.tool.kinematic_joints()
    ));
    out.push_str(&format!(
        "coupling: {}\n",
        if config.tool_coupling.is_identity() {
            "identity"
        } else {
            "custom"
        }
    ));
    out.push_str(&format!("engage lower (rad/m): {}\n", config.tool_engage_lower));
    out.push_str(&format!("engage upper (rad/m): {}\n", config.tool_engage_upper));
    push_limits(&mut out, "tool limits", &config.tool_limits);
    push_limits(&mut out, "no-tool limits", &config.no_tool_limits);
    out.push_str(&format!(
        "insertion threshold: {:.1} mm\n",
        config.tool_insertion_threshold / MM
    ));
    out.push_str(&format!("ack timeout: {}\n", fmt_timeout(config.ack_timeout)));
    out.push_str(&format!(
        "trajectory overrun: {}\n",
        fmt_timeout(config.trajectory_overrun)
    ));
    out
}

fn push_limits(out: &mut String, name: &str, limits: &LimitSet) {
    out.push_str(&format!("{} lower: {}\n", name, limits.joint_lower));
    out.push_str(&format!("{} upper: {}\n", name, limits.joint_upper));
    if let Some(torque) = &limits.torque {
        out.push_str(&format!("{} torque: {} .. {}\n", name, torque.lower, torque.upper));
    }
}

fn fmt_timeout(timeout: Option<std::time::Duration>) -> String {
    match timeout {
        Some(d) => format!("{:.1} s", d.as_secs_f64()),
        None => "disabled".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_of_example_config() {
        let config = ArmConfig::example().unwrap();
        let text = summary(&config);
        assert!(text.contains("Standard (6 kinematic joints)"));
        assert!(text.contains("coupling: custom"));
        assert!(text.contains("insertion threshold: 50.0 mm"));
        assert!(text.contains("no-tool limits lower"));
        assert!(!text.contains("no-tool limits torque"));
    }

    #[test]
    fn test_disabled_timeout() {
        assert_eq!(fmt_timeout(None), "disabled");
        assert_eq!(fmt_timeout(Some(std::time::Duration::from_secs(5))), "5.0 s");
    }
}
