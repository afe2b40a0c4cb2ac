//! 仿真命令
//!
//! 在内存硬件上跑一次完整的接合流程：归零 → 装适配器 → 装器械 → `READY`。
//! 硬件确认由 mock PID 回报，轨迹由三次插值生成器给出。

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use clap::Args;
use psm_client::control::{CubicTrajectory, LoopConfig, StopReason, run_loop};
use psm_client::{
    ArmState, OperatorMessage, OperatorMessages, Psm, PsmHardware, PsmOptions, PsmStatus,
};
use psm_driver::RunMode;
use psm_driver::mock::{AckPolicy, MockHardware};
use psm_protocol::INSERTION_INDEX;
use psm_protocol::units::MM;
use psm_tools::ArmConfig;
use tracing::info;

/// 仿真命令参数
#[derive(Args, Debug)]
pub struct SimulateCommand {
    /// 配置文件（缺省使用内置示例）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 手臂名称
    #[arg(long, default_value = "PSM1")]
    pub name: String,

    /// 上电时适配器已经装好
    #[arg(long)]
    pub adapter_at_boot: bool,

    /// 装器械时的插入深度（毫米），超过阈值时跳过器械接合
    #[arg(long, default_value_t = 0.0)]
    pub insertion_mm: f64,

    /// 仿真运行模式（不下发耦合、不执行接合运动）
    #[arg(long)]
    pub simulated: bool,

    /// 控制频率（Hz）
    #[arg(long, default_value_t = 1000.0)]
    pub rate: f64,

    /// 每个阶段的最大周期数
    #[arg(long, default_value_t = 60_000)]
    pub max_ticks: u64,

    /// 按墙钟节拍运行
    #[arg(long)]
    pub realtime: bool,

    /// 让 mock 控制器回报不一致的使能确认
    #[arg(long)]
    pub ack_mismatch: bool,

    /// 以 JSON 输出最终状态
    #[arg(long)]
    pub json: bool,
}

impl SimulateCommand {
    pub fn execute(&self) -> Result<()> {
        let config = match &self.config {
            Some(path) => ArmConfig::load_from_file(path)
                .with_context(|| format!("Invalid configuration: {}", path.display()))?,
            None => ArmConfig::example()?,
        };

        let loop_config = LoopConfig {
            frequency_hz: self.rate,
            max_iterations: Some(self.max_ticks),
            realtime: self.realtime,
        };
        let trajectory = CubicTrajectory::from_config(&config, loop_config.period()?)?;

        let (hw, events) = MockHardware::new();
        hw.adapter.set_level(self.adapter_at_boot);
        if self.ack_mismatch {
            hw.pid.set_enable_ack(AckPolicy::Mismatch);
        }

        let (messages, inbox) = OperatorMessages::with_channel(self.name.clone(), 1024);
        let mode = if self.simulated {
            RunMode::Simulated
        } else {
            RunMode::Hardware
        };
        let hardware = PsmHardware::from_mock(&hw, events, Box::new(trajectory));
        let mut psm = Psm::new(
            config,
            hardware,
            PsmOptions::new(self.name.clone())
                .with_mode(mode)
                .with_messages(messages),
        )?;

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
            .context("Failed to install Ctrl-C handler")?;

        psm.mark_homed()?;
        psm.set_desired_state(ArmState::Ready)?;

        // 阶段一：适配器
        if !self.adapter_at_boot {
            hw.adapter.press()?;
        }
        let outcome = run_loop(&mut psm, &loop_config, |status| {
            should_stop(status, &running)
                || matches!(
                    status.current_state,
                    ArmState::AdapterEngaged | ArmState::Ready
                )
        })?;
        info!(iterations = outcome.iterations, "Adapter phase finished");

        // 阶段二：器械
        let status = psm.status();
        if status.current_state == ArmState::AdapterEngaged && running.load(Ordering::SeqCst) {
            if self.insertion_mm != 0.0 {
                // 器械插入时刀尖已经越过套管
                let mut measured = hw.pid.state().position.clone();
                measured[INSERTION_INDEX] = self.insertion_mm * MM;
                hw.pid.set_measured_position(measured);
            }
            hw.tool.press()?;
            let outcome = run_loop(&mut psm, &loop_config, |status| {
                should_stop(status, &running) || status.current_state == ArmState::Ready
            })?;
            info!(iterations = outcome.iterations, "Tool phase finished");
            if outcome.reason == StopReason::MaxIterations {
                info!("Tool phase hit the tick limit");
            }
        }

        let status = psm.status();
        let log: Vec<OperatorMessage> = inbox.try_iter().collect();
        self.report(&status, &log)?;

        if status.current_state != ArmState::Ready {
            bail!(
                "{} did not reach READY (state: {})",
                self.name,
                status.current_state
            );
        }
        Ok(())
    }

    fn report(&self, status: &PsmStatus, log: &[OperatorMessage]) -> Result<()> {
        if self.json {
            let report = serde_json::json!({
                "status": status,
                "messages": log,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        for message in log {
            println!("[{}] {}", message.level, message.text);
        }
        println!("state: {} (desired {})", status.current_state, status.desired_state);
        println!(
            "presence: adapter={} tool={}",
            status.adapter_present, status.tool_present
        );
        println!(
            "tolerance: {:?}, joint limit check: {}, tool limits: {}",
            status.tolerance_profile, status.check_joint_limit, status.tool_limits_active
        );
        println!("ticks: {}", status.tick);
        if let Some(failure) = &status.last_failure {
            println!("⚠️ last failure: {}", failure);
        }
        Ok(())
    }
}

/// 中断或回退都结束当前阶段
fn should_stop(status: &PsmStatus, running: &AtomicBool) -> bool {
    !running.load(Ordering::SeqCst) || status.last_failure.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_stop_on_failure_or_interrupt() {
        let running = AtomicBool::new(true);
        let mut status = PsmStatus::default();
        assert!(!should_stop(&status, &running));

        status.last_failure = Some("timeout".to_string());
        assert!(should_stop(&status, &running));

        status.last_failure = None;
        running.store(false, Ordering::SeqCst);
        assert!(should_stop(&status, &running));
    }
}
