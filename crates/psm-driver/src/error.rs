//! 驱动层错误类型定义

use psm_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 协议/维度错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 硬件写入或读取失败
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// 事件通道已关闭（硬件端退出）
    #[error("Event channel closed")]
    ChannelClosed,

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,

    /// 无效输入
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
