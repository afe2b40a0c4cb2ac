//! 操作员消息
//!
//! 状态/警告/错误文本一方面写入 `tracing` 日志，另一方面以非阻塞方式转发给订阅者
//! （例如界面或 CLI）。订阅通道满时丢弃消息，不阻塞控制周期。

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::fmt;
use tracing::{debug, error, info, warn};

/// 消息等级
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageLevel {
    Status,
    Warning,
    Error,
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageLevel::Status => write!(f, "status"),
            MessageLevel::Warning => write!(f, "warning"),
            MessageLevel::Error => write!(f, "error"),
        }
    }
}

/// 操作员消息
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OperatorMessage {
    pub level: MessageLevel,
    pub text: String,
}

/// 操作员消息发送端
#[derive(Debug, Clone)]
pub struct OperatorMessages {
    name: String,
    sink: Option<Sender<OperatorMessage>>,
}

impl OperatorMessages {
    /// 只写日志
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sink: None,
        }
    }

    /// 写日志并转发到容量为 `capacity` 的通道
    pub fn with_channel(name: impl Into<String>, capacity: usize) -> (Self, Receiver<OperatorMessage>) {
        let (tx, rx) = bounded(capacity);
        (
            Self {
                name: name.into(),
                sink: Some(tx),
            },
            rx,
        )
    }

    /// 手臂名（消息前缀）
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self, text: impl AsRef<str>) {
        self.emit(MessageLevel::Status, text.as_ref());
    }

    pub fn warning(&self, text: impl AsRef<str>) {
        self.emit(MessageLevel::Warning, text.as_ref());
    }

    pub fn error(&self, text: impl AsRef<str>) {
        self.emit(MessageLevel::Error, text.as_ref());
    }

    pub fn emit(&self, level: MessageLevel, text: &str) {
        let text = format!("{}: {}", self.name, text);
        match level {
            MessageLevel::Status => info!(target: "psm_client::operator", "{}", text),
            MessageLevel::Warning => warn!(target: "psm_client::operator", "{}", text),
            MessageLevel::Error => error!(target: "psm_client::operator", "{}", text),
        }

        if let Some(sink) = &self.sink {
            // ✅ 使用 try_send，非阻塞
            match sink.try_send(OperatorMessage { level, text }) {
                Ok(()) => {},
                Err(TrySendError::Full(message)) => {
                    debug!("Operator message channel full, dropping: {}", message.text)
                },
                Err(TrySendError::Disconnected(_)) => {},
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_prefixed_and_forwarded() {
        let (messages, rx) = OperatorMessages::with_channel("PSM1", 8);
        messages.status("engaging adapter 1 of 4");
        messages.warning("can't set coupling");

        let first = rx.try_recv().unwrap();
        assert_eq!(first.level, MessageLevel::Status);
        assert_eq!(first.text, "PSM1: engaging adapter 1 of 4");
        assert_eq!(rx.try_recv().unwrap().level, MessageLevel::Warning);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_channel_never_blocks() {
        let (messages, rx) = OperatorMessages::with_channel("PSM1", 1);
        messages.status("one");
        messages.error("two");
        assert_eq!(rx.len(), 1);
        assert_eq!(rx.try_recv().unwrap().text, "PSM1: one");
    }

    #[test]
    fn test_log_only() {
        let messages = OperatorMessages::new("PSM2");
        messages.error("no subscriber");
        assert_eq!(messages.name(), "PSM2");
    }
}
