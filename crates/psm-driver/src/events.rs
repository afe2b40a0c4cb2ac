//! 硬件异步事件邮箱
//!
//! PID 控制器的确认（关节使能、耦合矩阵）与到位按钮的边沿事件可能在其他线程产生，
//! 控制周期开始时一次性取出。发送端不阻塞。
//!
//! # 使用示例
//!
//! ```rust
//! use psm_driver::events::{event_channel, HardwareEvent};
//! use psm_driver::buttons::ButtonEvent;
//!
//! let (tx, rx) = event_channel();
//! tx.send(HardwareEvent::ToolButton(ButtonEvent::Pressed)).unwrap();
//!
//! // 在控制周期中
//! let events: Vec<_> = rx.drain().collect();
//! assert_eq!(events.len(), 1);
//! ```

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, unbounded};
use psm_protocol::{CouplingMatrix, JointMask};
use tracing::warn;

use crate::buttons::ButtonEvent;
use crate::error::DriverError;

/// 硬件事件
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareEvent {
    /// PID 报告的关节使能位向量
    EnabledJointsChanged(JointMask),
    /// PID 报告的耦合矩阵
    CouplingChanged(CouplingMatrix),
    /// 无菌适配器按钮
    AdapterButton(ButtonEvent),
    /// 器械按钮
    ToolButton(ButtonEvent),
}

/// 事件发送端（可克隆，跨线程）
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<HardwareEvent>,
}

impl EventSender {
    /// 投递事件（非阻塞）
    ///
    /// 接收端已销毁时返回 `DriverError::ChannelClosed`。
    pub fn send(&self, event: HardwareEvent) -> Result<(), DriverError> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Disconnected(event)) => {
                warn!(?event, "Event mailbox closed, dropping hardware event");
                Err(DriverError::ChannelClosed)
            },
            // 无界通道不会满
            Err(TrySendError::Full(_)) => Err(DriverError::Hardware("event mailbox full".to_string())),
        }
    }
}

/// 事件接收端（控制线程持有）
#[derive(Debug)]
pub struct EventReceiver {
    rx: Receiver<HardwareEvent>,
}

impl EventReceiver {
    /// 取出当前所有待处理事件（不阻塞）
    pub fn drain(&self) -> impl Iterator<Item = HardwareEvent> + '_ {
        self.rx.try_iter()
    }

    /// 取出一个事件
    ///
    /// 队列为空返回 `Ok(None)`，所有发送端都已销毁返回 `DriverError::ChannelClosed`。
    pub fn try_recv(&self) -> Result<Option<HardwareEvent>, DriverError> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(DriverError::ChannelClosed),
        }
    }

    /// 待处理事件数量
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// 是否没有待处理事件
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// 创建事件邮箱
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = unbounded();
    (EventSender { tx }, EventReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_order() {
        let (tx, rx) = event_channel();
        tx.send(HardwareEvent::EnabledJointsChanged(JointMask::engage_disabled()))
            .unwrap();
        tx.send(HardwareEvent::CouplingChanged(CouplingMatrix::identity(7)))
            .unwrap();
        assert_eq!(rx.len(), 2);

        let events: Vec<_> = rx.drain().collect();
        assert!(matches!(events[0], HardwareEvent::EnabledJointsChanged(_)));
        assert!(matches!(events[1], HardwareEvent::CouplingChanged(_)));
        assert!(rx.is_empty());
    }

    #[test]
    fn test_sender_is_cloneable_across_threads() {
        let (tx, rx) = event_channel();
        let tx2 = tx.clone();
        let handle = std::thread::spawn(move || {
            tx2.send(HardwareEvent::AdapterButton(ButtonEvent::Pressed))
                .unwrap();
        });
        handle.join().unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Some(HardwareEvent::AdapterButton(ButtonEvent::Pressed))
        );
        assert_eq!(rx.try_recv().unwrap(), None);
    }

    #[test]
    fn test_closed_channel() {
        let (tx, rx) = event_channel();
        drop(rx);
        assert!(matches!(
            tx.send(HardwareEvent::ToolButton(ButtonEvent::Released)),
            Err(DriverError::ChannelClosed)
        ));

        let (tx, rx) = event_channel();
        drop(tx);
        assert!(matches!(rx.try_recv(), Err(DriverError::ChannelClosed)));
    }
}
