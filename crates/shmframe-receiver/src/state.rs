use std::fmt;

use shmframe_wire::FrameDescriptor;

use crate::sink::StopReason;

/// Lifecycle of a [`FrameReceiver`](crate::FrameReceiver).
///
/// ```text
/// Idle ──start()──▶ AwaitingInit ──init message──▶ Streaming ◀─┐
///  ▲                     │                            │   └────┘ every message
///  │                     └────── stop() / map failure ┴──▶ Stopped
///  └──── failed start()                                    │
///                                  start() ◀───────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReceiverState {
    #[default]
    Idle,
    /// Connected and opened; no control message seen yet.
    AwaitingInit,
    /// Mapped; `descriptor` is from the most recent message.
    Streaming { descriptor: FrameDescriptor },
    Stopped { reason: StopReason },
}

impl ReceiverState {
    /// Whether an init message was observed since the last start.
    pub fn has_initialized(&self) -> bool {
        matches!(self, ReceiverState::Streaming { .. })
    }

    /// AwaitingInit or Streaming.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ReceiverState::AwaitingInit | ReceiverState::Streaming { .. }
        )
    }

    pub fn descriptor(&self) -> Option<&FrameDescriptor> {
        match self {
            ReceiverState::Streaming { descriptor } => Some(descriptor),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReceiverState::Idle => "idle",
            ReceiverState::AwaitingInit => "awaiting_init",
            ReceiverState::Streaming { .. } => "streaming",
            ReceiverState::Stopped { .. } => "stopped",
        }
    }
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiverState::Streaming { descriptor } => write!(f, "streaming ({descriptor})"),
            ReceiverState::Stopped { reason } => write!(f, "stopped ({reason})"),
            other => f.write_str(other.name()),
        }
    }
}
