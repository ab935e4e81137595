use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use super::ChannelError;

// ============================================================================
// Control Channel - duplex, message-oriented pipe
// ============================================================================
//
// `duplex()` returns two connected endpoints. Whatever one end sends, the
// other receives, in order. Frames are JSON values so that malformed input
// from a control surface reaches the supervisor intact and can be rejected
// there with a diagnostic instead of failing at the transport.
//
// Both directions are unbounded: output capture must never block a writer
// and must never drop a line.
//
// ============================================================================

pub fn duplex() -> (ControlChannel, ControlChannel) {
    let (left_tx, right_rx) = mpsc::unbounded_channel();
    let (right_tx, left_rx) = mpsc::unbounded_channel();

    (
        ControlChannel {
            tx: ControlSender { tx: left_tx },
            rx: ControlReceiver { rx: left_rx },
        },
        ControlChannel {
            tx: ControlSender { tx: right_tx },
            rx: ControlReceiver { rx: right_rx },
        },
    )
}

/// One end of a duplex control channel
pub struct ControlChannel {
    tx: ControlSender,
    rx: ControlReceiver,
}

impl ControlChannel {
    /// A cloneable handle for sending to the peer
    pub fn sender(&self) -> ControlSender {
        self.tx.clone()
    }

    pub fn send<M: Serialize>(&self, message: &M) -> Result<(), ChannelError> {
        self.tx.send(message)
    }

    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Option<Value>, ChannelError> {
        self.rx.try_recv()
    }

    pub fn into_split(self) -> (ControlSender, ControlReceiver) {
        (self.tx, self.rx)
    }
}

#[derive(Clone)]
pub struct ControlSender {
    tx: UnboundedSender<Value>,
}

impl ControlSender {
    pub fn send<M: Serialize>(&self, message: &M) -> Result<(), ChannelError> {
        let frame = serde_json::to_value(message)?;
        self.send_frame(frame)
    }

    /// Forward a raw frame without inspecting it
    pub fn send_frame(&self, frame: Value) -> Result<(), ChannelError> {
        self.tx.send(frame).map_err(|_| ChannelError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct ControlReceiver {
    rx: UnboundedReceiver<Value>,
}

impl ControlReceiver {
    /// Wait for the next frame. `None` once every peer sender is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Non-blocking poll. `Ok(None)` when nothing is pending.
    pub fn try_recv(&mut self) -> Result<Option<Value>, ChannelError> {
        match self.rx.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ChannelError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlMessage;
    use serde_json::json;

    #[tokio::test]
    async fn test_frames_flow_both_ways_in_order() {
        let (mut supervisor_end, mut surface_end) = duplex();

        surface_end.send(&ControlMessage::Start).unwrap();
        surface_end.send(&ControlMessage::Stop).unwrap();
        supervisor_end.send(&ControlMessage::output(crate::process::Role::Trainer, "hello")).unwrap();

        assert_eq!(supervisor_end.recv().await, Some(json!({ "kind": "Start" })));
        assert_eq!(supervisor_end.recv().await, Some(json!({ "kind": "Stop" })));
        assert_eq!(
            surface_end.recv().await,
            Some(json!({ "kind": "LearnerOutput", "data": "hello" }))
        );
    }

    #[tokio::test]
    async fn test_try_recv_reports_empty_then_closed() {
        let (mut supervisor_end, surface_end) = duplex();

        assert!(matches!(supervisor_end.try_recv(), Ok(None)));

        surface_end.sender().send_frame(json!({ "no": "kind" })).unwrap();
        assert_eq!(supervisor_end.try_recv().unwrap(), Some(json!({ "no": "kind" })));

        drop(surface_end);
        assert!(matches!(supervisor_end.try_recv(), Err(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn test_send_fails_once_peer_receiver_dropped() {
        let (supervisor_end, surface_end) = duplex();
        let (_surface_tx, surface_rx) = surface_end.into_split();
        drop(surface_rx);

        let sender = supervisor_end.sender();
        assert!(sender.is_closed());
        assert!(matches!(
            sender.send(&ControlMessage::Start),
            Err(ChannelError::Closed)
        ));
    }
}
