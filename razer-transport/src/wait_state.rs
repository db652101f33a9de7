//! Request/response correlation for notification-based transports
//!
//! A [`WaitState`] is armed in the transport's [`WaitSlot`] before the request
//! is written. Every notification is handed to the armed state, which
//! reassembles the response and resolves its [`WaitHandle`] with the decoded
//! value (or a decode error).

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{ProtocolError, Result};
use crate::protocol::{ble, ResponseStatus};

/// How the response to a request is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `[cmd][status]` where status 0 means the write was applied
    Acknowledgement,
    /// `[cmd][declared length]` followed by the payload in later fragments
    Payload,
}

/// Lifecycle of a wait state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPhase {
    Armed,
    Accumulating { declared: usize, received: usize },
    Resolved,
}

type Decoder<T> = Box<dyn Fn(&[u8]) -> Result<T> + Send>;

/// Pending request resolved by a type-specific decode function
pub struct WaitState<T> {
    command_id: u8,
    shape: ResponseShape,
    phase: WaitPhase,
    buffer: Vec<u8>,
    decode: Decoder<T>,
    completion: Option<oneshot::Sender<Result<T>>>,
}

/// Receiving end of a [`WaitState`]
pub struct WaitHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> WaitHandle<T> {
    /// Resolves once the wait state does. A wait state that is dropped
    /// unresolved yields `Cancelled`.
    pub async fn wait(self) -> Result<T> {
        self.rx.await.unwrap_or(Err(ProtocolError::Cancelled))
    }
}

impl<T: Send + 'static> WaitState<T> {
    pub fn new<D>(command_id: u8, decode: D) -> (Self, WaitHandle<T>)
    where
        D: Fn(&[u8]) -> Result<T> + Send + 'static,
    {
        Self::with_shape(command_id, ResponseShape::Payload, decode)
    }

    fn with_shape<D>(command_id: u8, shape: ResponseShape, decode: D) -> (Self, WaitHandle<T>)
    where
        D: Fn(&[u8]) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let state = Self {
            command_id,
            shape,
            phase: WaitPhase::Armed,
            buffer: Vec::with_capacity(ble::RESPONSE_BUFFER_SIZE),
            decode: Box::new(decode),
            completion: Some(tx),
        };
        (state, WaitHandle { rx })
    }

    pub fn command_id(&self) -> u8 {
        self.command_id
    }

    pub fn phase(&self) -> WaitPhase {
        self.phase
    }

    fn resolve(&mut self, result: Result<T>) {
        self.phase = WaitPhase::Resolved;
        if let Some(tx) = self.completion.take() {
            // Receiver gone means the caller stopped waiting
            let _ = tx.send(result);
        }
    }

    fn finish(&mut self) {
        let result = (self.decode)(&self.buffer);
        self.resolve(result);
    }

    /// Feed one notification
    pub fn handle_packet(&mut self, data: &[u8]) {
        match self.phase {
            WaitPhase::Resolved => {}
            WaitPhase::Armed => {
                if data.len() < 2 {
                    self.resolve(Err(ProtocolError::invalid_payload(format!(
                        "notification of {} bytes is too short",
                        data.len()
                    ))));
                    return;
                }
                if data[0] != self.command_id {
                    trace!(
                        "Ignoring notification for 0x{:02X} while waiting for 0x{:02X}",
                        data[0],
                        self.command_id
                    );
                    return;
                }
                match self.shape {
                    ResponseShape::Acknowledgement if data[1] == 0 => self.finish(),
                    ResponseShape::Acknowledgement => {
                        debug!(
                            "Command 0x{:02X} acknowledged with status 0x{:02X}",
                            self.command_id, data[1]
                        );
                        self.resolve(Err(ProtocolError::Rejected {
                            status: ResponseStatus::Failure,
                        }));
                    }
                    ResponseShape::Payload if data[1] == 0 => self.finish(),
                    // The header fragment carries no payload bytes
                    ResponseShape::Payload => {
                        self.buffer.clear();
                        self.phase = WaitPhase::Accumulating {
                            declared: data[1] as usize,
                            received: 0,
                        };
                    }
                }
            }
            WaitPhase::Accumulating { declared, received } => {
                let take = (declared - received).min(data.len());
                self.buffer.extend_from_slice(&data[..take]);
                let received = received + take;
                if received == declared {
                    self.finish();
                } else {
                    self.phase = WaitPhase::Accumulating { declared, received };
                }
            }
        }
    }
}

impl WaitState<()> {
    /// Wait state for a write request acknowledged by `[cmd][0x00]`
    pub fn acknowledgement(command_id: u8) -> (Self, WaitHandle<()>) {
        Self::with_shape(command_id, ResponseShape::Acknowledgement, |_| Ok(()))
    }
}

/// Type-erased view of a wait state, as stored in the slot
trait PacketHandler: Send {
    fn handle_packet(&mut self, data: &[u8]);
    fn is_resolved(&self) -> bool;
}

impl<T: Send + 'static> PacketHandler for WaitState<T> {
    fn handle_packet(&mut self, data: &[u8]) {
        WaitState::handle_packet(self, data);
    }

    fn is_resolved(&self) -> bool {
        self.phase == WaitPhase::Resolved
    }
}

/// Single-slot mailbox holding the wait state of the in-flight request
#[derive(Default)]
pub struct WaitSlot {
    current: Mutex<Option<Box<dyn PacketHandler>>>,
}

impl WaitSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `state`. The returned guard empties the slot when dropped, which
    /// cancels the state if it has not resolved yet.
    pub fn arm<T: Send + 'static>(&self, state: WaitState<T>) -> Result<SlotGuard<'_>> {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|s| !s.is_resolved()) {
            return Err(ProtocolError::InFlight);
        }
        *current = Some(Box::new(state));
        Ok(SlotGuard { slot: self })
    }

    /// Hand a notification to the armed state. Returns false if none is armed.
    pub fn dispatch(&self, data: &[u8]) -> bool {
        match self.current.lock().as_mut() {
            Some(state) => {
                state.handle_packet(data);
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.current.lock().is_some()
    }

    pub fn clear(&self) {
        self.current.lock().take();
    }
}

/// Clears the [`WaitSlot`] on drop
pub struct SlotGuard<'a> {
    slot: &'a WaitSlot,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.slot.clear();
    }
}
