//! Effects produced by session transitions

use crate::protocol::OutboundMessage;

/// Effects to be executed after a session transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a message to the planning service
    Send(OutboundMessage),

    /// Publish a fresh state snapshot to the presentation layer
    PublishSnapshot,

    /// Blocking, user-visible notice
    Alert { message: String },

    /// Start the planning timeout for this finalize attempt, if one is configured
    ArmPlanningTimeout { attempt: u32 },

    /// Tell the presentation layer connectivity changed
    ConnectivityChanged { connected: bool },

    /// Booking confirmed for this amount
    BookingConfirmed { total: f64 },

    /// Close the channel
    CloseChannel,
}

impl Effect {
    pub fn send(message: OutboundMessage) -> Self {
        Effect::Send(message)
    }

    pub fn alert(message: impl Into<String>) -> Self {
        Effect::Alert {
            message: message.into(),
        }
    }

    /// Whether this effect sends a finalize
    pub fn is_finalize(&self) -> bool {
        matches!(self, Effect::Send(OutboundMessage::Finalize))
    }
}
