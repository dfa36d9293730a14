//! Events that drive the session

use crate::protocol::{InboundMessage, OptionId};

/// Events that trigger session transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Presentation intents
    UserText {
        text: String,
    },
    PickOption {
        option_id: OptionId,
    },
    /// Close the activities picker
    ActivitiesDone,
    RequestFinalize,
    /// Re-select an item out of the planning result
    ChooseFromResult {
        choice: ResultChoice,
    },
    /// Confirmation step; a success signal only, no payment happens
    ConfirmBooking,
    Close,

    // Channel events
    Inbound(InboundMessage),
    Connectivity {
        connected: bool,
    },

    // Timers
    PlanningTimeout {
        attempt: u32,
    },
}

/// An item of the final decision the user wants in their selections
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultChoice {
    Flight(OptionId),
    Hotel(OptionId),
    Activity(OptionId),
}
