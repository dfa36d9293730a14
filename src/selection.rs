//! Selection sub-protocol
//!
//! Cardinality rules per option kind, enforced locally regardless of what
//! the service tracks: flights and hotels are exactly-one-of-N and a new
//! pick replaces the old one; activities are zero-or-more-of-N, accumulate
//! on pick, and the picker is closed with an explicit "done".
//!
//! Selection membership is always re-derived from `CollectedInfo`; no
//! separate selection state exists.

use crate::protocol::{CollectedInfo, OptionId, OptionSet, OptionsKind, OutboundMessage, TripOption};
use thiserror::Error;

/// How many options of a kind may be selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Exactly one; re-selecting replaces. The pick closes the option set.
    ExactlyOne,
    /// Zero or more; picks accumulate until "done".
    ZeroOrMore,
}

pub fn cardinality(kind: OptionsKind) -> Cardinality {
    match kind {
        OptionsKind::Flights | OptionsKind::Hotels => Cardinality::ExactlyOne,
        OptionsKind::Activities => Cardinality::ZeroOrMore,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("There is nothing to choose from right now")]
    NoActiveOptions,
    #[error("Option `{0}` is not one of the offered choices")]
    UnknownOption(OptionId),
    #[error("Choosing {0} takes a single pick, there is nothing to finish")]
    NotMultiSelect(OptionsKind),
    #[error("Pick at least one activity first")]
    NothingSelected,
}

/// Outcome of accepting a pick
#[derive(Debug, Clone, PartialEq)]
pub struct Pick {
    /// Message telling the service about the pick
    pub message: OutboundMessage,
    /// Whether the option set is satisfied and should be cleared
    pub closes_set: bool,
}

/// Apply a pick from `set` to `collected`.
///
/// The matching slot is updated optimistically; the service's next
/// `bot_response` overwrites it. Returns `Ok(None)` when the pick has no
/// effect (an activity that is already selected).
pub fn pick(
    set: &OptionSet,
    id: &str,
    collected: &mut CollectedInfo,
) -> Result<Option<Pick>, SelectionError> {
    let option = set
        .find(id)
        .ok_or_else(|| SelectionError::UnknownOption(id.to_string()))?;

    let pick = match option {
        TripOption::Flight(flight) => {
            collected.selected_flight = Some(flight.clone());
            Pick {
                message: OutboundMessage::SelectFlight {
                    flight: flight.clone(),
                },
                closes_set: true,
            }
        }
        TripOption::Hotel(hotel) => {
            collected.selected_hotel = Some(hotel.clone());
            Pick {
                message: OutboundMessage::SelectHotel {
                    hotel: hotel.clone(),
                },
                closes_set: true,
            }
        }
        TripOption::Activity(activity) => {
            if !collected.add_activity(activity.clone()) {
                return Ok(None);
            }
            Pick {
                message: OutboundMessage::SelectActivity {
                    activity: activity.clone(),
                },
                closes_set: false,
            }
        }
    };

    debug_assert_eq!(pick.closes_set, cardinality(set.kind) == Cardinality::ExactlyOne);
    Ok(Some(pick))
}

/// Identities currently selected for an option kind
pub fn selected_ids(kind: OptionsKind, collected: &CollectedInfo) -> Vec<OptionId> {
    match kind {
        OptionsKind::Flights => collected
            .selected_flight
            .iter()
            .map(|f| f.id.clone())
            .collect(),
        OptionsKind::Hotels => collected
            .selected_hotel
            .iter()
            .map(|h| h.id.clone())
            .collect(),
        OptionsKind::Activities => collected
            .selected_activities
            .iter()
            .map(|a| a.id.clone())
            .collect(),
    }
}

/// Whether the "done" action is available for the active set
pub fn done_enabled(set: Option<&OptionSet>, collected: &CollectedInfo) -> bool {
    set.is_some_and(|s| {
        cardinality(s.kind) == Cardinality::ZeroOrMore && !collected.selected_activities.is_empty()
    })
}

/// Validate the "done" action for the active set
pub fn finish(set: Option<&OptionSet>, collected: &CollectedInfo) -> Result<(), SelectionError> {
    let set = set.ok_or(SelectionError::NoActiveOptions)?;
    if cardinality(set.kind) == Cardinality::ExactlyOne {
        return Err(SelectionError::NotMultiSelect(set.kind));
    }
    if collected.selected_activities.is_empty() {
        return Err(SelectionError::NothingSelected);
    }
    Ok(())
}
