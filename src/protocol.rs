//! Wire protocol for the planning service channel
//!
//! One JSON object per frame, discriminated by its `type` field. Inbound
//! frames with an unrecognized `type` decode to `None` and are ignored.
//! Option payloads keep any fields we don't model in `extra` so a picked
//! option is echoed back to the service exactly as it was offered.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Stable opaque identity of an offered option
pub type OptionId = String;

// ============================================================================
// Trip data
// ============================================================================

/// Trip parameters and current selections, as reported by the service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectedInfo {
    #[serde(default)]
    pub departure_city: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default, deserialize_with = "de::opt_number")]
    pub budget: Option<f64>,
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub selected_flight: Option<Flight>,
    #[serde(default)]
    pub selected_hotel: Option<Hotel>,
    #[serde(default, deserialize_with = "de::null_default")]
    pub selected_activities: Vec<Activity>,
}

impl CollectedInfo {
    /// Append an activity unless one with the same identity is already selected.
    ///
    /// Returns `true` if the list changed.
    pub fn add_activity(&mut self, activity: Activity) -> bool {
        if self.has_activity(&activity.id) {
            return false;
        }
        self.selected_activities.push(activity);
        true
    }

    pub fn has_activity(&self, id: &str) -> bool {
        self.selected_activities.iter().any(|a| a.id == id)
    }

    /// Whether any of the three selection slots is filled
    pub fn has_selections(&self) -> bool {
        self.selected_flight.is_some()
            || self.selected_hotel.is_some()
            || !self.selected_activities.is_empty()
    }
}

/// Hotel or venue rating; the service sends either a score or a label like "N/A"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rating {
    Score(f64),
    Label(String),
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rating::Score(score) => write!(f, "{score}"),
            Rating::Label(label) => f.write_str(label),
        }
    }
}

/// A flight offer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Flight {
    #[serde(default, deserialize_with = "de::text")]
    pub id: OptionId,
    #[serde(default, deserialize_with = "de::text")]
    pub airline: String,
    #[serde(default, deserialize_with = "de::text")]
    pub departure_time: String,
    #[serde(default, deserialize_with = "de::text")]
    pub arrival_time: String,
    #[serde(default, deserialize_with = "de::text")]
    pub duration: String,
    #[serde(default, deserialize_with = "de::count")]
    pub stops: u32,
    #[serde(default, deserialize_with = "de::number")]
    pub price: f64,
    #[serde(default, deserialize_with = "de::text")]
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure_airport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival_airport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aircraft: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cabin: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A hotel offer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hotel {
    #[serde(default, deserialize_with = "de::text")]
    pub id: OptionId,
    #[serde(default, deserialize_with = "de::text")]
    pub name: String,
    #[serde(default, deserialize_with = "de::number")]
    pub price_per_night: f64,
    #[serde(default, deserialize_with = "de::text")]
    pub currency: String,
    #[serde(default, alias = "stars", skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    #[serde(default, deserialize_with = "de::text")]
    pub room_type: String,
    #[serde(default, deserialize_with = "de::null_default")]
    pub amenities: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A bookable activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default, deserialize_with = "de::text")]
    pub id: OptionId,
    #[serde(default, deserialize_with = "de::text")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "de::number")]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Option sets
// ============================================================================

/// Which kind of choice the service is offering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionsKind {
    Flights,
    Hotels,
    Activities,
}

impl OptionsKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "flights" => Some(Self::Flights),
            "hotels" => Some(Self::Hotels),
            "activities" => Some(Self::Activities),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flights => "flights",
            Self::Hotels => "hotels",
            Self::Activities => "activities",
        }
    }
}

impl fmt::Display for OptionsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One offered option
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TripOption {
    Flight(Flight),
    Hotel(Hotel),
    Activity(Activity),
}

impl TripOption {
    pub fn id(&self) -> &str {
        match self {
            TripOption::Flight(f) => &f.id,
            TripOption::Hotel(h) => &h.id,
            TripOption::Activity(a) => &a.id,
        }
    }
}

/// The currently offered choice list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionSet {
    pub kind: OptionsKind,
    pub options: Vec<TripOption>,
    pub text: String,
}

impl OptionSet {
    pub fn find(&self, id: &str) -> Option<&TripOption> {
        self.options.iter().find(|o| o.id() == id)
    }
}

// ============================================================================
// Planning result
// ============================================================================

/// One agent's turn in the planning debate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebateEntry {
    #[serde(default, deserialize_with = "de::text")]
    pub agent: String,
    #[serde(default, deserialize_with = "de::text")]
    pub preferred_flight: String,
    #[serde(default, deserialize_with = "de::text")]
    pub preferred_hotel: String,
    #[serde(default, deserialize_with = "de::null_default")]
    pub preferred_activities: Vec<Value>,
    #[serde(default, deserialize_with = "de::text")]
    pub argument: String,
    #[serde(default, deserialize_with = "de::text")]
    pub counterarguments: String,
}

/// Debate transcript: normally a list of turns, older services send prose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DebateTranscript {
    Rounds(Vec<DebateEntry>),
    Narrative(String),
}

impl Default for DebateTranscript {
    fn default() -> Self {
        DebateTranscript::Rounds(Vec::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleItem {
    #[serde(default, deserialize_with = "de::text")]
    pub time_slot: String,
    #[serde(default, deserialize_with = "de::text")]
    pub time: String,
    #[serde(default, deserialize_with = "de::text")]
    pub activity_name: String,
    #[serde(default, deserialize_with = "de::text")]
    pub location: String,
    #[serde(default, deserialize_with = "de::text")]
    pub duration: String,
    #[serde(default, deserialize_with = "de::text")]
    pub tips: String,
}

/// One day of the generated itinerary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    #[serde(default, deserialize_with = "de::count")]
    pub day: u32,
    #[serde(default, deserialize_with = "de::text")]
    pub date: String,
    #[serde(default, deserialize_with = "de::text")]
    pub theme: String,
    #[serde(default, deserialize_with = "de::null_default")]
    pub schedule: Vec<ScheduleItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalDecision {
    #[serde(default)]
    pub flight: Option<Flight>,
    #[serde(default)]
    pub hotel: Option<Hotel>,
    #[serde(default, deserialize_with = "de::null_default")]
    pub itinerary: Vec<DayPlan>,
    #[serde(default, deserialize_with = "de::null_default")]
    pub activities: Vec<Activity>,
    #[serde(default, deserialize_with = "de::text")]
    pub reasoning: String,
    #[serde(default, deserialize_with = "de::text")]
    pub key_tradeoffs: String,
}

/// Debate transcript plus the agreed plan. Read-only once received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningResult {
    #[serde(default, deserialize_with = "de::null_default")]
    pub debate_transcript: DebateTranscript,
    #[serde(default, deserialize_with = "de::null_default")]
    pub final_decision: FinalDecision,
}

// ============================================================================
// Messages
// ============================================================================

/// Messages sent to the planning service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    #[serde(rename = "user_message")]
    UserUtterance { message: String },
    SelectFlight { flight: Flight },
    SelectHotel { hotel: Hotel },
    SelectActivity { activity: Activity },
    Finalize,
}

impl OutboundMessage {
    /// Wire name of this message
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::UserUtterance { .. } => "user_message",
            OutboundMessage::SelectFlight { .. } => "select_flight",
            OutboundMessage::SelectHotel { .. } => "select_hotel",
            OutboundMessage::SelectActivity { .. } => "select_activity",
            OutboundMessage::Finalize => "finalize",
        }
    }
}

/// Messages received from the planning service
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    BotResponse {
        text: String,
        collected_info: CollectedInfo,
        is_complete: bool,
    },
    ShowOptions(OptionSet),
    PlanningResult(PlanningResult),
    Error {
        text: String,
    },
}

impl InboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::BotResponse { .. } => "bot_response",
            InboundMessage::ShowOptions(_) => "show_options",
            InboundMessage::PlanningResult(_) => "planning_result",
            InboundMessage::Error { .. } => "error",
        }
    }
}

/// Frame that could not be turned into a message
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame has no string `type` field")]
    MissingType,
    #[error("malformed `{kind}` payload: {source}")]
    Payload {
        kind: &'static str,
        source: serde_json::Error,
    },
    #[error("unknown options_type `{0}`")]
    UnknownOptionsKind(String),
}

#[derive(Deserialize)]
struct BotResponseFrame {
    #[serde(default, deserialize_with = "de::text")]
    message: String,
    #[serde(default, deserialize_with = "de::null_default")]
    collected_info: CollectedInfo,
    #[serde(default, deserialize_with = "de::null_default")]
    is_complete: bool,
}

#[derive(Deserialize)]
struct ShowOptionsFrame {
    #[serde(default, deserialize_with = "de::text")]
    options_type: String,
    #[serde(default, deserialize_with = "de::null_default")]
    options: Vec<Value>,
    #[serde(default, deserialize_with = "de::text")]
    message: String,
}

#[derive(Deserialize)]
struct ErrorFrame {
    #[serde(default, deserialize_with = "de::text")]
    message: String,
}

fn payload<T: for<'de> Deserialize<'de>>(
    kind: &'static str,
    value: Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|source| ProtocolError::Payload { kind, source })
}

/// Decode one inbound frame.
///
/// Returns `Ok(None)` for well-formed frames of a type this client does not
/// handle.
pub fn decode(frame: &str) -> Result<Option<InboundMessage>, ProtocolError> {
    let value: Value = serde_json::from_str(frame)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?
        .to_string();

    let message = match kind.as_str() {
        "bot_response" => {
            let frame: BotResponseFrame = payload("bot_response", value)?;
            InboundMessage::BotResponse {
                text: frame.message,
                collected_info: frame.collected_info,
                is_complete: frame.is_complete,
            }
        }
        "show_options" => {
            let frame: ShowOptionsFrame = payload("show_options", value)?;
            let kind = OptionsKind::parse(&frame.options_type)
                .ok_or(ProtocolError::UnknownOptionsKind(frame.options_type))?;
            InboundMessage::ShowOptions(OptionSet {
                kind,
                options: decode_options(kind, frame.options),
                text: frame.message,
            })
        }
        "planning_result" => InboundMessage::PlanningResult(payload("planning_result", value)?),
        "error" => {
            let frame: ErrorFrame = payload("error", value)?;
            InboundMessage::Error {
                text: frame.message,
            }
        }
        _ => return Ok(None),
    };

    Ok(Some(message))
}

/// Decode option entries for a set, skipping entries that don't fit the kind
fn decode_options(kind: OptionsKind, raw: Vec<Value>) -> Vec<TripOption> {
    raw.into_iter()
        .filter_map(|value| {
            let decoded = match kind {
                OptionsKind::Flights => serde_json::from_value(value).map(TripOption::Flight),
                OptionsKind::Hotels => serde_json::from_value(value).map(TripOption::Hotel),
                OptionsKind::Activities => serde_json::from_value(value).map(TripOption::Activity),
            };
            match decoded {
                Ok(option) => Some(option),
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "Skipping malformed option");
                    None
                }
            }
        })
        .collect()
}

/// Encode one outbound frame
pub fn encode(message: &OutboundMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

/// Lenient field decoders. The service's payloads are partly model-generated,
/// so numbers arrive as strings, ids as integers and lists as `null`.
mod de {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub(super) fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    pub(super) fn number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(opt_number(d)?.unwrap_or(0.0))
    }

    pub(super) fn opt_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().replace(',', "").parse().ok(),
            _ => None,
        })
    }

    pub(super) fn count<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        let parsed = match Value::deserialize(d)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        Ok(parsed.and_then(|n| u32::try_from(n).ok()).unwrap_or(0))
    }

    pub(super) fn null_default<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Default,
    {
        Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
    }
}
