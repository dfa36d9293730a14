//! Terminal presentation
//!
//! Parses typed lines into intents and renders session updates as plain
//! text. Rendering is incremental: only what changed since the previous
//! snapshot is printed.

use crate::pricing::PriceSummary;
use crate::protocol::{DebateTranscript, OptionId, OptionSet, PlanningResult, TripOption};
use crate::runtime::{Intent, SessionSnapshot, SessionUpdate};
use crate::selection;
use crate::session::{ResultChoice, Role};
use crate::voice::VoiceMode;
use std::fmt::Write as _;
use thiserror::Error;

pub const HELP: &str = "\
Type a message to chat, or one of:
  /pick <n|id>          choose option n (1-based) or by id
  /done                 finish choosing activities
  /finalize             ask for the trip plan
  /mic                  toggle voice input
  /choose flight <id>   take the planned flight (also hotel, activity)
  /confirm              confirm the booking
  /quit                 end the session";

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Say(String),
    Pick(String),
    Done,
    Finalize,
    Mic,
    Choose(ResultChoice),
    Confirm,
    Help,
    Quit,
    Empty,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command `/{0}`, try /help")]
    Unknown(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
}

pub fn parse_line(line: &str) -> Result<ConsoleCommand, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ConsoleCommand::Empty);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(ConsoleCommand::Say(line.to_string()));
    };

    let mut words = command.split_whitespace();
    let name = words.next().unwrap_or_default().to_lowercase();
    let args: Vec<&str> = words.collect();

    match (name.as_str(), args.as_slice()) {
        ("pick" | "p", [arg]) => Ok(ConsoleCommand::Pick((*arg).to_string())),
        ("pick" | "p", _) => Err(ParseError::Usage("/pick <n|id>")),
        ("done", []) => Ok(ConsoleCommand::Done),
        ("finalize", []) => Ok(ConsoleCommand::Finalize),
        ("mic", []) => Ok(ConsoleCommand::Mic),
        ("choose", [kind, id]) => {
            let id = (*id).to_string();
            match kind.to_lowercase().as_str() {
                "flight" => Ok(ConsoleCommand::Choose(ResultChoice::Flight(id))),
                "hotel" => Ok(ConsoleCommand::Choose(ResultChoice::Hotel(id))),
                "activity" => Ok(ConsoleCommand::Choose(ResultChoice::Activity(id))),
                _ => Err(ParseError::Usage("/choose flight|hotel|activity <id>")),
            }
        }
        ("choose", _) => Err(ParseError::Usage("/choose flight|hotel|activity <id>")),
        ("confirm", []) => Ok(ConsoleCommand::Confirm),
        ("help" | "h" | "?", _) => Ok(ConsoleCommand::Help),
        ("quit" | "exit" | "q", _) => Ok(ConsoleCommand::Quit),
        ("done" | "finalize" | "mic" | "confirm", _) => Err(ParseError::Usage("no arguments")),
        (other, _) => Err(ParseError::Unknown(other.to_string())),
    }
}

/// Map a `/pick` argument to an option identity.
///
/// A number within range picks by 1-based position; anything else is taken
/// as an identity and validated by the session.
pub fn resolve_pick(arg: &str, options: Option<&OptionSet>) -> OptionId {
    if let (Ok(n), Some(set)) = (arg.parse::<usize>(), options) {
        if set.find(arg).is_none() {
            if let Some(option) = n.checked_sub(1).and_then(|i| set.options.get(i)) {
                return option.id().to_string();
            }
        }
    }
    arg.to_string()
}

/// Turn a command into an intent. `None` for commands handled locally.
pub fn to_intent(command: ConsoleCommand, snapshot: &SessionSnapshot) -> Option<Intent> {
    Some(match command {
        ConsoleCommand::Say(text) => Intent::SubmitText { text },
        ConsoleCommand::Pick(arg) => Intent::PickOption {
            id: resolve_pick(&arg, snapshot.options.as_ref()),
        },
        ConsoleCommand::Done => Intent::ActivitiesDone,
        ConsoleCommand::Finalize => Intent::RequestFinalize,
        ConsoleCommand::Mic => Intent::ToggleListening,
        ConsoleCommand::Choose(choice) => Intent::ChooseFromResult { choice },
        ConsoleCommand::Confirm => Intent::ConfirmBooking,
        ConsoleCommand::Quit => Intent::RequestClose,
        ConsoleCommand::Help | ConsoleCommand::Empty => return None,
    })
}

/// Incremental text renderer
#[derive(Debug, Default)]
pub struct Renderer {
    printed: usize,
    /// Option set last shown, with its selection
    shown_options: Option<(OptionSet, Vec<OptionId>)>,
    /// Plan last printed; a re-finalize replaces it
    shown_result: Option<PlanningResult>,
    planning: bool,
    voice_mode: Option<VoiceMode>,
    preview: String,
    price_total: Option<u64>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines to print for `update`
    pub fn render(&mut self, update: &SessionUpdate) -> Vec<String> {
        match update {
            SessionUpdate::Snapshot(snapshot) => self.snapshot(snapshot),
            SessionUpdate::Alert { message } => vec![format!("! {message}")],
            SessionUpdate::ConnectivityChanged { connected: true } => {
                vec!["* Connected to the planning service".to_string()]
            }
            SessionUpdate::ConnectivityChanged { connected: false } => {
                vec!["! Disconnected from the planning service".to_string()]
            }
            SessionUpdate::BookingConfirmed { total } => {
                vec![format!("* Booking confirmed, total {total:.2}")]
            }
            SessionUpdate::Closed => vec!["* Session closed".to_string()],
        }
    }

    fn snapshot(&mut self, snapshot: &SessionSnapshot) -> Vec<String> {
        let mut lines = Vec::new();

        for entry in snapshot.transcript.iter().skip(self.printed) {
            let who = match entry.role {
                Role::User => "you",
                Role::Assistant => "bot",
            };
            if !entry.text.is_empty() {
                lines.push(format!("{who}> {}", entry.text));
            }
        }
        self.printed = snapshot.transcript.len();

        let current = snapshot
            .options
            .as_ref()
            .map(|set| (set.clone(), snapshot.selected.clone()));
        if current != self.shown_options {
            if let Some((set, selected)) = &current {
                lines.extend(option_lines(set, selected, snapshot.done_enabled));
            }
            self.shown_options = current;
        }

        if snapshot.planning && !self.planning {
            lines.push("* Planning your trip, this can take a while...".to_string());
        }
        self.planning = snapshot.planning;

        if snapshot.result != self.shown_result {
            if let Some(result) = &snapshot.result {
                lines.extend(result_lines(result));
            }
            self.shown_result.clone_from(&snapshot.result);
        }

        // Whole cents, so float noise does not reprint the summary
        let total = (snapshot.price.total * 100.0).round();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let cents = if total.is_finite() && total >= 0.0 { Some(total as u64) } else { None };
        if snapshot.collected.has_selections() && cents != self.price_total {
            lines.push(price_line(&snapshot.price));
            self.price_total = cents;
        }

        if self.voice_mode != Some(snapshot.voice_mode) {
            if self.voice_mode.is_some() || snapshot.voice_mode != VoiceMode::Idle {
                lines.push(match snapshot.voice_mode {
                    VoiceMode::Idle => "[mic off]".to_string(),
                    VoiceMode::Listening => "[listening]".to_string(),
                    VoiceMode::Speaking => "[speaking]".to_string(),
                });
            }
            self.voice_mode = Some(snapshot.voice_mode);
        }
        if snapshot.preview != self.preview {
            if !snapshot.preview.is_empty() {
                lines.push(format!("... {}", snapshot.preview));
            }
            self.preview.clone_from(&snapshot.preview);
        }

        lines
    }
}

fn option_lines(set: &OptionSet, selected: &[OptionId], done_enabled: bool) -> Vec<String> {
    let mut lines = vec![format!("Choose {}:", set.kind)];
    for (i, option) in set.options.iter().enumerate() {
        let mark = if selected.iter().any(|id| id == option.id()) {
            "[x]"
        } else {
            "[ ]"
        };
        lines.push(format!("  {:>2}. {mark} {}", i + 1, describe(option)));
    }
    let hint = match selection::cardinality(set.kind) {
        selection::Cardinality::ExactlyOne => "  /pick <n> to choose".to_string(),
        selection::Cardinality::ZeroOrMore if done_enabled => {
            "  /pick <n> to add more, /done when finished".to_string()
        }
        selection::Cardinality::ZeroOrMore => "  /pick <n> to add activities".to_string(),
    };
    lines.push(hint);
    lines
}

fn describe(option: &TripOption) -> String {
    match option {
        TripOption::Flight(f) => {
            let stops = match f.stops {
                0 => "nonstop".to_string(),
                1 => "1 stop".to_string(),
                n => format!("{n} stops"),
            };
            format!(
                "{} {} -> {} ({}, {stops}) {:.2} {} [{}]",
                f.airline, f.departure_time, f.arrival_time, f.duration, f.price, f.currency, f.id
            )
        }
        TripOption::Hotel(h) => {
            let mut line = format!("{} {:.2} {}/night", h.name, h.price_per_night, h.currency);
            if let Some(rating) = &h.rating {
                let _ = write!(line, ", rated {rating}");
            }
            if !h.room_type.is_empty() {
                let _ = write!(line, ", {}", h.room_type);
            }
            let _ = write!(line, " [{}]", h.id);
            line
        }
        TripOption::Activity(a) => {
            let mut line = format!("{} {:.2}", a.name, a.price);
            if let Some(currency) = &a.currency {
                let _ = write!(line, " {currency}");
            }
            if let Some(description) = &a.description {
                let _ = write!(line, ": {description}");
            }
            let _ = write!(line, " [{}]", a.id);
            line
        }
    }
}

fn result_lines(result: &PlanningResult) -> Vec<String> {
    let mut lines = vec!["=== Planning debate ===".to_string()];
    match &result.debate_transcript {
        DebateTranscript::Rounds(rounds) => {
            for entry in rounds {
                lines.push(format!("{}: {}", entry.agent, entry.argument));
                if !entry.counterarguments.is_empty() {
                    lines.push(format!("    counter: {}", entry.counterarguments));
                }
            }
        }
        DebateTranscript::Narrative(text) => lines.push(text.clone()),
    }

    let decision = &result.final_decision;
    lines.push("=== Final plan ===".to_string());
    if let Some(flight) = &decision.flight {
        lines.push(format!("Flight: {}", describe(&TripOption::Flight(flight.clone()))));
    }
    if let Some(hotel) = &decision.hotel {
        lines.push(format!("Hotel: {}", describe(&TripOption::Hotel(hotel.clone()))));
    }
    for day in &decision.itinerary {
        let mut header = format!("Day {}", day.day);
        if !day.date.is_empty() {
            let _ = write!(header, " ({})", day.date);
        }
        if !day.theme.is_empty() {
            let _ = write!(header, ": {}", day.theme);
        }
        lines.push(header);
        for item in &day.schedule {
            let when = if item.time.is_empty() { &item.time_slot } else { &item.time };
            lines.push(format!("  {when} {} @ {}", item.activity_name, item.location));
        }
    }
    if !decision.activities.is_empty() {
        lines.push("Activities:".to_string());
        for activity in &decision.activities {
            lines.push(format!("  {}", describe(&TripOption::Activity(activity.clone()))));
        }
    }
    if !decision.reasoning.is_empty() {
        lines.push(format!("Why: {}", decision.reasoning));
    }
    if !decision.key_tradeoffs.is_empty() {
        lines.push(format!("Trade-offs: {}", decision.key_tradeoffs));
    }
    lines.push("Use /choose to swap items, /confirm to book".to_string());
    lines
}

fn price_line(price: &PriceSummary) -> String {
    let currency = price.currency.as_deref().unwrap_or("");
    let mut line = format!(
        "Total {:.2} {currency} (flight {:.2}, hotel {:.2} x {} nights, activities {:.2})",
        price.total, price.flight, price.hotel_per_night, price.nights, price.activities
    );
    if let Some(remaining) = price.remaining {
        if price.over_budget {
            let _ = write!(line, ", {:.2} over budget", -remaining);
        } else {
            let _ = write!(line, ", {remaining:.2} left in budget");
        }
    }
    line
}
