//! Core domain types for odometer
//!
//! Two families of types live here:
//!
//! - **Events** arrive from the capture layer: a timestamp plus an
//!   [`EventKind`]. Distances are already converted to meters upstream.
//! - **Aggregates** are what the store holds: [`Counters`] scoped to a day,
//!   an hour, a key or an application.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Date key** | Local calendar date rendered as `YYYY-MM-DD` |
//! | **Bucket** | A `(date, hour)` pair that an event is counted into |
//! | **Delta** | A [`Counters`] value added to an aggregate row, never replacing it |
//! | **Key identifier** | Canonical key name (see [`crate::keys`]) |

use chrono::{DateTime, Local, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Storage format for date keys.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Render a date as a `YYYY-MM-DD` date key.
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD` date key.
pub fn parse_date_key(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

// ============================================
// Counters
// ============================================

/// The numeric fields shared by daily and hourly aggregates.
///
/// Used both as a stored total and as an increment delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Counters {
    /// Key presses
    pub key_count: i64,
    /// Mouse travel in meters
    pub mouse_distance: f64,
    pub left_clicks: i64,
    pub right_clicks: i64,
    pub middle_clicks: i64,
    /// Scroll travel in meters
    pub scroll_distance: f64,
}

impl Counters {
    /// A delta carrying only key presses.
    pub fn keys(count: i64) -> Self {
        Self {
            key_count: count,
            ..Default::default()
        }
    }

    /// True when applying this delta would change nothing.
    pub fn is_zero(&self) -> bool {
        self.key_count == 0
            && self.mouse_distance == 0.0
            && self.left_clicks == 0
            && self.right_clicks == 0
            && self.middle_clicks == 0
            && self.scroll_distance == 0.0
    }

    /// Total clicks across all buttons.
    pub fn total_clicks(&self) -> i64 {
        self.left_clicks + self.right_clicks + self.middle_clicks
    }

    /// Field-wise comparison with a float tolerance for the distance columns.
    pub fn approx_eq(&self, other: &Counters, epsilon: f64) -> bool {
        self.key_count == other.key_count
            && self.left_clicks == other.left_clicks
            && self.right_clicks == other.right_clicks
            && self.middle_clicks == other.middle_clicks
            && (self.mouse_distance - other.mouse_distance).abs() <= epsilon
            && (self.scroll_distance - other.scroll_distance).abs() <= epsilon
    }
}

impl AddAssign for Counters {
    fn add_assign(&mut self, rhs: Self) {
        self.key_count += rhs.key_count;
        self.mouse_distance += rhs.mouse_distance;
        self.left_clicks += rhs.left_clicks;
        self.right_clicks += rhs.right_clicks;
        self.middle_clicks += rhs.middle_clicks;
        self.scroll_distance += rhs.scroll_distance;
    }
}

impl Add for Counters {
    type Output = Counters;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl std::iter::Sum for Counters {
    fn sum<I: Iterator<Item = Counters>>(iter: I) -> Self {
        iter.fold(Counters::default(), |acc, c| acc + c)
    }
}

// ============================================
// Aggregates
// ============================================

/// One row of `daily_aggregate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub totals: Counters,
}

/// One row of `hourly_aggregate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyAggregate {
    pub date: NaiveDate,
    /// Hour of day, 0-23
    pub hour: u32,
    #[serde(flatten)]
    pub totals: Counters,
}

/// Summed count for one key identifier over a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTotal {
    pub key: String,
    pub count: i64,
}

/// Summed foreground seconds for one application over a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppTotal {
    pub app: String,
    pub seconds: i64,
}

/// Totals over every row ever written plus the tracked period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifetimeTotals {
    #[serde(flatten)]
    pub totals: Counters,
    /// Oldest date present, if any
    pub first_date: Option<NaiveDate>,
    /// Newest date present, if any
    pub last_date: Option<NaiveDate>,
    /// Number of dates with a daily row
    pub days_tracked: i64,
}

// ============================================
// Events
// ============================================

/// Mouse button of a click event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Axis of a scroll event.
///
/// Both axes feed the same `scroll_distance` counter; they stay distinct here
/// so that consumers can tell them apart if they need to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollAxis {
    #[default]
    Vertical,
    Horizontal,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// A key press, with the raw identifier reported by the capture layer
    Key { key: String },
    /// Pointer movement in meters along each axis
    MouseMove { dx: f64, dy: f64 },
    /// A button press
    MouseClick { button: MouseButton },
    /// Wheel movement in meters; sign encodes direction
    Scroll {
        #[serde(default)]
        axis: ScrollAxis,
        distance: f64,
    },
    /// Seconds spent with an application in the foreground
    AppFocus { app: String, seconds: i64 },
}

impl EventKind {
    /// The aggregate delta this event contributes.
    pub fn counters(&self) -> Counters {
        match self {
            EventKind::Key { .. } => Counters::keys(1),
            EventKind::MouseMove { dx, dy } => Counters {
                mouse_distance: finite_or_zero(dx.hypot(*dy)),
                ..Default::default()
            },
            EventKind::MouseClick { button } => {
                let mut delta = Counters::default();
                match button {
                    MouseButton::Left => delta.left_clicks = 1,
                    MouseButton::Right => delta.right_clicks = 1,
                    MouseButton::Middle => delta.middle_clicks = 1,
                }
                delta
            }
            EventKind::Scroll { distance, .. } => Counters {
                scroll_distance: finite_or_zero(distance.abs()),
                ..Default::default()
            },
            EventKind::AppFocus { .. } => Counters::default(),
        }
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// A single event from the capture layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    pub timestamp: DateTime<Local>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl InputEvent {
    pub fn new(timestamp: DateTime<Local>, kind: EventKind) -> Self {
        Self { timestamp, kind }
    }

    /// Parse one line of the JSON-lines event stream.
    pub fn from_json_line(line: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }

    /// Local `(date, hour)` bucket this event counts into.
    pub fn bucket(&self) -> (NaiveDate, u32) {
        (self.timestamp.date_naive(), self.timestamp.hour())
    }
}
