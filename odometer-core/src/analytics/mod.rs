//! Analytics module for odometer
//!
//! Everything here is derived at read time from the aggregate tables:
//! - Period views (today, week, month, lifetime, explicit ranges)
//! - Daily series and activity streaks
//! - Keyboard heatmap normalization and coloring

pub mod heatmap;
pub mod views;

pub use heatmap::{color_of, heatmap, normalize, HeatmapCell, Rgba, HEATMAP_ALPHA};
pub use views::{AggregationViews, PeriodSummary, StatsPeriod, Streaks, STREAK_WINDOW_DAYS};
