//! Producer-side front end for the store
//!
//! The [`Recorder`] turns [`InputEvent`]s into deltas for their local
//! `(date, hour)` bucket and keeps them in a provisional buffer until
//! flushed. The buffer is never authoritative: readers that want the live
//! value ask for [`Recorder::live_totals`], which adds the unflushed delta
//! to what the store already holds.
//!
//! A flush happens when the bucket changes, when `flush_every` events are
//! buffered, on [`Recorder::flush`], and when the recorder is finished or
//! dropped. A failed flush is logged and its events are dropped; later
//! events are unaffected.

use crate::config::RecorderConfig;
use crate::db::{BucketDelta, Database};
use crate::error::Result;
use crate::keys::canonical_key;
use crate::types::{Counters, EventKind, InputEvent};
use chrono::NaiveDate;
use serde::Serialize;
use std::mem;
use std::sync::Arc;

/// Date-transition state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionState {
    Idle,
    /// The previous date is being finalized
    Transitioning,
}

/// Counters kept by a recorder over its lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecorderStats {
    /// Events accepted by [`Recorder::record`]
    pub recorded: u64,
    /// Events written to the store
    pub flushed: u64,
    /// Events lost to failed flushes
    pub dropped: u64,
    /// Completed date transitions
    pub date_transitions: u64,
}

/// Unflushed deltas for one bucket
#[derive(Debug)]
struct Pending {
    date: NaiveDate,
    hour: u32,
    delta: BucketDelta,
    events: u64,
}

impl Pending {
    fn new(date: NaiveDate, hour: u32) -> Self {
        Self {
            date,
            hour,
            delta: BucketDelta::default(),
            events: 0,
        }
    }

    fn add(&mut self, kind: &EventKind) {
        self.delta.totals += kind.counters();
        match kind {
            EventKind::Key { key } => {
                let key = canonical_key(key);
                if !key.is_empty() {
                    *self.delta.keys.entry(key.into_owned()).or_insert(0) += 1;
                }
            }
            EventKind::AppFocus { app, seconds } => {
                let app = app.trim();
                if !app.is_empty() && *seconds > 0 {
                    *self.delta.apps.entry(app.to_string()).or_insert(0) += seconds;
                }
            }
            _ => {}
        }
        self.events += 1;
    }
}

pub struct Recorder {
    db: Arc<Database>,
    flush_every: u64,
    current_date: Option<NaiveDate>,
    state: TransitionState,
    pending: Option<Pending>,
    stats: RecorderStats,
}

impl Recorder {
    pub fn new(db: Arc<Database>, config: &RecorderConfig) -> Self {
        Self {
            db,
            flush_every: config.flush_every.max(1) as u64,
            current_date: None,
            state: TransitionState::Idle,
            pending: None,
            stats: RecorderStats::default(),
        }
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    pub fn state(&self) -> TransitionState {
        self.state
    }

    /// Date the recorder currently considers "today"
    pub fn current_date(&self) -> Option<NaiveDate> {
        self.current_date
    }

    /// Number of events waiting to be flushed
    pub fn pending_events(&self) -> u64 {
        self.pending.as_ref().map_or(0, |p| p.events)
    }

    /// Buffer one event, flushing first if it belongs to a new bucket.
    pub fn record(&mut self, event: &InputEvent) {
        let (date, hour) = event.bucket();
        self.ensure_current_date(date);

        if self
            .pending
            .as_ref()
            .is_some_and(|p| p.date != date || p.hour != hour)
        {
            self.flush();
        }

        let pending = self.pending.get_or_insert_with(|| Pending::new(date, hour));
        pending.add(&event.kind);
        self.stats.recorded += 1;

        if pending.events >= self.flush_every {
            self.flush();
        }
    }

    /// Advance to `today`, finalizing the previous date first.
    ///
    /// Returns `true` if a transition happened. Calls made while a
    /// transition is already running are ignored and return `false`, as are
    /// dates that are not after the current one.
    pub fn ensure_current_date(&mut self, today: NaiveDate) -> bool {
        if self.state == TransitionState::Transitioning {
            tracing::debug!(%today, "Date transition already in progress, ignoring");
            return false;
        }

        let previous = match self.current_date {
            None => {
                self.current_date = Some(today);
                return false;
            }
            Some(current) if today <= current => return false,
            Some(current) => current,
        };

        self.state = TransitionState::Transitioning;

        // Capture the old day's buffer before anything else changes
        let finished = mem::take(&mut self.pending);
        if let Some(p) = finished {
            if p.date == previous {
                self.write(p);
            } else {
                self.pending = Some(p);
                self.flush();
            }
        }

        self.current_date = Some(today);
        self.stats.date_transitions += 1;
        self.state = TransitionState::Idle;

        tracing::info!(from = %previous, to = %today, "Date transition");
        true
    }

    /// Write the buffered deltas. Returns `false` if the write failed and
    /// the buffer was dropped.
    pub fn flush(&mut self) -> bool {
        match self.pending.take() {
            Some(p) => self.write(p),
            None => true,
        }
    }

    fn write(&mut self, p: Pending) -> bool {
        if p.events == 0 {
            return true;
        }

        match self.persist(&p) {
            Ok(()) => {
                self.stats.flushed += p.events;
                tracing::trace!(date = %p.date, hour = p.hour, events = p.events, "Flushed");
                true
            }
            Err(e) => {
                self.stats.dropped += p.events;
                tracing::error!(
                    error = %e,
                    date = %p.date,
                    hour = p.hour,
                    events = p.events,
                    "Flush failed, dropping buffered events"
                );
                false
            }
        }
    }

    fn persist(&self, p: &Pending) -> Result<()> {
        self.db.apply_bucket(p.date, p.hour, &p.delta)
    }

    /// Stored daily totals for `date` plus anything still buffered for it.
    pub fn live_totals(&self, date: NaiveDate) -> Result<Counters> {
        let mut totals = self
            .db
            .get_daily(date)?
            .map(|d| d.totals)
            .unwrap_or_default();
        if let Some(p) = self.pending.as_ref().filter(|p| p.date == date) {
            totals += p.delta.totals;
        }
        Ok(totals)
    }

    /// Flush and return the final stats
    pub fn finish(mut self) -> RecorderStats {
        self.flush();
        self.stats
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.pending_events() > 0 {
            self.flush();
        }
    }
}
