use crate::detectors::Detection;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// What to do when a payload already recorded this window is seen again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum DedupPolicy {
    /// Keep the position of the first sighting.
    #[default]
    FirstSeen,
    /// Move the entry to the latest sighting's position. Its first-seen slot
    /// is kept for tie-breaking.
    LastSeen,
}

impl std::str::FromStr for DedupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first-seen" => Ok(Self::FirstSeen),
            "last-seen" => Ok(Self::LastSeen),
            other => Err(format!(
                "unknown dedup policy '{other}' (expected first-seen or last-seen)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub payload: String,
    pub position: f32,
}

/// Accumulated distinct payloads for the open window.
#[derive(Debug, Clone, Default)]
pub struct WindowState {
    seen: HashMap<String, usize>,
    entries: Vec<Entry>,
    window_start: Duration,
}

impl WindowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(window_start: Duration) -> Self {
        Self {
            window_start,
            ..Self::default()
        }
    }

    /// Fold one frame's detections into the window.
    ///
    /// A payload is recorded at most once per window. A repeat sighting either
    /// keeps the first position or moves to the new one, depending on
    /// `policy`; its slot in first-seen order never changes.
    ///
    /// # Returns
    ///
    /// How many payloads were new to this window
    ///
    /// # Example
    ///
    /// ```rust
    /// use qrseq::detectors::Detection;
    /// use qrseq::{DedupPolicy, WindowState};
    ///
    /// let mut state = WindowState::new();
    /// let frame = [Detection::new("7", 40.0), Detection::new("7", 42.0)];
    /// assert_eq!(state.record(&frame, DedupPolicy::FirstSeen), 1);
    /// assert_eq!(state.record(&[Detection::new("7", 90.0)], DedupPolicy::LastSeen), 0);
    /// assert_eq!(state.entries()[0].position, 90.0);
    /// ```
    pub fn record(&mut self, detections: &[Detection], policy: DedupPolicy) -> usize {
        let mut added = 0;
        for detection in detections {
            match self.seen.get(&detection.payload) {
                Some(&slot) => {
                    if policy == DedupPolicy::LastSeen {
                        self.entries[slot].position = detection.position;
                    }
                }
                None => {
                    self.seen.insert(detection.payload.clone(), self.entries.len());
                    self.entries.push(Entry {
                        payload: detection.payload.clone(),
                        position: detection.position,
                    });
                    added += 1;
                }
            }
        }
        added
    }

    pub fn contains(&self, payload: &str) -> bool {
        self.seen.contains_key(payload)
    }

    /// Entries in first-seen order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn window_start(&self) -> Duration {
        self.window_start
    }

    /// Close the window: hand back its entries and open a new one at `now`.
    pub fn reset(&mut self, now: Duration) -> Vec<Entry> {
        self.seen.clear();
        self.window_start = now;
        std::mem::take(&mut self.entries)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushDecision {
    /// Window still open.
    Wait,
    /// Window expired with something (or an allowed empty batch) to send.
    Dispatch,
    /// Window expired empty and empty batches are not emitted.
    Skip,
}

/// Periodic flush timer, independent of frame rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowScheduler {
    duration: Duration,
    emit_empty_batches: bool,
}

impl WindowScheduler {
    pub fn new(duration: Duration, emit_empty_batches: bool) -> Self {
        Self {
            duration,
            emit_empty_batches,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn emit_empty_batches(&self) -> bool {
        self.emit_empty_batches
    }

    pub fn should_flush(&self, state: &WindowState, now: Duration) -> bool {
        now.checked_sub(state.window_start())
            .is_some_and(|elapsed| elapsed >= self.duration)
    }

    pub fn flush_decision(&self, state: &WindowState, now: Duration) -> FlushDecision {
        if !self.should_flush(state, now) {
            FlushDecision::Wait
        } else if state.is_empty() && !self.emit_empty_batches {
            FlushDecision::Skip
        } else {
            FlushDecision::Dispatch
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(payload: &str, position: f32) -> Detection {
        Detection::new(payload, position)
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn repeated_detections_are_recorded_once() {
        let mut state = WindowState::new();
        let frame = [det("1", 50.0), det("2", 10.0), det("1", 50.0)];
        assert_eq!(state.record(&frame, DedupPolicy::FirstSeen), 2);
        assert_eq!(state.record(&frame, DedupPolicy::FirstSeen), 0);
        assert_eq!(state.record(&frame, DedupPolicy::FirstSeen), 0);

        let payloads: Vec<&str> = state.entries().iter().map(|e| e.payload.as_str()).collect();
        assert_eq!(payloads, ["1", "2"]);
    }

    #[test]
    fn first_seen_keeps_original_position() {
        let mut state = WindowState::new();
        state.record(&[det("A", 10.0)], DedupPolicy::FirstSeen);
        state.record(&[det("A", 99.0)], DedupPolicy::FirstSeen);
        assert_eq!(state.entries()[0].position, 10.0);
    }

    #[test]
    fn last_seen_moves_position_but_keeps_slot() {
        let mut state = WindowState::new();
        state.record(&[det("A", 10.0), det("B", 20.0)], DedupPolicy::LastSeen);
        state.record(&[det("A", 99.0)], DedupPolicy::LastSeen);
        assert_eq!(
            state.entries(),
            &[
                Entry {
                    payload: "A".into(),
                    position: 99.0
                },
                Entry {
                    payload: "B".into(),
                    position: 20.0
                },
            ]
        );
    }

    #[test]
    fn reset_clears_and_restarts_window() {
        let mut state = WindowState::new();
        state.record(&[det("A", 1.0)], DedupPolicy::FirstSeen);
        let taken = state.reset(secs(2.0));
        assert_eq!(taken.len(), 1);
        assert!(state.is_empty());
        assert!(!state.contains("A"));
        assert_eq!(state.window_start(), secs(2.0));

        state.record(&[det("A", 1.0)], DedupPolicy::FirstSeen);
        assert!(state.contains("A"));
    }

    #[test]
    fn flushes_once_duration_has_elapsed() {
        let scheduler = WindowScheduler::new(secs(0.5), false);
        let state = WindowState::starting_at(secs(1.0));
        assert!(!scheduler.should_flush(&state, secs(1.2)));
        assert!(scheduler.should_flush(&state, secs(1.5)));
        assert!(scheduler.should_flush(&state, secs(3.0)));
        // A clock earlier than the window start never flushes.
        assert!(!scheduler.should_flush(&state, secs(0.2)));
    }

    #[test]
    fn empty_windows_follow_the_emit_flag() {
        let state = WindowState::new();
        let quiet = WindowScheduler::new(secs(0.5), false);
        let heartbeat = WindowScheduler::new(secs(0.5), true);

        assert_eq!(quiet.flush_decision(&state, secs(0.1)), FlushDecision::Wait);
        assert_eq!(quiet.flush_decision(&state, secs(0.6)), FlushDecision::Skip);
        assert_eq!(
            heartbeat.flush_decision(&state, secs(0.6)),
            FlushDecision::Dispatch
        );
    }

    #[test]
    fn policy_parses_from_cli_spelling() {
        assert_eq!("first-seen".parse::<DedupPolicy>(), Ok(DedupPolicy::FirstSeen));
        assert_eq!("last-seen".parse::<DedupPolicy>(), Ok(DedupPolicy::LastSeen));
        assert!("newest".parse::<DedupPolicy>().is_err());
    }
}
