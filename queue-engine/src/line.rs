//! A single consumer cursor over a topic.
//!
//! `head` advances past every id ever handed out; `flight_head` trails it,
//! marking the oldest id still unconfirmed. The gap between them is the
//! redelivery window `clean` must leave untouched.

use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, SystemTime},
};

use queue_core::error::QueueError;
use tracing::debug;

/// Whether an id that was once popped is still unconfirmed or has since
/// been confirmed. Tracked only long enough to let `flight_head` skip past
/// out-of-order confirms cheaply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightState {
    InFlight,
    Confirmed,
}

/// A named, independent consumer cursor over a topic.
#[derive(Debug)]
pub struct Line {
    name: String,
    recycle: Duration,
    head: u64,
    flight_head: u64,
    flights: VecDeque<(u64, SystemTime)>,
    flighted: HashMap<u64, FlightState>,
}

impl Line {
    /// Create a new line. A new line's `head` and `flight_head` start at
    /// the *topic's current head*, not its tail: it sees the surviving
    /// backlog, not just future pushes.
    pub fn new(name: impl Into<String>, recycle: Duration, topic_head: u64) -> Self {
        let name = name.into();
        debug!(line = %name, recycle = ?recycle, head = topic_head, "line created");
        Line {
            name,
            recycle,
            head: topic_head,
            flight_head: topic_head,
            flights: VecDeque::new(),
            flighted: HashMap::new(),
        }
    }

    /// Reconstruct a line from snapshot fields. `flighted` is left empty; it
    /// is rebuilt lazily as `confirm` advances `flight_head`.
    pub fn from_parts(
        name: String,
        recycle: Duration,
        head: u64,
        flight_head: u64,
        flights: VecDeque<(u64, SystemTime)>,
    ) -> Self {
        Line {
            name,
            recycle,
            head,
            flight_head,
            flights,
            flighted: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn recycle(&self) -> Duration {
        self.recycle
    }

    pub fn head(&self) -> u64 {
        self.head
    }

    pub fn flight_head(&self) -> u64 {
        self.flight_head
    }

    pub fn flights(&self) -> &VecDeque<(u64, SystemTime)> {
        &self.flights
    }

    /// Pop the next id for this line: an expired in-flight redelivery if one
    /// is due, else the next fresh id below `topic_tail`. Returns `Ok(None)`
    /// on an empty line — this is not an error.
    pub fn pop(&mut self, topic_tail: u64, now: SystemTime) -> Result<Option<u64>, QueueError> {
        let mut id = None;

        if self.recycle > Duration::ZERO {
            if let Some(&(front_id, expires_at)) = self.flights.front() {
                if now > expires_at {
                    self.flights.pop_front();
                    id = Some(front_id);
                }
            }
        }

        let id = match id {
            Some(id) => id,
            None => {
                if self.head >= topic_tail {
                    return Ok(None);
                }
                let id = self.head;
                self.flighted.insert(id, FlightState::InFlight);
                self.head += 1;
                id
            }
        };

        if self.recycle > Duration::ZERO {
            let expires_at = now + self.recycle;
            self.flights.push_back((id, expires_at));
        }

        Ok(Some(id))
    }

    /// Confirm a previously-popped id, advancing `flight_head` over any run
    /// of now-resolved ids that follows.
    pub fn confirm(&mut self, id: u64) -> Result<(), QueueError> {
        if self.recycle <= Duration::ZERO {
            return Err(QueueError::ReadOnly(self.name.clone()));
        }

        let position = self.flights.iter().position(|&(flight_id, _)| flight_id == id);
        let position = match position {
            Some(p) => p,
            None => {
                return Err(QueueError::KeyNotFound(format!("{}/{}", self.name, id)));
            }
        };
        self.flights.remove(position);
        self.flighted.insert(id, FlightState::Confirmed);

        while self.flight_head < self.head {
            match self.flighted.get(&self.flight_head) {
                None => self.flight_head += 1,
                Some(FlightState::Confirmed) => {
                    self.flighted.remove(&self.flight_head);
                    self.flight_head += 1;
                }
                Some(FlightState::InFlight) => break,
            }
        }

        Ok(())
    }
}
