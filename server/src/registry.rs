//! Ownership of live sessions and the timer tasks attached to them
//!
//! A session lives here from pairing until it is finalized or abandoned.
//! Every timer task spawned for a session is registered under its id and
//! aborted when the session is removed, so nothing keeps running for a game
//! that no longer exists.

use crate::matchmaking::WaitingEntry;
use crate::session::{Session, SessionId};
use log::{debug, info};
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug)]
struct SessionSlot {
    session: Session,
    countdown: Option<JoinHandle<()>>,
    timers: Vec<JoinHandle<()>>,
}

impl SessionSlot {
    fn cancel_all(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            countdown.abort();
        }
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }
}

#[derive(Debug)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, SessionSlot>,
    next_session_id: SessionId,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            next_session_id: 1,
        }
    }

    /// Builds and stores a session for two paired players
    pub fn create(
        &mut self,
        first: WaitingEntry,
        second: WaitingEntry,
        now: Instant,
        duration: Duration,
    ) -> SessionId {
        let id = self.next_session_id;
        self.next_session_id += 1;

        info!(
            "Session {} created: {} vs {}",
            id, first.name, second.name
        );
        let session = Session::new(id, first, second, now, duration);
        self.sessions.insert(
            id,
            SessionSlot {
                session,
                countdown: None,
                timers: Vec::new(),
            },
        );
        id
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id).map(|slot| &slot.session)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id).map(|slot| &mut slot.session)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Ties a one-shot timer task to a session
    ///
    /// If the session is already gone the task is aborted right away.
    pub fn attach_timer(&mut self, id: SessionId, timer: JoinHandle<()>) -> bool {
        match self.sessions.get_mut(&id) {
            Some(slot) => {
                slot.timers.retain(|t| !t.is_finished());
                slot.timers.push(timer);
                true
            }
            None => {
                timer.abort();
                false
            }
        }
    }

    /// Ties the recurring countdown task to a session, replacing any previous one
    pub fn attach_countdown(&mut self, id: SessionId, countdown: JoinHandle<()>) -> bool {
        match self.sessions.get_mut(&id) {
            Some(slot) => {
                if let Some(previous) = slot.countdown.replace(countdown) {
                    previous.abort();
                }
                true
            }
            None => {
                countdown.abort();
                false
            }
        }
    }

    /// Stops the countdown of a session that is still registered
    ///
    /// Returns false when there was no running countdown to stop.
    pub fn stop_countdown(&mut self, id: SessionId) -> bool {
        match self
            .sessions
            .get_mut(&id)
            .and_then(|slot| slot.countdown.take())
        {
            Some(countdown) => {
                debug!("Session {}: countdown stopped", id);
                countdown.abort();
                true
            }
            None => false,
        }
    }

    /// Removes a session and cancels all of its timers; idempotent
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let mut slot = self.sessions.remove(&id)?;
        slot.cancel_all();
        info!("Session {} removed", id);
        Some(slot.session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
