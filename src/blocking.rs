//! Cross-thread bridge for hosts that run the line consumer on its own thread.
//!
//! Readers really block here. Each reader draws a ticket on entry and is only
//! served once every earlier ticket has been served, which keeps the pairing
//! of requests and lines strictly FIFO even with many blocked threads.

use std::{collections::VecDeque, sync::Arc};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::{
    bridge::Commit,
    error::{BridgeError, BridgeResult},
};

#[derive(Debug, Default)]
struct State {
    lines: VecDeque<String>,
    next_ticket: u64,
    serving: u64,
    closed: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    ready: Condvar,
}

#[derive(Debug, Clone, Default)]
pub struct BlockingBridge {
    shared: Arc<Shared>,
}

impl BlockingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until this caller's turn comes up and a line is available.
    ///
    /// Returns [`BridgeError::Closed`] once the bridge is closed and every
    /// line committed before the close has been handed out.
    pub fn read_line(&self) -> BridgeResult<String> {
        let mut state = self.shared.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        trace!(ticket, "line requested");

        loop {
            if state.serving == ticket {
                if let Some(line) = state.lines.pop_front() {
                    state.serving += 1;
                    trace!(ticket, len = line.len(), "line delivered");
                    drop(state);
                    self.shared.ready.notify_all();
                    return Ok(line);
                }

                if state.closed {
                    state.serving += 1;
                    drop(state);
                    self.shared.ready.notify_all();
                    return Err(BridgeError::Closed);
                }
            }

            self.shared.ready.wait(&mut state);
        }
    }

    /// Non-blocking variant: takes a line only when no reader is queued
    /// ahead and one is already waiting.
    pub fn try_read_line(&self) -> Option<String> {
        let mut state = self.shared.state.lock();
        if state.serving != state.next_ticket {
            return None;
        }

        let line = state.lines.pop_front()?;
        state.next_ticket += 1;
        state.serving += 1;
        Some(line)
    }

    pub fn available(&self) -> usize {
        self.shared.state.lock().lines.len()
    }

    /// Readers currently blocked in [`read_line`](Self::read_line).
    pub fn waiting(&self) -> u64 {
        let state = self.shared.state.lock();
        state.next_ticket - state.serving
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        debug!(queued = state.lines.len(), "blocking bridge closed");
        drop(state);
        self.shared.ready.notify_all();
    }
}

impl Commit for BlockingBridge {
    fn commit(&self, line: String) {
        let mut state = self.shared.state.lock();
        if state.closed {
            debug!("commit after close ignored");
            return;
        }
        trace!(len = line.len(), "line committed");
        state.lines.push_back(line);
        drop(state);
        self.shared.ready.notify_all();
    }
}
