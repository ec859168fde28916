//! Single-threaded bridge between a caller that wants "the next line, now" and
//! a page that only produces lines when the user gets around to typing them.
//!
//! Two FIFO queues live behind one handle: parked requests and committed lines.
//! Every mutation runs the matching step, so after any call returns at most one
//! of the two queues is non-empty.

use std::{
    cell::RefCell,
    collections::VecDeque,
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

use futures::channel::oneshot;
use tracing::{debug, trace};

use crate::error::{BridgeError, BridgeResult};

type Continuation = Box<dyn FnOnce(String)>;

/// Anything that accepts committed lines.
pub trait Commit {
    fn commit(&self, line: String);
}

#[derive(Default)]
struct Queues {
    lines: VecDeque<String>,
    pending: VecDeque<(u64, Continuation)>,
    next_request: u64,
    delivered: u64,
    closed: bool,
}

impl Queues {
    fn next_pair(&mut self) -> Option<(u64, Continuation, String)> {
        if self.pending.is_empty() || self.lines.is_empty() {
            return None;
        }

        let (id, k) = self.pending.pop_front()?;
        let line = self.lines.pop_front()?;
        self.delivered += 1;
        Some((id, k, line))
    }
}

#[derive(Clone, Default)]
pub struct LineBridge {
    queues: Rc<RefCell<Queues>>,
}

impl std::fmt::Debug for LineBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let q = self.queues.borrow();
        f.debug_struct("LineBridge")
            .field("lines", &q.lines.len())
            .field("pending", &q.pending.len())
            .field("delivered", &q.delivered)
            .field("closed", &q.closed)
            .finish()
    }
}

impl LineBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `k` to receive the next unclaimed line. Runs `k` before
    /// returning when a line is already waiting.
    pub fn request_line_with<F>(&self, k: F)
    where
        F: FnOnce(String) + 'static,
    {
        {
            let mut q = self.queues.borrow_mut();
            let id = q.next_request;
            q.next_request += 1;

            if q.closed && q.lines.is_empty() {
                debug!(request = id, "request on closed bridge abandoned");
                return;
            }

            trace!(request = id, "line requested");
            q.pending.push_back((id, Box::new(k)));
        }

        self.settle();
    }

    /// Future form of [`request_line_with`](Self::request_line_with).
    pub fn request_line(&self) -> LineRequest {
        let (tx, rx) = oneshot::channel();

        self.request_line_with(move |line| {
            // The receiver may have been dropped by a caller that gave up.
            let _ = tx.send(line);
        });

        LineRequest { rx }
    }

    /// Pairs heads of both queues until one runs dry. Continuations run with
    /// no borrow held so they may request again.
    fn settle(&self) {
        loop {
            let next = self.queues.borrow_mut().next_pair();
            match next {
                Some((id, k, line)) => {
                    trace!(request = id, len = line.len(), "line delivered");
                    k(line);
                }
                None => break,
            }
        }
    }

    pub fn available(&self) -> usize {
        self.queues.borrow().lines.len()
    }

    pub fn pending(&self) -> usize {
        self.queues.borrow().pending.len()
    }

    /// Total number of request/line pairs matched so far.
    pub fn delivered(&self) -> u64 {
        self.queues.borrow().delivered
    }

    pub fn is_closed(&self) -> bool {
        self.queues.borrow().closed
    }

    /// Ends the session. Parked requests are dropped without running, queued
    /// lines remain claimable, and further commits are ignored.
    pub fn close(&self) {
        let abandoned = {
            let mut q = self.queues.borrow_mut();
            if q.closed {
                return;
            }
            q.closed = true;
            std::mem::take(&mut q.pending)
        };

        debug!(abandoned = abandoned.len(), "line bridge closed");
        // Dropping outside the borrow: a dropped oneshot sender wakes its task.
        drop(abandoned);
    }
}

impl Commit for LineBridge {
    fn commit(&self, line: String) {
        {
            let mut q = self.queues.borrow_mut();
            if q.closed {
                debug!("commit after close ignored");
                return;
            }
            trace!(len = line.len(), queued = q.lines.len(), "line committed");
            q.lines.push_back(line);
        }

        self.settle();
    }
}

/// A parked (or already satisfied) request for one line.
#[derive(Debug)]
#[must_use = "a line request does nothing unless awaited"]
pub struct LineRequest {
    rx: oneshot::Receiver<String>,
}

impl Future for LineRequest {
    type Output = BridgeResult<String>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|line| line.map_err(|_| BridgeError::Closed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use pretty_assertions::assert_eq;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn() -> Box<dyn FnOnce(String)>) {
        let got = Rc::new(RefCell::new(Vec::new()));
        let sink = got.clone();
        (got, move || {
            let sink = sink.clone();
            let k: Box<dyn FnOnce(String)> = Box::new(move |line: String| sink.borrow_mut().push(line));
            k
        })
    }

    #[test]
    fn resolves_immediately_when_line_is_waiting() {
        let bridge = LineBridge::new();
        bridge.commit("hello".to_string());

        let (got, k) = recorder();
        bridge.request_line_with(k());

        assert_eq!(*got.borrow(), vec!["hello".to_string()]);
        assert_eq!(bridge.available(), 0);
        assert_eq!(bridge.pending(), 0);
    }

    #[test]
    fn parks_until_commit() {
        let bridge = LineBridge::new();
        let (got, k) = recorder();

        bridge.request_line_with(k());
        assert!(got.borrow().is_empty());
        assert_eq!(bridge.pending(), 1);

        bridge.commit("late".to_string());
        assert_eq!(*got.borrow(), vec!["late".to_string()]);
        assert_eq!(bridge.pending(), 0);
    }

    #[test]
    fn empty_line_is_delivered() {
        let bridge = LineBridge::new();
        bridge.commit(String::new());
        assert_eq!(bridge.available(), 1);

        let line = bridge.request_line().now_or_never();
        assert_eq!(line.map(|r| r.ok()), Some(Some(String::new())));
    }

    #[test]
    fn continuation_may_request_again() {
        let bridge = LineBridge::new();
        let got = Rc::new(RefCell::new(Vec::new()));

        let again = bridge.clone();
        let sink = got.clone();
        bridge.request_line_with(move |first| {
            sink.borrow_mut().push(first);
            let sink = sink.clone();
            again.request_line_with(move |second| sink.borrow_mut().push(second));
        });

        let (_, k) = recorder();
        bridge.request_line_with(k());

        // Three lines: the first request, then the older second request, then
        // the re-entrant one registered inside the first continuation.
        bridge.commit("a".to_string());
        bridge.commit("b".to_string());
        bridge.commit("c".to_string());

        assert_eq!(*got.borrow(), vec!["a".to_string(), "c".to_string()]);
        assert_eq!(bridge.delivered(), 3);
    }

    #[test]
    fn future_parks_and_resolves() {
        let bridge = LineBridge::new();
        let mut req = bridge.request_line();

        assert!((&mut req).now_or_never().is_none());
        bridge.commit("x".to_string());
        assert_eq!(req.now_or_never().map(|r| r.ok()), Some(Some("x".to_string())));
    }

    #[test]
    fn close_abandons_parked_requests() {
        let bridge = LineBridge::new();
        let (got, k) = recorder();
        bridge.request_line_with(k());
        let req = bridge.request_line();

        bridge.close();
        bridge.commit("ignored".to_string());

        assert!(got.borrow().is_empty());
        assert!(matches!(req.now_or_never(), Some(Err(BridgeError::Closed))));
        assert_eq!(bridge.available(), 0);
    }

    #[test]
    fn close_keeps_queued_lines_claimable() {
        let bridge = LineBridge::new();
        bridge.commit("kept".to_string());
        bridge.close();

        let first = bridge.request_line().now_or_never();
        assert_eq!(first.map(|r| r.ok()), Some(Some("kept".to_string())));

        let second = bridge.request_line().now_or_never();
        assert!(matches!(second, Some(Err(BridgeError::Closed))));
    }
}
