//! Turns UI activity into committed lines.
//!
//! Every front end (single line box, staging area with a submit control,
//! upload followed by evaluate) ends in [`LineSource::on_commit`]; the bridge
//! behind it never learns which one produced a line.

use tracing::{debug, trace};

use crate::{
    bridge::Commit,
    keys::{Gesture, GestureMap, KeyChord, KeyEvent},
};

/// The editable control a front end reads from.
pub trait InputWidget {
    fn value(&self) -> String;
    fn set_value(&mut self, value: &str);

    fn clear(&mut self) {
        self.set_value("");
    }

    fn is_focused(&self) -> bool {
        true
    }
}

/// Plain in-memory widget.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TextField {
    pub text: String,
    pub focused: bool,
}

impl TextField {
    pub fn new() -> Self {
        TextField {
            text: String::new(),
            focused: true,
        }
    }

    pub fn type_str(&mut self, s: &str) {
        self.text.push_str(s);
    }
}

impl InputWidget for TextField {
    fn value(&self) -> String {
        self.text.clone()
    }

    fn set_value(&mut self, value: &str) {
        self.text = value.to_string();
    }

    fn is_focused(&self) -> bool {
        self.focused
    }
}

type Echo = Box<dyn FnMut(&str)>;

/// Cuts `raw` at its first line terminator.
pub fn normalize(raw: &str) -> &str {
    match raw.find(['\r', '\n']) {
        Some(end) => &raw[..end],
        None => raw,
    }
}

/// Longest prefix of `line` that fits in `max` bytes without splitting a
/// character.
pub fn truncate(line: &str, max: usize) -> &str {
    if line.len() <= max {
        return line;
    }

    let mut end = max;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

/// Splits staged text into lines. One trailing terminator doesn't start an
/// extra line; empty text is one empty line.
pub fn split_lines(text: &str) -> Vec<&str> {
    let body = text
        .strip_suffix('\n')
        .map(|t| t.strip_suffix('\r').unwrap_or(t))
        .unwrap_or(text);

    body.split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect()
}

pub struct LineSource<C> {
    target: C,
    echo: Option<Echo>,
    max_line_bytes: Option<usize>,
    committed: u64,
}

impl<C: std::fmt::Debug> std::fmt::Debug for LineSource<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSource")
            .field("target", &self.target)
            .field("echo", &self.echo.is_some())
            .field("max_line_bytes", &self.max_line_bytes)
            .field("committed", &self.committed)
            .finish()
    }
}

impl<C: Commit> LineSource<C> {
    pub fn new(target: C) -> Self {
        LineSource {
            target,
            echo: None,
            max_line_bytes: None,
            committed: 0,
        }
    }

    /// Copies each committed line somewhere visible, e.g. the output sink.
    pub fn with_echo(mut self, echo: impl FnMut(&str) + 'static) -> Self {
        self.echo = Some(Box::new(echo));
        self
    }

    pub fn with_line_limit(mut self, max_line_bytes: Option<usize>) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    pub fn target(&self) -> &C {
        &self.target
    }

    pub fn committed(&self) -> u64 {
        self.committed
    }

    /// Queues exactly one line, empty or not.
    pub fn on_commit(&mut self, raw: &str) {
        let mut line = normalize(raw);
        if let Some(max) = self.max_line_bytes {
            line = truncate(line, max);
        }

        if let Some(echo) = self.echo.as_mut() {
            echo(line);
        }

        self.committed += 1;
        trace!(n = self.committed, len = line.len(), "commit");
        self.target.commit(line.to_string());
    }

    /// Queues lines that were already separated by the front end, one commit
    /// each, so trailing empty lines survive.
    pub fn on_entry<S: AsRef<str>>(&mut self, lines: &[S]) {
        for line in lines {
            self.on_commit(line.as_ref());
        }
    }

    /// Queues every line of a multi-line submission, in order.
    pub fn on_submit(&mut self, text: &str) {
        let lines = split_lines(text);
        debug!(lines = lines.len(), "bulk submit");
        for line in lines {
            self.on_commit(line);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Key(KeyEvent),
    /// The submit or evaluate control was activated.
    Submit,
    /// File contents finished loading.
    Loaded(String),
}

/// One way of producing lines from the page.
pub trait FrontEnd {
    /// Returns true when the event was consumed and the host's default action
    /// should be suppressed.
    fn handle(&mut self, event: UiEvent) -> bool;
}

/// Single-line input box; the commit gesture sends its value.
#[derive(Debug)]
pub struct LineBox<W, C> {
    widget: W,
    source: LineSource<C>,
    gestures: GestureMap,
}

impl<W: InputWidget, C: Commit> LineBox<W, C> {
    pub fn new(widget: W, source: LineSource<C>, gestures: GestureMap) -> Self {
        LineBox {
            widget,
            source,
            gestures,
        }
    }

    pub fn widget(&self) -> &W {
        &self.widget
    }

    pub fn widget_mut(&mut self) -> &mut W {
        &mut self.widget
    }
}

impl<W: InputWidget, C: Commit> FrontEnd for LineBox<W, C> {
    fn handle(&mut self, event: UiEvent) -> bool {
        let key = match event {
            UiEvent::Key(key) => key,
            UiEvent::Submit => {
                let value = self.widget.value();
                self.widget.clear();
                self.source.on_commit(&value);
                return true;
            }
            UiEvent::Loaded(_) => return false,
        };

        match self.gestures.classify(&key) {
            Gesture::Commit if self.widget.is_focused() => {
                let value = self.widget.value();
                self.widget.clear();
                self.source.on_commit(&value);
                true
            }
            Gesture::Commit => {
                trace!("commit without focus ignored");
                false
            }
            // Single-line widget: there's nowhere for a continuation to go.
            Gesture::Continue if self.widget.is_focused() => true,
            Gesture::Continue => {
                trace!("continuation without focus ignored");
                false
            }
            Gesture::Edit => false,
        }
    }
}

/// Multi-line staging area with an explicit submit.
#[derive(Debug)]
pub struct StagingArea<W, C> {
    widget: W,
    source: LineSource<C>,
    submit_key: Option<KeyChord>,
}

impl<W: InputWidget, C: Commit> StagingArea<W, C> {
    pub fn new(widget: W, source: LineSource<C>, submit_key: Option<KeyChord>) -> Self {
        StagingArea {
            widget,
            source,
            submit_key,
        }
    }

    pub fn widget(&self) -> &W {
        &self.widget
    }

    pub fn widget_mut(&mut self) -> &mut W {
        &mut self.widget
    }

    fn submit(&mut self) {
        let text = self.widget.value();
        self.widget.clear();
        self.source.on_submit(&text);
    }
}

impl<W: InputWidget, C: Commit> FrontEnd for StagingArea<W, C> {
    fn handle(&mut self, event: UiEvent) -> bool {
        match event {
            UiEvent::Submit => {
                self.submit();
                true
            }
            UiEvent::Key(key) if Some(key) == self.submit_key => {
                if !self.widget.is_focused() {
                    trace!("submit chord without focus ignored");
                    return false;
                }
                self.submit();
                true
            }
            UiEvent::Key(_) => false,
            UiEvent::Loaded(_) => false,
        }
    }
}

/// Upload lands in a staging widget for review; evaluate sends it.
#[derive(Debug)]
pub struct UploadStaging<W, C> {
    staging: StagingArea<W, C>,
}

impl<W: InputWidget, C: Commit> UploadStaging<W, C> {
    pub fn new(widget: W, source: LineSource<C>) -> Self {
        UploadStaging {
            staging: StagingArea::new(widget, source, None),
        }
    }

    pub fn widget(&self) -> &W {
        self.staging.widget()
    }
}

impl<W: InputWidget, C: Commit> FrontEnd for UploadStaging<W, C> {
    fn handle(&mut self, event: UiEvent) -> bool {
        match event {
            UiEvent::Loaded(text) => {
                debug!(bytes = text.len(), "upload staged");
                self.staging.widget_mut().set_value(&text);
                true
            }
            other => self.staging.handle(other),
        }
    }
}
