//! Line-buffered output for the two streams a line program writes to.
//!
//! Writes arrive at any granularity (single bytes, character codes, string
//! fragments). Each stream keeps its own buffer and hands complete lines to a
//! [`LineDisplay`] as soon as their terminator shows up.

use std::{
    cell::{Cell, Ref, RefCell},
    fmt, io,
    rc::Rc,
};

use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stream::Stdout => write!(f, "stdout"),
            Stream::Stderr => write!(f, "stderr"),
        }
    }
}

/// Where finished lines end up.
pub trait LineDisplay {
    fn show_line(&mut self, stream: Stream, line: &str);
}

impl<D: LineDisplay + ?Sized> LineDisplay for Box<D> {
    fn show_line(&mut self, stream: Stream, line: &str) {
        (**self).show_line(stream, line)
    }
}

/// In-memory display. Keeps every rendered line in order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Transcript {
    lines: Vec<(Stream, String)>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> &[(Stream, String)] {
        &self.lines
    }

    pub fn lines(&self, stream: Stream) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, l)| l.as_str())
            .collect()
    }

    pub fn take(&mut self) -> Vec<(Stream, String)> {
        std::mem::take(&mut self.lines)
    }
}

impl LineDisplay for Transcript {
    fn show_line(&mut self, stream: Stream, line: &str) {
        self.lines.push((stream, line.to_string()));
    }
}

/// Bytes written since the last terminator.
#[derive(Debug, Default, Clone)]
pub struct OutputBuffer {
    bytes: Vec<u8>,
}

impl OutputBuffer {
    /// Appends `unit`, calling `emit` once per completed line.
    pub fn push(&mut self, unit: &[u8], mut emit: impl FnMut(String)) {
        for &b in unit {
            if b == b'\n' {
                if self.bytes.last() == Some(&b'\r') {
                    self.bytes.pop();
                }
                emit(decode(std::mem::take(&mut self.bytes)));
            } else {
                self.bytes.push(b);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn partial(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn take_partial(&mut self) -> Option<String> {
        if self.bytes.is_empty() {
            None
        } else {
            Some(decode(std::mem::take(&mut self.bytes)))
        }
    }
}

fn decode(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

#[derive(Debug)]
pub struct OutputSink<D> {
    display: D,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
}

impl<D: Default> Default for OutputSink<D> {
    fn default() -> Self {
        OutputSink::new(D::default())
    }
}

impl<D> OutputSink<D> {
    pub fn new(display: D) -> Self {
        OutputSink {
            display,
            stdout: OutputBuffer::default(),
            stderr: OutputBuffer::default(),
        }
    }

    fn buffer(&self, stream: Stream) -> &OutputBuffer {
        match stream {
            Stream::Stdout => &self.stdout,
            Stream::Stderr => &self.stderr,
        }
    }

    pub fn pending(&self, stream: Stream) -> String {
        self.buffer(stream).partial()
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn into_display(self) -> D {
        self.display
    }
}

impl<D: LineDisplay> OutputSink<D> {
    fn push(&mut self, stream: Stream, unit: &[u8]) {
        let (buffer, display) = match stream {
            Stream::Stdout => (&mut self.stdout, &mut self.display),
            Stream::Stderr => (&mut self.stderr, &mut self.display),
        };

        buffer.push(unit, |line| {
            trace!(%stream, len = line.len(), "line rendered");
            display.show_line(stream, &line);
        });
    }

    /// One raw byte, as a C-style `putchar` hook delivers it. Multi-byte
    /// UTF-8 sequences may be split across calls.
    pub fn write_byte(&mut self, stream: Stream, byte: u8) {
        self.push(stream, &[byte]);
    }

    /// One Unicode scalar value. Codes that aren't one render as U+FFFD.
    pub fn write_char(&mut self, stream: Stream, code: u32) {
        let c = char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
        let mut utf8 = [0; 4];
        self.push(stream, c.encode_utf8(&mut utf8).as_bytes());
    }

    pub fn write_str(&mut self, stream: Stream, text: &str) {
        self.push(stream, text.as_bytes());
    }

    /// Renders whatever is left in `stream`'s buffer as a line of its own.
    pub fn flush(&mut self, stream: Stream) {
        let partial = match stream {
            Stream::Stdout => self.stdout.take_partial(),
            Stream::Stderr => self.stderr.take_partial(),
        };

        if let Some(line) = partial {
            self.display.show_line(stream, &line);
        }
    }

    /// Transcript copy of a committed input line. The prompt is only added
    /// when the program hasn't already started the current stdout line.
    pub fn echo(&mut self, prompt: &str, line: &str) {
        if self.stdout.is_empty() {
            self.write_str(Stream::Stdout, prompt);
        }
        self.write_str(Stream::Stdout, line);
        self.write_byte(Stream::Stdout, b'\n');
    }

    pub fn flush_all(&mut self) {
        self.flush(Stream::Stdout);
        self.flush(Stream::Stderr);
    }

    pub fn writer(&mut self, stream: Stream) -> StreamWriter<'_, D> {
        StreamWriter { sink: self, stream }
    }
}

/// [`io::Write`] view of one stream. `flush` only flushes the underlying
/// display, never a partial line.
#[derive(Debug)]
pub struct StreamWriter<'a, D> {
    sink: &'a mut OutputSink<D>,
    stream: Stream,
}

impl<D: LineDisplay> io::Write for StreamWriter<'_, D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.push(self.stream, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Shared handle to an [`OutputSink`] whose display may write back into the
/// same sink while showing a line. Completed lines are collected with the sink
/// borrowed and shown once the borrow is released, in completion order.
pub struct SharedSink<D> {
    inner: Rc<Shared<D>>,
}

struct Shared<D> {
    sink: RefCell<OutputSink<Transcript>>,
    display: RefCell<D>,
    delivering: Cell<bool>,
}

impl<D> Clone for SharedSink<D> {
    fn clone(&self) -> Self {
        SharedSink {
            inner: self.inner.clone(),
        }
    }
}

impl<D: LineDisplay> SharedSink<D> {
    pub fn new(display: D) -> Self {
        SharedSink {
            inner: Rc::new(Shared {
                sink: RefCell::new(OutputSink::new(Transcript::new())),
                display: RefCell::new(display),
                delivering: Cell::new(false),
            }),
        }
    }

    /// Runs `f` against the sink, then shows whatever lines it completed.
    pub fn with<R>(&self, f: impl FnOnce(&mut OutputSink<Transcript>) -> R) -> R {
        let result = f(&mut self.inner.sink.borrow_mut());
        self.deliver();
        result
    }

    pub fn display(&self) -> Ref<'_, D> {
        self.inner.display.borrow()
    }

    /// A nested call made from inside `show_line` only queues; the outer
    /// call picks its lines up on the next pass.
    fn deliver(&self) {
        if self.inner.delivering.replace(true) {
            trace!("re-entrant write queued");
            return;
        }

        loop {
            let lines = self.inner.sink.borrow_mut().display_mut().take();
            if lines.is_empty() {
                break;
            }

            let mut display = self.inner.display.borrow_mut();
            for (stream, line) in lines {
                display.show_line(stream, &line);
            }
        }

        self.inner.delivering.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn sink() -> OutputSink<Transcript> {
        OutputSink::new(Transcript::new())
    }

    #[test]
    fn char_by_char_lines() {
        let mut out = sink();
        for c in "abc\ndef\n".chars() {
            out.write_char(Stream::Stdout, c as u32);
        }

        assert_eq!(out.display().lines(Stream::Stdout), vec!["abc", "def"]);
        assert_eq!(out.pending(Stream::Stdout), "");
    }

    #[test]
    fn partial_writes_coalesce() {
        let mut out = sink();
        out.write_str(Stream::Stdout, "ab");
        assert!(out.display().all().is_empty());
        assert_eq!(out.pending(Stream::Stdout), "ab");

        out.write_str(Stream::Stdout, "c\n");
        assert_eq!(out.display().lines(Stream::Stdout), vec!["abc"]);
    }

    #[test]
    fn fragment_with_several_terminators() {
        let mut out = sink();
        out.write_str(Stream::Stdout, "one\ntwo\n\nthr");

        assert_eq!(out.display().lines(Stream::Stdout), vec!["one", "two", ""]);
        assert_eq!(out.pending(Stream::Stdout), "thr");
    }

    #[test]
    fn streams_do_not_mix() {
        let mut out = sink();
        out.write_str(Stream::Stdout, "out-");
        out.write_str(Stream::Stderr, "err-");
        out.write_str(Stream::Stdout, "line\n");
        out.write_str(Stream::Stderr, "line\n");

        assert_eq!(
            out.display().all(),
            &[
                (Stream::Stdout, "out-line".to_string()),
                (Stream::Stderr, "err-line".to_string()),
            ]
        );
    }

    #[test]
    fn utf8_bytes_split_across_writes() {
        let mut out = sink();
        for b in "héllo\n".bytes() {
            out.write_byte(Stream::Stdout, b);
        }
        assert_eq!(out.display().lines(Stream::Stdout), vec!["héllo"]);
    }

    #[test]
    fn invalid_input_is_replaced() {
        let mut out = sink();
        out.write_byte(Stream::Stderr, 0xff);
        out.write_char(Stream::Stderr, 0xD800);
        out.write_byte(Stream::Stderr, b'\n');
        assert_eq!(out.display().lines(Stream::Stderr), vec!["\u{fffd}\u{fffd}"]);
    }

    #[test]
    fn crlf_is_one_line() {
        let mut out = sink();
        out.write_str(Stream::Stdout, "dos\r\n");
        assert_eq!(out.display().lines(Stream::Stdout), vec!["dos"]);
    }

    #[test]
    fn flush_renders_partial_line_once() {
        let mut out = sink();
        out.write_str(Stream::Stdout, "> ");
        out.flush(Stream::Stdout);
        out.flush(Stream::Stdout);

        assert_eq!(out.display().lines(Stream::Stdout), vec!["> "]);
    }

    #[test]
    fn echo_joins_program_prompt() {
        let mut out = sink();
        out.echo("> ", "first");
        out.write_str(Stream::Stdout, "name? ");
        out.echo("> ", "second");

        assert_eq!(
            out.display().lines(Stream::Stdout),
            vec!["> first", "name? second"]
        );
    }

    struct Loopback {
        shown: Vec<(Stream, String)>,
        sink: Rc<RefCell<Option<SharedSink<Loopback>>>>,
    }

    impl LineDisplay for Loopback {
        fn show_line(&mut self, stream: Stream, line: &str) {
            self.shown.push((stream, line.to_string()));
            if stream == Stream::Stdout {
                if let Some(sink) = self.sink.borrow().as_ref() {
                    sink.with(|out| out.write_str(Stream::Stderr, &format!("saw {}\n", line)));
                }
            }
        }
    }

    #[test]
    fn display_may_write_back_into_shared_sink() {
        let slot = Rc::new(RefCell::new(None));
        let shared = SharedSink::new(Loopback {
            shown: Vec::new(),
            sink: slot.clone(),
        });
        *slot.borrow_mut() = Some(shared.clone());

        shared.with(|out| out.write_str(Stream::Stdout, "a\nb\npart"));
        shared.with(|out| out.flush_all());

        assert_eq!(
            shared.display().shown,
            vec![
                (Stream::Stdout, "a".to_string()),
                (Stream::Stdout, "b".to_string()),
                (Stream::Stderr, "saw a".to_string()),
                (Stream::Stderr, "saw b".to_string()),
                (Stream::Stdout, "part".to_string()),
                (Stream::Stderr, "saw part".to_string()),
            ]
        );
        slot.borrow_mut().take();
    }

    #[test]
    fn io_writer() {
        let mut out = sink();
        writeln!(out.writer(Stream::Stdout), "{} + {} = {}", 1, 2, 3).ok();
        assert_eq!(out.display().lines(Stream::Stdout), vec!["1 + 2 = 3"]);
    }
}
