use std::io::{stdin, stdout, BufRead, Stdout, Write};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use termion::event::{Event, Key as TermKey};
use termion::input::TermRead;
use termion::raw::{IntoRawMode, RawTerminal};
use tracing::{debug, info};

use linebridge::{
    logging, BlockingBridge, BridgeResult, Gesture, GestureMap, Key, KeyEvent, LineDisplay,
    LineSource, Modifiers, OutputSink, SessionConfig, Stream,
};

const CONTINUATION_PROMPT: &str = ".. ";

/// Renders program output. In raw mode the editor's current input row is
/// redrawn under every line so output doesn't swallow it.
struct TerminalDisplay {
    raw: bool,
    input_row: Arc<Mutex<String>>,
}

impl LineDisplay for TerminalDisplay {
    fn show_line(&mut self, stream: Stream, line: &str) {
        if !self.raw {
            let _ = match stream {
                Stream::Stdout => writeln!(stdout().lock(), "{}", line),
                Stream::Stderr => writeln!(std::io::stderr().lock(), "{}", line),
            };
            return;
        }

        let mut out = stdout().lock();
        let _ = match stream {
            Stream::Stdout => write!(out, "\r\x1B[2K{}\r\n", line),
            Stream::Stderr => write!(out, "\r\x1B[2K\x1B[31m{}\x1B[0m\r\n", line),
        };
        let _ = write!(out, "{}", self.input_row.lock());
        let _ = out.flush();
    }
}

type SharedOutput = Arc<Mutex<OutputSink<TerminalDisplay>>>;

fn key_event(key: TermKey) -> KeyEvent {
    let alt = Modifiers {
        alt: true,
        ..Modifiers::NONE
    };
    let ctrl = Modifiers {
        ctrl: true,
        ..Modifiers::NONE
    };

    match key {
        TermKey::Char('\n') | TermKey::Char('\r') => KeyEvent::plain(Key::Enter),
        TermKey::Char('\t') => KeyEvent::plain(Key::Tab),
        TermKey::Char(' ') => KeyEvent::plain(Key::Space),
        TermKey::Char(c) => KeyEvent::plain(Key::Char(c)),
        TermKey::Alt('\r') | TermKey::Alt('\n') => KeyEvent::new(Key::Enter, alt),
        TermKey::Alt(c) => KeyEvent::new(Key::Char(c), alt),
        TermKey::Ctrl(c) => KeyEvent::new(Key::Char(c), ctrl),
        TermKey::Backspace => KeyEvent::plain(Key::Backspace),
        TermKey::Esc => KeyEvent::plain(Key::Escape),
        _ => KeyEvent::plain(Key::Other),
    }
}

fn byte_at(line: &str, cursor: usize) -> usize {
    line.char_indices()
        .nth(cursor)
        .map_or(line.len(), |(i, _)| i)
}

struct Editor {
    stdout: RawTerminal<Stdout>,
    history: Vec<String>,
    gestures: GestureMap,
    prompt: String,
    input_row: Arc<Mutex<String>>,
}

impl Editor {
    pub fn new(config: &SessionConfig, input_row: Arc<Mutex<String>>) -> BridgeResult<Self> {
        let stdout = stdout().into_raw_mode()?;

        Ok(Editor {
            stdout,
            history: Vec::new(),
            gestures: config.gestures()?,
            prompt: config.prompt.clone(),
            input_row,
        })
    }

    fn redraw(&mut self, continued: bool, line: &str, cursor: usize) -> BridgeResult<()> {
        let indicator = match continued {
            false => self.prompt.as_str(),
            true => CONTINUATION_PROMPT,
        };

        let row = format!("{}{}", indicator, line);
        let column = indicator.chars().count() + cursor + 1;
        *self.input_row.lock() = format!("{}\x1B[{}G", row, column);

        write!(self.stdout, "\r\x1B[2K{}\x1B[{}G", row, column)?;
        self.stdout.flush()?;
        Ok(())
    }

    /// Reads one entry, which may span several lines joined by the
    /// continuation chord. `None` means the user asked to leave.
    pub fn readline(&mut self) -> BridgeResult<Option<Vec<String>>> {
        let mut lines: Vec<String> = Vec::new();
        let mut line = String::new();
        let mut cursor: usize = 0;
        let mut history_pos: usize = self.history.len();
        self.stdout.activate_raw_mode()?;

        self.redraw(false, &line, cursor)?;

        for event in stdin().events() {
            let key = match event? {
                Event::Key(key) => key,
                _ => continue,
            };

            match (self.gestures.classify(&key_event(key)), key) {
                (Gesture::Commit, _) => {
                    self.history.push(line.clone());
                    lines.push(line);
                    write!(self.stdout, "\r\n")?;
                    self.input_row.lock().clear();
                    return Ok(Some(lines));
                }
                (Gesture::Continue, _) => {
                    self.history.push(line.clone());
                    lines.push(std::mem::take(&mut line));
                    cursor = 0;
                    write!(self.stdout, "\r\n")?;
                }
                (_, TermKey::Ctrl('c')) => {
                    write!(self.stdout, "\r\n")?;
                    return Ok(None);
                }
                (_, TermKey::Ctrl('d')) if line.is_empty() && lines.is_empty() => {
                    write!(self.stdout, "\r\n")?;
                    return Ok(None);
                }
                (_, TermKey::Char('\t')) => {
                    line.insert_str(byte_at(&line, cursor), "    ");
                    cursor += 4;
                }
                (_, TermKey::Backspace) => {
                    if cursor > 0 {
                        cursor -= 1;
                        line.remove(byte_at(&line, cursor));
                    }
                }
                (_, TermKey::Char('\n')) => (),
                (_, TermKey::Char(x)) => {
                    line.insert(byte_at(&line, cursor), x);
                    cursor += 1;
                }
                (_, TermKey::Left) => cursor = cursor.saturating_sub(1),
                (_, TermKey::Right) => cursor = (cursor + 1).min(line.chars().count()),
                (_, TermKey::Up) => {
                    history_pos = history_pos.saturating_sub(1);
                    line = self.history.get(history_pos).cloned().unwrap_or_default();
                    cursor = line.chars().count();
                }
                (_, TermKey::Down) => {
                    history_pos = (history_pos + 1).min(self.history.len());
                    line = self.history.get(history_pos).cloned().unwrap_or_default();
                    cursor = line.chars().count();
                }
                _ => (),
            }

            self.redraw(!lines.is_empty(), &line, cursor)?;
        }

        Ok(None)
    }
}

impl Drop for Editor {
    fn drop(&mut self) {
        let _ = self.stdout.suspend_raw_mode();
    }
}

/// Stand-in line program: prints every line reversed, one character at a
/// time, and reports empty lines on stderr.
fn reverse_lines(bridge: BlockingBridge, output: SharedOutput) {
    let mut count: u64 = 0;

    while let Ok(line) = bridge.read_line() {
        count += 1;
        let mut out = output.lock();

        if line.is_empty() {
            let _ = writeln!(out.writer(Stream::Stderr), "line {}: empty", count);
            continue;
        }

        for c in line.chars().rev() {
            out.write_char(Stream::Stdout, c as u32);
        }
        out.write_byte(Stream::Stdout, b'\n');
    }

    info!(count, "input closed");
    output.lock().flush_all();
}

fn echo_into(
    source: LineSource<BlockingBridge>,
    config: &SessionConfig,
    output: &SharedOutput,
) -> LineSource<BlockingBridge> {
    if !config.echo {
        return source;
    }

    let output = output.clone();
    let prompt = config.prompt.clone();
    source.with_echo(move |line| output.lock().echo(&prompt, line))
}

fn main() -> BridgeResult<()> {
    if let Err(err) = logging::init(&logging::LogConfig::from_env()) {
        eprintln!("linebridge: {}", err);
    }

    let mut config = SessionConfig {
        continuation: Modifiers {
            alt: true,
            ..Modifiers::NONE
        },
        ..SessionConfig::default()
    };
    config.apply_env(|key| std::env::var(key).ok())?;

    let interactive = termion::is_tty(&stdin());
    let input_row = Arc::new(Mutex::new(String::new()));
    let bridge = BlockingBridge::new();
    let output: SharedOutput = Arc::new(Mutex::new(OutputSink::new(TerminalDisplay {
        raw: interactive,
        input_row: input_row.clone(),
    })));

    let program = {
        let bridge = bridge.clone();
        let output = output.clone();
        thread::Builder::new()
            .name("program".to_string())
            .spawn(move || reverse_lines(bridge, output))?
    };

    let source = LineSource::new(bridge.clone()).with_line_limit(config.max_line_bytes);
    let mut source = echo_into(source, &config, &output);

    if interactive {
        debug!("interactive session");
        let mut editor = Editor::new(&config, input_row)?;
        while let Some(entry) = editor.readline()? {
            source.on_entry(&entry);
        }
    } else {
        debug!("piped session");
        for line in stdin().lock().lines() {
            source.on_commit(&line?);
        }
    }

    bridge.close();
    if program.join().is_err() {
        eprintln!("linebridge: program thread panicked");
    }

    Ok(())
}
