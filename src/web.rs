//! The JavaScript-facing session: one bridge, one output sink bound to the
//! page, and whatever input front ends the page attaches.

use std::{cell::RefCell, rc::Rc};

use js_sys::{Function, Promise, Reflect};
use tracing::{debug, trace, warn};
use wasm_bindgen::{prelude::*, JsCast};
use wasm_bindgen_futures::{future_to_promise, spawn_local, JsFuture};
use web_sys::{
    Document, Element, Event, EventTarget, HtmlInputElement, HtmlTextAreaElement, KeyboardEvent,
};

use crate::{
    bridge::LineBridge,
    config::SessionConfig,
    error::BridgeError,
    keys::{Key, KeyEvent, Modifiers},
    output::{LineDisplay, SharedSink, Stream},
    source::{FrontEnd, InputWidget, LineBox, LineSource, StagingArea, UiEvent, UploadStaging},
};

fn to_js(err: BridgeError) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}

fn document() -> Result<Document, JsValue> {
    web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| JsValue::from_str("no document available"))
}

fn find<T: JsCast>(doc: &Document, selector: &str) -> Result<T, JsValue> {
    doc.query_selector(selector)?
        .and_then(|el| el.dyn_into::<T>().ok())
        .ok_or_else(|| to_js(BridgeError::MissingElement(selector.to_string())))
}

fn has_focus(el: &Element) -> bool {
    web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.active_element())
        .map_or(false, |active| active == *el)
}

impl InputWidget for HtmlInputElement {
    fn value(&self) -> String {
        HtmlInputElement::value(self)
    }

    fn set_value(&mut self, value: &str) {
        HtmlInputElement::set_value(self, value)
    }

    fn is_focused(&self) -> bool {
        has_focus(self)
    }
}

impl InputWidget for HtmlTextAreaElement {
    fn value(&self) -> String {
        HtmlTextAreaElement::value(self)
    }

    fn set_value(&mut self, value: &str) {
        HtmlTextAreaElement::set_value(self, value)
    }

    fn is_focused(&self) -> bool {
        has_focus(self)
    }
}

enum PageDisplay {
    Regions { stdout: Element, stderr: Element },
    Callbacks { stdout: Function, stderr: Function },
}

impl LineDisplay for PageDisplay {
    fn show_line(&mut self, stream: Stream, line: &str) {
        match self {
            PageDisplay::Regions { stdout, stderr } => {
                let region = match stream {
                    Stream::Stdout => stdout,
                    Stream::Stderr => stderr,
                };

                let mut text = String::with_capacity(line.len() + 1);
                text.push_str(line);
                text.push('\n');
                if region.append_with_str_1(&text).is_err() {
                    warn!(%stream, "could not append output line");
                }
                region.set_scroll_top(region.scroll_height());
            }
            PageDisplay::Callbacks { stdout, stderr } => {
                let f = match stream {
                    Stream::Stdout => stdout,
                    Stream::Stderr => stderr,
                };
                if f.call1(&JsValue::NULL, &JsValue::from_str(line)).is_err() {
                    warn!(%stream, "output callback threw");
                }
            }
        }
    }
}

/// Keeps a listener registered for as long as it lives.
struct Listener {
    target: EventTarget,
    kind: &'static str,
    callback: Closure<dyn FnMut(Event)>,
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.kind, self.callback.as_ref().unchecked_ref());
    }
}

fn listen<F>(target: &EventTarget, kind: &'static str, f: F) -> Result<Listener, JsValue>
where
    F: FnMut(Event) + 'static,
{
    let callback = Closure::wrap(Box::new(f) as Box<dyn FnMut(Event)>);
    target.add_event_listener_with_callback(kind, callback.as_ref().unchecked_ref())?;

    Ok(Listener {
        target: target.clone(),
        kind,
        callback,
    })
}

fn key_event(event: &Event) -> Option<KeyEvent> {
    let ke = event.dyn_ref::<KeyboardEvent>()?;
    if ke.is_composing() {
        return None;
    }

    Some(KeyEvent::new(
        Key::from_dom(&ke.key()),
        Modifiers {
            shift: ke.shift_key(),
            ctrl: ke.ctrl_key(),
            alt: ke.alt_key(),
            meta: ke.meta_key(),
        },
    ))
}

fn on_key<T: FrontEnd + 'static>(front: Rc<RefCell<T>>) -> impl FnMut(Event) {
    move |event: Event| {
        let Some(key) = key_event(&event) else {
            return;
        };
        if front.borrow_mut().handle(UiEvent::Key(key)) {
            event.prevent_default();
        }
    }
}

fn on_click<T: FrontEnd + 'static>(front: Rc<RefCell<T>>) -> impl FnMut(Event) {
    move |event: Event| {
        if front.borrow_mut().handle(UiEvent::Submit) {
            event.prevent_default();
        }
    }
}

fn js_string(options: &JsValue, key: &str) -> Result<Option<String>, JsValue> {
    Ok(Reflect::get(options, &JsValue::from_str(key))?.as_string())
}

fn js_function(options: &JsValue, key: &str) -> Result<Option<Function>, JsValue> {
    Ok(Reflect::get(options, &JsValue::from_str(key))?
        .dyn_into::<Function>()
        .ok())
}

fn read_config(options: &JsValue) -> Result<SessionConfig, JsValue> {
    let mut config = SessionConfig::default();

    if let Some(echo) = Reflect::get(options, &JsValue::from_str("echo"))?.as_bool() {
        config.echo = echo;
    }
    if let Some(prompt) = js_string(options, "prompt")? {
        config.prompt = prompt;
    }
    if let Some(chord) = js_string(options, "commitKey")? {
        config.set_commit_key(&chord).map_err(to_js)?;
    }
    if let Some(mods) = js_string(options, "continuation")? {
        config.set_continuation(&mods).map_err(to_js)?;
    }
    if let Some(chord) = js_string(options, "submitKey")? {
        config.set_submit_key(&chord).map_err(to_js)?;
    }
    if let Some(max) = Reflect::get(options, &JsValue::from_str("maxLineBytes"))?.as_f64() {
        config.max_line_bytes = (max >= 1.0).then(|| max as usize);
    }

    config.validate().map_err(to_js)?;
    Ok(config)
}

#[wasm_bindgen]
pub struct Session {
    bridge: LineBridge,
    output: SharedSink<PageDisplay>,
    direct: LineSource<LineBridge>,
    config: SessionConfig,
    document: Document,
    listeners: Vec<Listener>,
}

impl Session {
    fn build(display: PageDisplay, config: SessionConfig) -> Result<Session, JsValue> {
        let document = document()?;
        let bridge = LineBridge::new();
        let output = SharedSink::new(display);

        let mut session = Session {
            direct: LineSource::new(bridge.clone()),
            bridge,
            output,
            config,
            document,
            listeners: Vec::new(),
        };
        session.direct = session.line_source();

        debug!(config = ?session.config, "session started");
        Ok(session)
    }

    fn line_source(&self) -> LineSource<LineBridge> {
        let source = LineSource::new(self.bridge.clone()).with_line_limit(self.config.max_line_bytes);
        if !self.config.echo {
            return source;
        }

        let output = self.output.clone();
        let prompt = self.config.prompt.clone();
        source.with_echo(move |line| output.with(|out| out.echo(&prompt, line)))
    }

    fn regions(doc: &Document, stdout: &str, stderr: Option<&str>) -> Result<PageDisplay, JsValue> {
        let stdout_region: Element = find(doc, stdout)?;
        let stderr_region = match stderr {
            Some(selector) => find(doc, selector)?,
            None => stdout_region.clone(),
        };

        Ok(PageDisplay::Regions {
            stdout: stdout_region,
            stderr: stderr_region,
        })
    }
}

#[wasm_bindgen]
impl Session {
    /// Renders stdout into the element matching `stdout`, and stderr into
    /// `stderr` (or the same element when omitted).
    #[wasm_bindgen(constructor)]
    pub fn new(stdout: &str, stderr: Option<String>) -> Result<Session, JsValue> {
        let display = Session::regions(&document()?, stdout, stderr.as_deref())?;
        Session::build(display, SessionConfig::default())
    }

    /// Accepts `{ stdout, stderr }` selectors or `{ onStdout, onStderr }`
    /// callbacks, plus `echo`, `prompt`, `commitKey`, `continuation`,
    /// `submitKey` and `maxLineBytes`.
    #[wasm_bindgen(js_name = withOptions)]
    pub fn with_options(options: &JsValue) -> Result<Session, JsValue> {
        let config = read_config(options)?;

        let display = match js_function(options, "onStdout")? {
            Some(stdout) => {
                let stderr = js_function(options, "onStderr")?.unwrap_or_else(|| stdout.clone());
                PageDisplay::Callbacks { stdout, stderr }
            }
            None => {
                let stdout = js_string(options, "stdout")?
                    .ok_or_else(|| JsValue::from_str("options need `stdout` or `onStdout`"))?;
                let stderr = js_string(options, "stderr")?;
                Session::regions(&document()?, &stdout, stderr.as_deref())?
            }
        };

        Session::build(display, config)
    }

    /// Resolves with the next input line; rejects if the session closes
    /// first. Requests resolve in the order they were made.
    #[wasm_bindgen(js_name = requestLine)]
    pub fn request_line(&self) -> Promise {
        let request = self.bridge.request_line();
        future_to_promise(async move {
            request
                .await
                .map(|line| JsValue::from_str(&line))
                .map_err(to_js)
        })
    }

    #[wasm_bindgen(js_name = writeStdout)]
    pub fn write_stdout(&self, byte: u8) {
        self.output.with(|out| out.write_byte(Stream::Stdout, byte));
    }

    #[wasm_bindgen(js_name = writeStderr)]
    pub fn write_stderr(&self, byte: u8) {
        self.output.with(|out| out.write_byte(Stream::Stderr, byte));
    }

    #[wasm_bindgen(js_name = printStdout)]
    pub fn print_stdout(&self, text: &str) {
        self.output.with(|out| out.write_str(Stream::Stdout, text));
    }

    #[wasm_bindgen(js_name = printStderr)]
    pub fn print_stderr(&self, text: &str) {
        self.output.with(|out| out.write_str(Stream::Stderr, text));
    }

    pub fn flush(&self) {
        self.output.with(|out| out.flush_all());
    }

    /// Commits `text` as one line, as if typed and accepted.
    pub fn commit(&mut self, text: &str) {
        self.direct.on_commit(text);
    }

    /// Commits every line of `text`.
    pub fn submit(&mut self, text: &str) {
        self.direct.on_submit(text);
    }

    #[wasm_bindgen(js_name = attachLineBox)]
    pub fn attach_line_box(&mut self, selector: &str) -> Result<(), JsValue> {
        let input: HtmlInputElement = find(&self.document, selector)?;
        let front = Rc::new(RefCell::new(LineBox::new(
            input.clone(),
            self.line_source(),
            self.config.gestures().map_err(to_js)?,
        )));

        self.listeners.push(listen(&input, "keydown", on_key(front))?);
        debug!(selector, "line box attached");
        Ok(())
    }

    #[wasm_bindgen(js_name = attachStagingArea)]
    pub fn attach_staging_area(&mut self, textarea: &str, button: &str) -> Result<(), JsValue> {
        let area: HtmlTextAreaElement = find(&self.document, textarea)?;
        let control: Element = find(&self.document, button)?;
        let front = Rc::new(RefCell::new(StagingArea::new(
            area.clone(),
            self.line_source(),
            self.config.submit_key,
        )));

        self.listeners.push(listen(&area, "keydown", on_key(front.clone()))?);
        self.listeners.push(listen(&control, "click", on_click(front))?);
        debug!(textarea, button, "staging area attached");
        Ok(())
    }

    #[wasm_bindgen(js_name = attachUpload)]
    pub fn attach_upload(
        &mut self,
        file_input: &str,
        textarea: &str,
        button: &str,
    ) -> Result<(), JsValue> {
        let picker: HtmlInputElement = find(&self.document, file_input)?;
        let area: HtmlTextAreaElement = find(&self.document, textarea)?;
        let control: Element = find(&self.document, button)?;
        let front = Rc::new(RefCell::new(UploadStaging::new(area, self.line_source())));

        let loader = front.clone();
        let files = picker.clone();
        let on_change = move |_: Event| {
            let Some(file) = files.files().and_then(|list| list.get(0)) else {
                trace!("change without a file ignored");
                return;
            };

            let front = loader.clone();
            spawn_local(async move {
                match JsFuture::from(file.text()).await {
                    Ok(text) => {
                        let text = text.as_string().unwrap_or_default();
                        front.borrow_mut().handle(UiEvent::Loaded(text));
                    }
                    Err(err) => warn!(?err, "could not read uploaded file"),
                }
            });
        };

        self.listeners.push(listen(&picker, "change", on_change)?);
        self.listeners.push(listen(&control, "click", on_click(front))?);
        debug!(file_input, textarea, button, "upload staging attached");
        Ok(())
    }

    #[wasm_bindgen(js_name = availableLines)]
    pub fn available_lines(&self) -> usize {
        self.bridge.available()
    }

    #[wasm_bindgen(js_name = pendingRequests)]
    pub fn pending_requests(&self) -> usize {
        self.bridge.pending()
    }

    /// Detaches every listener, renders leftover partial output and abandons
    /// parked requests.
    pub fn close(&mut self) {
        if self.bridge.is_closed() {
            return;
        }
        self.listeners.clear();
        self.output.with(|out| out.flush_all());
        self.bridge.close();
        debug!("session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
