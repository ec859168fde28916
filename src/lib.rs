//! Line input and line-buffered output for an interpreter hosted in a web page.
//!
//! The interpreter asks for lines when it wants them; the page produces them
//! whenever the user commits one. [`LineBridge`] pairs the two in strict FIFO
//! order, [`LineSource`] and its front ends turn UI events into lines, and
//! [`OutputSink`] turns arbitrary writes back into whole lines for display.

pub mod blocking;
pub mod bridge;
pub mod chord;
pub mod config;
pub mod error;
pub mod keys;
#[cfg(feature = "build-binary")]
pub mod logging;
pub mod output;
pub mod source;
mod web;

pub use blocking::BlockingBridge;
pub use bridge::{Commit, LineBridge, LineRequest};
pub use config::SessionConfig;
pub use error::{BridgeError, BridgeResult};
pub use keys::{Gesture, GestureMap, Key, KeyChord, KeyEvent, Modifiers};
pub use output::{LineDisplay, OutputBuffer, OutputSink, SharedSink, Stream, Transcript};
pub use source::{
    FrontEnd, InputWidget, LineBox, LineSource, StagingArea, TextField, UiEvent, UploadStaging,
};
pub use web::Session;
