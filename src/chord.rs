//! Textual key chords such as `Enter`, `Shift+Enter` or `Ctrl+Alt+x`.

use std::fmt;
use std::iter::Peekable;

use chumsky::prelude::*;

use crate::{
    error::{BridgeError, BridgeResult},
    keys::{Key, KeyChord, Modifiers},
};

pub type Span = std::ops::Range<usize>;
type ChordError = Simple<Token>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Word(String),
    Plus,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Word(x) => write!(f, "{}", x),
            Token::Plus => write!(f, "+"),
        }
    }
}

pub fn tokenize<I: Iterator<Item = char>>(mut input: Peekable<I>) -> Vec<(Token, Span)> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while let Some(ch) = input.next() {
        let start = pos;
        pos += ch.len_utf8();

        match ch {
            '+' => tokens.push((Token::Plus, start..pos)),
            c if c.is_whitespace() => (),
            c if c.is_alphanumeric() => {
                let mut word = String::from(c);

                while let Some(&next) = input.peek() {
                    if !next.is_alphanumeric() {
                        break;
                    }
                    pos += next.len_utf8();
                    word.push(next);
                    input.next();
                }

                tokens.push((Token::Word(word), start..pos));
            }
            c => tokens.push((Token::Word(c.to_string()), start..pos)),
        }
    }

    tokens
}

fn modifier() -> impl Parser<Token, Modifiers, Error = ChordError> + Clone {
    filter_map(|span, tok: Token| {
        let found = match &tok {
            Token::Word(w) => match w.to_lowercase().as_str() {
                "shift" => Some(Modifiers {
                    shift: true,
                    ..Modifiers::NONE
                }),
                "ctrl" | "control" => Some(Modifiers {
                    ctrl: true,
                    ..Modifiers::NONE
                }),
                "alt" | "option" => Some(Modifiers {
                    alt: true,
                    ..Modifiers::NONE
                }),
                "meta" | "cmd" | "super" => Some(Modifiers {
                    meta: true,
                    ..Modifiers::NONE
                }),
                _ => None,
            },
            Token::Plus => None,
        };

        found.ok_or_else(|| Simple::expected_input_found(span, Vec::new(), Some(tok)))
    })
}

fn key() -> impl Parser<Token, Key, Error = ChordError> + Clone {
    filter_map(|span, tok: Token| {
        let found = match &tok {
            Token::Word(w) => match w.to_lowercase().as_str() {
                "enter" | "return" => Some(Key::Enter),
                "tab" => Some(Key::Tab),
                "backspace" => Some(Key::Backspace),
                "escape" | "esc" => Some(Key::Escape),
                "space" => Some(Key::Space),
                _ => {
                    let mut chars = w.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => Some(Key::Char(c)),
                        _ => None,
                    }
                }
            },
            Token::Plus => None,
        };

        found.ok_or_else(|| Simple::expected_input_found(span, Vec::new(), Some(tok)))
    })
}

fn fold(mods: Vec<Modifiers>) -> Modifiers {
    mods.into_iter().fold(Modifiers::NONE, Modifiers::union)
}

fn chord_parser() -> impl Parser<Token, KeyChord, Error = ChordError> {
    modifier()
        .then_ignore(just(Token::Plus))
        .repeated()
        .then(key())
        .then_ignore(end())
        .map(|(mods, key)| KeyChord::new(key, fold(mods)))
}

fn modifiers_parser() -> impl Parser<Token, Modifiers, Error = ChordError> {
    modifier()
        .separated_by(just(Token::Plus))
        .then_ignore(end())
        .map(fold)
}

fn run<O>(
    input: &str,
    parser: impl Parser<Token, O, Error = ChordError>,
) -> BridgeResult<O> {
    let tokens = tokenize(input.chars().peekable());
    let eoi = input.len()..input.len();

    parser
        .parse(chumsky::Stream::from_iter(eoi, tokens.into_iter()))
        .map_err(|errors| BridgeError::InvalidChord {
            input: input.to_string(),
            reason: describe(&errors),
        })
}

fn describe(errors: &[ChordError]) -> String {
    match errors.first() {
        Some(e) => match e.found() {
            Some(tok) => format!("unexpected '{}' at {}", tok, e.span().start),
            None => "unexpected end of input".to_string(),
        },
        None => "unparseable".to_string(),
    }
}

/// Parses a chord like `Ctrl+Enter`.
pub fn parse(input: &str) -> BridgeResult<KeyChord> {
    run(input, chord_parser())
}

/// Parses a bare modifier set like `Shift` or `Ctrl+Alt`. `none` and the
/// empty string both mean no modifiers.
pub fn parse_modifiers(input: &str) -> BridgeResult<Modifiers> {
    if input.trim().eq_ignore_ascii_case("none") {
        return Ok(Modifiers::NONE);
    }
    run(input, modifiers_parser())
}
