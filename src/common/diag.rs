//! Diagnostic sideband used by the front end while it drives the builder.
//!
//! A [`Logger`] tags messages with the source position of the construct
//! being lowered. The module keeps a stack of these (see
//! `ir::Module::set_context`) so nested lowering scopes report against the
//! right location. Reporting goes through the `log` facade; the sideband
//! never participates in IR semantics.

use std::cell::Cell;
use std::fmt;

/// Source position carried by a [`Logger`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

/// A location-tagged error reporter.
#[derive(Debug, Clone, Default)]
pub struct Logger {
    file: Option<String>,
    pos: Pos,
    errors: Cell<usize>,
}

impl Logger {
    pub fn new(file: impl Into<String>, line: u32, col: u32) -> Self {
        Logger { file: Some(file.into()), pos: Pos { line, col }, errors: Cell::new(0) }
    }

    pub fn pos(&self) -> Pos {
        self.pos
    }

    /// Report a semantic error against this logger's location.
    pub fn log_error(&self, message: &str) {
        self.errors.set(self.errors.get() + 1);
        log::error!("{}: error: {}", self, message);
    }

    pub fn log_warning(&self, message: &str) {
        log::warn!("{}: warning: {}", self, message);
    }

    pub fn error_num(&self) -> usize {
        self.errors.get()
    }
}

impl fmt::Display for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file, self.pos.line, self.pos.col),
            None => write!(f, "<unknown>:{}:{}", self.pos.line, self.pos.col),
        }
    }
}
