//! Terminal output for streamed replies.

use std::io::{self, Stdout, Write};

use crate::completion::DeltaSink;

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// Writes deltas as they arrive, flushing after each one so partial output
/// is visible immediately.
///
/// Tracks whether the text written so far ends in a newline, so that
/// [`StreamRenderer::finish_response`] leaves the cursor on a fresh line
/// without adding a blank one.
pub struct StreamRenderer<W: Write = Stdout> {
    out: W,
    wrote_any: bool,
    at_line_start: bool,
}

impl StreamRenderer<Stdout> {
    /// A renderer writing to standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> StreamRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            wrote_any: false,
            at_line_start: true,
        }
    }

    /// True once any non-empty text has been written.
    pub fn wrote_any(&self) -> bool {
        self.wrote_any
    }

    pub fn print_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
        self.wrote_any = true;
        self.at_line_start = text.ends_with('\n');
    }

    /// End the response, adding a newline only if one is missing.
    pub fn finish_response(&mut self) {
        if !self.at_line_start {
            let _ = self.out.write_all(b"\n");
            self.at_line_start = true;
        }
        let _ = self.out.flush();
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> DeltaSink for StreamRenderer<W> {
    fn on_delta(&mut self, delta: &str, done: bool) {
        if done {
            self.finish_response();
        } else {
            self.print_text(delta);
        }
    }
}

/// Format an error line for the terminal.
pub fn format_error(error: &str, use_color: bool) -> String {
    if use_color {
        format!("{ANSI_RED}Error: {error}{ANSI_RESET}")
    } else {
        format!("Error: {error}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(deltas: &[&str], done: bool) -> String {
        let mut renderer = StreamRenderer::new(Vec::new());
        for delta in deltas {
            renderer.on_delta(delta, false);
        }
        if done {
            renderer.on_delta("", true);
        }
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn deltas_are_written_verbatim() {
        assert_eq!(rendered(&["Hi", " there"], false), "Hi there");
    }

    #[test]
    fn done_adds_missing_newline() {
        assert_eq!(rendered(&["Hi", " there"], true), "Hi there\n");
    }

    #[test]
    fn done_keeps_existing_newline() {
        assert_eq!(rendered(&["line\n"], true), "line\n");
    }

    #[test]
    fn finish_twice_adds_one_newline() {
        let mut renderer = StreamRenderer::new(Vec::new());
        renderer.print_text("x");
        renderer.finish_response();
        renderer.finish_response();
        assert_eq!(renderer.into_inner(), b"x\n");
    }

    #[test]
    fn nothing_written_means_no_newline() {
        let mut renderer = StreamRenderer::new(Vec::new());
        renderer.on_delta("", true);
        assert!(!renderer.wrote_any());
        assert!(renderer.into_inner().is_empty());
    }

    #[test]
    fn errors_are_prefixed() {
        assert_eq!(format_error("boom", false), "Error: boom");
        assert_eq!(format_error("boom", true), "\x1b[31mError: boom\x1b[0m");
    }
}
