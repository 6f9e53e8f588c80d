//! Byte-stream framer for the `@verb` / `#param` line protocol
//!
//! The codec never blocks and never fails. Bytes go in through [`FrameCodec::push`]
//! in whatever chunks the socket delivers them, and whole frames come out of
//! [`FrameCodec::next_event`] once enough terminated lines have arrived.
//!
//! ## Recovery
//!
//! Lines that start with neither `@` nor `#` are noise and are dropped as soon
//! as they are terminated. Parameter lines with no header in front of them are
//! dropped too. An unknown verb, or a header whose parameter block is cut short
//! by another header, becomes the *pending bad command*. The next frame that
//! parses cleanly is preceded by a single [`FrameEvent::BadCommand`] carrying
//! that verb, which the session answers with `@ignoring`.

use crate::protocol::{param_count, Command, VerbTable};
use log::debug;
use std::collections::VecDeque;

/// Longest line the codec buffers before treating it as noise
pub const MAX_LINE_LEN: usize = 4096;

/// Output of the codec
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A complete, well-formed frame
    Command(Command),
    /// A previously rejected verb, reported once the stream resynchronised
    BadCommand(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Header(String),
    Param(String),
}

impl Line {
    /// Classifies a terminated line, returning None for noise
    fn classify(raw: &[u8]) -> Option<Line> {
        if raw.len() > MAX_LINE_LEN {
            return None;
        }
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let (&first, rest) = raw.split_first()?;
        let text = String::from_utf8_lossy(rest).into_owned();
        match first {
            b'@' => Some(Line::Header(text)),
            b'#' => Some(Line::Param(text)),
            _ => None,
        }
    }

    fn into_text(self) -> String {
        match self {
            Line::Header(text) | Line::Param(text) => text,
        }
    }
}

/// Incremental frame decoder for one direction of one connection
#[derive(Debug)]
pub struct FrameCodec {
    table: VerbTable,
    /// Bytes of the current unterminated line
    partial: Vec<u8>,
    /// Offset in `partial` already searched for a line break
    scanned: usize,
    /// Set while discarding the rest of an overlong line
    skipping: bool,
    /// Terminated, non-noise lines not yet consumed by a frame
    lines: VecDeque<Line>,
    pending_bad: Option<String>,
    ready: VecDeque<FrameEvent>,
}

impl FrameCodec {
    /// Creates a codec that recognises the verbs in `table`
    pub fn new(table: VerbTable) -> Self {
        Self {
            table,
            partial: Vec::new(),
            scanned: 0,
            skipping: false,
            lines: VecDeque::new(),
            pending_bad: None,
            ready: VecDeque::new(),
        }
    }

    /// Appends received bytes to the accumulator
    pub fn push(&mut self, bytes: &[u8]) {
        self.partial.extend_from_slice(bytes);

        let mut line_start = 0;
        while let Some(offset) = self.partial[self.scanned..].iter().position(|&b| b == b'\n') {
            let line_end = self.scanned + offset;
            if self.skipping {
                self.skipping = false;
            } else if let Some(line) = Line::classify(&self.partial[line_start..line_end]) {
                self.lines.push_back(line);
            }
            line_start = line_end + 1;
            self.scanned = line_start;
        }

        self.partial.drain(..line_start);
        self.scanned = self.partial.len();

        if self.partial.len() > MAX_LINE_LEN {
            debug!("Dropping overlong line ({} bytes buffered)", self.partial.len());
            self.partial.clear();
            self.scanned = 0;
            self.skipping = true;
        }
    }

    /// Returns the next decoded event, or None when more bytes are needed
    pub fn next_event(&mut self) -> Option<FrameEvent> {
        if let Some(event) = self.ready.pop_front() {
            return Some(event);
        }

        loop {
            while matches!(self.lines.front(), Some(Line::Param(_))) {
                self.lines.pop_front();
            }

            let verb = match self.lines.front() {
                Some(Line::Header(verb)) => verb.clone(),
                _ => return None,
            };

            let Some(count) = param_count(self.table, &verb) else {
                debug!("Unknown verb {:?}", verb);
                self.lines.pop_front();
                self.pending_bad = Some(verb);
                continue;
            };

            if self.lines.len() < count + 1 {
                return None;
            }

            let interrupted = self
                .lines
                .iter()
                .skip(1)
                .take(count)
                .position(|line| matches!(line, Line::Header(_)));

            if let Some(offset) = interrupted {
                // Keep the interrupting header for the next pass
                debug!("Frame {:?} interrupted after {} parameters", verb, offset);
                self.lines.drain(..=offset);
                self.pending_bad = Some(verb);
                continue;
            }

            self.lines.pop_front();
            let params = self.lines.drain(..count).map(Line::into_text).collect();
            let command = Command::new(verb, params);

            return match self.pending_bad.take() {
                Some(bad) => {
                    self.ready.push_back(FrameEvent::Command(command));
                    Some(FrameEvent::BadCommand(bad))
                }
                None => Some(FrameEvent::Command(command)),
            };
        }
    }

    /// Pushes bytes and drains every event that became available
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<FrameEvent> {
        self.push(bytes);
        std::iter::from_fn(|| self.next_event()).collect()
    }

    /// Records a command that parsed but could not be applied, so it is
    /// reported the same way as an unknown verb
    pub fn mark_bad(&mut self, verb: impl Into<String>) {
        self.pending_bad = Some(verb.into());
    }

    pub fn pending_bad(&self) -> Option<&str> {
        self.pending_bad.as_deref()
    }

    /// Bytes held in the unterminated tail
    pub fn buffered(&self) -> usize {
        self.partial.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CLIENT_TO_SERVER, SERVER_TO_CLIENT};

    fn command(verb: &str, params: &[&str]) -> FrameEvent {
        FrameEvent::Command(Command::new(
            verb,
            params.iter().map(|p| p.to_string()).collect(),
        ))
    }

    #[test]
    fn test_single_frame() {
        let mut codec = FrameCodec::new(CLIENT_TO_SERVER);
        let events = codec.feed(b"@name\n#Aric\n");
        assert_eq!(events, vec![command("name", &["Aric"])]);
    }

    #[test]
    fn test_carriage_returns_are_stripped() {
        let mut codec = FrameCodec::new(CLIENT_TO_SERVER);
        let events = codec.feed(b"@move\r\n#4\r\n@resign\r\n");
        assert_eq!(
            events,
            vec![command("move", &["4"]), command("resign", &[])]
        );
    }

    #[test]
    fn test_partial_frame_waits_for_parameters() {
        let mut codec = FrameCodec::new(SERVER_TO_CLIENT);
        assert!(codec.feed(b"@play\n#Mia\n#30").is_empty());
        assert!(codec.feed(b"\n").is_empty());
        assert_eq!(
            codec.feed(b"#white\n"),
            vec![command("play", &["Mia", "30", "white"])]
        );
    }

    #[test]
    fn test_byte_at_a_time_matches_single_write() {
        let input: &[u8] = b"junk\n#stray\n@name\r\n#A\r\nnoise\n@bogus\n@move\n@move\n#3\n@resign\n";

        let mut whole = FrameCodec::new(CLIENT_TO_SERVER);
        let expected = whole.feed(input);

        let mut split = FrameCodec::new(CLIENT_TO_SERVER);
        let mut actual = Vec::new();
        for byte in input {
            actual.extend(split.feed(std::slice::from_ref(byte)));
        }

        assert_eq!(actual, expected);
        assert_eq!(
            expected,
            vec![
                command("name", &["A"]),
                FrameEvent::BadCommand("move".to_string()),
                command("move", &["3"]),
                command("resign", &[]),
            ]
        );
    }

    #[test]
    fn test_unknown_verb_reported_before_next_command() {
        let mut codec = FrameCodec::new(CLIENT_TO_SERVER);
        let events = codec.feed(b"#bogus\n@unknown\n@name\n#X\n");
        assert_eq!(
            events,
            vec![
                FrameEvent::BadCommand("unknown".to_string()),
                command("name", &["X"]),
            ]
        );
    }

    #[test]
    fn test_bad_command_held_until_stream_recovers() {
        let mut codec = FrameCodec::new(CLIENT_TO_SERVER);
        assert!(codec.feed(b"@aric\n").is_empty());
        assert_eq!(codec.pending_bad(), Some("aric"));

        // An incomplete frame does not flush the pending report
        assert!(codec.feed(b"@name\n").is_empty());
        assert_eq!(codec.pending_bad(), Some("aric"));

        assert_eq!(
            codec.feed(b"#Mia\n"),
            vec![
                FrameEvent::BadCommand("aric".to_string()),
                command("name", &["Mia"]),
            ]
        );
        assert_eq!(codec.pending_bad(), None);
    }

    #[test]
    fn test_only_latest_bad_command_is_reported() {
        let mut codec = FrameCodec::new(CLIENT_TO_SERVER);
        let events = codec.feed(b"@one\n@two\n@resign\n");
        assert_eq!(
            events,
            vec![
                FrameEvent::BadCommand("two".to_string()),
                command("resign", &[]),
            ]
        );
    }

    #[test]
    fn test_interrupted_frame_keeps_the_interrupting_header() {
        let mut codec = FrameCodec::new(SERVER_TO_CLIENT);
        let events = codec.feed(b"@tick\n#black\n@legal\n");
        assert_eq!(
            events,
            vec![FrameEvent::BadCommand("tick".to_string()), command("legal", &[])]
        );
    }

    #[test]
    fn test_noise_between_parameters_is_skipped() {
        let mut codec = FrameCodec::new(SERVER_TO_CLIENT);
        let events = codec.feed(b"@tick\ncomment\n#white\n\n#9\n");
        assert_eq!(events, vec![command("tick", &["white", "9"])]);
    }

    #[test]
    fn test_ignoring_is_a_regular_command() {
        let mut codec = FrameCodec::new(CLIENT_TO_SERVER);
        let events = codec.feed(b"@ignoring\n#play\n");
        assert_eq!(events, vec![command("ignoring", &["play"])]);
    }

    #[test]
    fn test_mark_bad_reports_on_next_command() {
        let mut codec = FrameCodec::new(CLIENT_TO_SERVER);
        assert_eq!(codec.feed(b"@resign\n"), vec![command("resign", &[])]);
        codec.mark_bad("resign");
        assert_eq!(
            codec.feed(b"@name\n#Z\n"),
            vec![
                FrameEvent::BadCommand("resign".to_string()),
                command("name", &["Z"]),
            ]
        );
    }

    #[test]
    fn test_overlong_line_is_dropped_regardless_of_chunking() {
        let mut input = b"@name\n#".to_vec();
        input.extend(std::iter::repeat(b'x').take(MAX_LINE_LEN + 10));
        input.extend_from_slice(b"\n@name\n#ok\n");

        let mut whole = FrameCodec::new(CLIENT_TO_SERVER);
        let expected = whole.feed(&input);

        let mut chunked = FrameCodec::new(CLIENT_TO_SERVER);
        let mut actual = Vec::new();
        for chunk in input.chunks(7) {
            actual.extend(chunked.feed(chunk));
        }

        assert_eq!(actual, expected);
        assert_eq!(
            expected,
            vec![
                FrameEvent::BadCommand("name".to_string()),
                command("name", &["ok"]),
            ]
        );
        assert_eq!(chunked.buffered(), 0);
    }
}
