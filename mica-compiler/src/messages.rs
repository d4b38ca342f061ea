//! Diagnostics
//!
//! User errors accumulate in a message buffer while a phase keeps going;
//! the buffer is reported sorted and deduplicated at phase checkpoints.
//! Internal errors never land here: they panic immediately. Overload
//! resolution uses scoped buffers, one per attempt, merged into the loser
//! report when every candidate fails.

use mica_syntax::{SourceFile, Span};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One reportable finding
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub severity: Severity,
    pub span: Option<Span>,
    pub text: String,
    /// Nested details, e.g. one entry per failed overload candidate
    pub notes: Vec<String>,
}

impl Message {
    pub fn error(text: impl Into<String>, span: Option<Span>) -> Self {
        Message { severity: Severity::Error, span, text: text.into(), notes: Vec::new() }
    }

    pub fn warning(text: impl Into<String>, span: Option<Span>) -> Self {
        Message { severity: Severity::Warning, span, text: text.into(), notes: Vec::new() }
    }

    pub fn with_notes(mut self, notes: Vec<String>) -> Self {
        self.notes = notes;
        self
    }

    /// An ambiguous overload: every candidate matched
    pub fn ambiguous_overload(
        name: &str,
        span: Option<Span>,
        candidates: Vec<String>,
    ) -> Self {
        Message::error(format!("ambiguous call to '{}': multiple definitions match", name), span)
            .with_notes(candidates)
    }

    /// A failed overload: no candidate matched; each attempt carries its
    /// own nested error
    pub fn failed_overload(name: &str, span: Option<Span>, attempts: Vec<String>) -> Self {
        Message::error(format!("no definition of '{}' matches this call", name), span)
            .with_notes(attempts)
    }
}

/// The accumulating buffer
#[derive(Debug, Clone, Default)]
pub struct MessageBuffer {
    messages: Vec<Message>,
}

impl MessageBuffer {
    pub fn new() -> Self {
        MessageBuffer::default()
    }

    pub fn report(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn error(&mut self, text: impl Into<String>, span: Option<Span>) {
        self.report(Message::error(text, span));
    }

    pub fn warning(&mut self, text: impl Into<String>, span: Option<Span>) {
        self.report(Message::warning(text, span));
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Run `f` against a scoped buffer, keeping its messages out of this
    /// one. Used per overload attempt.
    pub fn scoped<R>(&mut self, f: impl FnOnce(&mut MessageBuffer) -> R) -> (R, MessageBuffer) {
        let mut scoped = MessageBuffer::new();
        let result = f(&mut scoped);
        (result, scoped)
    }

    /// Merge another buffer's findings into this one
    pub fn absorb(&mut self, other: MessageBuffer) {
        self.messages.extend(other.messages);
    }

    /// The checkpoint view: sorted by position and deduplicated
    pub fn sorted_deduped(&self) -> Vec<Message> {
        let mut out = self.messages.clone();
        out.sort_by_key(|m| {
            (
                m.span.map(|s| (s.file, s.start)),
                m.severity,
                m.text.clone(),
            )
        });
        out.dedup();
        out
    }
}

/// Render a message with its position and a caret-underlined excerpt
pub fn render(message: &Message, source: Option<&SourceFile>) -> String {
    let mut out = String::new();

    match (message.span, source) {
        (Some(span), Some(file)) => {
            let pos = file.position(span.start);
            out.push_str(&format!(
                "[{}] {}:{} {}\n",
                message.severity, file.path, pos, message.text
            ));
            if let Some(line) = file.line_text(pos.line) {
                out.push_str(&format!("  {}\n", line));
                let width = (span.len().max(1) as usize).min(line.len().saturating_sub(pos.column as usize).max(1));
                out.push_str(&format!(
                    "  {}{}\n",
                    " ".repeat(pos.column as usize),
                    "^".repeat(width)
                ));
            }
        }
        _ => {
            out.push_str(&format!("[{}] {}\n", message.severity, message.text));
        }
    }

    for note in &message.notes {
        out.push_str(&format!("    - {}\n", note));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mica_syntax::{ByteOffset, FileId};

    fn span(file: FileId, start: u32, end: u32) -> Span {
        Span::new(file, ByteOffset(start), ByteOffset(end))
    }

    #[test]
    fn test_sorted_deduped() {
        let file = FileId::new(0);
        let mut buffer = MessageBuffer::new();
        buffer.error("late", Some(span(file, 10, 12)));
        buffer.error("early", Some(span(file, 0, 2)));
        buffer.error("late", Some(span(file, 10, 12)));

        let out = buffer.sorted_deduped();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text, "early");
        assert_eq!(out[1].text, "late");
    }

    #[test]
    fn test_scoped_buffers_stay_separate() {
        let mut buffer = MessageBuffer::new();
        let ((), attempt) = buffer.scoped(|scoped| {
            scoped.error("candidate failed", None);
        });
        assert!(buffer.is_empty());
        assert_eq!(attempt.len(), 1);

        buffer.absorb(attempt);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_render_includes_caret_excerpt() {
        let file = SourceFile::new(FileId::new(0), "dir\\demo.mica", "let x = boom\n");
        let msg = Message::error("unknown name 'boom'", Some(span(file.id, 8, 12)));
        let rendered = render(&msg, Some(&file));

        // Forward-slash path, 1-based position, caret under the range
        assert!(rendered.contains("dir/demo.mica"));
        assert!(rendered.contains("1:9"));
        assert!(rendered.contains("^^^^"));
    }

    #[test]
    fn test_overload_messages_carry_candidates() {
        let msg = Message::ambiguous_overload(
            "log",
            None,
            vec!["demo.log: (Int) => Unit".into(), "demo.log: (Double) => Unit".into()],
        );
        assert_eq!(msg.notes.len(), 2);
        let rendered = render(&msg, None);
        assert!(rendered.contains("demo.log: (Int) => Unit"));
    }
}
