use serde::{Deserialize, Serialize};

/// A single line of an email thread, with its segmentation labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub text: String,
    /// The line opens a new message in the thread.
    pub is_start: bool,
    /// The line belongs to the body of its message.
    pub is_body: bool,
}

impl Line {
    /// An unlabelled line.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_start: false,
            is_body: false,
        }
    }

    /// The line's labels as `[is_start, is_body]` factors.
    pub fn factors(&self) -> [f32; 2] {
        [self.is_start as u8 as f32, self.is_body as u8 as f32]
    }
}

/// An email conversation, segmented into lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailThread {
    pub lines: Vec<Line>,
}

impl EmailThread {
    pub fn new(lines: Vec<Line>) -> Self {
        Self { lines }
    }

    /// Splits raw thread text into unlabelled lines.
    pub fn from_text(text: &str) -> Self {
        let lines = text
            .split('\n')
            .map(|line| Line::new(line.strip_suffix('\r').unwrap_or(line)))
            .collect();

        Self { lines }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.lines.iter().map(|l| l.text.as_str()).collect()
    }

    /// Groups the lines into messages. Every `is_start` line opens a new
    /// message; the first line always does.
    pub fn messages(&self) -> Vec<&[Line]> {
        let mut messages = Vec::new();
        let mut begin = 0;

        for (i, line) in self.lines.iter().enumerate().skip(1) {
            if line.is_start {
                messages.push(&self.lines[begin..i]);
                begin = i;
            }
        }

        if begin < self.lines.len() {
            messages.push(&self.lines[begin..]);
        }

        messages
    }

    /// The body text of each message, body lines joined by `\n`.
    pub fn bodies(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .map(|message| {
                message
                    .iter()
                    .filter(|l| l.is_body)
                    .map(|l| l.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labelled(text: &str, is_start: bool, is_body: bool) -> Line {
        Line {
            text: text.into(),
            is_start,
            is_body,
        }
    }

    #[test]
    fn from_text_splits_on_newlines() {
        let thread = EmailThread::from_text("hello\r\nworld\n");
        assert_eq!(thread.texts(), vec!["hello", "world", ""]);
    }

    #[test]
    fn messages_split_at_start_lines() {
        let thread = EmailThread::new(vec![
            labelled("Hi Bob,", false, true),
            labelled("see you", false, true),
            labelled("On Monday Alice wrote:", true, false),
            labelled("> ping", false, false),
        ]);

        let messages = thread.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].len(), 2);
        assert_eq!(messages[1][0].text, "On Monday Alice wrote:");
        assert_eq!(thread.bodies(), vec!["Hi Bob,\nsee you".to_string(), String::new()]);
    }

    #[test]
    fn empty_thread_has_no_messages() {
        assert!(EmailThread::default().messages().is_empty());
    }
}
