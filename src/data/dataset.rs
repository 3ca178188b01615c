use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use super::thread::{EmailThread, Line};
use crate::{CleanerError, Result};

/// A thread-level dataset: each sample is a whole thread with per-line labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailDataset {
    pub threads: Vec<EmailThread>,
}

#[derive(Debug, Deserialize)]
struct ThreadRow {
    thread_id: String,
    line: String,
    is_start: u8,
    is_body: u8,
}

impl EmailDataset {
    pub fn new(threads: Vec<EmailThread>) -> Self {
        Self { threads }
    }

    /// Loads a dataset from a CSV file with columns
    /// `thread_id,line,is_start,is_body`. Rows of one thread must be contiguous.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let reader = csv::Reader::from_path(path)?;
        Self::from_reader(reader)
    }

    fn from_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let mut threads = Vec::new();
        let mut current: Option<(String, Vec<Line>)> = None;

        for (i, row) in reader.deserialize::<ThreadRow>().enumerate() {
            let row = row?;
            let line = Line {
                text: row.line,
                is_start: flag(row.is_start, i, "is_start")?,
                is_body: flag(row.is_body, i, "is_body")?,
            };

            match &mut current {
                Some((id, lines)) if *id == row.thread_id => lines.push(line),
                _ => {
                    if let Some((_, lines)) = current.replace((row.thread_id, vec![line])) {
                        threads.push(EmailThread::new(lines));
                    }
                }
            }
        }

        if let Some((_, lines)) = current {
            threads.push(EmailThread::new(lines));
        }

        Ok(Self { threads })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// The text of every line of every thread, in order.
    pub fn lines(&self) -> Vec<&str> {
        self.threads.iter().flat_map(|t| t.texts()).collect()
    }

    /// Yields one `(lines, labels)` pair per thread, labels being the
    /// `[is_start, is_body]` factors of each line.
    pub fn samples(&self) -> impl Iterator<Item = (Vec<&str>, Vec<[f32; 2]>)> + '_ {
        self.threads.iter().map(|thread| {
            let labels = thread.lines.iter().map(Line::factors).collect();
            (thread.texts(), labels)
        })
    }
}

fn flag(value: u8, row: usize, column: &str) -> Result<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(CleanerError::InvalidData(format!(
            "row {row}: {column} must be 0 or 1, got {other}"
        ))),
    }
}

/// The seven categories a single line can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineCategory {
    Body,
    Greeting,
    Signature,
    Header,
    Quote,
    Disclaimer,
    Separator,
}

impl LineCategory {
    pub const COUNT: usize = 7;

    pub const ALL: [LineCategory; Self::COUNT] = [
        Self::Body,
        Self::Greeting,
        Self::Signature,
        Self::Header,
        Self::Quote,
        Self::Disclaimer,
        Self::Separator,
    ];

    /// The class index used as the sparse label.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Greeting => "greeting",
            Self::Signature => "signature",
            Self::Header => "header",
            Self::Quote => "quote",
            Self::Disclaimer => "disclaimer",
            Self::Separator => "separator",
        }
    }
}

impl fmt::Display for LineCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LineCategory {
    type Err = CleanerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| CleanerError::InvalidData(format!("unknown line category: {s}")))
    }
}

/// A line-level dataset used to train the encoder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailLineDataset {
    lines: Vec<String>,
    labels: Vec<LineCategory>,
}

#[derive(Debug, Deserialize)]
struct LineRow {
    line: String,
    category: LineCategory,
}

impl EmailLineDataset {
    /// # Panics
    /// If `lines` and `labels` differ in length.
    pub fn new(lines: Vec<String>, labels: Vec<LineCategory>) -> Self {
        assert_eq!(lines.len(), labels.len(), "lines and labels must have same length");
        Self { lines, labels }
    }

    /// Loads a dataset from a CSV file with columns `line,category`.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut dataset = Self::default();

        for row in reader.deserialize::<LineRow>() {
            let row = row?;
            dataset.lines.push(row.line);
            dataset.labels.push(row.category);
        }

        Ok(dataset)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Yields `(lines, labels)` batches of at most `batch_size` lines each.
    ///
    /// # Panics
    /// If `batch_size` is zero.
    pub fn samples(
        &self,
        batch_size: usize,
    ) -> impl Iterator<Item = (&[String], Vec<usize>)> + '_ {
        assert!(batch_size > 0, "batch_size must be > 0");

        self.lines
            .chunks(batch_size)
            .zip(self.labels.chunks(batch_size))
            .map(|(lines, labels)| (lines, labels.iter().map(|l| l.index()).collect()))
    }
}
