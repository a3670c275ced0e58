//! Records and the reader that splits an input stream into them.
//!
//! In per-line mode every line is a record and its terminator (`\n` or
//! `\r\n`) is kept aside so output can re-append it unchanged. In slurp mode
//! the whole stream is a single record with no terminator.

use std::io::{self, BufRead, Read};

use crate::config::Mode;

/// One unit of input subject to a single evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    text: String,
    terminator: &'static str,
    index: usize,
}

impl Record {
    pub fn new(text: impl Into<String>, terminator: &'static str, index: usize) -> Self {
        Self {
            text: text.into(),
            terminator,
            index,
        }
    }

    /// Build a record from one raw line, splitting off its terminator.
    pub fn from_line(mut line: String, index: usize) -> Self {
        let terminator = if line.ends_with("\r\n") {
            line.truncate(line.len() - 2);
            "\r\n"
        } else if line.ends_with('\n') {
            line.truncate(line.len() - 1);
            "\n"
        } else {
            ""
        };
        Self::new(line, terminator, index)
    }

    /// The record text without its terminator.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn terminator(&self) -> &'static str {
        self.terminator
    }

    /// 1-based position in the input.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Iterator over the records of a buffered input stream.
pub struct RecordReader<R> {
    input: R,
    mode: Mode,
    next_index: usize,
    done: bool,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(input: R, mode: Mode) -> Self {
        Self {
            input,
            mode,
            next_index: 1,
            done: false,
        }
    }

    fn read_line(&mut self) -> io::Result<Option<Record>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let record = Record::from_line(line, self.next_index);
        self.next_index += 1;
        Ok(Some(record))
    }

    fn read_all(&mut self) -> io::Result<Record> {
        let mut text = String::new();
        self.input.read_to_string(&mut text)?;
        Ok(Record::new(text, "", 1))
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = match self.mode {
            Mode::Lines => self.read_line().transpose(),
            Mode::Slurp => {
                // Slurp always yields exactly one record, even for empty input.
                self.done = true;
                Some(self.read_all())
            }
        };
        if matches!(result, None | Some(Err(_))) {
            self.done = true;
        }
        result
    }
}
