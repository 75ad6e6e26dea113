//! Incremental decoding of a streamed JSON array.
//!
//! The model streams the text of one JSON array in arbitrary fragments.
//! `PartialArrayDecoder` scans only the newly appended bytes on each
//! `feed`, tracking string/escape state and nesting depth, and cuts out each
//! top-level element as soon as its closing delimiter arrives. Elements are
//! parsed with `serde_json` one at a time; the unfinished tail is held back.
//!
//! Leading prose or a Markdown fence before the first `[` is skipped.

use serde_json::Value;

/// One element cut out of the array.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Value(Value),
    /// The element's text was complete but not valid JSON.
    Malformed { index: usize, error: String },
}

#[derive(Debug, Default)]
pub struct PartialArrayDecoder {
    buffer: String,
    /// Next byte of `buffer` to scan.
    cursor: usize,
    /// Nesting depth: 0 before the array opens, 1 directly inside it.
    depth: usize,
    in_string: bool,
    escaped: bool,
    /// Byte offset where the current top-level element began.
    element_start: Option<usize>,
    elements: Vec<Element>,
    opened: bool,
    closed: bool,
}

impl PartialArrayDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return how many new elements completed.
    pub fn feed(&mut self, fragment: &str) -> usize {
        let before = self.elements.len();
        if self.closed {
            // Trailing text after the closing bracket is ignored
            return 0;
        }
        self.buffer.push_str(fragment);

        let bytes = self.buffer.as_bytes();
        let mut completed: Vec<(usize, usize)> = Vec::new();
        let mut pos = self.cursor;

        while pos < bytes.len() && !self.closed {
            let b = bytes[pos];

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
                pos += 1;
                continue;
            }

            if !self.opened {
                if b == b'[' {
                    self.opened = true;
                    self.depth = 1;
                }
                pos += 1;
                continue;
            }

            match b {
                b'"' => {
                    self.in_string = true;
                    if self.depth == 1 && self.element_start.is_none() {
                        self.element_start = Some(pos);
                    }
                }
                b'{' | b'[' => {
                    if self.depth == 1 && self.element_start.is_none() {
                        self.element_start = Some(pos);
                    }
                    self.depth += 1;
                }
                b'}' | b']' => {
                    if self.depth == 1 {
                        // Closing bracket of the top-level array
                        if let Some(start) = self.element_start.take() {
                            completed.push((start, pos));
                        }
                        self.closed = true;
                    } else {
                        self.depth -= 1;
                        if self.depth == 1 {
                            if let Some(start) = self.element_start.take() {
                                completed.push((start, pos + 1));
                            }
                        }
                    }
                }
                b',' if self.depth == 1 => {
                    if let Some(start) = self.element_start.take() {
                        completed.push((start, pos));
                    }
                }
                b if b.is_ascii_whitespace() => {}
                _ => {
                    if self.depth == 1 && self.element_start.is_none() {
                        self.element_start = Some(pos);
                    }
                }
            }
            pos += 1;
        }
        self.cursor = pos;

        for (start, end) in completed {
            let text = self.buffer[start..end].trim();
            let index = self.elements.len();
            let element = match serde_json::from_str::<Value>(text) {
                Ok(value) => Element::Value(value),
                Err(e) => Element::Malformed {
                    index,
                    error: e.to_string(),
                },
            };
            self.elements.push(element);
        }

        self.elements.len() - before
    }

    /// Elements completed so far, in order.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Whether the top-level array has been opened.
    pub fn is_opened(&self) -> bool {
        self.opened
    }

    /// Whether the closing `]` of the top-level array has arrived.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
