/*!
 * Record Reader
 * Splits a ring buffer dump into individual `<event>` records
 *
 * Streams over the blob with a pull parser and hands out one record body at
 * a time, so a large buffer is never materialized as a full tree.
 */

use crate::core::errors::CaptureError;
use crate::events::raw::attr_value;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Attributes of the buffer's root element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferHeader {
    pub event_count: Option<u64>,
    pub dropped_count: Option<u64>,
    pub total_processed: Option<u64>,
    pub memory_used: Option<u64>,
    pub truncated: bool,
}

impl BufferHeader {
    fn from_root(e: &BytesStart<'_>) -> Self {
        Self {
            event_count: attr_number(e, b"eventCount"),
            dropped_count: attr_number(e, b"droppedCount"),
            total_processed: attr_number(e, b"totalEventsProcessed"),
            memory_used: attr_number(e, b"memoryUsed"),
            truncated: attr_value(e, b"truncated").is_some_and(|v| v.trim() == "1"),
        }
    }
}

fn attr_number(e: &BytesStart<'_>, key: &[u8]) -> Option<u64> {
    attr_value(e, key).and_then(|v| v.trim().parse().ok())
}

/// One `<event>` element: its attributes and raw inner content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSlice<'a> {
    pub name: String,
    pub timestamp: Option<String>,
    pub body: Cow<'a, str>,
}

/// Item produced by [`RecordReader`]
#[derive(Debug)]
pub enum RecordItem<'a> {
    Record(RecordSlice<'a>),
    /// One record that could not be read; `raw` covers it up to the next record
    ///
    /// `name` and `timestamp` are kept when the record's start tag was readable.
    Malformed {
        name: Option<String>,
        timestamp: Option<String>,
        raw: &'a str,
        error: CaptureError,
    },
}

/// Pull-based iterator over the records of one buffer blob
pub struct RecordReader<'a> {
    source: &'a str,
    reader: Reader<&'a [u8]>,
    /// Offset of `reader`'s input within `source`
    base: usize,
    header: BufferHeader,
    depth: usize,
    last_end: usize,
    finished: bool,
}

impl<'a> RecordReader<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut reader = Reader::from_str(source);
        reader.trim_text(true);
        Self {
            source,
            reader,
            base: 0,
            header: BufferHeader::default(),
            depth: 0,
            last_end: 0,
            finished: false,
        }
    }

    /// Root element attributes, populated once the root has been read
    pub fn header(&self) -> &BufferHeader {
        &self.header
    }

    #[inline]
    fn byte_position(&self) -> usize {
        self.base + self.reader.buffer_position()
    }

    /// Report the span starting at `from` and resume at the next record
    ///
    /// Without a following record the rest of the blob is reported and
    /// iteration ends.
    fn malformed(
        &mut self,
        from: usize,
        start_tag: Option<(String, Option<String>)>,
        error: CaptureError,
    ) -> Option<RecordItem<'a>> {
        let resume_from = self.byte_position().max(from + 1);
        let end = match next_record_start(self.source, resume_from) {
            Some(next) => {
                self.resume_at(next);
                next
            }
            None => {
                self.finished = true;
                self.source.len()
            }
        };

        let raw = self.source.get(from..end).unwrap_or_default().trim();
        let (name, timestamp) = match start_tag {
            Some((name, timestamp)) => (Some(name), timestamp),
            None => (None, None),
        };
        Some(RecordItem::Malformed {
            name,
            timestamp,
            raw,
            error,
        })
    }

    fn resume_at(&mut self, offset: usize) {
        let rest = self.source.get(offset..).unwrap_or_default();
        let mut reader = Reader::from_str(rest);
        // Ancestors opened before `offset` are unknown to the new reader
        reader.trim_text(true).check_end_names(false);
        self.reader = reader;
        self.base = offset;
        self.last_end = offset;
    }
}

/// Byte offset of the first `<event` start tag at or after `from`
fn next_record_start(source: &str, from: usize) -> Option<usize> {
    let mut cursor = from;
    while let Some(found) = source.get(cursor..)?.find("<event") {
        let at = cursor + found;
        let after = source.as_bytes().get(at + "<event".len());
        if matches!(after, Some(b' ' | b'\t' | b'\r' | b'\n' | b'>' | b'/')) {
            return Some(at);
        }
        cursor = at + 1;
    }
    None
}

impl<'a> Iterator for RecordReader<'a> {
    type Item = RecordItem<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let start = self.byte_position();
            let event = match self.reader.read_event() {
                Ok(event) => event,
                Err(e) => return self.malformed(start, None, e.into()),
            };

            match event {
                Event::Start(e) if e.local_name().as_ref() == b"event" => {
                    let name = attr_value(&e, b"name").unwrap_or_default();
                    let timestamp = attr_value(&e, b"timestamp");
                    return match self.reader.read_text(e.name()) {
                        Ok(body) => {
                            self.last_end = self.byte_position();
                            Some(RecordItem::Record(RecordSlice {
                                name,
                                timestamp,
                                body,
                            }))
                        }
                        Err(err) => self.malformed(start, Some((name, timestamp)), err.into()),
                    };
                }
                Event::Empty(e) if e.local_name().as_ref() == b"event" => {
                    self.last_end = self.byte_position();
                    return Some(RecordItem::Record(RecordSlice {
                        name: attr_value(&e, b"name").unwrap_or_default(),
                        timestamp: attr_value(&e, b"timestamp"),
                        body: Cow::Borrowed(""),
                    }));
                }
                Event::Start(e) => {
                    if self.depth == 0 {
                        self.header = BufferHeader::from_root(&e);
                    }
                    self.depth += 1;
                }
                Event::End(_) => self.depth = self.depth.saturating_sub(1),
                Event::Eof => {
                    if self.depth > 0 {
                        let depth = self.depth;
                        return self.malformed(
                            self.last_end,
                            None,
                            CaptureError::MalformedPayload(format!(
                                "buffer ended with {} open elements",
                                depth
                            )),
                        );
                    }
                    self.finished = true;
                    return None;
                }
                _ => {}
            }
        }
    }
}
