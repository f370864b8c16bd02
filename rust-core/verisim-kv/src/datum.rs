// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Owned values handed back to callers.

use std::borrow::Cow;

/// A key or value as the caller asked to receive it.
///
/// `Buffer` carries the raw bytes. `Text` is the UTF-8 rendering; invalid
/// sequences are replaced with U+FFFD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datum {
    Buffer(Vec<u8>),
    Text(String),
}

impl Datum {
    pub fn new(bytes: Vec<u8>, as_buffer: bool) -> Self {
        if as_buffer {
            return Datum::Buffer(bytes);
        }
        match String::from_utf8(bytes) {
            Ok(text) => Datum::Text(text),
            Err(err) => Datum::Text(String::from_utf8_lossy(err.as_bytes()).into_owned()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Datum::Buffer(bytes) => bytes,
            Datum::Text(text) => text.as_bytes(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Datum::Buffer(bytes) => bytes,
            Datum::Text(text) => text.into_bytes(),
        }
    }

    /// Text view; a buffer is decoded lossily.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Datum::Buffer(bytes) => String::from_utf8_lossy(bytes),
            Datum::Text(text) => Cow::Borrowed(text),
        }
    }

    pub fn is_buffer(&self) -> bool {
        matches!(self, Datum::Buffer(_))
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// One key/value pair from a cursor. A side the cursor was told not to
/// materialize is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Option<Datum>,
    pub value: Option<Datum>,
}

/// The result of one cursor advance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    /// Entries in scan order.
    pub entries: Vec<Entry>,
    /// No further entry satisfies the range.
    pub finished: bool,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys of this batch as raw bytes, skipping entries without a key.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.entries
            .iter()
            .filter_map(|entry| entry.key.as_ref().map(|k| k.as_bytes().to_vec()))
            .collect()
    }
}
