// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Range bounds for cursor scans.
//
// A `Range` is fixed when the cursor is created. It answers three questions
// for the scan loop: where to seek first, whether the landed key needs a
// one-step correction, and whether a key is still inside the range. Of each
// exclusive/inclusive pair, the exclusive bound wins when both are given.

use crate::options::CursorOptions;

/// Immutable key range plus direction and entry limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Range {
    pub start: Option<Vec<u8>>,
    /// Inclusive far bound in scan direction.
    pub end: Option<Vec<u8>>,
    pub lt: Option<Vec<u8>>,
    pub lte: Option<Vec<u8>>,
    pub gt: Option<Vec<u8>>,
    pub gte: Option<Vec<u8>>,
    pub reverse: bool,
    /// Maximum entries over the cursor's lifetime. `None` is unlimited.
    pub limit: Option<u64>,
}

fn non_empty(bound: &Option<Vec<u8>>) -> Option<Vec<u8>> {
    bound.as_ref().filter(|b| !b.is_empty()).cloned()
}

impl Range {
    pub fn from_options(options: &CursorOptions) -> Self {
        Self {
            start: non_empty(&options.start),
            end: non_empty(&options.end),
            lt: non_empty(&options.lt),
            lte: non_empty(&options.lte),
            gt: non_empty(&options.gt),
            gte: non_empty(&options.gte),
            reverse: options.reverse,
            limit: options.limit,
        }
    }

    /// The key the first seek targets, if any.
    ///
    /// Reverse scans start from the upper bound, forward scans from the
    /// lower one; a plain `start` is used only when that side has no bound.
    pub fn effective_start(&self) -> Option<&[u8]> {
        let directional = if self.reverse {
            self.lt.as_ref().or(self.lte.as_ref())
        } else {
            self.gt.as_ref().or(self.gte.as_ref())
        };
        directional.or(self.start.as_ref()).map(Vec::as_slice)
    }

    /// Reverse scans only: whether the key a seek landed on lies beyond the
    /// upper bound, so the iterator has to step back once.
    ///
    /// Seek lands on the first key `>= start`, which is past an `lt` bound
    /// when equal, past `lte` when greater, and past a plain `start` whenever
    /// it is not that exact key.
    pub fn overshoots_upper(&self, landed: &[u8]) -> bool {
        if let Some(lt) = &self.lt {
            landed >= lt.as_slice()
        } else if let Some(lte) = &self.lte {
            landed > lte.as_slice()
        } else if let Some(start) = &self.start {
            landed != start.as_slice()
        } else {
            false
        }
    }

    /// Forward scans only: whether the landed key sits exactly on an
    /// exclusive `gt` bound and must be stepped over.
    pub fn sits_on_lower(&self, landed: &[u8]) -> bool {
        self.gt.as_deref() == Some(landed)
    }

    /// Whether `key` satisfies `end`, `lt`/`lte` and `gt`/`gte`.
    ///
    /// Scans stop at the first key that fails: every bound is monotone in
    /// scan direction once the cursor is positioned.
    pub fn contains(&self, key: &[u8]) -> bool {
        let within_end = match &self.end {
            None => true,
            Some(end) if self.reverse => key >= end.as_slice(),
            Some(end) => key <= end.as_slice(),
        };

        let below_upper = match (&self.lt, &self.lte) {
            (Some(lt), _) => key < lt.as_slice(),
            (None, Some(lte)) => key <= lte.as_slice(),
            (None, None) => true,
        };

        let above_lower = match (&self.gt, &self.gte) {
            (Some(gt), _) => key > gt.as_slice(),
            (None, Some(gte)) => key >= gte.as_slice(),
            (None, None) => true,
        };

        within_end && below_upper && above_lower
    }
}
