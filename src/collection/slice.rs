use std::ops::{Range, RangeInclusive};

/// Start-and-length window over a collection's sequence. A negative start
/// counts from the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceSpec {
    pub start: isize,
    pub length: usize,
}

impl SliceSpec {
    pub fn new(start: isize, length: usize) -> Self {
        Self { start, length }
    }

    /// Concrete index range for a sequence of `len` elements.
    ///
    /// `None` when the start lies past the end. A start equal to `len` is
    /// still addressable and yields an empty range.
    pub fn resolve(&self, len: usize) -> Option<Range<usize>> {
        let start = if self.start >= 0 {
            let start = self.start as usize;
            if start > len {
                return None;
            }
            start
        } else {
            len.checked_sub(self.start.unsigned_abs())?
        };
        let end = start.saturating_add(self.length).min(len);
        Some(start..end)
    }
}

impl From<(isize, usize)> for SliceSpec {
    fn from((start, length): (isize, usize)) -> Self {
        Self::new(start, length)
    }
}

impl From<Range<usize>> for SliceSpec {
    fn from(range: Range<usize>) -> Self {
        Self::new(clamp_start(range.start), range.end.saturating_sub(range.start))
    }
}

impl From<RangeInclusive<usize>> for SliceSpec {
    fn from(range: RangeInclusive<usize>) -> Self {
        let (start, end) = range.into_inner();
        Self::new(clamp_start(start), end.saturating_add(1).saturating_sub(start))
    }
}

// Starts past `isize::MAX` lie past the end of any sequence anyway.
fn clamp_start(start: usize) -> isize {
    isize::try_from(start).unwrap_or(isize::MAX)
}

/// Position of `index` in a sequence of `len`; negative indices count from the end.
pub(crate) fn normalize_index(index: isize, len: usize) -> Option<usize> {
    if index >= 0 {
        let index = index as usize;
        (index < len).then_some(index)
    } else {
        len.checked_sub(index.unsigned_abs())
    }
}
