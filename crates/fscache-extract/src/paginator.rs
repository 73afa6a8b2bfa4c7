//! Windowed pagination over an identifier range
//!
//! [`Paginator`] yields fixed-width windows starting at the range's first
//! identifier until the cursor passes its last one. What a window returns has
//! no influence on the sequence: empty windows are gaps in a sparse
//! identifier space, and so are windows whose request failed.

use crate::range::IdentifierRange;

/// Inclusive identifier bounds of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

/// Window width for a layer: the configured step, reduced to the layer's
/// page limit when it advertises one.
pub fn effective_step(steps: u64, max_record_count: Option<u64>) -> u64 {
    let step = match max_record_count {
        Some(limit) if limit > 0 => steps.min(limit),
        _ => steps,
    };
    step.max(1)
}

/// Iterator of windows covering an [`IdentifierRange`]
#[derive(Debug, Clone)]
pub struct Paginator {
    cursor: Option<i64>,
    end: i64,
    step: i64,
}

impl Paginator {
    pub fn new(range: IdentifierRange, step: u64) -> Self {
        Self {
            cursor: Some(range.start),
            end: range.end,
            step: i64::try_from(step.max(1)).unwrap_or(i64::MAX),
        }
    }

    /// Start of the next window, `None` once the range is exhausted
    pub fn cursor(&self) -> Option<i64> {
        self.cursor.filter(|&c| c <= self.end)
    }
}

impl Iterator for Paginator {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        let start = self.cursor()?;
        let end = start.saturating_add(self.step - 1);
        self.cursor = end.checked_add(1);
        Some(Window { start, end })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.cursor() {
            None => (0, Some(0)),
            Some(c) => {
                let span = (self.end as i128) - (c as i128) + 1;
                let n = (span + self.step as i128 - 1) / self.step as i128;
                let n = usize::try_from(n).unwrap_or(usize::MAX);
                (n, Some(n))
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn range(start: i64, end: i64) -> IdentifierRange {
        IdentifierRange::new(start, end).unwrap()
    }

    #[test]
    fn test_single_window_for_small_layer() {
        let windows: Vec<_> = Paginator::new(range(1, 2), 1000).collect();
        assert_eq!(windows, vec![Window { start: 1, end: 1000 }]);
    }

    #[test]
    fn test_windows_are_not_clamped() {
        let windows: Vec<_> = Paginator::new(range(1, 15), 5).collect();
        assert_eq!(
            windows,
            vec![
                Window { start: 1, end: 5 },
                Window { start: 6, end: 10 },
                Window { start: 11, end: 15 },
            ]
        );

        let windows: Vec<_> = Paginator::new(range(0, 10), 4).collect();
        assert_eq!(windows.last(), Some(&Window { start: 8, end: 11 }));
    }

    #[test]
    fn test_single_identifier() {
        let windows: Vec<_> = Paginator::new(range(7, 7), 1).collect();
        assert_eq!(windows, vec![Window { start: 7, end: 7 }]);
    }

    #[test]
    fn test_does_not_overflow_near_max() {
        let windows: Vec<_> = Paginator::new(range(i64::MAX - 3, i64::MAX), 2).collect();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].end, i64::MAX);

        let windows: Vec<_> = Paginator::new(range(0, i64::MAX), u64::MAX).collect();
        assert_eq!(windows, vec![Window { start: 0, end: i64::MAX - 1 }, Window { start: i64::MAX, end: i64::MAX }]);
    }

    #[test]
    fn test_effective_step() {
        assert_eq!(effective_step(1000, Some(5)), 5);
        assert_eq!(effective_step(100, Some(2000)), 100);
        assert_eq!(effective_step(1000, None), 1000);
        assert_eq!(effective_step(1000, Some(0)), 1000);
        assert_eq!(effective_step(0, None), 1);
    }

    #[test]
    fn test_size_hint_matches_count() {
        let paginator = Paginator::new(range(3, 2500), 1000);
        assert_eq!(paginator.size_hint(), (3, Some(3)));
        assert_eq!(paginator.count(), 3);
    }

    proptest! {
        #[test]
        fn windows_cover_range_exactly_once(
            start in 0i64..5_000,
            len in 0i64..5_000,
            step in 1u64..1_500,
        ) {
            let end = start + len;
            let windows: Vec<Window> = Paginator::new(range(start, end), step).collect();

            prop_assert!(!windows.is_empty());
            prop_assert_eq!(windows[0].start, start);
            for pair in windows.windows(2) {
                prop_assert_eq!(pair[1].start, pair[0].end + 1);
            }
            for w in &windows {
                prop_assert_eq!((w.end - w.start + 1) as u64, step);
                prop_assert!(w.start <= end);
            }
            prop_assert!(windows[windows.len() - 1].end >= end);
        }
    }
}
