//! Page and slice assembly around a windowed fetch.
//!
//! # Invariants
//! - The count runs only when the fetched window cannot prove the total.
//! - A slice never counts; it fetches one row past the window instead.

use crate::error::RepoResult;
use crate::query::page::{Page, PageRequest, Slice, Window};

/// Fetches one page and its total.
///
/// The count is skipped when the first page comes back short, or when a
/// later page is non-empty and short; both cases fix the total exactly.
pub fn paginate<T>(
    request: &PageRequest,
    fetch: impl FnOnce(Window) -> RepoResult<Vec<T>>,
    count: impl FnOnce() -> RepoResult<u64>,
) -> RepoResult<Page<T>> {
    let window = request.window();
    let content = fetch(window)?;
    let fetched = content.len() as u64;

    let total = if fetched < window.limit && (window.offset == 0 || fetched > 0) {
        window.offset + fetched
    } else {
        count()?
    };
    Ok(Page::new(content, request, total))
}

/// Fetches one slice, detecting a following page by over-fetching one row.
pub fn paginate_slice<T>(
    request: &PageRequest,
    fetch: impl FnOnce(Window) -> RepoResult<Vec<T>>,
) -> RepoResult<Slice<T>> {
    let window = request.window();
    let mut content = fetch(Window {
        offset: window.offset,
        limit: window.limit + 1,
    })?;
    let has_next = content.len() as u64 > window.limit;
    content.truncate(request.size() as usize);
    Ok(Slice::new(content, request, has_next))
}

#[cfg(test)]
mod tests {
    use super::{paginate, paginate_slice};
    use crate::query::page::{PageRequest, Window};
    use std::cell::Cell;

    fn rows(total: u64, window: Window) -> Vec<u64> {
        (window.offset..total.min(window.offset + window.limit)).collect()
    }

    #[test]
    fn short_first_page_skips_count() {
        let counted = Cell::new(false);
        let page = paginate(
            &PageRequest::of(0, 10).unwrap(),
            |window| Ok(rows(4, window)),
            || {
                counted.set(true);
                Ok(4)
            },
        )
        .unwrap();
        assert!(!counted.get());
        assert_eq!(page.total_elements, 4);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn full_page_and_empty_tail_page_count() {
        let counted = Cell::new(0);
        let count = || {
            counted.set(counted.get() + 1);
            Ok(8)
        };
        let full = paginate(&PageRequest::of(0, 3).unwrap(), |w| Ok(rows(8, w)), count).unwrap();
        assert_eq!(full.total_elements, 8);

        let beyond = paginate(&PageRequest::of(5, 3).unwrap(), |w| Ok(rows(8, w)), || {
            counted.set(counted.get() + 1);
            Ok(8)
        })
        .unwrap();
        assert!(beyond.content.is_empty());
        assert!(!beyond.has_next);
        assert_eq!(beyond.total_elements, 8);
        assert_eq!(counted.get(), 2);
    }

    #[test]
    fn short_last_page_derives_total() {
        let page = paginate(
            &PageRequest::of(2, 3).unwrap(),
            |window| Ok(rows(8, window)),
            || panic!("count must not run"),
        )
        .unwrap();
        assert_eq!(page.content, vec![6, 7]);
        assert_eq!(page.total_elements, 8);
        assert!(page.last);
    }

    #[test]
    fn slice_over_fetches_by_one() {
        let requested = Cell::new(None);
        let slice = paginate_slice(&PageRequest::of(0, 3).unwrap(), |window| {
            requested.set(Some(window));
            Ok(rows(8, window))
        })
        .unwrap();
        assert_eq!(requested.get(), Some(Window { offset: 0, limit: 4 }));
        assert_eq!(slice.content, vec![0, 1, 2]);
        assert!(slice.has_next);

        let tail = paginate_slice(&PageRequest::of(2, 3).unwrap(), |w| Ok(rows(8, w))).unwrap();
        assert_eq!(tail.content, vec![6, 7]);
        assert!(!tail.has_next);
    }
}
