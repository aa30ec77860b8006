//! Page request and result shapes.
//!
//! # Invariants
//! - `total_pages == ceil(total_elements / size)`; zero elements is zero pages.
//! - `has_next == (number + 1) * size < total_elements`.
//! - Serialized keys are camelCase.

use crate::error::{RepoError, RepoResult};
use crate::query::sort::Sort;
use serde::Serialize;

/// Zero-based page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    number: u32,
    size: u32,
    sort: Sort,
}

/// Row window derived from a page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

impl PageRequest {
    /// # Errors
    /// - `InvalidPagination` when `size` is zero.
    pub fn of(number: u32, size: u32) -> RepoResult<Self> {
        Self::of_sorted(number, size, Sort::unsorted())
    }

    pub fn of_sorted(number: u32, size: u32, sort: Sort) -> RepoResult<Self> {
        if size == 0 {
            return Err(RepoError::InvalidPagination(
                "page size must be at least 1".to_string(),
            ));
        }
        Ok(Self { number, size, sort })
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number) * u64::from(self.size)
    }

    pub fn window(&self) -> Window {
        Window {
            offset: self.offset(),
            limit: u64::from(self.size),
        }
    }

    pub fn next(&self) -> Self {
        Self {
            number: self.number.saturating_add(1),
            ..self.clone()
        }
    }
}

/// One page of results with totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub number: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u64,
    pub first: bool,
    pub last: bool,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        let size = u64::from(request.size());
        let number = request.number();
        let total_pages = total_elements.div_ceil(size);
        let has_next = (u64::from(number) + 1) * size < total_elements;
        Self {
            content,
            number,
            size: request.size(),
            total_elements,
            total_pages,
            first: number == 0,
            last: !has_next,
            has_next,
            has_previous: number > 0,
        }
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    /// Converts the content, keeping every total.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            first: self.first,
            last: self.last,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}

/// One page of results without totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Slice<T> {
    pub content: Vec<T>,
    pub number: u32,
    pub size: u32,
    pub first: bool,
    pub last: bool,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Slice<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, has_next: bool) -> Self {
        let number = request.number();
        Self {
            content,
            number,
            size: request.size(),
            first: number == 0,
            last: !has_next,
            has_next,
            has_previous: number > 0,
        }
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Slice<U> {
        Slice {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            first: self.first,
            last: self.last,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Page, PageRequest};
    use crate::error::RepoError;

    #[test]
    fn zero_size_is_rejected() {
        assert!(matches!(
            PageRequest::of(0, 0),
            Err(RepoError::InvalidPagination(_))
        ));
    }

    #[test]
    fn totals_follow_ceiling_division() {
        let request = PageRequest::of(0, 3).unwrap();
        let page = Page::new(vec![1, 2, 3], &request, 8);
        assert_eq!(page.total_pages, 3);
        assert!(page.first);
        assert!(page.has_next);
        assert!(!page.last);

        let last = Page::new(vec![7, 8], &PageRequest::of(2, 3).unwrap(), 8);
        assert!(last.last);
        assert!(!last.has_next);
        assert!(last.has_previous);
    }

    #[test]
    fn zero_total_has_zero_pages() {
        let page: Page<i32> = Page::new(Vec::new(), &PageRequest::of(0, 5).unwrap(), 0);
        assert_eq!(page.total_pages, 0);
        assert!(page.first);
        assert!(page.last);
        assert!(!page.has_next);
    }

    #[test]
    fn map_keeps_totals() {
        let page = Page::new(vec![1, 2], &PageRequest::of(1, 2).unwrap(), 5).map(|n| n * 10);
        assert_eq!(page.content, vec![10, 20]);
        assert_eq!(page.total_elements, 5);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next);
    }
}
