//! Generic cursor pager.
//!
//! Every list endpoint (followers, followees, pending approvals, posts,
//! conversations, messages) pages the same way: rows ordered by creation time
//! descending, a cursor that is the creation time of the last row returned,
//! and a `next` flag computed from an exists-older probe. [`paginate`] drives
//! any relation that implements [`Pager`].

use async_trait::async_trait;

use crate::cursor;
use crate::error::Result;

/// Page size when the caller supplies none (or a non-positive value).
pub const DEFAULT_LIMIT: i64 = 50;

/// One page of a time-ordered listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Rows in creation-time descending order.
    pub rows: Vec<T>,
    /// Total row count ignoring the cursor.
    pub total: i64,
    /// Cursor positioned at the last returned row, or `None` on an empty page.
    pub cursor: Option<String>,
    /// Whether at least one strictly older row exists beyond this page.
    pub next: bool,
}

/// A time-ordered relation the generic pager can drive.
#[async_trait]
pub trait Pager {
    type Item;

    /// Rows strictly older than `before` (all rows when `None`), newest
    /// first, limited to `limit`.
    async fn page(&self, before: Option<i64>, limit: i64) -> Result<Vec<Self::Item>>;

    /// Total row count ignoring any cursor.
    async fn total(&self) -> Result<i64>;

    /// Whether at least one row strictly older than `before` exists.
    async fn exists_older(&self, before: i64) -> Result<bool>;

    /// Creation time of an item, in epoch milliseconds.
    fn created_at(item: &Self::Item) -> i64;
}

/// Run one page of a listing.
///
/// The cursor is opaque (see [`crate::cursor`]); an absent or malformed
/// cursor pages from the newest row.
pub async fn paginate<P: Pager>(
    pager: &P,
    cursor: Option<&str>,
    limit: Option<i64>,
) -> Result<Page<P::Item>> {
    let before = cursor::decode(cursor);
    let limit = match limit {
        Some(n) if n > 0 => n,
        _ => DEFAULT_LIMIT,
    };

    let rows = pager.page(before, limit).await?;
    let total = pager.total().await?;

    let (next_cursor, next) = match rows.last() {
        None => (None, false),
        Some(last) => {
            let last_ts = P::created_at(last);
            (Some(cursor::encode(last_ts)), pager.exists_older(last_ts).await?)
        }
    };

    Ok(Page {
        rows,
        total,
        cursor: next_cursor,
        next,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    /// Fixed rows keyed by descending timestamps.
    struct FakePager {
        timestamps: Vec<i64>,
    }

    #[async_trait]
    impl Pager for FakePager {
        type Item = i64;

        async fn page(&self, before: Option<i64>, limit: i64) -> Result<Vec<i64>> {
            let before = before.unwrap_or(i64::MAX);
            Ok(self
                .timestamps
                .iter()
                .copied()
                .filter(|ts| *ts < before)
                .take(limit as usize)
                .collect())
        }

        async fn total(&self) -> Result<i64> {
            Ok(self.timestamps.len() as i64)
        }

        async fn exists_older(&self, before: i64) -> Result<bool> {
            Ok(self.timestamps.iter().any(|ts| *ts < before))
        }

        fn created_at(item: &i64) -> i64 {
            *item
        }
    }

    fn pager_with(n: i64) -> FakePager {
        FakePager {
            timestamps: (1..=n).rev().map(|i| i * 1000).collect(),
        }
    }

    #[tokio::test]
    async fn test_three_pages_of_25_rows() {
        let pager = pager_with(25);
        let mut seen: Vec<i64> = Vec::new();

        let page1 = paginate(&pager, None, Some(10)).await.unwrap();
        assert_eq!(page1.rows.len(), 10);
        assert_eq!(page1.total, 25);
        assert!(page1.next);
        seen.extend(&page1.rows);

        let page2 = paginate(&pager, page1.cursor.as_deref(), Some(10)).await.unwrap();
        assert_eq!(page2.rows.len(), 10);
        assert!(page2.next);
        seen.extend(&page2.rows);

        let page3 = paginate(&pager, page2.cursor.as_deref(), Some(10)).await.unwrap();
        assert_eq!(page3.rows.len(), 5);
        assert!(!page3.next);
        seen.extend(&page3.rows);

        // No duplicates across pages.
        let mut dedup = seen.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), 25);
    }

    #[tokio::test]
    async fn test_empty_page_has_no_cursor() {
        let pager = FakePager { timestamps: vec![] };

        let page = paginate(&pager, None, None).await.unwrap();
        assert!(page.rows.is_empty());
        assert_eq!(page.cursor, None);
        assert!(!page.next);
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_invalid_cursor_and_limit_fall_back() {
        let pager = pager_with(60);

        // Garbage cursor pages from the newest; bad limit falls back to 50.
        let page = paginate(&pager, Some("!!not-a-cursor!!"), Some(0)).await.unwrap();
        assert_eq!(page.rows.len(), DEFAULT_LIMIT as usize);
        assert_eq!(page.rows[0], 60_000);
        assert!(page.next);
    }

    // Exercise the EngineError plumbing through a failing pager.
    struct FailingPager;

    #[async_trait]
    impl Pager for FailingPager {
        type Item = i64;

        async fn page(&self, _before: Option<i64>, _limit: i64) -> Result<Vec<i64>> {
            Err(EngineError::NotFound { entity: "Row" })
        }

        async fn total(&self) -> Result<i64> {
            Ok(0)
        }

        async fn exists_older(&self, _before: i64) -> Result<bool> {
            Ok(false)
        }

        fn created_at(item: &i64) -> i64 {
            *item
        }
    }

    #[tokio::test]
    async fn test_pager_errors_propagate() {
        let err = paginate(&FailingPager, None, None).await.unwrap_err();
        assert_eq!(err.status(), 404);
    }
}
