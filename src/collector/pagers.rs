//! Pagination helpers shared by every collection task.
//!
//! Two calling conventions exist in the AWS APIs this crate consumes:
//! operations that page through results with a continuation token, and
//! "describe many" operations that accept a bounded list of identifiers per
//! request. [`paginate`] and [`batch`] cover both; point lookups go straight
//! through the typed client since a single `send()` already is the whole
//! call.

use std::future::Future;

/// One page of a token-paginated response: the items of interest plus the
/// continuation token for the next request, if any.
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_token: Option<String>) -> Self {
        Self { items, next_token }
    }
}

/// Follows continuation tokens until exhaustion, concatenating every page's
/// items in order.
///
/// `fetch` is invoked with the token from the previous page (`None` for the
/// first request). An absent or empty token terminates the loop; some APIs
/// (ELB, WAF) signal the last page with an empty marker rather than omitting
/// it. Errors from `fetch` propagate unmodified; retry policy lives in the
/// SDK transport underneath.
pub async fn paginate<T, E, F, Fut>(mut fetch: F) -> Result<Vec<T>, E>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let mut items = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = fetch(token).await?;
        items.extend(page.items);
        match page.next_token {
            Some(next) if !next.is_empty() => token = Some(next),
            _ => return Ok(items),
        }
    }
}

/// Issues one call per chunk of at most `chunk_size` identifiers and
/// concatenates the results in input order.
///
/// This is the "fake pagination" needed by APIs that reject unbounded
/// identifier lists (DescribeImages caps at 100 ids, DescribeFindings at
/// 10, GetFindings at 50). An empty identifier list issues zero calls.
pub async fn batch<I, T, E, F, Fut>(items: &[I], chunk_size: usize, mut call: F) -> Result<Vec<T>, E>
where
    I: Clone,
    F: FnMut(Vec<I>) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    let mut results = Vec::new();
    for chunk in items.chunks(chunk_size.max(1)) {
        results.extend(call(chunk.to_vec()).await?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    #[tokio::test]
    async fn paginate_reassembles_pages_in_order() {
        // One logical response of ten items split over three pages.
        let pages = vec![
            Page::new(vec![0, 1, 2], Some("t1".to_string())),
            Page::new(vec![3, 4, 5, 6], Some("t2".to_string())),
            Page::new(vec![7, 8, 9], None),
        ];
        let mut pages = pages.into_iter();
        let expected_tokens = [None, Some("t1".to_string()), Some("t2".to_string())];
        let calls = Cell::new(0usize);

        let items: Vec<i32> = paginate(|token| {
            assert_eq!(token, expected_tokens[calls.get()]);
            calls.set(calls.get() + 1);
            let page = pages.next().expect("fetched past the terminal page");
            async move { Ok::<_, anyhow::Error>(page) }
        })
        .await
        .unwrap();

        assert_eq!(items, (0..10).collect::<Vec<i32>>());
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn paginate_treats_empty_token_as_terminal() {
        let items: Vec<i32> = paginate(|token| {
            assert!(token.is_none());
            async move { Ok::<_, anyhow::Error>(Page::new(vec![1, 2], Some(String::new()))) }
        })
        .await
        .unwrap();
        assert_eq!(items, vec![1, 2]);
    }

    #[tokio::test]
    async fn paginate_propagates_fetch_errors() {
        let result: Result<Vec<i32>, _> =
            paginate(|_| async { Err(anyhow::anyhow!("throttled")) }).await;
        assert_eq!(result.unwrap_err().to_string(), "throttled");
    }

    #[tokio::test]
    async fn batch_chunks_and_preserves_order() {
        let items: Vec<i32> = (0..25).collect();
        let calls = Cell::new(0usize);

        let out: Vec<i32> = batch(&items, 10, |chunk| {
            calls.set(calls.get() + 1);
            assert!(chunk.len() <= 10);
            async move { Ok::<_, anyhow::Error>(chunk) }
        })
        .await
        .unwrap();

        // ceil(25 / 10) calls, input order preserved.
        assert_eq!(calls.get(), 3);
        assert_eq!(out, items);
    }

    #[tokio::test]
    async fn batch_with_no_items_issues_no_calls() {
        let calls = Cell::new(0usize);
        let out: Vec<i32> = batch(&Vec::<i32>::new(), 10, |chunk| {
            calls.set(calls.get() + 1);
            async move { Ok::<_, anyhow::Error>(chunk) }
        })
        .await
        .unwrap();
        assert_eq!(calls.get(), 0);
        assert!(out.is_empty());
    }
}
