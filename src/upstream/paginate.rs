use std::future::Future;

/// Fetches numbered pages (starting at 1) until one comes back shorter than
/// `page_size`, then returns every item in order.
///
/// `max_pages` bounds the loop against an upstream that keeps returning
/// full pages.
pub async fn collect_pages<T, E, F, Fut>(
    page_size: usize,
    max_pages: usize,
    mut fetch: F,
) -> Result<Vec<T>, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    let mut all = Vec::new();
    for page in 1..=max_pages {
        let items = fetch(page).await?;
        let len = items.len();
        all.extend(items);
        tracing::debug!(page, len, total = all.len(), "fetched page");
        if len < page_size {
            return Ok(all);
        }
    }
    tracing::warn!(max_pages, "page limit reached, result may be truncated");
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_stops_on_short_page() {
        let calls = AtomicUsize::new(0);
        let sizes = [3usize, 3, 1, 3];
        let out: Result<Vec<usize>, ()> = collect_pages(3, 100, |page| {
            calls.fetch_add(1, Ordering::SeqCst);
            let n = sizes[page - 1];
            async move { Ok((0..n).collect()) }
        })
        .await;
        assert_eq!(out.unwrap().len(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_first_page() {
        let out: Result<Vec<u8>, ()> = collect_pages(500, 10, |_| async { Ok(vec![]) }).await;
        assert!(out.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_aborts() {
        let out: Result<Vec<u8>, &str> = collect_pages(1, 10, |page| async move {
            if page == 2 { Err("boom") } else { Ok(vec![1]) }
        })
        .await;
        assert_eq!(out.unwrap_err(), "boom");
    }

    #[tokio::test]
    async fn test_max_pages_bound() {
        let out: Result<Vec<u8>, ()> = collect_pages(1, 4, |_| async { Ok(vec![1]) }).await;
        assert_eq!(out.unwrap().len(), 4);
    }
}
