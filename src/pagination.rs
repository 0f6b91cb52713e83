//! Pagination driver.
//!
//! Concrete request types opt in by implementing the two hook traits; the
//! driver loops a caller-supplied command until the next-page computation
//! returns `None` or a page comes back empty, enforcing a stable
//! `TotalCount` across pages.

use std::future::Future;

use tracing::Instrument;

use crate::error::ApiError;
use crate::region::Region;

/// A response page: item extraction plus the advertised total.
pub trait PaginatedResponse {
    type Item;

    fn items(&self) -> Vec<Self::Item>;

    fn total_count(&self) -> Option<u64>;
}

/// A request that can compute its successor from the current response.
pub trait PaginatedRequest: Clone {
    type Response: PaginatedResponse;

    /// The request for the next page, or `None` when this was the last.
    fn next_request(&self, response: &Self::Response) -> Option<Self>;
}

/// Drives a paginated action to completion and returns the recorded total
/// plus the accumulated items.
///
/// Pages are fetched strictly serially; the command receives its own copy
/// of the request for each page. A change of the advertised total between
/// pages fails with [`ApiError::TotalCountChanged`].
pub async fn paginate<R, F, Fut>(
    initial: R,
    region: Option<&Region>,
    mut command: F,
) -> Result<(u64, Vec<<R::Response as PaginatedResponse>::Item>), ApiError>
where
    R: PaginatedRequest,
    F: FnMut(R, Option<Region>) -> Fut,
    Fut: Future<Output = Result<R::Response, ApiError>>,
{
    let mut accumulated = Vec::new();
    let mut recorded_total: Option<u64> = None;
    let mut request = initial;
    let mut sequence: u64 = 0;

    loop {
        let span = tracing::debug_span!("pagination", seq = sequence);
        let response = command(request.clone(), region.cloned())
            .instrument(span)
            .await?;

        let items = response.items();
        if items.is_empty() {
            return Ok((recorded_total.unwrap_or(0), accumulated));
        }
        if let Some(total) = response.total_count() {
            match recorded_total {
                Some(previous) if previous != total => {
                    return Err(ApiError::TotalCountChanged {
                        previous,
                        current: total,
                    });
                }
                _ => recorded_total = Some(total),
            }
        }
        accumulated.extend(items);

        match request.next_request(&response) {
            Some(next) => {
                request = next;
                sequence += 1;
            }
            None => return Ok((recorded_total.unwrap_or(0), accumulated)),
        }
    }
}
