use burrow_cache::BloomMembershipFilter;
use burrow_core::{AliasStore, ShortCode, StorageError};
use tracing::{debug, info};

/// Codes fetched per `list_codes` call while warming.
pub const DEFAULT_PAGE_SIZE: usize = 1_000;

/// Loads every stored code into an in-process bloom filter.
///
/// The in-process filter starts empty on every boot, so without this step
/// every existing alias would resolve as not found. Returns the number of
/// codes added.
pub async fn warm_filter<S>(
    store: &S,
    filter: &BloomMembershipFilter,
    page_size: usize,
) -> Result<usize, StorageError>
where
    S: AliasStore + ?Sized,
{
    let mut after: Option<ShortCode> = None;
    let mut total = 0;

    loop {
        let page = store.list_codes(after.as_ref(), page_size).await?;
        if page.is_empty() {
            break;
        }

        total += filter.extend(&page);
        debug!(loaded = total, "warming membership filter");

        if page.len() < page_size {
            break;
        }
        after = page.last().cloned();
    }

    info!(codes = total, "membership filter warmed from storage");
    Ok(total)
}
