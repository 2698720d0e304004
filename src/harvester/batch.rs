//! Batch planning for bounded queries
//!
//! The search endpoint refuses `max_results` below [`MIN_BATCH_SIZE`], so a
//! naive `total / ceiling` split can end on a batch the API rejects. The plan
//! always carries one trailing batch (even when `total` divides evenly) and
//! lifts it to the floor, borrowing the difference from the batch before it.

use tracing::debug;

use super::config::MIN_BATCH_SIZE;
use super::{HarvestError, HarvestResult};

/// Ordered per-request batch sizes for `total_items` under `ceiling`.
///
/// - `105 / 100` plans `[95, 10]`
/// - `100 / 100` plans `[90, 10]`
/// - `5 / 100` plans `[10]`: a single batch is forced to the floor, so callers
///   must tolerate fetching up to [`MIN_BATCH_SIZE`] items more than asked.
///
/// A borrowed-from batch is never shrunk below the floor; with a ceiling
/// under `2 * MIN_BATCH_SIZE` this over-fetches instead.
///
/// # Errors
/// Returns [`HarvestError::InvalidBatch`] when `ceiling` is below the floor.
pub fn plan_batches(total_items: usize, ceiling: usize) -> HarvestResult<Vec<usize>> {
    if ceiling < MIN_BATCH_SIZE {
        return Err(HarvestError::InvalidBatch(format!(
            "batch ceiling {ceiling} is below the API minimum of {MIN_BATCH_SIZE}"
        )));
    }
    if total_items == 0 {
        return Ok(Vec::new());
    }

    let num_batches = total_items / ceiling + 1;
    let mut batches = vec![ceiling; num_batches];
    let remainder = total_items % ceiling;
    let last = num_batches - 1;

    if remainder < MIN_BATCH_SIZE {
        batches[last] = MIN_BATCH_SIZE;
        if num_batches > 1 {
            let borrowed = MIN_BATCH_SIZE - remainder;
            batches[last - 1] = ceiling.saturating_sub(borrowed).max(MIN_BATCH_SIZE);
        }
    } else {
        batches[last] = remainder;
    }

    debug!(total_items, ceiling, ?batches, "Planned request batches");
    Ok(batches)
}
