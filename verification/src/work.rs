use network::Currency;
use storage::ChainAccess;

/// Median of `values`; the mean of the middle pair for even counts.
pub fn median_value(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let middle = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[middle]
    } else {
        (sorted[middle - 1] + sorted[middle]) / 2
    }
}

/// Difficulty required of the block extending `previous_height`.
pub fn work_required(view: &dyn ChainAccess, previous_height: u32, currency: &Currency) -> u64 {
    let count = std::cmp::min(
        previous_height as usize,
        currency.difficulty_blocks_count(),
    );
    let timestamps = view.last_timestamps(count, previous_height, false);
    let cumulative_difficulties = view.last_cumulative_difficulties(count, previous_height, false);
    currency.next_difficulty(timestamps, cumulative_difficulties)
}
