//! Bucketed sliding-window counter.
//!
//! The window of `interval_ms` is split into fixed-width buckets stored in a
//! ring. A bucket is lazily reset when the ring wraps onto it, so there is no
//! background sweeper. Callers hold the per-resource lock while touching it.

/// Target bucket count per window. Short windows get fewer (min 1ms) buckets.
const BUCKETS_PER_WINDOW: u64 = 10;

#[derive(Debug, Clone)]
pub(crate) struct SlidingWindow<B> {
    interval_ms: u64,
    bucket_ms: u64,
    ring: Vec<Option<(u64, B)>>,
}

impl<B: Default> SlidingWindow<B> {
    pub(crate) fn new(interval_ms: u64) -> Self {
        let interval_ms = interval_ms.max(1);
        let bucket_ms = (interval_ms / BUCKETS_PER_WINDOW).max(1);
        let len = interval_ms.div_ceil(bucket_ms) as usize;
        let mut ring = Vec::with_capacity(len);
        ring.resize_with(len, || None);
        Self { interval_ms, bucket_ms, ring }
    }

    pub(crate) fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Bucket covering `now`, reset if it still holds an older period.
    pub(crate) fn current(&mut self, now_ms: u64) -> &mut B {
        let idx = ((now_ms / self.bucket_ms) % self.ring.len() as u64) as usize;
        let start = now_ms - now_ms % self.bucket_ms;
        let slot = &mut self.ring[idx];
        if !matches!(slot, Some((s, _)) if *s == start) {
            *slot = None;
        }
        &mut slot.get_or_insert_with(|| (start, B::default())).1
    }

    /// Buckets whose period overlaps `(now - interval, now]`.
    pub(crate) fn live(&self, now_ms: u64) -> impl Iterator<Item = &B> + '_ {
        let interval = self.interval_ms;
        self.ring.iter().filter_map(move |slot| match slot {
            Some((start, b)) if *start <= now_ms && now_ms - *start < interval => Some(b),
            _ => None,
        })
    }

    pub(crate) fn reset(&mut self) {
        for slot in &mut self.ring {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Count(u64);

    fn total(w: &SlidingWindow<Count>, now: u64) -> u64 {
        w.live(now).map(|c| c.0).sum()
    }

    #[test]
    fn counts_expire_after_interval() {
        let mut w = SlidingWindow::<Count>::new(1000);
        w.current(0).0 += 3;
        w.current(450).0 += 2;
        assert_eq!(total(&w, 900), 5);
        // first bucket [0,100) left the window, second [400,500) still live
        assert_eq!(total(&w, 1000), 2);
        assert_eq!(total(&w, 1500), 0);
    }

    #[test]
    fn wrapped_bucket_is_reset() {
        let mut w = SlidingWindow::<Count>::new(1000);
        w.current(10).0 += 7;
        w.current(1010).0 += 1;
        assert_eq!(total(&w, 1010), 1);
    }

    #[test]
    fn tiny_window_has_one_ms_buckets() {
        let mut w = SlidingWindow::<Count>::new(5);
        w.current(1).0 += 1;
        w.current(3).0 += 1;
        assert_eq!(total(&w, 4), 2);
        assert_eq!(total(&w, 6), 1);
    }
}
