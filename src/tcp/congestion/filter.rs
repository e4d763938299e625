use std::collections::VecDeque;

/// Running maximum over the last `window` ticks (round trips, for instance).
///
/// Samples are kept in decreasing order of value; a sample is dropped as soon as
/// a larger or equal one arrives after it, or when it ages out.
#[derive(Clone, Debug)]
pub(super) struct MaxFilter<T> {
    window: u64,
    samples: VecDeque<(u64, T)>,
}

impl<T: Copy + Ord> MaxFilter<T> {
    pub(super) fn new(window: u64) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    pub(super) fn update(&mut self, tick: u64, value: T) {
        while self.samples.back().is_some_and(|(_, v)| *v <= value) {
            self.samples.pop_back();
        }
        self.samples.push_back((tick, value));
        self.expire(tick);
    }

    /// Forget samples older than the window, as seen from `tick`.
    pub(super) fn expire(&mut self, tick: u64) {
        while self.samples.len() > 1 && self.samples.front().is_some_and(|(t, _)| t + self.window <= tick) {
            self.samples.pop_front();
        }
    }

    pub(super) fn get(&self) -> Option<T> {
        self.samples.front().map(|(_, v)| *v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_max_in_window() {
        let mut filter = MaxFilter::new(3);
        assert_eq!(filter.get(), None);
        filter.update(0, 10);
        filter.update(1, 5);
        filter.update(2, 7);
        assert_eq!(filter.get(), Some(10));
        // 10 ages out, 7 is the max of ticks 1..=3
        filter.update(3, 1);
        assert_eq!(filter.get(), Some(7));
        filter.update(4, 1);
        assert_eq!(filter.get(), Some(7));
        filter.update(5, 1);
        assert_eq!(filter.get(), Some(1));
        filter.update(6, 20);
        assert_eq!(filter.get(), Some(20));
    }
}
