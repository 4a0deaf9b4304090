use std::collections::VecDeque;

pub const WINDOW_SIZE: usize = 5;

/// Most recent prices for one instrument, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalWindow {
    prices: VecDeque<u64>,
}

impl SignalWindow {
    pub fn new() -> Self {
        Self {
            prices: VecDeque::with_capacity(WINDOW_SIZE + 1),
        }
    }

    pub fn observe(&mut self, price: u64) {
        self.prices.push_back(price);
        while self.prices.len() > WINDOW_SIZE {
            self.prices.pop_front();
        }
    }

    /// Lowest price strictly before the newest observation.
    pub fn recent_low(&self) -> Option<u64> {
        if self.prices.len() < 2 {
            return None;
        }
        self.prices.iter().take(self.prices.len() - 1).copied().min()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &u64> {
        self.prices.iter()
    }
}

impl FromIterator<u64> for SignalWindow {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        let mut window = SignalWindow::new();
        for price in iter {
            window.observe(price);
        }
        window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_two_observations_for_a_low() {
        let mut w = SignalWindow::new();
        assert_eq!(w.recent_low(), None);
        w.observe(100);
        assert_eq!(w.recent_low(), None);
        w.observe(90);
        assert_eq!(w.recent_low(), Some(100));
    }

    #[test]
    fn low_excludes_newest_price() {
        let w: SignalWindow = [100, 101, 99, 98, 100].into_iter().collect();
        assert_eq!(w.recent_low(), Some(98));
        let w: SignalWindow = [100, 101, 99, 98, 50].into_iter().collect();
        assert_eq!(w.recent_low(), Some(98));
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let w: SignalWindow = [10, 20, 30, 40, 50, 60].into_iter().collect();
        assert_eq!(w.len(), WINDOW_SIZE);
        assert_eq!(w.iter().copied().collect::<Vec<_>>(), vec![20, 30, 40, 50, 60]);
        assert_eq!(w.recent_low(), Some(20));
    }
}
