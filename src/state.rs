/// Per-instrument position. Entry and high-water prices only exist while holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionState {
    #[default]
    Flat,
    Holding {
        entry_price: u64,
        /// Highest price seen since entry, never below `entry_price`.
        high_water_price: u64,
    },
}

impl PositionState {
    pub fn open(price: u64) -> Self {
        PositionState::Holding {
            entry_price: price,
            high_water_price: price,
        }
    }

    pub fn is_holding(&self) -> bool {
        matches!(self, PositionState::Holding { .. })
    }

    pub fn entry_price(&self) -> Option<u64> {
        match self {
            PositionState::Flat => None,
            PositionState::Holding { entry_price, .. } => Some(*entry_price),
        }
    }

    pub fn high_water_price(&self) -> Option<u64> {
        match self {
            PositionState::Flat => None,
            PositionState::Holding { high_water_price, .. } => Some(*high_water_price),
        }
    }

    /// Raises the high-water mark; no-op while flat.
    pub fn observe_high(self, price: u64) -> Self {
        match self {
            PositionState::Flat => PositionState::Flat,
            PositionState::Holding { entry_price, high_water_price } => PositionState::Holding {
                entry_price,
                high_water_price: high_water_price.max(price),
            },
        }
    }
}
