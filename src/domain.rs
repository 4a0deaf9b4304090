use chrono::NaiveTime;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub code: String,
    /// Shares per order, always > 0.
    pub quantity: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountMode {
    Real,
    Demo,
}

impl AccountMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::Demo => "demo",
        }
    }
}

impl std::fmt::Display for AccountMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccountMode {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "real" | "prod" => Ok(Self::Real),
            "demo" | "vps" | "paper" => Ok(Self::Demo),
            _ => Err("invalid account mode; expected real|demo"),
        }
    }
}

/// Brokerage account context handed over by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub number: String,
    pub product_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    TrailingStop,
    StopLoss,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTick {
    pub code: String,
    pub price: u64,
    /// Replay step index or live poll counter.
    pub seq: u64,
}

/// One historical minute sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bar {
    pub code: String,
    pub time: NaiveTime,
    pub price: u64,
}

/// What the decision engine wants done this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    None,
    Enter { price: u64, change: f64 },
    Exit { price: u64, change: f64, reason: ExitReason },
}

impl Action {
    pub fn side(&self) -> Option<Side> {
        match self {
            Action::None => None,
            Action::Enter { .. } => Some(Side::Buy),
            Action::Exit { .. } => Some(Side::Sell),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub code: String,
    pub side: Side,
    pub quantity: u64,
    /// Price the signal was evaluated at; market orders may fill elsewhere.
    pub signal_price: u64,
    pub reason: Option<ExitReason>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAck {
    pub order_id: String,
}
