pub mod momentum;
pub mod window;

pub use momentum::{Decision, MomentumBreakout};
pub use window::SignalWindow;
