//! Comic adapters.

mod dm5;
mod kuman;

pub use dm5::Dm5;
pub use kuman::Kuman;
