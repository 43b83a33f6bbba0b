pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Relay, Tile, Version};
