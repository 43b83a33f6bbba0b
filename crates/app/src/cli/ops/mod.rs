pub mod relay;
pub mod tile;
pub mod version;

pub use relay::Relay;
pub use tile::Tile;
pub use version::Version;
