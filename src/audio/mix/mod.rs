pub mod corrupt;
pub mod layer;
pub mod mixer;

pub use corrupt::{CorruptMode, CorruptSettings};
pub use layer::MixLayer;
pub use mixer::Mixer;
