pub mod base;
pub mod logging;
pub mod pipeline;
pub mod session;
pub mod transcode;

pub use base::*;
pub use logging::*;
pub use pipeline::*;
pub use session::*;
pub use transcode::*;
