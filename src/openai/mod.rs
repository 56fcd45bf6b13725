mod core;
mod gateway;
pub use self::core::*;
pub use self::gateway::*;
