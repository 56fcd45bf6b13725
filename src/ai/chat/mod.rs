mod core;
mod models;
pub use self::core::*;
pub use self::models::*;
