//! HTTP request handlers.

mod rtm;
mod system;


pub use rtm::*;
pub use system::*;
