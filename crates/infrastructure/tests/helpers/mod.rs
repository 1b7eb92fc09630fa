#![allow(dead_code)]

mod mock_resolver;
mod peer;

pub use mock_resolver::*;
pub use peer::*;
