//! Location plumbing: the consumed traits and three reference
//! implementations (in-memory, hash-fragment, pushState).

mod browser;
mod memory;
mod services;

pub use browser::{BrowserPort, HashLocation, PushStateLocation};
pub use memory::MemoryLocation;
pub use services::{
    parse_base_href, LocationChangeFn, LocationConfig, LocationServices, Unsubscribe,
};
