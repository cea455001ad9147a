//! URL frontier module
//!
//! The frontier holds the set of paths waiting to be crawled and the set of
//! paths already done. Two backends are provided:
//! - [`RedisFrontier`] - shared, survives restarts
//! - [`MemoryFrontier`] - in-process, for tests and throwaway crawls

mod memory;
mod remote;
mod traits;

pub use memory::MemoryFrontier;
pub use remote::RedisFrontier;
pub use traits::{Frontier, FrontierError, FrontierResult};
