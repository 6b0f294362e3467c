//! Block adjacency.
//!
//! - `csr`: compressed sparse rows, used for both views of a block
//! - `localizer`: global V-keys to dense local column ids

pub mod csr;
pub mod localizer;

pub use csr::{Graph, GraphError};
pub use localizer::{localize, LocalizedBlock};
