//! Grid module - global geometry, subdomains, and domain decomposition.

mod decomposition;
mod subdomain;

pub use decomposition::*;
pub use subdomain::*;
