//! Routing metrics and the mesh-side tables driven by VAINA requests.
//!
//! This crate provides the hop-count routing metric used by the
//! distance-vector mesh protocol, the Router Client Set (addresses the node
//! originates routes for), the NIB forwarding table, and the [`VainaRouter`]
//! trait through which the request session applies incoming VAINA requests.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod metric;
pub mod nib;
pub mod prefix;
pub mod rcs;
pub mod router;
pub mod table;

pub use error::TableError;
pub use metric::*;
pub use nib::*;
pub use rcs::*;
pub use router::*;
pub use table::*;
