//! # netgraph
//!
//! A network topology analysis engine. Given a directed, capacitated,
//! costed multigraph of nodes and links, it computes maximum flows,
//! shortest paths, and capacity envelopes under random failure scenarios.
//! It is used to evaluate the resilience of large routed networks
//! (data-center fabrics, WAN backbones).
//!
//! ## Modules
//!
//! - [`graph`] - strict multigraph, SPF/KSP, and the cost-tiered max-flow
//!   engine
//! - [`model`] - nodes, links, risk groups, the network container, and
//!   read-only views with exclusions
//! - [`solver`] - group-to-group operations binding selection to the
//!   engines
//! - [`failure`] - declarative failure policies and the parallel Monte
//!   Carlo driver
//!
//! ## Quick Start
//!
//! ```rust
//! use netgraph::model::{Link, Network, Node};
//! use netgraph::solver::{FlowOptions, SolverOps};
//!
//! let mut net = Network::new();
//! net.add_node(Node::new("A")).unwrap();
//! net.add_node(Node::new("B")).unwrap();
//! net.add_node(Node::new("C")).unwrap();
//! net.add_link(Link::new("A", "B", 10.0, 1.0)).unwrap();
//! net.add_link(Link::new("B", "C", 3.0, 1.0)).unwrap();
//!
//! let flows = net.max_flow("^A$", "^C$", &FlowOptions::default()).unwrap();
//! assert_eq!(flows[&("^A$".to_string(), "^C$".to_string())], 3.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::float_cmp)]

pub mod failure;
pub mod graph;
pub mod model;
pub mod solver;

mod error;
mod types;

pub use error::{Error, Result};
pub use types::*;

/// Prelude for common imports
pub mod prelude {
    pub use crate::failure::{
        CapacityEnvelope, EnvelopeSettings, FailureManager, FailurePolicy, FailurePolicySet,
        FailureRule, MonteCarloSettings,
    };
    pub use crate::graph::{EdgeId, FlowSummary, Path, StrictMultiDigraph};
    pub use crate::model::{AnalysisContext, Link, Network, NetworkView, Node, RiskGroup};
    pub use crate::solver::{FlowOptions, SolverOps};
    pub use crate::types::{EdgeSelect, FlowMode, FlowPlacement};
    pub use crate::Error;
    pub use crate::Result;
}
