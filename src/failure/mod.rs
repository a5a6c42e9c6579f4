//! Failure modeling: declarative policies and the Monte Carlo driver
//!
//! - [`policy`] - rules describing which entities fail in a trial
//! - [`manager`] - the parallel sampler applying a policy many times
//! - [`envelope`] - aggregated result artifacts
//!
//! ## Example
//!
//! ```rust,no_run
//! use netgraph::failure::{
//!     EntityScope, EnvelopeSettings, FailureManager, FailurePolicy, FailurePolicySet,
//!     FailureRule, MonteCarloSettings,
//! };
//! use netgraph::model::Network;
//!
//! let network = Network::new();
//! let mut policies = FailurePolicySet::new();
//! policies.add(
//!     "single_link",
//!     FailurePolicy::new(vec![FailureRule::choice(EntityScope::Link, 1)]),
//! );
//!
//! let manager = FailureManager::new(&network, &policies, Some("single_link"));
//! let settings = EnvelopeSettings {
//!     monte_carlo: MonteCarloSettings::new(1000, 4).with_seed(42),
//!     ..Default::default()
//! };
//! let envelopes = manager.capacity_envelopes("^dc.*", "^edge.*", &settings)?.envelopes;
//! # Ok::<(), netgraph::Error>(())
//! ```

pub mod envelope;
pub mod manager;
pub mod policy;

pub use envelope::{CapacityEnvelope, FailurePattern, RunMetadata};
pub use manager::{
    CancelToken, EnvelopeResults, EnvelopeSettings, FailureManager, MonteCarloResults,
    MonteCarloSettings,
};
pub use policy::{
    ConditionOp, EntityScope, FailureCondition, FailurePolicy, FailurePolicySet, FailureRule,
    RuleLogic, RuleType,
};
