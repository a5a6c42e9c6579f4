//! Parallel Monte Carlo failure driver
//!
//! [`FailureManager`] applies a failure policy to the base network many
//! times, builds a [`NetworkView`] per realization, runs an analysis
//! function against each view on a worker pool, and collects results in
//! iteration order. Workers share the read-only base network and never
//! mutate it; the only per-iteration state is an RNG seeded from
//! `master_seed + i`, so a fixed seed yields bit-identical exclusion sets
//! at any parallelism level.

use super::envelope::{CapacityEnvelope, FailurePattern, RunMetadata};
use super::policy::{FailurePolicy, FailurePolicySet};
use crate::model::{Network, NetworkView};
use crate::solver::{self, FlowOptions};
use crate::{Error, Result};
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Cooperative cancellation handle checked at iteration boundaries.
///
/// A cancelled worker returns without emitting a result; aggregates
/// finalize over completed iterations only.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, non-cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Parameters of a Monte Carlo run
#[derive(Debug, Clone, Default)]
pub struct MonteCarloSettings {
    /// Trial count; clamped to 1 when the policy has no rules
    pub iterations: usize,
    /// Worker parallelism
    pub parallelism: usize,
    /// Master seed; per-iteration seeds are `seed + i`. OS entropy when
    /// absent.
    pub seed: Option<u64>,
    /// Run iteration 0 without failures
    pub baseline: bool,
    /// Record the exclusion sets of every iteration
    pub store_failure_patterns: bool,
    /// Cooperative cancellation handle
    pub cancel: Option<CancelToken>,
}

impl MonteCarloSettings {
    /// Settings for `iterations` trials at `parallelism` workers
    pub fn new(iterations: usize, parallelism: usize) -> Self {
        Self {
            iterations,
            parallelism,
            ..Default::default()
        }
    }

    /// Fix the master seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Outcome of a Monte Carlo run. Entry `k` of `results` corresponds to
/// iteration `k`; cancelled iterations are `None`.
#[derive(Debug, Clone)]
pub struct MonteCarloResults<T> {
    /// Per-iteration analysis results, in iteration order
    pub results: Vec<Option<T>>,
    /// Run summary
    pub metadata: RunMetadata,
    /// Exclusion sets per iteration, when requested
    pub failure_patterns: Vec<FailurePattern>,
}

/// Settings of a capacity-envelope campaign
#[derive(Debug, Clone, Default)]
pub struct EnvelopeSettings {
    /// Monte Carlo parameters
    pub monte_carlo: MonteCarloSettings,
    /// Flow computation parameters applied in every trial
    pub flow: FlowOptions,
}

/// Outcome of a capacity-envelope campaign
#[derive(Debug, Clone)]
pub struct EnvelopeResults {
    /// Envelope per (source label, sink label) pair
    pub envelopes: IndexMap<(String, String), CapacityEnvelope>,
    /// Exclusion sets per iteration, when requested
    pub failure_patterns: Vec<FailurePattern>,
    /// Run summary
    pub metadata: RunMetadata,
}

/// Monte Carlo driver bound to a base network and a policy set
#[derive(Debug, Clone)]
pub struct FailureManager<'a> {
    network: &'a Network,
    policy_set: &'a FailurePolicySet,
    policy_name: Option<String>,
}

impl<'a> FailureManager<'a> {
    /// Bind a manager to a network and policy set; `policy_name` selects a
    /// specific policy, otherwise the set's default applies
    pub fn new(
        network: &'a Network,
        policy_set: &'a FailurePolicySet,
        policy_name: Option<&str>,
    ) -> Self {
        Self {
            network,
            policy_set,
            policy_name: policy_name.map(str::to_string),
        }
    }

    /// The base network this manager analyzes
    pub fn network(&self) -> &'a Network {
        self.network
    }

    /// Resolve the failure policy for this run
    pub fn failure_policy(&self) -> Result<Option<&'a FailurePolicy>> {
        match &self.policy_name {
            Some(name) => self.policy_set.policy(name).map(Some),
            None => self.policy_set.default_policy(),
        }
    }

    /// Apply the policy once with the given seed and return the exclusion
    /// sets `(node names, link ids)`. Failed risk groups are expanded into
    /// their member nodes and links.
    pub fn compute_exclusions(
        &self,
        policy: Option<&FailurePolicy>,
        seed: u64,
    ) -> Result<(BTreeSet<String>, BTreeSet<String>)> {
        let Some(policy) = policy else {
            return Ok((BTreeSet::new(), BTreeSet::new()));
        };
        let mut rng = StdRng::seed_from_u64(seed);
        let failed = policy.apply_failures(self.network, &mut rng)?;

        let mut excluded_nodes = BTreeSet::new();
        let mut excluded_links = BTreeSet::new();
        let mut failed_groups: BTreeSet<&str> = BTreeSet::new();
        for id in &failed {
            if self.network.nodes.contains_key(id) {
                excluded_nodes.insert(id.clone());
            } else if self.network.links.contains_key(id) {
                excluded_links.insert(id.clone());
            } else {
                failed_groups.insert(id);
            }
        }

        if !failed_groups.is_empty() {
            for node in self.network.nodes.values() {
                if node.risk_groups.iter().any(|g| failed_groups.contains(g.as_str())) {
                    excluded_nodes.insert(node.name.clone());
                }
            }
            for link in self.network.links.values() {
                if link.risk_groups.iter().any(|g| failed_groups.contains(g.as_str())) {
                    excluded_links.insert(link.id.clone());
                }
            }
        }

        Ok((excluded_nodes, excluded_links))
    }

    /// Run `analysis` against `iterations` failure realizations.
    ///
    /// With a fixed master seed the ordered result stream is identical
    /// across runs and across parallelism levels. Worker errors fail the
    /// whole call; cancellation skips remaining iterations.
    pub fn run_monte_carlo_analysis<T, F>(
        &self,
        analysis: F,
        settings: &MonteCarloSettings,
    ) -> Result<MonteCarloResults<T>>
    where
        F: Fn(&NetworkView<'_>) -> Result<T> + Sync,
        T: Send,
    {
        let policy = self.failure_policy()?;
        let has_rules = policy.is_some_and(FailurePolicy::has_rules);
        let requested = settings.iterations.max(1);
        if !has_rules && requested > 1 {
            return Err(Error::invalid_config(format!(
                "iterations={requested} is meaningless without a failure policy with rules; \
                 all iterations would produce identical results"
            )));
        }
        let iterations = if has_rules { requested } else { 1 };
        let parallelism = settings.parallelism.max(1).min(iterations);

        // Per-iteration seeds are fixed up front so the result stream is
        // independent of worker scheduling.
        let seeds: Vec<u64> = (0..iterations)
            .map(|i| match settings.seed {
                Some(seed) => seed.wrapping_add(i as u64),
                None => rand::random(),
            })
            .collect();

        info!(
            iterations,
            parallelism,
            baseline = settings.baseline,
            policy = self.policy_name.as_deref().unwrap_or("default"),
            "starting Monte Carlo failure analysis"
        );

        let cancel = settings.cancel.clone().unwrap_or_default();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallelism)
            .build()
            .map_err(|e| Error::internal(format!("failed to build worker pool: {e}")))?;

        type Outcome<T> = Option<(Option<FailurePattern>, T)>;
        let outcomes: Result<Vec<Outcome<T>>> = pool.install(|| {
            (0..iterations)
                .into_par_iter()
                .map(|i| -> Result<Outcome<T>> {
                    if cancel.is_cancelled() {
                        return Ok(None);
                    }
                    let (excluded_nodes, excluded_links) = if settings.baseline && i == 0 {
                        (BTreeSet::new(), BTreeSet::new())
                    } else {
                        self.compute_exclusions(policy, seeds[i])?
                    };
                    debug!(
                        iteration = i,
                        excluded_nodes = excluded_nodes.len(),
                        excluded_links = excluded_links.len(),
                        "evaluating failure realization"
                    );
                    let pattern = settings.store_failure_patterns.then(|| FailurePattern {
                        iteration: i,
                        excluded_nodes: excluded_nodes.iter().cloned().collect(),
                        excluded_links: excluded_links.iter().cloned().collect(),
                    });
                    let view = NetworkView::from_excluded_sets(
                        self.network,
                        excluded_nodes,
                        excluded_links,
                    );
                    let value = analysis(&view)?;
                    Ok(Some((pattern, value)))
                })
                .collect()
        });
        let outcomes = outcomes?;

        let mut results = Vec::with_capacity(iterations);
        let mut failure_patterns = Vec::new();
        let mut completed = 0;
        for outcome in outcomes {
            match outcome {
                Some((pattern, value)) => {
                    completed += 1;
                    failure_patterns.extend(pattern);
                    results.push(Some(value));
                }
                None => results.push(None),
            }
        }

        info!(completed, iterations, "Monte Carlo failure analysis finished");

        Ok(MonteCarloResults {
            results,
            failure_patterns,
            metadata: RunMetadata {
                iterations,
                completed,
                parallelism,
                baseline: settings.baseline,
                policy_name: self.policy_name.clone(),
                seed: settings.seed,
            },
        })
    }

    /// Capacity-envelope campaign: per trial, compute group-to-group max
    /// flow on the realization and aggregate per-pair samples into
    /// [`CapacityEnvelope`]s.
    ///
    /// Pairs whose selection is emptied by a failure contribute a zero
    /// sample for that trial, so every envelope holds one value per
    /// completed iteration.
    pub fn capacity_envelopes(
        &self,
        source_path: &str,
        sink_path: &str,
        settings: &EnvelopeSettings,
    ) -> Result<EnvelopeResults> {
        // Establish the pair universe on the unfailed base topology
        let base_flows = solver::max_flow(self.network, source_path, sink_path, &settings.flow)?;
        let base_pairs: Vec<(String, String)> = base_flows.keys().cloned().collect();

        let flow = settings.flow;
        let run = self.run_monte_carlo_analysis(
            |view: &NetworkView<'_>| -> Result<Vec<(String, String, f64)>> {
                let flows = match solver::max_flow(view, source_path, sink_path, &flow) {
                    Ok(flows) => flows,
                    // A failure wiping out every matched source or sink is
                    // an empty selection, not a config error
                    Err(Error::InvalidSelector(_)) => IndexMap::new(),
                    Err(other) => return Err(other),
                };
                Ok(base_pairs
                    .iter()
                    .map(|(src, snk)| {
                        let value = flows
                            .get(&(src.clone(), snk.clone()))
                            .copied()
                            .unwrap_or(0.0);
                        (src.clone(), snk.clone(), value)
                    })
                    .collect())
            },
            &settings.monte_carlo,
        )?;

        let mut samples: IndexMap<(String, String), Vec<f64>> = base_pairs
            .iter()
            .map(|pair| (pair.clone(), Vec::new()))
            .collect();
        for outcome in run.results.iter().flatten() {
            for (src, snk, value) in outcome {
                samples
                    .entry((src.clone(), snk.clone()))
                    .or_default()
                    .push(*value);
            }
        }

        let envelopes = samples
            .into_iter()
            .map(|(pair, values)| {
                let envelope = CapacityEnvelope::from_values(
                    source_path,
                    sink_path,
                    settings.flow.mode,
                    values,
                );
                (pair, envelope)
            })
            .collect();

        Ok(EnvelopeResults {
            envelopes,
            failure_patterns: run.failure_patterns,
            metadata: run.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::policy::{EntityScope, FailureRule};
    use crate::model::{Link, Network, Node};
    use approx::assert_abs_diff_eq;

    fn triangle_network() -> Network {
        let mut net = Network::new();
        for name in ["A", "B", "C"] {
            net.add_node(Node::new(name)).unwrap();
        }
        net.add_link(Link::new("A", "B", 10.0, 1.0)).unwrap();
        net.add_link(Link::new("B", "C", 10.0, 1.0)).unwrap();
        net.add_link(Link::new("A", "C", 5.0, 1.0)).unwrap();
        net
    }

    fn single_link_failure_set() -> FailurePolicySet {
        let mut set = FailurePolicySet::new();
        set.add(
            "single_link",
            FailurePolicy::new(vec![FailureRule::choice(EntityScope::Link, 1)]),
        );
        set
    }

    #[test]
    fn test_named_policy_resolution() {
        let net = triangle_network();
        let set = single_link_failure_set();

        let manager = FailureManager::new(&net, &set, Some("single_link"));
        assert!(manager.failure_policy().unwrap().is_some());

        let missing = FailureManager::new(&net, &set, Some("nope"));
        assert!(matches!(
            missing.failure_policy(),
            Err(Error::UnknownReference(_))
        ));
    }

    #[test]
    fn test_compute_exclusions_targets_scope() {
        let net = triangle_network();
        let set = single_link_failure_set();
        let manager = FailureManager::new(&net, &set, Some("single_link"));
        let policy = manager.failure_policy().unwrap();

        let (nodes, links) = manager.compute_exclusions(policy, 42).unwrap();
        assert!(nodes.is_empty());
        assert_eq!(links.len(), 1);
        assert!(net.links.contains_key(links.iter().next().unwrap()));

        // Same seed, same exclusions
        let again = manager.compute_exclusions(policy, 42).unwrap();
        assert_eq!(again.1, links);
    }

    #[test]
    fn test_risk_group_failure_expands_to_members() {
        let mut net = Network::new();
        net.add_node(Node::new("A").with_risk_groups(["pod1"])).unwrap();
        net.add_node(Node::new("B")).unwrap();
        net.add_link(Link::new("A", "B", 1.0, 1.0)).unwrap();
        net.add_risk_group(crate::model::RiskGroup::new("pod1")).unwrap();

        let mut set = FailurePolicySet::new();
        set.add(
            "pods",
            FailurePolicy::new(vec![FailureRule::all(EntityScope::RiskGroup)]),
        );
        let manager = FailureManager::new(&net, &set, Some("pods"));
        let policy = manager.failure_policy().unwrap();

        let (nodes, links) = manager.compute_exclusions(policy, 1).unwrap();
        assert!(nodes.contains("A"));
        assert!(links.is_empty());
    }

    #[test]
    fn test_iterations_without_rules_is_an_error() {
        let net = triangle_network();
        let mut set = FailurePolicySet::new();
        set.add("empty", FailurePolicy::default());
        let manager = FailureManager::new(&net, &set, Some("empty"));

        let err = manager
            .run_monte_carlo_analysis(
                |_| Ok(0.0_f64),
                &MonteCarloSettings::new(5, 1),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        // A single iteration is fine and runs exactly once
        let run = manager
            .run_monte_carlo_analysis(|_| Ok(1.0_f64), &MonteCarloSettings::new(1, 4))
            .unwrap();
        assert_eq!(run.results.len(), 1);
        assert_eq!(run.metadata.completed, 1);
    }

    #[test]
    fn test_determinism_across_parallelism_levels() {
        let net = triangle_network();
        let set = single_link_failure_set();
        let manager = FailureManager::new(&net, &set, Some("single_link"));

        let sample = |parallelism: usize| -> Vec<Vec<String>> {
            let settings = MonteCarloSettings::new(40, parallelism).with_seed(42);
            let run = manager
                .run_monte_carlo_analysis(
                    |view| Ok(view.excluded_links().iter().cloned().collect::<Vec<_>>()),
                    &settings,
                )
                .unwrap();
            run.results.into_iter().map(Option::unwrap).collect()
        };

        assert_eq!(sample(1), sample(4));
    }

    #[test]
    fn test_worker_error_propagates() {
        let net = triangle_network();
        let set = single_link_failure_set();
        let manager = FailureManager::new(&net, &set, Some("single_link"));

        let err = manager
            .run_monte_carlo_analysis::<f64, _>(
                |_| Err(Error::numeric("boom")),
                &MonteCarloSettings::new(3, 1).with_seed(7),
            )
            .unwrap_err();
        assert!(matches!(err, Error::NumericFailure(_)));
    }

    #[test]
    fn test_cancellation_yields_partial_results() {
        let net = triangle_network();
        let set = single_link_failure_set();
        let manager = FailureManager::new(&net, &set, Some("single_link"));

        let token = CancelToken::new();
        token.cancel();
        let mut settings = MonteCarloSettings::new(5, 1).with_seed(1);
        settings.cancel = Some(token);

        let run = manager
            .run_monte_carlo_analysis(|_| Ok(1.0_f64), &settings)
            .unwrap();
        assert_eq!(run.metadata.completed, 0);
        assert!(run.results.iter().all(Option::is_none));
    }

    #[test]
    fn test_failure_patterns_recorded() {
        let net = triangle_network();
        let set = single_link_failure_set();
        let manager = FailureManager::new(&net, &set, Some("single_link"));

        let mut settings = MonteCarloSettings::new(4, 2).with_seed(9);
        settings.store_failure_patterns = true;
        let run = manager
            .run_monte_carlo_analysis(|_| Ok(()), &settings)
            .unwrap();
        assert_eq!(run.failure_patterns.len(), 4);
        for (i, pattern) in run.failure_patterns.iter().enumerate() {
            assert_eq!(pattern.iteration, i);
            assert_eq!(pattern.excluded_links.len(), 1);
        }
    }

    #[test]
    fn test_baseline_iteration_has_no_exclusions() {
        let net = triangle_network();
        let set = single_link_failure_set();
        let manager = FailureManager::new(&net, &set, Some("single_link"));

        let mut settings = MonteCarloSettings::new(3, 1).with_seed(5);
        settings.baseline = true;
        settings.store_failure_patterns = true;
        let run = manager
            .run_monte_carlo_analysis(|_| Ok(()), &settings)
            .unwrap();
        assert!(run.metadata.baseline);
        assert!(run.failure_patterns[0].excluded_links.is_empty());
        assert_eq!(run.failure_patterns[1].excluded_links.len(), 1);
    }

    #[test]
    fn test_capacity_envelopes_single_link_failures() {
        let net = triangle_network();
        let set = single_link_failure_set();
        let manager = FailureManager::new(&net, &set, Some("single_link"));

        let settings = EnvelopeSettings {
            monte_carlo: MonteCarloSettings::new(30, 2).with_seed(42),
            flow: FlowOptions::default(),
        };
        let results = manager.capacity_envelopes("^A$", "^C$", &settings).unwrap();
        let envelope = &results.envelopes[&("^A$".to_string(), "^C$".to_string())];

        assert_eq!(envelope.sample_count(), 30);
        // Full capacity is 15; any single link failure leaves at least 5
        assert!(envelope.max <= 15.0 + 1e-9);
        assert!(envelope.min >= 5.0 - 1e-9);
        assert!(envelope.mean <= envelope.max && envelope.mean >= envelope.min);
        assert_abs_diff_eq!(
            envelope.values.iter().sum::<f64>() / 30.0,
            envelope.mean,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_capacity_envelopes_deterministic_across_parallelism() {
        let net = triangle_network();
        let set = single_link_failure_set();
        let manager = FailureManager::new(&net, &set, Some("single_link"));

        let run = |parallelism: usize| {
            let settings = EnvelopeSettings {
                monte_carlo: MonteCarloSettings::new(50, parallelism).with_seed(42),
                flow: FlowOptions::default(),
            };
            manager
                .capacity_envelopes("^A$", "^C$", &settings)
                .unwrap()
                .envelopes[&("^A$".to_string(), "^C$".to_string())]
                .values
                .clone()
        };

        assert_eq!(run(4), run(1));
    }
}
