//! Smart model selection: filter, weight, pick.
//!
//! Filter candidates down, compute a comparable score, pick by policy: the
//! weighting formula and the three selection modes below (weighted-random,
//! best, top-N-random).

use std::sync::Arc;

use rand::Rng;

use crate::circuit_breaker::CircuitBreaker;
use crate::registry::{ModelRegistry, SelectionCriteria};
use crate::state::{StateStore, now_ms, stats_from_records};
use crate::types::ModelDefinition;
use crate::Result;

/// Normalizes the latency term so a typical sub-second response yields an
/// effective-weight factor near 1.
const LATENCY_NORMALIZATION_FACTOR: f64 = 200.0;
const MIN_LATENCY_MS_FOR_CALCULATION: f64 = 50.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionMode {
    #[default]
    WeightedRandom,
    Best,
    TopNRandom,
}

struct Candidate {
    model: Arc<ModelDefinition>,
    effective_weight: f64,
    avg_latency_ms: f64,
    total_requests: u64,
}

pub struct Selector {
    registry: Arc<ModelRegistry>,
    breaker: Arc<CircuitBreaker>,
    store: Arc<dyn StateStore>,
    stats_window_ms: u64,
}

impl Selector {
    pub fn new(
        registry: Arc<ModelRegistry>,
        breaker: Arc<CircuitBreaker>,
        store: Arc<dyn StateStore>,
        stats_window_ms: u64,
    ) -> Self {
        Self {
            registry,
            breaker,
            store,
            stats_window_ms,
        }
    }

    async fn candidates(
        &self,
        criteria: &SelectionCriteria,
        exclude: &[String],
    ) -> Result<Vec<Candidate>> {
        let filtered = self.registry.filter(criteria);
        let mut names: Vec<String> = Vec::with_capacity(filtered.len());
        let mut by_name = std::collections::HashMap::new();
        for model in filtered {
            if exclude
                .iter()
                .any(|x| x == &model.name || x == &model.provider_qualified_name())
            {
                continue;
            }
            names.push(model.name.clone());
            by_name.insert(model.name.clone(), model);
        }

        let admitted = self.breaker.filter_available(&names).await?;

        let mut candidates = Vec::with_capacity(admitted.len());
        for name in admitted {
            let model = by_name.remove(&name).expect("admitted name came from filtered set");
            let window_start = now_ms().saturating_sub(self.stats_window_ms);
            let records = self.store.get_requests(&name, window_start).await?;
            let stats = stats_from_records(&records);

            if let Some(min_rate) = criteria.min_success_rate {
                if stats.success_rate < min_rate {
                    continue;
                }
            }

            let static_weight = model.weight.max(1) as f64;
            let effective_weight = if stats.total_requests == 0 {
                static_weight
            } else {
                static_weight
                    * stats.success_rate
                    * (LATENCY_NORMALIZATION_FACTOR
                        / stats.avg_latency_ms.max(MIN_LATENCY_MS_FOR_CALCULATION))
            };

            candidates.push(Candidate {
                model,
                effective_weight,
                avg_latency_ms: stats.avg_latency_ms,
                total_requests: stats.total_requests,
            });
        }

        Ok(candidates)
    }

    /// Select the next model given accumulated filter criteria and the
    /// names already attempted this request. Returns `None` if nothing
    /// qualifies.
    pub async fn select_next_model(
        &self,
        criteria: &SelectionCriteria,
        attempt_list: &[String],
    ) -> Result<Option<Arc<ModelDefinition>>> {
        let candidates = self.candidates(criteria, attempt_list).await?;
        if candidates.is_empty() {
            return Ok(None);
        }

        if criteria.prefer_fast {
            return Ok(Some(pick_lowest_latency(candidates)));
        }

        match criteria.selection_mode {
            SelectionMode::Best => Ok(Some(pick_best(candidates))),
            SelectionMode::TopNRandom => Ok(Some(pick_top_n_random(candidates, 3))),
            SelectionMode::WeightedRandom => Ok(Some(pick_weighted_random(candidates))),
        }
    }
}

fn pick_lowest_latency(candidates: Vec<Candidate>) -> Arc<ModelDefinition> {
    candidates
        .into_iter()
        .min_by(|a, b| {
            let a_key = if a.total_requests == 0 { f64::INFINITY } else { a.avg_latency_ms };
            let b_key = if b.total_requests == 0 { f64::INFINITY } else { b.avg_latency_ms };
            a_key.total_cmp(&b_key)
        })
        .expect("non-empty candidate list")
        .model
}

fn pick_best(candidates: Vec<Candidate>) -> Arc<ModelDefinition> {
    candidates
        .into_iter()
        .max_by(|a, b| a.effective_weight.total_cmp(&b.effective_weight))
        .expect("non-empty candidate list")
        .model
}

fn pick_top_n_random(mut candidates: Vec<Candidate>, n: usize) -> Arc<ModelDefinition> {
    candidates.sort_by(|a, b| b.effective_weight.total_cmp(&a.effective_weight));
    candidates.truncate(n.max(1));
    pick_weighted_random(candidates)
}

fn pick_weighted_random(candidates: Vec<Candidate>) -> Arc<ModelDefinition> {
    let total_weight: f64 = candidates.iter().map(|c| c.effective_weight).sum();
    if total_weight <= 0.0 {
        return candidates.into_iter().next().expect("non-empty candidate list").model;
    }

    let mut roll = rand::thread_rng().gen_range(0.0..total_weight);
    let mut iter = candidates.into_iter().peekable();
    while let Some(candidate) = iter.next() {
        if iter.peek().is_none() {
            return candidate.model;
        }
        roll -= candidate.effective_weight;
        if roll <= 0.0 {
            return candidate.model;
        }
    }
    unreachable!("loop always returns on the last element");
}
