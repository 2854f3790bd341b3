//! Group Chat Manager orchestration (C4): round-robin and intelligent
//! delegation over a `GroupChatManager` node's connected delegates.
//!
//! [`run`] is the single entry point; it never talks to `graph_core`'s
//! scheduler or persistence directly - it takes an already-built
//! [`crate::context::AggregatedContext`] and a [`DelegateInvoker`] the
//! caller (`crate::executors`) wires to real LLM providers, and returns
//! plain text plus a JSON transcript the caller can store as the node's
//! structured delegate conversation.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use graph_core::graph::{NodeConfig, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::context::AggregatedContext;
use crate::delegate_executor::DelegateOutcome;
use crate::error::OrchestratorError;
use crate::protocol::{self, Message};
use crate::query_analysis;

fn protocol_priority(priority: query_analysis::SubqueryPriority) -> protocol::Priority {
    match priority {
        query_analysis::SubqueryPriority::High => protocol::Priority::High,
        query_analysis::SubqueryPriority::Medium => protocol::Priority::Medium,
        query_analysis::SubqueryPriority::Low => protocol::Priority::Low,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegationMode {
    RoundRobin,
    Intelligent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationStrategy {
    AllDelegatesComplete,
    AnyDelegateComplete,
}

/// One delegate node's identity and prompt-building inputs, as seen by the
/// GCM - everything it needs without reaching back into the full [`Graph`].
#[derive(Debug, Clone)]
pub struct DelegateHandle {
    pub node_id: NodeId,
    pub name: String,
    pub system_message: String,
    pub description: String,
}

/// Everything [`run`] needs that isn't carried on [`Graph`]/[`NodeConfig`]
/// directly - the dispatch boundary to real LLM calls.
#[async_trait]
pub trait DelegateInvoker: Send + Sync {
    /// Invoke `node_id` (a delegate, or the GCM itself for final synthesis)
    /// with `prompt`, honoring `timeout` and retrying up to `max_retries`
    /// additional times per [`crate::delegate_executor::execute_with_retry`].
    async fn invoke(
        &self,
        node_id: &str,
        prompt: &str,
        temperature: f32,
        timeout: Duration,
        max_retries: usize,
    ) -> DelegateOutcome;
}

#[derive(Debug, Clone)]
pub struct GcmSettings {
    pub delegation_mode: DelegationMode,
    pub max_rounds: u32,
    pub termination_condition: Option<String>,
    pub termination_strategy: TerminationStrategy,
    pub confidence_threshold: f64,
    pub delegation_timeout: Duration,
    pub max_delegation_retries: usize,
    pub max_subqueries: Option<usize>,
    pub temperature: f32,
}

impl GcmSettings {
    /// Read a `GroupChatManager` node's settings, applying the same
    /// defaults and precedence the source config carries: node-level
    /// `max_iterations` wins over `max_rounds` when both are set (this is
    /// the per-delegate iteration cap, reused here as the round cap since
    /// the source has no separate per-delegate field), `max_rounds`
    /// defaults to 10, `confidence_threshold` to 0.7, `delegation_timeout`
    /// to 30s, `max_delegation_retries` to 3.
    pub fn from_node_config(data: &NodeConfig) -> Self {
        let max_rounds = data.max_iterations.or(data.max_rounds).unwrap_or(10).max(1);
        let delegation_mode = match data.delegation_mode.as_deref() {
            Some("intelligent") => DelegationMode::Intelligent,
            _ => DelegationMode::RoundRobin,
        };
        let termination_strategy = match data.termination_strategy.as_deref() {
            Some("any_delegate_complete") => TerminationStrategy::AnyDelegateComplete,
            // `max_iterations_reached` has no separate semantics here: a
            // delegate already marks itself `completed` once its own
            // iteration cap is hit, so "all complete" covers it.
            _ => TerminationStrategy::AllDelegatesComplete,
        };

        Self {
            delegation_mode,
            max_rounds,
            termination_condition: data.termination_condition.clone(),
            termination_strategy,
            confidence_threshold: data.delegation_confidence_threshold.unwrap_or(0.7) as f64,
            delegation_timeout: Duration::from_secs(data.delegation_timeout_s.unwrap_or(30)),
            max_delegation_retries: data.max_delegation_retries.unwrap_or(3) as usize,
            max_subqueries: data.max_subqueries,
            temperature: data.temperature.unwrap_or(0.5),
        }
    }

    /// Intelligent mode is always a single pass with a hard
    /// all-delegates-complete bar - forcing these rather than trusting
    /// caller-supplied values matches the source's intelligent-delegation
    /// path exactly.
    fn forced_for_intelligent(&self) -> Self {
        Self {
            max_rounds: 1,
            termination_strategy: TerminationStrategy::AllDelegatesComplete,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcmResult {
    pub output: String,
    pub transcript: Value,
}

struct DelegateStatus {
    iterations: u32,
    max_iterations: u32,
    completed: bool,
}

fn check_termination_strategy(statuses: &HashMap<String, DelegateStatus>, strategy: TerminationStrategy) -> bool {
    let completed = statuses.values().filter(|s| s.completed).count();
    match strategy {
        TerminationStrategy::AllDelegatesComplete => completed == statuses.len(),
        TerminationStrategy::AnyDelegateComplete => completed > 0,
    }
}

fn delegate_summary(statuses: &HashMap<String, DelegateStatus>) -> String {
    statuses
        .iter()
        .map(|(name, s)| {
            let mark = if s.completed { "completed" } else { "incomplete" };
            format!("- {name}: {}/{} iterations ({mark})", s.iterations, s.max_iterations)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Top-level entry point: dispatch to round-robin or intelligent mode. A
/// GCM with zero connected delegates is a configuration error, not a
/// silent no-op, since a `GroupChatManager` node only exists to delegate.
pub async fn run(
    manager_name: &str,
    settings: &GcmSettings,
    delegates: &[DelegateHandle],
    aggregated: &AggregatedContext,
    invoker: &dyn DelegateInvoker,
    gcm_node_id: &str,
) -> Result<GcmResult, OrchestratorError> {
    if delegates.is_empty() {
        return Err(OrchestratorError::Configuration(format!(
            "GroupChatManager '{manager_name}' has no connected delegates"
        )));
    }

    match settings.delegation_mode {
        DelegationMode::RoundRobin => {
            run_round_robin(manager_name, settings, delegates, aggregated, invoker, gcm_node_id).await
        }
        DelegationMode::Intelligent => {
            run_intelligent(manager_name, settings, delegates, aggregated, invoker, gcm_node_id).await
        }
    }
}

fn delegate_prompt(
    delegate: &DelegateHandle,
    aggregated: &AggregatedContext,
    conversation_log: &[String],
    iteration: u32,
) -> String {
    let recent: Vec<&String> = conversation_log.iter().rev().take(3).rev().collect();
    let recent_block = if recent.is_empty() {
        "(none yet)".to_string()
    } else {
        recent.iter().map(|s| s.as_str()).collect::<Vec<_>>().join("\n")
    };

    format!(
        "You are {name}, a specialized delegate agent.\n\n\
         System Message: {system_message}\n\n\
         Iteration: {iteration}\n\n\
         Input Context ({input_count} sources):\n{formatted_context}\n\n\
         Recent Delegate Conversation:\n{recent_block}\n\n\
         Respond with your contribution to this conversation.",
        name = delegate.name,
        system_message = delegate.system_message,
        input_count = aggregated.input_count,
        formatted_context = aggregated.formatted_context,
    )
}

async fn run_round_robin(
    manager_name: &str,
    settings: &GcmSettings,
    delegates: &[DelegateHandle],
    aggregated: &AggregatedContext,
    invoker: &dyn DelegateInvoker,
    gcm_node_id: &str,
) -> Result<GcmResult, OrchestratorError> {
    let mut statuses: HashMap<String, DelegateStatus> = delegates
        .iter()
        .map(|d| {
            (
                d.name.clone(),
                DelegateStatus { iterations: 0, max_iterations: settings.max_rounds, completed: false },
            )
        })
        .collect();
    let by_name: BTreeMap<String, &DelegateHandle> = delegates.iter().map(|d| (d.name.clone(), d)).collect();

    let mut conversation_log: Vec<String> = Vec::new();
    let mut total_iterations = 0u32;
    let mut delegate_outcomes: Vec<Value> = Vec::new();

    'rounds: for round in 0..settings.max_rounds {
        let mut processed_this_round = 0usize;

        let pending: Vec<String> = delegates
            .iter()
            .map(|d| d.name.clone())
            .filter(|name| {
                let status = &statuses[name];
                !(status.completed && status.iterations > 0)
            })
            .collect();

        let futures = pending.iter().map(|name| {
            let delegate = by_name[name];
            let iteration = statuses[name].iterations + 1;
            let prompt = delegate_prompt(delegate, aggregated, &conversation_log, iteration);
            async move {
                let outcome = invoker
                    .invoke(&delegate.node_id, &prompt, settings.temperature, settings.delegation_timeout, settings.max_delegation_retries)
                    .await;
                (name.clone(), outcome)
            }
        });
        let results = futures::future::join_all(futures).await;

        for (name, outcome) in results {
            processed_this_round += 1;
            let response_text = if outcome.success && !outcome.response.trim().is_empty() {
                outcome.response.clone()
            } else if outcome.success {
                format!("I am {name} and I have processed the input. No specific output generated.")
            } else {
                format!("ERROR: Delegate execution failed: {}", outcome.error.clone().unwrap_or_default())
            };

            conversation_log.push(format!("[Round {}] {name}: {response_text}", round + 1));
            delegate_outcomes.push(serde_json::json!({
                "round": round + 1,
                "delegate": name,
                "response": response_text,
                "success": outcome.success,
                "retry_count": outcome.retry_count,
            }));

            let status = statuses.get_mut(&name).expect("status tracked for every delegate");
            let is_error = response_text.starts_with("ERROR:");
            status.iterations += 1;
            total_iterations += 1;

            let mut terminated = is_error;
            if let Some(condition) = &settings.termination_condition {
                if !condition.is_empty() && response_text.trim().ends_with(condition.as_str()) {
                    terminated = true;
                }
            }
            if status.iterations >= status.max_iterations {
                terminated = true;
            }
            if terminated {
                status.completed = true;
            }

            if check_termination_strategy(&statuses, settings.termination_strategy) {
                info!(manager = %manager_name, "termination strategy triggered mid-round");
                break 'rounds;
            }
        }

        if processed_this_round == 0 {
            let all_completed = statuses.values().all(|s| s.completed && s.iterations > 0);
            if all_completed {
                break;
            }
            warn!(manager = %manager_name, round = round + 1, "no delegates processed this round but not all complete");
        }

        if check_termination_strategy(&statuses, settings.termination_strategy) {
            break;
        }
    }

    if conversation_log.is_empty() {
        return Err(OrchestratorError::Configuration(format!(
            "GroupChatManager '{manager_name}' completed execution but no delegate conversations were generated"
        )));
    }

    let final_prompt = format!(
        "You are the Group Chat Manager named {manager_name}.\n\n\
         You have coordinated delegate responses across {rounds} round(s).\n\n\
         {formatted_context}\n\n\
         Delegate Conversation Log:\n{log}\n\n\
         Based on the input and delegate conversations, provide a comprehensive summary and final output.",
        rounds = settings.max_rounds,
        formatted_context = aggregated.formatted_context,
        log = conversation_log.join("; "),
    );

    let synthesis = invoker
        .invoke(gcm_node_id, &final_prompt, settings.temperature, settings.delegation_timeout, 0)
        .await;
    if !synthesis.success {
        return Err(OrchestratorError::LlmPermanent(format!(
            "GroupChatManager final synthesis failed: {}",
            synthesis.error.unwrap_or_default()
        )));
    }

    let output = format!(
        "GroupChatManager Summary (processed {total_iterations} delegate iterations):\n\n\
         {synthesis_text}\n\n\
         Input Summary:\n{input_summary}\n\n\
         Delegate Processing Summary:\n{delegate_summary}",
        synthesis_text = synthesis.response.trim(),
        input_summary = aggregated.input_summary,
        delegate_summary = delegate_summary(&statuses),
    );

    Ok(GcmResult {
        output,
        transcript: serde_json::json!({
            "mode": "round_robin",
            "total_iterations": total_iterations,
            "conversation_log": conversation_log,
            "delegate_outcomes": delegate_outcomes,
        }),
    })
}

async fn run_intelligent(
    manager_name: &str,
    settings: &GcmSettings,
    delegates: &[DelegateHandle],
    aggregated: &AggregatedContext,
    invoker: &dyn DelegateInvoker,
    gcm_node_id: &str,
) -> Result<GcmResult, OrchestratorError> {
    let settings = settings.forced_for_intelligent();
    let descriptions: BTreeMap<String, String> = delegates
        .iter()
        .map(|d| {
            let desc = if !d.description.is_empty() {
                d.description.clone()
            } else if !d.system_message.is_empty() {
                d.system_message.clone()
            } else {
                format!("{} is a specialized delegate agent.", d.name)
            };
            (d.name.clone(), desc)
        })
        .collect();
    let by_name: BTreeMap<String, &DelegateHandle> = delegates.iter().map(|d| (d.name.clone(), d)).collect();

    // Dummy delegate-call LLM provider: query-analysis itself runs through
    // the GCM node's own synthesis channel so it shares credentials/config
    // with final synthesis, via the invoker's `invoke` boundary adapted to
    // `llm::LlmProvider`.
    let llm = InvokerAsLlmProvider { invoker, node_id: gcm_node_id.to_string() };

    let subqueries = match query_analysis::split_query(
        &aggregated.combined_text,
        &descriptions,
        &llm,
        settings.max_subqueries,
    )
    .await
    {
        Ok(subqueries) if !subqueries.is_empty() => subqueries,
        _ => vec![query_analysis::Subquery {
            subquery_id: "fallback_0".to_string(),
            query: aggregated.combined_text.clone(),
            priority: query_analysis::SubqueryPriority::Medium,
            dependencies: Vec::new(),
            suggested_delegates: descriptions.keys().cloned().collect(),
            index: 0,
        }],
    };

    let matches = futures::future::join_all(subqueries.iter().map(|sq| {
        let descriptions = &descriptions;
        let llm = &llm;
        async move {
            match query_analysis::match_delegate(&sq.query, descriptions, llm, settings.confidence_threshold).await {
                Ok(m) => m,
                Err(e) => query_analysis::DelegateMatch {
                    assigned_delegates: descriptions.keys().cloned().collect(),
                    confidence: 0.5,
                    reasoning: format!("matching failed: {e}"),
                },
            }
        }
    }))
    .await;

    let levels = schedule_by_dependency(&subqueries);

    let mut total_delegations = 0u32;
    let mut successful = 0u32;
    let mut failed = 0u32;
    let mut per_subquery: Vec<Value> = Vec::new();

    for (level_idx, level) in levels.iter().enumerate() {
        let iteration = level_idx as u32 + 1;
        let dispatches = level.iter().map(|&idx| {
            let subquery = &subqueries[idx];
            let assigned = &matches[idx].assigned_delegates;
            let confidence = matches[idx].confidence;
            let related_subqueries: Vec<String> = subqueries
                .iter()
                .filter(|other| other.subquery_id != subquery.subquery_id)
                .map(|other| other.subquery_id.clone())
                .collect();
            let delegation = Message::delegation(
                subquery.subquery_id.clone(),
                subquery.query.clone(),
                protocol_priority(subquery.priority),
                aggregated.combined_text.clone(),
                related_subqueries,
                iteration,
                confidence,
            );
            let prompt = protocol::format_for_delegate(&delegation);
            let by_name = &by_name;
            async move {
                let calls = assigned.iter().filter_map(|name| by_name.get(name)).map(|delegate| {
                    let prompt = prompt.clone();
                    async move {
                        let outcome = invoker
                            .invoke(&delegate.node_id, &prompt, settings.temperature, settings.delegation_timeout, settings.max_delegation_retries)
                            .await;
                        (delegate.name.clone(), outcome)
                    }
                });
                let results = futures::future::join_all(calls).await;
                (subquery.subquery_id.clone(), results)
            }
        });
        let level_results = futures::future::join_all(dispatches).await;

        for (subquery_id, results) in level_results {
            let mut delegate_responses = serde_json::Map::new();
            for (name, outcome) in results {
                total_delegations += 1;
                if outcome.success {
                    successful += 1;
                } else {
                    failed += 1;
                }
                delegate_responses.insert(
                    name,
                    serde_json::json!({
                        "response": outcome.response,
                        "success": outcome.success,
                        "retry_count": outcome.retry_count,
                        "confidence": outcome.confidence,
                    }),
                );
            }
            per_subquery.push(serde_json::json!({
                "subquery_id": subquery_id,
                "responses": Value::Object(delegate_responses),
            }));
        }
    }

    if per_subquery.is_empty() {
        return Err(OrchestratorError::Configuration(format!(
            "GroupChatManager '{manager_name}' completed intelligent delegation with no subquery results"
        )));
    }

    let transcript_text = per_subquery
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("\n");
    let final_prompt = format!(
        "You are the Group Chat Manager named {manager_name}.\n\n\
         You split the input into {n} subqueries and dispatched them to delegates via intelligent matching.\n\n\
         {formatted_context}\n\n\
         Subquery Results:\n{transcript_text}\n\n\
         Synthesize these results into a single comprehensive final output.",
        n = subqueries.len(),
        formatted_context = aggregated.formatted_context,
    );

    let synthesis = invoker
        .invoke(gcm_node_id, &final_prompt, settings.temperature, settings.delegation_timeout, 0)
        .await;
    if !synthesis.success {
        return Err(OrchestratorError::LlmPermanent(format!(
            "GroupChatManager final synthesis failed: {}",
            synthesis.error.unwrap_or_default()
        )));
    }

    let success_rate = if total_delegations == 0 { 0.0 } else { successful as f64 / total_delegations as f64 };
    let output = format!(
        "GroupChatManager Intelligent Delegation Summary ({subquery_count} subqueries, {total_delegations} delegations, {success_rate:.0}% success):\n\n\
         {synthesis_text}",
        subquery_count = subqueries.len(),
        synthesis_text = synthesis.response.trim(),
        success_rate = success_rate * 100.0,
    );

    Ok(GcmResult {
        output,
        transcript: serde_json::json!({
            "mode": "intelligent",
            "total_delegations": total_delegations,
            "successful_delegations": successful,
            "failed_delegations": failed,
            "subqueries": per_subquery,
        }),
    })
}

/// Group subquery indices into dependency levels via Kahn's algorithm on
/// `subquery.dependencies`. A cycle (no remaining subquery has all its
/// dependencies satisfied) is logged and the remainder is dumped into one
/// final level to run in arbitrary order, rather than deadlocking.
fn schedule_by_dependency(subqueries: &[query_analysis::Subquery]) -> Vec<Vec<usize>> {
    let mut remaining: Vec<usize> = (0..subqueries.len()).collect();
    let mut done: std::collections::HashSet<usize> = std::collections::HashSet::new();
    let mut levels = Vec::new();

    while !remaining.is_empty() {
        let (ready, rest): (Vec<usize>, Vec<usize>) = remaining.iter().partition(|&&idx| {
            subqueries[idx].dependencies.iter().all(|dep| done.contains(dep))
        });

        if ready.is_empty() {
            warn!("dependency cycle detected among subqueries; running remainder in arbitrary order");
            levels.push(rest.clone());
            break;
        }

        for &idx in &ready {
            done.insert(idx);
        }
        levels.push(ready);
        remaining = rest;
    }

    levels
}

/// Adapts a [`DelegateInvoker`] (keyed on a node id) to [`llm::LlmProvider`]
/// so [`query_analysis`]'s functions - which only know about `LlmProvider` -
/// can run their split/match calls through the GCM node's own credentials
/// without query_analysis needing to know about node ids at all.
struct InvokerAsLlmProvider<'a> {
    invoker: &'a dyn DelegateInvoker,
    node_id: String,
}

#[async_trait]
impl<'a> llm::LlmProvider for InvokerAsLlmProvider<'a> {
    async fn generate(&self, prompt: &str, temperature: f32, _max_tokens: u32) -> llm::Result<llm::GenerateResponse> {
        let outcome = self
            .invoker
            .invoke(&self.node_id, prompt, temperature, Duration::from_secs(30), 0)
            .await;
        if outcome.success {
            Ok(llm::GenerateResponse::ok(outcome.response, None, 0))
        } else {
            Ok(llm::GenerateResponse::failed(outcome.error.unwrap_or_default(), 0))
        }
    }

    fn provider_name(&self) -> &str {
        "gcm-query-analysis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedInvoker {
        responses: Mutex<HashMap<String, Vec<String>>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DelegateInvoker for ScriptedInvoker {
        async fn invoke(&self, node_id: &str, _prompt: &str, _t: f32, _timeout: Duration, _retries: usize) -> DelegateOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            let text = responses.get_mut(node_id).and_then(|v| if v.is_empty() { None } else { Some(v.remove(0)) });
            match text {
                Some(text) => DelegateOutcome { success: true, response: text, status: "completed".into(), confidence: 1.0, retry_count: 0, error: None },
                None => DelegateOutcome { success: true, response: "default response ends_now".into(), status: "completed".into(), confidence: 1.0, retry_count: 0, error: None },
            }
        }
    }

    fn delegate(id: &str, name: &str) -> DelegateHandle {
        DelegateHandle { node_id: id.into(), name: name.into(), system_message: "help".into(), description: "a helper".into() }
    }

    fn aggregated() -> AggregatedContext {
        AggregatedContext {
            input_count: 1,
            primary_input: "do the thing".into(),
            secondary_inputs: vec![],
            input_summary: "1 input source processed".into(),
            combined_text: "do the thing".into(),
            formatted_context: "[Input 1] User: do the thing".into(),
        }
    }

    #[tokio::test]
    async fn round_robin_runs_each_delegate_once_for_one_round() {
        let mut responses = HashMap::new();
        responses.insert("d1".to_string(), vec!["D1 says hi ends_now".to_string()]);
        responses.insert("d2".to_string(), vec!["D2 says hi ends_now".to_string()]);
        responses.insert("gcm".to_string(), vec!["final synthesis".to_string()]);
        let invoker = ScriptedInvoker { responses: Mutex::new(responses), calls: AtomicUsize::new(0) };

        let settings = GcmSettings {
            delegation_mode: DelegationMode::RoundRobin,
            max_rounds: 1,
            termination_condition: Some("ends_now".to_string()),
            termination_strategy: TerminationStrategy::AllDelegatesComplete,
            confidence_threshold: 0.7,
            delegation_timeout: Duration::from_secs(5),
            max_delegation_retries: 0,
            max_subqueries: None,
            temperature: 0.5,
        };
        let delegates = vec![delegate("d1", "D1"), delegate("d2", "D2")];
        let result = run("Manager", &settings, &delegates, &aggregated(), &invoker, "gcm").await.unwrap();
        assert!(result.output.contains("final synthesis"));
        assert_eq!(result.transcript["conversation_log"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rejects_a_gcm_with_no_delegates() {
        let settings = GcmSettings::from_node_config(&NodeConfig::default());
        let invoker = ScriptedInvoker { responses: Mutex::new(HashMap::new()), calls: AtomicUsize::new(0) };
        let err = run("Manager", &settings, &[], &aggregated(), &invoker, "gcm").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }

    #[test]
    fn settings_prefer_node_max_iterations_over_max_rounds() {
        let data = NodeConfig { max_iterations: Some(2), max_rounds: Some(10), ..Default::default() };
        let settings = GcmSettings::from_node_config(&data);
        assert_eq!(settings.max_rounds, 2);
    }

    #[test]
    fn intelligent_forces_single_round_and_all_complete_strategy() {
        let data = NodeConfig {
            delegation_mode: Some("intelligent".to_string()),
            max_rounds: Some(5),
            termination_strategy: Some("any_delegate_complete".to_string()),
            ..Default::default()
        };
        let settings = GcmSettings::from_node_config(&data).forced_for_intelligent();
        assert_eq!(settings.max_rounds, 1);
        assert_eq!(settings.termination_strategy, TerminationStrategy::AllDelegatesComplete);
    }

    #[test]
    fn schedules_subqueries_into_dependency_levels() {
        let subqueries = vec![
            query_analysis::Subquery {
                subquery_id: "0".into(),
                query: "first".into(),
                priority: query_analysis::SubqueryPriority::High,
                dependencies: vec![],
                suggested_delegates: vec![],
                index: 0,
            },
            query_analysis::Subquery {
                subquery_id: "1".into(),
                query: "second".into(),
                priority: query_analysis::SubqueryPriority::Medium,
                dependencies: vec![0],
                suggested_delegates: vec![],
                index: 1,
            },
        ];
        let levels = schedule_by_dependency(&subqueries);
        assert_eq!(levels, vec![vec![0], vec![1]]);
    }

    #[test]
    fn delegate_prompt_carries_the_iteration_number() {
        let prompt = delegate_prompt(&delegate("d1", "D1"), &aggregated(), &[], 3);
        assert!(prompt.contains("Iteration: 3"));
    }

    #[test]
    fn protocol_priority_maps_subquery_priority_one_to_one() {
        assert_eq!(protocol_priority(query_analysis::SubqueryPriority::High), protocol::Priority::High);
        assert_eq!(protocol_priority(query_analysis::SubqueryPriority::Medium), protocol::Priority::Medium);
        assert_eq!(protocol_priority(query_analysis::SubqueryPriority::Low), protocol::Priority::Low);
    }
}
