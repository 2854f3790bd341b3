//! Splits a GCM's input into subqueries and matches each one to delegates.
//!
//! Both [`split_query`] and [`match_delegate`] ask an LLM for a JSON answer
//! and fall back to a conservative default whenever that answer can't be
//! trusted - an LLM-reported error, malformed JSON, or (for matching) a
//! confidence below threshold. The fallback differs by failure kind:
//! LLM-level failures use a fixed confidence of 0.5, while a parsed-but-low
//! confidence result keeps the model's own confidence value in the
//! broadcast it falls back to, so callers can still see how unsure the
//! model was.

use std::collections::BTreeMap;

use llm::LlmProvider;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OrchestratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubqueryPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subquery {
    pub subquery_id: String,
    pub query: String,
    pub priority: SubqueryPriority,
    #[serde(default)]
    pub dependencies: Vec<usize>,
    #[serde(default)]
    pub suggested_delegates: Vec<String>,
    pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateMatch {
    pub assigned_delegates: Vec<String>,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Deserialize)]
struct RawSubquery {
    #[serde(default)]
    query: String,
    #[serde(default = "default_priority")]
    priority: String,
    #[serde(default)]
    dependencies: Vec<usize>,
    #[serde(default)]
    suggested_delegates: Vec<String>,
}

fn default_priority() -> String {
    "medium".to_string()
}

fn parse_priority(raw: &str) -> SubqueryPriority {
    match raw.to_lowercase().as_str() {
        "high" => SubqueryPriority::High,
        "low" => SubqueryPriority::Low,
        _ => SubqueryPriority::Medium,
    }
}

fn single_subquery_fallback(input_text: &str, delegate_names: &[String]) -> Vec<Subquery> {
    vec![Subquery {
        subquery_id: Uuid::new_v4().to_string(),
        query: input_text.to_string(),
        priority: SubqueryPriority::Medium,
        dependencies: Vec::new(),
        suggested_delegates: delegate_names.to_vec(),
        index: 0,
    }]
}

fn delegate_descriptions_block(delegate_descriptions: &BTreeMap<String, String>) -> String {
    delegate_descriptions
        .iter()
        .map(|(name, desc)| format!("- {name}: {desc}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip a ```json fenced block (or a bare ```-fenced one) from an LLM
/// completion, falling back to a raw `[`/`]` or `{`/`}` scan when no fence
/// is present - LLMs asked for "only JSON" still often wrap it in prose or
/// markdown.
fn extract_json_block(text: &str, open: char, close: char) -> String {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim().to_string();
        }
        return rest.trim().to_string();
    }
    if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
        if end >= start {
            return text[start..=end].to_string();
        }
    }
    text.to_string()
}

/// Split `input_text` into subqueries using `llm_provider`, assigning each a
/// priority and candidate delegates. Returns a single synthetic subquery
/// (assignable to every delegate) on empty input, an empty delegate set, an
/// LLM-reported error, or any JSON parsing failure - the caller always gets
/// at least something schedulable rather than a hard error, matching how a
/// failed split must not abort an otherwise-runnable workflow.
pub async fn split_query(
    input_text: &str,
    delegate_descriptions: &BTreeMap<String, String>,
    llm_provider: &dyn LlmProvider,
    max_subqueries: Option<usize>,
) -> Result<Vec<Subquery>, OrchestratorError> {
    if input_text.trim().is_empty() || delegate_descriptions.is_empty() {
        return Ok(Vec::new());
    }

    let delegate_names: Vec<String> = delegate_descriptions.keys().cloned().collect();
    let prompt = format!(
        "You are a task analysis system. Given an input query and available delegate agents, \
         analyze the query and split it into meaningful, actionable subqueries.\n\n\
         Input Query: {input_text}\n\n\
         Available Delegates:\n{delegates}\n\n\
         Instructions:\n\
         1. Identify distinct, actionable subqueries within the input\n\
         2. Each subquery should be specific and assignable to a delegate\n\
         3. Maintain context and relationships between subqueries\n\
         4. Prioritize subqueries (high/medium/low) based on importance\n\
         5. Identify dependencies between subqueries if any\n\
         6. Suggest which delegate(s) might handle each subquery based on their descriptions\n\n\
         Return a JSON array of subqueries. Each subquery should have:\n\
         - query: the subquery text (string)\n\
         - priority: \"high\", \"medium\", or \"low\"\n\
         - dependencies: indices of other subqueries this depends on (array of integers)\n\
         - suggested_delegates: delegate names that might handle this (array of strings)\n\n\
         Return ONLY the JSON array, no additional text or explanation.",
        delegates = delegate_descriptions_block(delegate_descriptions),
    );

    let response = llm_provider.generate(&prompt, 0.3, 2000).await?;
    if response.is_failure() {
        return Ok(single_subquery_fallback(input_text, &delegate_names));
    }

    let json_text = extract_json_block(&response.text, '[', ']');
    let raw: Vec<RawSubquery> = match serde_json::from_str(&json_text) {
        Ok(parsed) => parsed,
        Err(_) => return Ok(single_subquery_fallback(input_text, &delegate_names)),
    };

    let mut subqueries: Vec<Subquery> = raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, sq)| {
            let query = sq.query.trim().to_string();
            if query.is_empty() {
                return None;
            }
            Some(Subquery {
                subquery_id: Uuid::new_v4().to_string(),
                query,
                priority: parse_priority(&sq.priority),
                dependencies: sq.dependencies,
                suggested_delegates: sq.suggested_delegates,
                index,
            })
        })
        .collect();

    if let Some(max) = max_subqueries {
        if max > 0 && subqueries.len() > max {
            subqueries.sort_by_key(|sq| match sq.priority {
                SubqueryPriority::High => 0,
                SubqueryPriority::Medium => 1,
                SubqueryPriority::Low => 2,
            });
            subqueries.truncate(max);
        }
    }

    Ok(subqueries)
}

/// Match a single subquery to the delegate(s) that should handle it.
///
/// Three distinct "give up and broadcast" paths exist, mirroring the
/// original service's behavior exactly:
/// - an LLM-reported error, or a JSON body that fails to parse, broadcasts
///   to every delegate at a flat confidence of 0.5;
/// - a response that parses fine but assigns no valid delegate name (or
///   whose delegate names aren't in `delegate_descriptions`) or whose
///   confidence falls below `confidence_threshold` also broadcasts to every
///   delegate, but *keeps the model's own confidence value* rather than
///   resetting it to 0.5, so a caller inspecting the result can tell "the
///   model was genuinely unsure" from "the model's answer couldn't be used
///   at all".
pub async fn match_delegate(
    subquery: &str,
    delegate_descriptions: &BTreeMap<String, String>,
    llm_provider: &dyn LlmProvider,
    confidence_threshold: f64,
) -> Result<DelegateMatch, OrchestratorError> {
    if subquery.trim().is_empty() {
        return Ok(DelegateMatch {
            assigned_delegates: Vec::new(),
            confidence: 0.0,
            reasoning: "Empty subquery provided".to_string(),
        });
    }
    if delegate_descriptions.is_empty() {
        return Ok(DelegateMatch {
            assigned_delegates: Vec::new(),
            confidence: 0.0,
            reasoning: "No delegates available".to_string(),
        });
    }

    let delegate_names: Vec<String> = delegate_descriptions.keys().cloned().collect();
    let broadcast_on_failure = || DelegateMatch {
        assigned_delegates: delegate_names.clone(),
        confidence: 0.5,
        reasoning: "LLM matching failed, broadcasting to all delegates".to_string(),
    };

    let prompt = format!(
        "You are a task routing system. Given a subquery and available delegate agents, \
         determine which delegate(s) should handle this subquery.\n\n\
         Subquery: {subquery}\n\n\
         Available Delegates:\n{delegates}\n\n\
         Instructions:\n\
         1. Analyze the subquery requirements and capabilities needed\n\
         2. Match against delegate capabilities (from their descriptions)\n\
         3. Assign to the best matching delegate(s) - can assign to multiple if collaboration is beneficial\n\
         4. Provide confidence score (0.0-1.0) indicating how well the delegate matches\n\
         5. Provide brief reasoning for the assignment\n\n\
         Return JSON with:\n\
         - assigned_delegates: delegate names (array of strings)\n\
         - confidence: a score between 0.0 and 1.0\n\
         - reasoning: brief explanation\n\n\
         Return ONLY the JSON object, no additional text or explanation.",
        delegates = delegate_descriptions_block(delegate_descriptions),
    );

    let response = llm_provider.generate(&prompt, 0.2, 500).await?;
    if response.is_failure() {
        return Ok(broadcast_on_failure());
    }

    let json_text = extract_json_block(&response.text, '{', '}');
    let raw: serde_json::Value = match serde_json::from_str(&json_text) {
        Ok(value) if value.is_object() => value,
        _ => return Ok(broadcast_on_failure()),
    };

    let assigned: Vec<String> = raw
        .get("assigned_delegates")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let valid_delegates: Vec<String> = assigned
        .into_iter()
        .filter(|name| delegate_descriptions.contains_key(name))
        .collect();

    let confidence = raw
        .get("confidence")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);
    let reasoning = raw
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or("No reasoning provided")
        .to_string();

    if valid_delegates.is_empty() || confidence < confidence_threshold {
        return Ok(DelegateMatch {
            assigned_delegates: delegate_names,
            confidence,
            reasoning: format!(
                "Confidence below threshold or no valid matches. Original reasoning: {reasoning}"
            ),
        });
    }

    Ok(DelegateMatch { assigned_delegates: valid_delegates, confidence, reasoning })
}
