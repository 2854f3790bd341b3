//! Document-retrieval integration for agents with `doc_aware` enabled.
//!
//! The core never talks to a vector store directly - it calls through
//! [`DocAwareSearch`], formats whatever comes back into prompt text, and
//! moves on. A search failure degrades the prompt (a short notice is
//! substituted for document context) rather than failing the node, since a
//! missing citation is not a reason to abort an otherwise-answerable query.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One document chunk returned by a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub content: String,
    pub score: f64,
    pub source: String,
    #[serde(default)]
    pub page: Option<u32>,
}

/// The document-retrieval boundary. A concrete implementation wraps
/// whatever vector/keyword search backend a deployment uses; the core only
/// needs query, method, parameters, content filters, and the conversation
/// context a contextual search method might use.
#[async_trait]
pub trait DocAwareSearch: Send + Sync {
    async fn search(
        &self,
        project_id: &str,
        query: &str,
        search_method: &str,
        search_parameters: &serde_json::Value,
        conversation_context: &str,
        content_filters: &[String],
    ) -> Result<Vec<SearchResult>, String>;
}

const MAX_RESULTS: usize = 5;
const CONTENT_TRUNCATE_AT: usize = 400;

/// Whether an agent's config enables document retrieval at all - both
/// `doc_aware` and a non-empty `search_method` are required.
pub fn is_docaware_enabled(doc_aware: bool, search_method: Option<&str>) -> bool {
    doc_aware && search_method.is_some_and(|m| !m.is_empty())
}

/// Split a `content_filters` list into a folder-prefix OR clause. Each
/// filter is either `folder_<path>` (prefix match against a document's
/// folder path) or `file_<document_id>` (exact match against one document);
/// multiple filters combine with OR - a document need only satisfy one.
pub fn matches_content_filters(filters: &[String], doc_folder_path: &str, doc_id: &str) -> bool {
    if filters.is_empty() {
        return true;
    }
    filters.iter().any(|filter| {
        if let Some(folder) = filter.strip_prefix("folder_") {
            doc_folder_path.starts_with(folder)
        } else if let Some(id) = filter.strip_prefix("file_") {
            doc_id == id
        } else {
            false
        }
    })
}

/// Run a document search and render the results into prompt text. Returns
/// an empty string (not an error) when nothing relevant is found, and a
/// short `⚠️`-prefixed notice in place of document context when the backend
/// itself fails - either way the caller gets a string safe to splice
/// straight into a prompt.
pub async fn retrieve_context(
    search: &dyn DocAwareSearch,
    project_id: &str,
    query: &str,
    search_method: &str,
    search_parameters: &serde_json::Value,
    conversation_context: &str,
    content_filters: &[String],
) -> String {
    let results = match search
        .search(project_id, query, search_method, search_parameters, conversation_context, content_filters)
        .await
    {
        Ok(results) => results,
        Err(err) => return format!("⚠️ Document search failed: {err}"),
    };

    if results.is_empty() {
        return String::new();
    }

    format_results(&results, search_method)
}

fn format_results(results: &[SearchResult], search_method: &str) -> String {
    let mut parts = Vec::new();
    parts.push(format!(
        "Found {} relevant documents based on conversation context:\n",
        results.len()
    ));

    for (i, result) in results.iter().take(MAX_RESULTS).enumerate() {
        let content = if result.content.len() > CONTENT_TRUNCATE_AT {
            format!("{}... [content truncated]", &result.content[..CONTENT_TRUNCATE_AT])
        } else {
            result.content.clone()
        };

        parts.push(format!("📄 Document {} (Relevance: {:.3}):", i + 1, result.score));
        parts.push(format!("   Source: {}", result.source));
        if let Some(page) = result.page {
            parts.push(format!("   Page: {page}"));
        }
        parts.push(format!("   Content: {content}"));
        parts.push(String::new());
    }

    parts.push(format!("Search performed using: {search_method}"));
    parts.push("Query derived from conversation history".to_string());

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(content: &str, score: f64) -> SearchResult {
        SearchResult { content: content.to_string(), score, source: "doc.pdf".to_string(), page: Some(3) }
    }

    #[test]
    fn docaware_requires_both_flag_and_method() {
        assert!(is_docaware_enabled(true, Some("semantic_search")));
        assert!(!is_docaware_enabled(true, None));
        assert!(!is_docaware_enabled(true, Some("")));
        assert!(!is_docaware_enabled(false, Some("semantic_search")));
    }

    #[test]
    fn folder_filter_matches_by_prefix() {
        let filters = vec!["folder_reports/q4".to_string()];
        assert!(matches_content_filters(&filters, "reports/q4/summary", "doc-1"));
        assert!(!matches_content_filters(&filters, "reports/q1/summary", "doc-1"));
    }

    #[test]
    fn file_filter_matches_exact_id() {
        let filters = vec!["file_doc-42".to_string()];
        assert!(matches_content_filters(&filters, "any/path", "doc-42"));
        assert!(!matches_content_filters(&filters, "any/path", "doc-43"));
    }

    #[test]
    fn multiple_filters_combine_with_or() {
        let filters = vec!["file_doc-1".to_string(), "folder_reports".to_string()];
        assert!(matches_content_filters(&filters, "reports/x", "doc-99"));
        assert!(matches_content_filters(&filters, "other/x", "doc-1"));
        assert!(!matches_content_filters(&filters, "other/x", "doc-99"));
    }

    #[test]
    fn formats_top_five_results_with_truncation() {
        let long_content = "x".repeat(500);
        let results: Vec<SearchResult> = (0..7).map(|i| result(&long_content, 0.9 - i as f64 * 0.01)).collect();
        let text = format_results(&results, "semantic_search");
        assert_eq!(text.matches("📄 Document").count(), 5);
        assert!(text.contains("[content truncated]"));
        assert!(text.contains("Search performed using: semantic_search"));
    }

    #[test]
    fn short_content_is_not_truncated() {
        let results = vec![result("short", 0.5)];
        let text = format_results(&results, "keyword_search");
        assert!(text.contains("Content: short"));
        assert!(!text.contains("truncated"));
    }
}
