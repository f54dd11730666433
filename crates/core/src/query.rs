//! The inbound chat query.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::message::{Message, Role};

/// A user question plus the mode it should be answered in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatQuery {
    /// The question. Must not be blank.
    pub query: String,

    /// `false` answers strictly from the knowledge base; `true` allows the
    /// model's general knowledge when retrieval confidence is low.
    #[serde(rename = "useGeneralLLM", default)]
    pub use_general_llm: bool,

    /// Earlier turns, oldest first. Accepted and validated but not yet used
    /// when building prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_history: Option<Vec<Message>>,
}

/// Why a query was rejected before reaching the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("conversation history entry {index} has unsupported role '{role}'")]
    InvalidHistoryRole { index: usize, role: String },
}

impl ChatQuery {
    /// Create a query with no history.
    pub fn new(query: impl Into<String>, use_general_llm: bool) -> Self {
        Self {
            query: query.into(),
            use_general_llm,
            conversation_history: None,
        }
    }

    /// Check the query shape.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.query.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        for (index, msg) in self.conversation_history.iter().flatten().enumerate() {
            if msg.role == Role::System {
                return Err(QueryError::InvalidHistoryRole {
                    index,
                    role: "system".into(),
                });
            }
        }

        Ok(())
    }

    /// Number of history turns supplied.
    pub fn history_len(&self) -> usize {
        self.conversation_history.as_ref().map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_payload() {
        let json = r#"{
            "query": "What is the price of the Pro plan?",
            "useGeneralLLM": true,
            "conversationHistory": [{"role": "user", "content": "hi"}]
        }"#;
        let q: ChatQuery = serde_json::from_str(json).unwrap();
        assert!(q.use_general_llm);
        assert_eq!(q.history_len(), 1);
        assert!(q.validate().is_ok());
    }

    #[test]
    fn blank_query_rejected() {
        assert_eq!(ChatQuery::new("   ", false).validate(), Err(QueryError::EmptyQuery));
    }

    #[test]
    fn system_role_in_history_rejected() {
        let mut q = ChatQuery::new("hello", false);
        q.conversation_history = Some(vec![Message::user("a"), Message::system("b")]);
        assert_eq!(
            q.validate(),
            Err(QueryError::InvalidHistoryRole {
                index: 1,
                role: "system".into()
            })
        );
    }

    #[test]
    fn use_general_llm_defaults_to_false() {
        let q: ChatQuery = serde_json::from_str(r#"{"query":"x"}"#).unwrap();
        assert!(!q.use_general_llm);
        assert!(q.conversation_history.is_none());
    }
}
