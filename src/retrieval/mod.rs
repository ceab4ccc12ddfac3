//! Retrieval pre-processing
//!
//! An `Executor` runs before an agent turn and may append context to the
//! incoming messages. `KeywordRetriever` is the minimal RAG step: when the last
//! message mentions a known keyword the matching document is appended as a
//! system message, otherwise a fixed "not found" marker is.
//!
//! Executors never call a model. Whether the agent refuses to answer without a
//! document is decided by its instructions.

use tracing::debug;

use crate::items::Message;
use crate::recipes;

/// Marker appended when no document matched.
pub const NO_RECIPE_PROVIDED: &str = "No recipe provided";

/// Message transformer run ahead of an agent.
pub trait Executor: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn process(&self, messages: Vec<Message>) -> Vec<Message>;
}

#[derive(Debug, Clone)]
struct Document {
    keywords: Vec<String>,
    text: String,
}

/// Case-insensitive keyword lookup over a fixed set of documents.
#[derive(Debug, Clone)]
pub struct KeywordRetriever {
    name: String,
    documents: Vec<Document>,
    not_found: String,
}

impl KeywordRetriever {
    pub fn new(name: impl Into<String>, not_found: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: Vec::new(),
            not_found: not_found.into(),
        }
    }

    /// The ragù lookup used by the `rag` workflow.
    pub fn recipes() -> Self {
        Self::new("rag_executor", NO_RECIPE_PROVIDED).document(["ragu", "ragù"], recipes::RAGU)
    }

    pub fn document<I, K>(mut self, keywords: I, text: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.documents.push(Document {
            keywords: keywords.into_iter().map(|k| k.into().to_lowercase()).collect(),
            text: text.into(),
        });
        self
    }

    fn lookup(&self, text: &str) -> Option<&Document> {
        let text = text.to_lowercase();
        self.documents
            .iter()
            .find(|d| d.keywords.iter().any(|k| text.contains(k.as_str())))
    }
}

impl Executor for KeywordRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, mut messages: Vec<Message>) -> Vec<Message> {
        let found = messages
            .last()
            .and_then(|m| self.lookup(&m.content))
            .map(|d| d.text.clone());
        debug!(executor = %self.name, found = found.is_some(), "retrieval");
        messages.push(Message::system(found.unwrap_or_else(|| self.not_found.clone())));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::Role;

    #[test]
    fn ragu_in_any_case_appends_the_recipe() {
        let retriever = KeywordRetriever::recipes();
        for prompt in ["How do I make ragu?", "RAGU please", "classic Ragù"] {
            let out = retriever.process(vec![Message::user(prompt)]);
            assert_eq!(out.len(), 2);
            assert_eq!(out[1].role, Role::System);
            assert_eq!(out[1].content, recipes::RAGU);
        }
    }

    #[test]
    fn anything_else_gets_the_marker() {
        let out = KeywordRetriever::recipes().process(vec![Message::user("pancakes?")]);
        assert_eq!(out.last().unwrap(), &Message::system(NO_RECIPE_PROVIDED));
    }

    #[test]
    fn only_the_last_message_is_inspected() {
        let out = KeywordRetriever::recipes().process(vec![
            Message::user("ragu"),
            Message::assistant("which one?"),
            Message::user("never mind, soup"),
        ]);
        assert_eq!(out.last().unwrap().content, NO_RECIPE_PROVIDED);
    }

    #[test]
    fn empty_input_gets_the_marker() {
        let out = KeywordRetriever::recipes().process(vec![]);
        assert_eq!(out, vec![Message::system(NO_RECIPE_PROVIDED)]);
    }
}
