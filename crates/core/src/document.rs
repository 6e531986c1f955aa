use serde::{Deserialize, Serialize};

use crate::normalize::normalize_text;

/// A source text plus the identifier chunk ids are derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub source: String,
    pub text: String,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }

    /// Builds a document whose text has been passed through [`normalize_text`].
    pub fn normalized(source: impl Into<String>, text: &str) -> Self {
        Self::new(source, normalize_text(text))
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
