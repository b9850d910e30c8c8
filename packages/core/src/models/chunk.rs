//! Chunk bookkeeping types
//!
//! A large file arrives as `n` chunks. Each stored chunk is tracked as a token
//! `"{blobName}_{index}"` (1-based index) under the group key
//! `"{tenant}_{wholeFileHash}"`. Once all `n` tokens are present the producer
//! publishes a [`MergeMessage`] carrying the tokens in index order.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

const TOKEN_PATTERN: &str = r"^(.+)_(\d+)$";

fn token_regex() -> Option<&'static Regex> {
    static TOKEN_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    TOKEN_REGEX
        .get_or_init(|| Regex::new(TOKEN_PATTERN).ok())
        .as_ref()
}

/// Key of one logical upload in the chunk tracker.
pub fn group_key(tenant: &str, file_hash: &str) -> String {
    format!("{}_{}", tenant, file_hash)
}

/// A parsed `"{blobName}_{index}"` token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkToken {
    pub blob_name: String,
    pub index: u32,
}

impl ChunkToken {
    pub fn new(blob_name: impl Into<String>, index: u32) -> Self {
        Self {
            blob_name: blob_name.into(),
            index,
        }
    }

    /// Parse a raw token. Index 0 and non-numeric suffixes yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let captures = token_regex()?.captures(raw)?;
        let index: u32 = captures.get(2)?.as_str().parse().ok()?;
        if index == 0 {
            return None;
        }
        Some(Self {
            blob_name: captures.get(1)?.as_str().to_string(),
            index,
        })
    }

    pub fn token(&self) -> String {
        format!("{}_{}", self.blob_name, self.index)
    }
}

/// Tokens sorted by index, plus the raw tokens that could not be parsed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedChunks {
    pub tokens: Vec<ChunkToken>,
    pub rejected: Vec<String>,
}

impl OrderedChunks {
    /// Raw token strings in index order
    pub fn raw(&self) -> Vec<String> {
        self.tokens.iter().map(ChunkToken::token).collect()
    }

    /// Check that the indices form exactly `1..=n` with nothing rejected.
    pub fn validate(&self) -> Result<(), String> {
        if !self.rejected.is_empty() {
            return Err(format!("unparsable chunk tokens: {:?}", self.rejected));
        }
        if self.tokens.is_empty() {
            return Err("empty chunk list".to_string());
        }

        let mut seen = BTreeSet::new();
        for token in &self.tokens {
            if !seen.insert(token.index) {
                return Err(format!("duplicate chunk index {}", token.index));
            }
        }
        for (expected, token) in (1u32..).zip(&self.tokens) {
            if token.index != expected {
                return Err(format!("missing chunk index {}", expected));
            }
        }
        Ok(())
    }
}

/// Parse and stably sort raw tokens by index.
pub fn order_chunk_tokens<S: AsRef<str>>(raw: &[S]) -> OrderedChunks {
    let mut ordered = OrderedChunks::default();
    for token in raw {
        match ChunkToken::parse(token.as_ref()) {
            Some(parsed) => ordered.tokens.push(parsed),
            None => ordered.rejected.push(token.as_ref().to_string()),
        }
    }
    ordered.tokens.sort_by_key(|t| t.index);
    ordered
}

/// Body of a merge work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeMessage {
    pub tenant: String,
    /// Chunk tokens in index order
    pub chunks: Vec<String>,
    pub final_blob_name: String,
    pub content_type: String,
    pub target_path: String,
    pub relative_path: String,
    pub display_name: String,
    pub file_hash: String,
    pub declared_size: u64,
}
