//! Tokenizer capability for decoding token ids to display text
//!
//! The processor never owns a tokenizer; it holds an optional shared
//! capability with a single bulk operation: decode a list of token ids to a
//! same-length, order-preserving list of display strings. When no capability
//! is configured, decoding is skipped entirely and every decoded text is
//! absent.
//!
//! The capability is shared across many per-request processors, so
//! implementations must be safe for concurrent use; each decode call is
//! treated as a pure function.

use std::collections::HashMap;

use crate::error::{RecontarError, Result};

/// Bulk token-id decoder capability
///
/// Implementations must preserve input order and return exactly one string
/// per input id.
pub trait TokenDecoder: Send + Sync {
    /// Decode a list of token ids to display strings
    fn decode_tokens(&self, ids: &[u32]) -> Vec<String>;
}

/// Placeholder emitted for ids outside the vocabulary
pub const UNKNOWN_TOKEN: &str = "<unk>";

/// Vocabulary-backed decoder
///
/// A minimal concrete [`TokenDecoder`] for embedders without a full
/// tokenizer stack, and for tests. Ids outside the vocabulary decode to
/// [`UNKNOWN_TOKEN`] rather than failing, preserving the same-length
/// contract.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    /// ID to token mapping
    id_to_token: HashMap<u32, String>,
}

impl Vocabulary {
    /// Create a vocabulary from a token list
    ///
    /// # Arguments
    ///
    /// * `tokens` - List of tokens in order (index = token ID)
    ///
    /// # Errors
    ///
    /// Returns an error if the list is empty or contains duplicates.
    pub fn from_tokens(tokens: Vec<String>) -> Result<Self> {
        if tokens.is_empty() {
            return Err(RecontarError::InvalidConfig {
                reason: "vocabulary cannot be empty".to_string(),
            });
        }

        let mut id_to_token = HashMap::with_capacity(tokens.len());
        let mut seen = HashMap::with_capacity(tokens.len());

        for (id, token) in tokens.into_iter().enumerate() {
            let id = u32::try_from(id).map_err(|_| RecontarError::InvalidConfig {
                reason: format!("token ID {id} exceeds u32 limit"),
            })?;
            if seen.insert(token.clone(), id).is_some() {
                return Err(RecontarError::InvalidConfig {
                    reason: format!("duplicate token: {token}"),
                });
            }
            id_to_token.insert(id, token);
        }

        Ok(Self { id_to_token })
    }

    /// Get the token for an id, `None` if outside the vocabulary
    #[must_use]
    pub fn get_token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(&id).map(String::as_str)
    }

    /// Vocabulary size
    #[must_use]
    pub fn size(&self) -> usize {
        self.id_to_token.len()
    }
}

impl TokenDecoder for Vocabulary {
    fn decode_tokens(&self, ids: &[u32]) -> Vec<String> {
        ids.iter()
            .map(|id| {
                self.id_to_token
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_TOKEN.to_string())
            })
            .collect()
    }
}
