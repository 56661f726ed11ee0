//! Conversation relay: one request in, one reply out.
//!
//! An exchange runs these steps in order:
//! 1. validate the conversation key (persistent mode only)
//! 2. FAQ short-circuit; a hit returns immediately and touches no transcript
//! 3. fetch or start the transcript
//! 4. apply the window policy
//! 5. append the user turn
//! 6. call the completion engine with the whole transcript
//! 7. fall back to a placeholder when the engine returns no text
//! 8. append the assistant turn
//! 9. persist the transcript (persistent mode only)
//!
//! If saving fails after the engine has answered, the exchange fails and the
//! reply is dropped. The caller sees the storage error.

pub mod locks;


use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::faq::{self, FaqSource};
use crate::generation::{GenerationEngine, GenerationError, GenerationRequest};
use crate::store::{StoreError, TranscriptStore};
use crate::transcript::{DEFAULT_WINDOW, Transcript};

use locks::KeyLocks;

/// Reply used when the engine answers without any text.
pub const PLACEHOLDER_REPLY: &str = "No reply generated.";

/// Longest accepted conversation key (the `chat_history` primary key width).
pub const MAX_CONVERSATION_KEY_LEN: usize = 255;

/// Instruction used when the deployment does not configure its own.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly, concise sales assistant \
chatting with visitors on our website. Answer questions about our products and \
services, ask one short follow-up question at a time to understand what the visitor \
needs, and guide interested visitors towards booking a call or leaving their contact \
details. Never invent prices, guarantees or policies you have not been told about; \
say you will check with the team instead. Keep every reply under three sentences.";

/// Errors that end an exchange without a reply.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("contact_id is required")]
    MissingConversationKey,

    #[error("contact_id {0}")]
    InvalidConversationKey(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),
}

/// Whether transcripts are kept between exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationMode {
    /// History is stored per conversation key; the key is required.
    Persistent,
    /// Every exchange sees only the system turn and the new message.
    Stateless,
}

impl ConversationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationMode::Persistent => "persistent",
            ConversationMode::Stateless => "stateless",
        }
    }
}

/// Input for a single exchange.
#[derive(Debug, Clone, Default)]
pub struct ExchangeRequest {
    pub contact_id: Option<String>,
    pub message: String,
    pub prompt_id: Option<String>,
}

/// Where a reply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Faq,
    Generated,
    Placeholder,
}

/// Outcome of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub reply: String,
    pub source: ReplySource,
}

/// Orchestrates FAQ lookup, transcript storage and the completion engine.
///
/// Collaborators are passed in at construction; the relay holds no global
/// state besides the per-key lock map.
pub struct Relay {
    system_prompt: String,
    store: Option<Arc<dyn TranscriptStore>>,
    faq: Option<Arc<dyn FaqSource>>,
    engine: Arc<dyn GenerationEngine>,
    window: usize,
    locks: KeyLocks,
}

impl Relay {
    /// Relay that keeps history in `store`, keyed by contact id.
    pub fn persistent(
        system_prompt: impl Into<String>,
        store: Arc<dyn TranscriptStore>,
        engine: Arc<dyn GenerationEngine>,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            store: Some(store),
            faq: None,
            engine,
            window: DEFAULT_WINDOW,
            locks: KeyLocks::new(),
        }
    }

    /// Relay without history.
    pub fn stateless(system_prompt: impl Into<String>, engine: Arc<dyn GenerationEngine>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            store: None,
            faq: None,
            engine,
            window: DEFAULT_WINDOW,
            locks: KeyLocks::new(),
        }
    }

    /// Enable the FAQ short-circuit.
    pub fn with_faq(mut self, faq: Arc<dyn FaqSource>) -> Self {
        self.faq = Some(faq);
        self
    }

    /// Override the transcript window (turns kept before appending).
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn mode(&self) -> ConversationMode {
        if self.store.is_some() {
            ConversationMode::Persistent
        } else {
            ConversationMode::Stateless
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Run one exchange and return the reply.
    pub async fn exchange(&self, request: ExchangeRequest) -> Result<Exchange, RelayError> {
        let key = match self.mode() {
            ConversationMode::Persistent => {
                Some(conversation_key(request.contact_id.as_deref())?)
            }
            ConversationMode::Stateless => None,
        };

        if let Some(source) = &self.faq
            && let Some(answer) = faq::lookup(source.as_ref(), &request.message).await?
        {
            info!(contact_id = ?key, "answered from FAQ");
            return Ok(Exchange {
                reply: answer,
                source: ReplySource::Faq,
            });
        }

        match (key, &self.store) {
            (Some(key), Some(store)) => {
                let _guard = self.locks.acquire(key).await;
                let mut transcript = store.fetch(key, &self.system_prompt).await?;
                let exchange = self.converse(&mut transcript, &request).await?;

                if let Err(e) = store.save(key, &transcript).await {
                    warn!(
                        contact_id = key,
                        reply_len = exchange.reply.len(),
                        "generated reply discarded, transcript save failed: {e}"
                    );
                    return Err(e.into());
                }

                info!(
                    contact_id = key,
                    turns = transcript.len(),
                    source = ?exchange.source,
                    "exchange complete"
                );
                Ok(exchange)
            }
            _ => {
                let mut transcript = Transcript::new(&self.system_prompt);
                let exchange = self.converse(&mut transcript, &request).await?;
                info!(source = ?exchange.source, "stateless exchange complete");
                Ok(exchange)
            }
        }
    }

    /// Window, append the user turn, generate, append the reply.
    async fn converse(
        &self,
        transcript: &mut Transcript,
        request: &ExchangeRequest,
    ) -> Result<Exchange, RelayError> {
        let dropped = transcript.apply_window(self.window);
        if dropped > 0 {
            debug!(dropped, "transcript window applied");
        }

        transcript.push_user(request.message.as_str());

        let generated = self
            .engine
            .generate(GenerationRequest {
                transcript: &*transcript,
                prompt_id: request.prompt_id.as_deref(),
            })
            .await?;

        let exchange = match generated {
            Some(reply) => Exchange {
                reply,
                source: ReplySource::Generated,
            },
            None => {
                warn!("engine returned no text, using placeholder reply");
                Exchange {
                    reply: PLACEHOLDER_REPLY.to_string(),
                    source: ReplySource::Placeholder,
                }
            }
        };

        transcript.push_assistant(exchange.reply.as_str());
        Ok(exchange)
    }
}

/// Validate the caller-supplied key. Keys are used verbatim; surrounding
/// whitespace is an error, blank is missing.
fn conversation_key(contact_id: Option<&str>) -> Result<&str, RelayError> {
    let key = contact_id
        .filter(|k| !k.trim().is_empty())
        .ok_or(RelayError::MissingConversationKey)?;

    if key.trim() != key {
        return Err(RelayError::InvalidConversationKey(
            "must not have leading or trailing whitespace".into(),
        ));
    }

    let len = key.chars().count();
    if len > MAX_CONVERSATION_KEY_LEN {
        return Err(RelayError::InvalidConversationKey(format!(
            "must be at most {MAX_CONVERSATION_KEY_LEN} characters (got {len})"
        )));
    }
    Ok(key)
}
