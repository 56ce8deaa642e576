// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use super::update::{UpdateAction, UpdateType};

/// Errors surfaced by the knowledge stores and the consolidation engine
#[derive(Debug, thiserror::Error)]
pub enum CortexError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported action '{action}' for update type '{update_type}'")]
    UnsupportedAction {
        update_type: UpdateType,
        action: UpdateAction,
    },

    #[error("backend error: {0}")]
    Backend(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for CortexError {
    fn from(err: serde_json::Error) -> Self {
        CortexError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CortexError>;
