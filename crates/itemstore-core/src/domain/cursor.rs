//! Batch cursor - resumable pagination position
//!
//! The cursor belongs to the caller (the controller), never to the store.
//! A store receives the current cursor with each fetch and returns the next
//! one alongside the batch. Constructors enforce the terminal-state rule:
//! a token or link cursor can only report `has_more = false` when the next
//! token or link is absent, and can only report `has_more = true` when it
//! is present.

use serde::{Deserialize, Serialize};

use super::errors::{DomainError, StoreError};
use super::fetch_options::{FetchOptions, PagingScheme};

/// Where the next fetch resumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CursorPosition {
    /// Nothing fetched yet; compatible with every scheme
    Start,
    Offset(usize),
    Token(String),
    Link(String),
    /// Backend signalled end of results
    End,
}

/// Pagination progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCursor {
    position: CursorPosition,
    has_more: bool,
}

impl Default for BatchCursor {
    fn default() -> Self {
        Self {
            position: CursorPosition::Start,
            has_more: true,
        }
    }
}

impl BatchCursor {
    /// Initial cursor for the given options
    #[must_use]
    pub fn start(options: &FetchOptions) -> Self {
        let position = if let Some(token) = &options.continuation_token {
            CursorPosition::Token(token.clone())
        } else if options.initial_offset > 0 {
            CursorPosition::Offset(options.initial_offset)
        } else {
            CursorPosition::Start
        };
        Self {
            position,
            has_more: true,
        }
    }

    /// Offset cursor after a batch
    #[must_use]
    pub fn offset(next_offset: usize, has_more: bool) -> Self {
        Self {
            position: CursorPosition::Offset(next_offset),
            has_more,
        }
    }

    /// Token cursor after a batch
    ///
    /// `(None, false)` is the only terminal state. A missing token with
    /// `has_more = true`, or a token with `has_more = false`, is rejected.
    pub fn token(next_token: Option<String>, has_more: bool) -> Result<Self, DomainError> {
        Self::resumable(next_token, has_more, CursorPosition::Token, "token")
    }

    /// Link cursor after a batch, with the same terminal-state rule as tokens
    pub fn link(next_link: Option<String>, has_more: bool) -> Result<Self, DomainError> {
        Self::resumable(next_link, has_more, CursorPosition::Link, "link")
    }

    fn resumable(
        next: Option<String>,
        has_more: bool,
        wrap: fn(String) -> CursorPosition,
        what: &str,
    ) -> Result<Self, DomainError> {
        match (next, has_more) {
            (Some(value), true) if !value.is_empty() => Ok(Self {
                position: wrap(value),
                has_more: true,
            }),
            (None, false) => Ok(Self::exhausted()),
            (Some(_), false) => Err(DomainError::InvalidCursor(format!(
                "next {what} present but has_more is false"
            ))),
            (_, true) => Err(DomainError::InvalidCursor(format!(
                "null {what} with has_more = true"
            ))),
        }
    }

    /// Cursor past the last batch
    #[must_use]
    pub fn exhausted() -> Self {
        Self {
            position: CursorPosition::End,
            has_more: false,
        }
    }

    pub fn position(&self) -> &CursorPosition {
        &self.position
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(self.position, CursorPosition::Start)
    }

    /// Back to the start state of the given options
    pub fn reset(&mut self, options: &FetchOptions) {
        *self = Self::start(options);
    }

    /// Moves an offset position by `delta` rows
    ///
    /// Keeps the next page aligned after a record was inserted into or
    /// removed from the already-fetched part of the result set. Other
    /// positions are left alone; tokens and links are opaque.
    pub fn shift_offset(&mut self, delta: isize) {
        if let CursorPosition::Offset(n) = &mut self.position {
            *n = n.saturating_add_signed(delta);
        }
    }

    /// Paging scheme implied by the position; `None` for `Start` and `End`
    #[must_use]
    pub fn scheme(&self) -> Option<PagingScheme> {
        match self.position {
            CursorPosition::Offset(_) => Some(PagingScheme::Offset),
            CursorPosition::Token(_) => Some(PagingScheme::Token),
            CursorPosition::Link(_) => Some(PagingScheme::Link),
            CursorPosition::Start | CursorPosition::End => None,
        }
    }

    /// Reject a cursor produced by a store of another scheme
    pub fn check_scheme(&self, scheme: PagingScheme) -> Result<(), StoreError> {
        match self.scheme() {
            Some(own) if own != scheme => Err(StoreError::InvalidConfiguration(format!(
                "{own} cursor given to a {scheme}-paged store"
            ))),
            _ => Ok(()),
        }
    }

    /// Row offset an offset-paged store should resume from
    pub fn resolve_offset(&self, options: &FetchOptions) -> Result<usize, StoreError> {
        match &self.position {
            CursorPosition::Start => Ok(options.initial_offset),
            CursorPosition::Offset(n) => Ok(*n),
            CursorPosition::End => Ok(0),
            CursorPosition::Token(_) | CursorPosition::Link(_) => {
                self.check_scheme(PagingScheme::Offset)?;
                Ok(0)
            }
        }
    }
}
