//! Unit of work passed from producers to the sender workers.

use crate::token::Token;

/// A rendered log line waiting to be shipped.
///
/// Created on every log call and consumed exactly once by a worker.
#[derive(Clone, Debug)]
pub struct Entry {
    pub token: Token,
    pub text: String,
}

impl Entry {
    pub fn new(token: Token, text: impl Into<String>) -> Self {
        Self {
            token,
            text: text.into(),
        }
    }
}
