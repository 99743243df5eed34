//! Completion results and the streaming sink interface.

use crate::error::{Error, Result};

/// Receives streamed output as it arrives.
///
/// The transport calls [`DeltaSink::on_delta`] zero or more times with
/// `done == false` and non-empty text, then at most once with `("", true)`
/// when the server sends `[DONE]`.  A stream that is cut short produces no
/// `done` call; the return of the completion call is the implicit end.
pub trait DeltaSink {
    /// Called for each delta, in arrival order, on the requesting task.
    fn on_delta(&mut self, delta: &str, done: bool);
}

impl<F> DeltaSink for F
where
    F: FnMut(&str, bool),
{
    fn on_delta(&mut self, delta: &str, done: bool) {
        self(delta, done)
    }
}

/// A sink that only accumulates what it is given.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    /// Deltas in arrival order.
    pub deltas: Vec<String>,
    /// Number of `done` signals observed.
    pub done_calls: usize,
}

impl CollectingSink {
    /// The concatenation of every delta received.
    pub fn text(&self) -> String {
        self.deltas.concat()
    }
}

impl DeltaSink for CollectingSink {
    fn on_delta(&mut self, delta: &str, done: bool) {
        if done {
            self.done_calls += 1;
        } else {
            self.deltas.push(delta.to_string());
        }
    }
}

/// The outcome of one chat completion request.
///
/// Either a success holding the whitespace-trimmed reply (possibly empty) or
/// a failure holding the error; never both.
#[derive(Debug, Clone)]
pub struct ChatCompletionResult {
    full_response: String,
    error: Option<Error>,
}

impl ChatCompletionResult {
    /// A successful result; `response` is trimmed of surrounding whitespace.
    pub fn success(response: &str) -> Self {
        Self {
            full_response: response.trim().to_string(),
            error: None,
        }
    }

    /// A failed result.
    pub fn failure(error: Error) -> Self {
        Self {
            full_response: String::new(),
            error: Some(error),
        }
    }

    /// True if the request succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The trimmed reply; empty on failure.
    pub fn full_response(&self) -> &str {
        &self.full_response
    }

    /// The failure, if any.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// The failure description, if any.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(Error::to_string)
    }

    /// Convert into a `Result` holding the reply.
    pub fn into_result(self) -> Result<String> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.full_response),
        }
    }
}

impl From<Result<String>> for ChatCompletionResult {
    fn from(result: Result<String>) -> Self {
        match result {
            Ok(response) => Self::success(&response),
            Err(err) => Self::failure(err),
        }
    }
}
