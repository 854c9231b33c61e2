//! Scripted local API for exercising the orchestrator and checkers.

use crate::{
    error::{Error, Result},
    session::{ApiResponse, BoxFuture, LocalApi},
};
use parking_lot::Mutex;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

/// Replies are consumed in order; a request that does not match the next
/// scripted method and path fails with `UnexpectedResponse`.
#[derive(Debug, Default)]
pub struct ScriptedApi {
    script: Mutex<VecDeque<(Method, String, Result<ApiResponse>)>>,
    calls: Mutex<Vec<Call>>,
    reinitializations: Mutex<usize>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, method: Method, path: &str, status: StatusCode, body: Value) -> Self {
        self.script
            .lock()
            .push_back((method, path.to_string(), Ok(ApiResponse::new(status, body))));
        self
    }

    pub fn fail(self, method: Method, path: &str, error: Error) -> Self {
        self.script
            .lock()
            .push_back((method, path.to_string(), Err(error)));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls.lock().iter().map(|call| call.path.clone()).collect()
    }

    pub fn reinitializations(&self) -> usize {
        *self.reinitializations.lock()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

impl LocalApi for ScriptedApi {
    fn request<'a>(
        &'a self,
        _ctx: &'a CancellationToken,
        method: Method,
        path: &'a str,
        body: Option<Value>,
    ) -> BoxFuture<'a, Result<ApiResponse>> {
        self.calls.lock().push(Call {
            method: method.clone(),
            path: path.to_string(),
            body,
        });

        let next = self.script.lock().pop_front();
        let result = match next {
            Some((expected_method, expected_path, reply))
                if expected_method == method && expected_path == path =>
            {
                reply
            }
            Some((expected_method, expected_path, _)) => Err(Error::unexpected(
                path,
                format!("scripted {expected_method} {expected_path}, got {method} {path}"),
            )),
            None => Err(Error::unexpected(path, "script exhausted")),
        };

        Box::pin(async move { result })
    }

    fn ensure_session<'a>(&'a self, _ctx: &'a CancellationToken) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn reinitialize<'a>(&'a self, _ctx: &'a CancellationToken) -> BoxFuture<'a, Result<()>> {
        *self.reinitializations.lock() += 1;
        Box::pin(async { Ok(()) })
    }
}
