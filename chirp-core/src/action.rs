//! Action correlator
//!
//! Every outbound action frame carries a fresh `echo` token from a
//! monotonic counter; the matching response resolves the registered
//! oneshot. Responses are matched purely by echo, so any number of calls
//! may be in flight and resolve out of order. On connection loss the
//! router calls [`ActionClient::fail_all`] so no caller waits forever.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};

use crate::socket::{FrameSink, SocketError};
use chirp_api::{ActionCaller, ActionError, ActionRequest, ActionResponse, ResponseStatus};

/// Observability events around action calls
#[derive(Debug, Clone)]
pub enum ApiEvent {
    PreSend {
        action: String,
        echo: String,
    },
    Success {
        action: String,
        echo: String,
    },
    Failure {
        action: String,
        echo: String,
        retcode: i64,
        message: String,
    },
}

struct PendingCall {
    action: String,
    tx: oneshot::Sender<Result<Value, ActionError>>,
    sent_at: Instant,
}

/// Correlates action requests with their responses by echo token
pub struct ActionClient {
    sink: Arc<dyn FrameSink>,
    pending: Mutex<HashMap<String, PendingCall>>,
    seq: AtomicU64,
    events: broadcast::Sender<ApiEvent>,
}

impl ActionClient {
    pub fn new(sink: Arc<dyn FrameSink>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            sink,
            pending: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(1),
            events,
        }
    }

    /// Subscribe to per-call observability events
    pub fn subscribe(&self) -> broadcast::Receiver<ApiEvent> {
        self.events.subscribe()
    }

    /// Number of calls currently awaiting a response
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    fn next_echo(&self) -> String {
        self.seq.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Register a pending call and write the request frame
    fn dispatch(
        &self,
        action: &str,
        params: Value,
    ) -> Result<(String, oneshot::Receiver<Result<Value, ActionError>>), ActionError> {
        let echo = self.next_echo();
        let frame = ActionRequest {
            action: action.to_string(),
            params,
            echo: echo.clone(),
        };
        let text = serde_json::to_string(&frame).map_err(|e| ActionError::Send(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(
            echo.clone(),
            PendingCall {
                action: action.to_string(),
                tx,
                sent_at: Instant::now(),
            },
        );

        let _ = self.events.send(ApiEvent::PreSend {
            action: action.to_string(),
            echo: echo.clone(),
        });
        tracing::debug!(action, %echo, "sending action");

        if let Err(e) = self.sink.send_frame(text) {
            // Registered before sending; roll back on failure
            self.pending.lock().unwrap().remove(&echo);
            return Err(match e {
                SocketError::NotConnected => ActionError::NotConnected,
                other => ActionError::Send(other.to_string()),
            });
        }
        Ok((echo, rx))
    }

    /// Offer an inbound frame; true when it was a response and has been
    /// consumed, false when the frame carries no echo and should be
    /// classified as an event
    pub fn resolve(&self, frame: &Value) -> bool {
        let Some(echo) = frame.get("echo").and_then(Value::as_str) else {
            return false;
        };

        let Some(call) = self.pending.lock().unwrap().remove(echo) else {
            tracing::warn!(%echo, "response for unknown or expired call");
            return true;
        };

        let elapsed = call.sent_at.elapsed();
        let response: ActionResponse = match serde_json::from_value(frame.clone()) {
            Ok(response) => response,
            Err(e) => {
                let _ = call.tx.send(Err(ActionError::Decode(e.to_string())));
                return true;
            }
        };

        match response.status {
            ResponseStatus::Ok => {
                tracing::debug!(action = %call.action, %echo, ?elapsed, "action ok");
                let _ = self.events.send(ApiEvent::Success {
                    action: call.action.clone(),
                    echo: echo.to_string(),
                });
                let _ = call.tx.send(Ok(response.data));
            }
            ResponseStatus::Failed => {
                tracing::warn!(
                    action = %call.action,
                    %echo,
                    retcode = response.retcode,
                    message = %response.message,
                    "action failed"
                );
                let _ = self.events.send(ApiEvent::Failure {
                    action: call.action.clone(),
                    echo: echo.to_string(),
                    retcode: response.retcode,
                    message: response.message.clone(),
                });
                let _ = call.tx.send(Err(ActionError::Failed {
                    action: call.action,
                    retcode: response.retcode,
                    message: response.message,
                    wording: response.wording,
                }));
            }
        }
        true
    }

    /// Reject every in-flight call; invoked on connection loss
    pub fn fail_all(&self) {
        let drained: Vec<PendingCall> = {
            let mut pending = self.pending.lock().unwrap();
            pending.drain().map(|(_, call)| call).collect()
        };
        if !drained.is_empty() {
            tracing::warn!(count = drained.len(), "failing in-flight actions");
        }
        for call in drained {
            let _ = call.tx.send(Err(ActionError::ConnectionLost));
        }
    }

    /// Drop one pending call (timeouts); true when it was still pending
    fn abort(&self, echo: &str) -> bool {
        self.pending.lock().unwrap().remove(echo).is_some()
    }
}

#[async_trait]
impl ActionCaller for ActionClient {
    async fn call(&self, action: &str, params: Value) -> Result<Value, ActionError> {
        let (_echo, rx) = self.dispatch(action, params)?;
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ActionError::ConnectionLost),
        }
    }

    async fn call_with_timeout(
        &self,
        action: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ActionError> {
        let (echo, rx) = self.dispatch(action, params)?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ActionError::ConnectionLost),
            Err(_) => {
                self.abort(&echo);
                Err(ActionError::Timeout {
                    action: action.to_string(),
                    timeout,
                })
            }
        }
    }
}
