//! Per-event-kind listener registration and interactive responders.
//!
//! Observers are plain callbacks invoked in registration order for every
//! event of their kind. Confirm and ask-question responders are async:
//! the supervisor awaits each in registration order before pulling the
//! next line, and the first responder to settle with a value wins the
//! auto-response; later values are silently ignored.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use serde_json::Value;

use rudder_protocol::{Event, EventKind};

/// Payload handed to confirm responders.
#[derive(Debug, Clone)]
pub struct ConfirmRequest {
    pub step: u64,
    /// The action awaiting approval, passed through uninterpreted.
    pub action: Value,
    /// Human-readable reason the driver wants approval.
    pub reason: String,
}

/// Payload handed to ask-question responders.
#[derive(Debug, Clone)]
pub struct QuestionRequest {
    pub step: u64,
    pub question: String,
    pub question_id: Option<String>,
}

type Observer = Arc<dyn Fn(&Event) + Send + Sync>;
type DiagnosticObserver = Arc<dyn Fn(&str) + Send + Sync>;
pub(crate) type ConfirmResponder =
    Arc<dyn Fn(ConfirmRequest) -> BoxFuture<'static, Option<bool>> + Send + Sync>;
pub(crate) type AnswerResponder =
    Arc<dyn Fn(QuestionRequest) -> BoxFuture<'static, Option<String>> + Send + Sync>;

/// Registry of observers and responders for one supervisor instance.
#[derive(Default)]
pub struct ListenerSet {
    observers: Mutex<HashMap<EventKind, Vec<Observer>>>,
    diagnostics: Mutex<Vec<DiagnosticObserver>>,
    confirm: Mutex<Vec<ConfirmResponder>>,
    answer: Mutex<Vec<AnswerResponder>>,
}

impl ListenerSet {
    /// Register an observer for one event kind.
    pub fn on<F>(&self, kind: EventKind, f: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let Ok(mut observers) = self.observers.lock() else {
            return;
        };
        observers.entry(kind).or_default().push(Arc::new(f));
    }

    /// Register an observer for raw stderr diagnostics.
    pub fn on_diagnostic<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let Ok(mut diagnostics) = self.diagnostics.lock() else {
            return;
        };
        diagnostics.push(Arc::new(f));
    }

    /// Register an async confirm responder. Returning `Some(approved)`
    /// auto-responds on the caller's behalf; `None` abstains.
    pub fn on_confirm<F, Fut>(&self, f: F)
    where
        F: Fn(ConfirmRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<bool>> + Send + 'static,
    {
        let Ok(mut confirm) = self.confirm.lock() else {
            return;
        };
        confirm.push(Arc::new(move |req| Box::pin(f(req))));
    }

    /// Register an async ask-question responder. Returning `Some(text)`
    /// auto-answers on the caller's behalf; `None` abstains.
    pub fn on_ask_question<F, Fut>(&self, f: F)
    where
        F: Fn(QuestionRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        let Ok(mut answer) = self.answer.lock() else {
            return;
        };
        answer.push(Arc::new(move |req| Box::pin(f(req))));
    }

    /// Invoke all observers registered for the event's kind, in
    /// registration order.
    pub fn notify(&self, event: &Event) {
        let observers = {
            let Ok(map) = self.observers.lock() else {
                return;
            };
            map.get(&event.kind()).cloned().unwrap_or_default()
        };
        for observer in observers {
            observer(event);
        }
    }

    /// Invoke all diagnostic observers with one stderr chunk.
    pub fn notify_diagnostic(&self, chunk: &str) {
        let diagnostics = {
            let Ok(list) = self.diagnostics.lock() else {
                return;
            };
            list.clone()
        };
        for observer in diagnostics {
            observer(chunk);
        }
    }

    pub(crate) fn confirm_responders(&self) -> Vec<ConfirmResponder> {
        self.confirm
            .lock()
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    pub(crate) fn answer_responders(&self) -> Vec<AnswerResponder> {
        self.answer
            .lock()
            .map(|list| list.clone())
            .unwrap_or_default()
    }
}
