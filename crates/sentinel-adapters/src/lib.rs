//! The adapter contract and a name-keyed registry of adapters.
//!
//! An adapter is a named component the Executor drives through
//! `{name, is_enabled, validate, execute}`. Adapters never abort a
//! tick: every error path returns a [`Receipt`] rather than
//! propagating, so one misbehaving channel never blocks the others.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sentinel_types::{ErrorReason, Receipt};

/// Everything an adapter needs to render and send one action: the
/// resolved message body, a channel label, routing addresses, and
/// whether the tick is running in global mock mode.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub project_id: String,
    pub stage: String,
    pub action_id: String,
    pub title: String,
    pub body: String,
    pub channel: String,
    pub addresses: BTreeMap<String, String>,
    pub mock_mode: bool,
    pub now: DateTime<Utc>,
}

/// The capability set every adapter implements. `execute` must never
/// panic or propagate: the Executor catches unwinding separately, but
/// a well-behaved adapter reports failure as a [`Receipt`] itself.
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;
    fn is_enabled(&self, ctx: &ExecutionContext) -> bool;
    /// Cheap pre-flight check: is there enough routing data to attempt
    /// this send at all. Returns a human-readable reason on failure.
    fn validate(&self, ctx: &ExecutionContext) -> Result<(), String>;
    fn execute(&self, ctx: &ExecutionContext) -> Receipt;
}

/// Name -> adapter instance. Looked up once per action by the
/// Executor.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Box<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Box<dyn Adapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Adapter> {
        self.adapters.get(name).map(|b| b.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }

    /// Run one action through the registry's contract: disabled
    /// adapters and missing adapter names both produce a `skipped`
    /// receipt rather than a hard error, matching the reliability
    /// layer's "adapter errors are local" invariant.
    pub fn execute(&self, adapter_name: &str, ctx: &ExecutionContext) -> Receipt {
        let Some(adapter) = self.get(adapter_name) else {
            return Receipt::failed(
                adapter_name,
                &ctx.action_id,
                ErrorReason::NotConfigured,
                format!("no adapter registered under name `{adapter_name}`"),
                ctx.now,
            );
        };

        if ctx.mock_mode {
            return Receipt::skipped(adapter.name(), &ctx.action_id, ErrorReason::MockMode, ctx.now);
        }

        if !adapter.is_enabled(ctx) {
            return Receipt::skipped(adapter.name(), &ctx.action_id, ErrorReason::NotConfigured, ctx.now);
        }

        if let Err(reason) = adapter.validate(ctx) {
            return Receipt::failed(adapter.name(), &ctx.action_id, ErrorReason::InvalidArgument, reason, ctx.now);
        }

        adapter.execute(ctx)
    }
}

/// Always-enabled adapter that never actually sends anything;
/// records an `ok` receipt. Used in tests and when a project opts into
/// running ticks without live side effects.
pub struct MockAdapter {
    name: String,
}

impl MockAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self, _ctx: &ExecutionContext) -> bool {
        true
    }

    fn validate(&self, _ctx: &ExecutionContext) -> Result<(), String> {
        Ok(())
    }

    fn execute(&self, ctx: &ExecutionContext) -> Receipt {
        Receipt::ok(&self.name, &ctx.action_id, ctx.now)
    }
}

/// Webhook adapter wrapping `sentinel-webhook`'s HTTP client. Enabled
/// only when the registry was given a URL for it. A send failure is
/// classified by what the HTTP layer actually said: `rate_limited` for
/// a 429, `upstream_error` for another non-retryable 4xx, and
/// `transient_error` for a 5xx, timeout, or network failure.
pub struct WebhookAdapter {
    name: String,
    config: sentinel_webhook::WebhookConfig,
}

impl WebhookAdapter {
    pub fn new(name: impl Into<String>, config: sentinel_webhook::WebhookConfig) -> Self {
        Self { name: name.into(), config }
    }
}

impl Adapter for WebhookAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self, _ctx: &ExecutionContext) -> bool {
        !self.config.url.is_empty()
    }

    fn validate(&self, ctx: &ExecutionContext) -> Result<(), String> {
        if ctx.body.is_empty() {
            return Err("rendered message body is empty".to_string());
        }
        Ok(())
    }

    fn execute(&self, ctx: &ExecutionContext) -> Receipt {
        let payload = sentinel_webhook::WebhookPayload {
            title: ctx.title.clone(),
            message: ctx.body.clone(),
            fields: ctx.addresses.clone(),
        };

        match sentinel_webhook::send_webhook(&self.config, &payload) {
            Ok(()) => Receipt::ok(&self.name, &ctx.action_id, ctx.now),
            Err(err) => {
                let reason = classify_webhook_error(&err);
                Receipt::failed(&self.name, &ctx.action_id, reason, err.to_string(), ctx.now)
            }
        }
    }
}

/// Map a webhook send failure to the `ErrorReason` the reliability
/// layer and the retry queue act on: a 429 is rate limiting, any other
/// non-success status below 500 is an upstream rejection that retrying
/// won't fix, and everything else (5xx, timeout, transport failure) is
/// transient.
fn classify_webhook_error(err: &sentinel_webhook::WebhookError) -> ErrorReason {
    match err.status_code() {
        Some(429) => ErrorReason::RateLimited,
        Some(status) if (400..500).contains(&status) => ErrorReason::UpstreamError,
        _ => ErrorReason::TransientError,
    }
}
