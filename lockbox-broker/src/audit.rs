use crate::request::{Identity, Method};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// One terminal request outcome. Formatting and persistence of the stream is
/// the sink's concern.
#[derive(Debug)]
pub struct AuditRecord<'a> {
    pub timestamp: SystemTime,
    pub identity: Option<&'a Identity>,
    pub path: &'a str,
    pub method: Method,
    pub outcome: &'a str,
}

/// Append-only consumer of audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord<'_>);
}

/// Default sink: emits each record as a structured tracing event under the
/// `lockbox::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord<'_>) {
        let timestamp = record
            .timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let identity = record
            .identity
            .map(|identity| identity.principal.to_string())
            .unwrap_or_else(|| "anonymous".to_string());
        info!(
            target: "lockbox::audit",
            timestamp,
            identity = %identity,
            path = %record.path,
            method = %record.method,
            outcome = %record.outcome,
        );
    }
}
