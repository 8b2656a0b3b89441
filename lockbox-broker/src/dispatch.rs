use crate::audit::{AuditRecord, AuditSink};
use crate::authn::AuthenticatorChain;
use crate::authz::AuthorizerChain;
use crate::error::AppError;
use crate::request::{Identity, Reply, Request};
use crate::router::PathRouter;
use std::sync::Arc;
use std::time::SystemTime;

/// Per-request decision chain: authentication, authorization, routing,
/// handler invocation.
///
/// All components are read-only after construction, so one dispatcher is
/// shared across concurrent requests without locking.
pub struct Dispatcher {
    authenticators: AuthenticatorChain,
    authorizers: AuthorizerChain,
    router: PathRouter,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        authenticators: AuthenticatorChain,
        authorizers: AuthorizerChain,
        router: PathRouter,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            authenticators,
            authorizers,
            router,
            audit,
        }
    }

    /// Handle one request to its terminal outcome.
    ///
    /// Exactly one audit record is emitted per call, whatever the outcome.
    pub fn handle(&self, request: &Request) -> Reply {
        let (identity, result) = self.run(request);

        let (reply, outcome) = match result {
            Ok(reply) => (reply, "ok"),
            Err(err) => {
                let outcome = err.label();
                (err.into_reply(), outcome)
            }
        };

        self.audit.record(&AuditRecord {
            timestamp: SystemTime::now(),
            identity: identity.as_ref(),
            path: &request.path,
            method: request.method,
            outcome,
        });

        reply
    }

    fn run(&self, request: &Request) -> (Option<Identity>, Result<Reply, AppError>) {
        if !request.path.starts_with('/') {
            return (
                None,
                Err(AppError::bad_request("request path must be absolute")),
            );
        }

        // Authentication failures never reach routing or storage.
        let Some(identity) = self.authenticators.authenticate(request) else {
            return (None, Err(AppError::unauthorized("authentication required")));
        };

        if !self
            .authorizers
            .authorize(&identity, &request.path, request.method)
        {
            return (
                Some(identity),
                Err(AppError::forbidden("access denied")),
            );
        }

        let Some(entry) = self.router.resolve(&request.path) else {
            return (Some(identity), Err(AppError::not_found()));
        };

        let trail = entry.trail(&request.path);
        let result = entry.handler().handle(request, &identity, trail);
        (Some(identity), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authn::HeaderAuth;
    use crate::authz::{DenyPathsAuthz, PathPrefixAuthz};
    use crate::handlers::SecretsHandler;
    use crate::request::Method;
    use axum::http::StatusCode;
    use lockbox_core::{Store, StoreResult};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Store double that counts every contract call.
    #[derive(Default)]
    struct RecordingStore {
        calls: AtomicUsize,
    }

    impl RecordingStore {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Store for RecordingStore {
        fn get(&self, _key: &str) -> StoreResult<Option<Vec<u8>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(b"value".to_vec()))
        }

        fn set(&self, _key: &str, _value: &[u8]) -> StoreResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn delete(&self, _key: &str) -> StoreResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn list(&self, _prefix: &str) -> StoreResult<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        outcomes: Mutex<Vec<String>>,
    }

    impl AuditSink for CollectingSink {
        fn record(&self, record: &AuditRecord<'_>) {
            self.outcomes
                .lock()
                .unwrap()
                .push(record.outcome.to_string());
        }
    }

    fn dispatcher(
        store: Arc<dyn Store>,
        sink: Arc<dyn AuditSink>,
    ) -> Dispatcher {
        let mut authenticators = AuthenticatorChain::new();
        authenticators.push("header", Box::new(HeaderAuth::new("remote_user", None)));

        let mut authorizers = AuthorizerChain::new();
        authorizers.push(
            "paths",
            Box::new(PathPrefixAuthz::new(vec!["/secrets".into()])),
        );
        authorizers.push(
            "deny",
            Box::new(DenyPathsAuthz::new(vec!["/secrets/forbidden".into()])),
        );

        let mut router = PathRouter::new();
        router
            .route("/secrets", Arc::new(SecretsHandler::new(store)))
            .unwrap();

        Dispatcher::new(authenticators, authorizers, router, sink)
    }

    fn request(path: &str, authenticated: bool) -> Request {
        let mut headers = HashMap::new();
        if authenticated {
            headers.insert("remote_user".to_string(), "alice".to_string());
        }
        Request {
            method: Method::Read,
            path: path.into(),
            headers,
            body: None,
            peer: None,
        }
    }

    #[test]
    fn unauthenticated_requests_never_reach_the_store() {
        let store = Arc::new(RecordingStore::default());
        let sink = Arc::new(CollectingSink::default());
        let dispatcher = dispatcher(store.clone(), sink.clone());

        let reply = dispatcher.handle(&request("/secrets/app", false));
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(store.calls(), 0);
        assert_eq!(sink.outcomes.lock().unwrap().as_slice(), ["unauthorized"]);
    }

    #[test]
    fn denied_requests_never_reach_the_store() {
        let store = Arc::new(RecordingStore::default());
        let sink = Arc::new(CollectingSink::default());
        let dispatcher = dispatcher(store.clone(), sink.clone());

        let reply = dispatcher.handle(&request("/secrets/forbidden/key", true));
        assert_eq!(reply.status, StatusCode::FORBIDDEN);
        assert_eq!(store.calls(), 0);
    }

    #[test]
    fn unmatched_paths_are_not_found_before_any_store_call() {
        let store = Arc::new(RecordingStore::default());
        let sink = Arc::new(CollectingSink::default());
        // Authorize everything so routing is the deciding step.
        let mut authenticators = AuthenticatorChain::new();
        authenticators.push("header", Box::new(HeaderAuth::new("remote_user", None)));
        let mut authorizers = AuthorizerChain::new();
        authorizers.push("all", Box::new(PathPrefixAuthz::new(vec!["/".into()])));
        let mut router = PathRouter::new();
        router
            .route("/secrets", Arc::new(SecretsHandler::new(store.clone())))
            .unwrap();
        let dispatcher = Dispatcher::new(authenticators, authorizers, router, sink);

        let reply = dispatcher.handle(&request("/elsewhere", true));
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(store.calls(), 0);
    }

    #[test]
    fn allowed_requests_reach_the_store() {
        let store = Arc::new(RecordingStore::default());
        let sink = Arc::new(CollectingSink::default());
        let dispatcher = dispatcher(store.clone(), sink.clone());

        let reply = dispatcher.handle(&request("/secrets/app", true));
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(store.calls(), 1);
        assert_eq!(sink.outcomes.lock().unwrap().as_slice(), ["ok"]);
    }

    #[test]
    fn every_outcome_is_audited_exactly_once() {
        let store = Arc::new(RecordingStore::default());
        let sink = Arc::new(CollectingSink::default());
        let dispatcher = dispatcher(store, sink.clone());

        dispatcher.handle(&request("/secrets/app", true));
        dispatcher.handle(&request("/secrets/app", false));
        dispatcher.handle(&request("/secrets/forbidden/x", true));
        dispatcher.handle(&request("relative-path", true));

        assert_eq!(
            sink.outcomes.lock().unwrap().as_slice(),
            ["ok", "unauthorized", "forbidden", "bad_request"]
        );
    }
}
