use crate::error::AppError;
use crate::request::{Identity, Method, Reply, Request};
use axum::http::StatusCode;
use lockbox_core::Store;
use serde::Serialize;
use std::sync::Arc;

/// Path-routed request handler, bound to its store at configuration time.
pub trait Handler: Send + Sync {
    fn handle(&self, request: &Request, identity: &Identity, trail: &str)
        -> Result<Reply, AppError>;
}

/// Key/value secrets sub-tree backed by one store instance.
pub struct SecretsHandler {
    store: Arc<dyn Store>,
}

impl SecretsHandler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl Handler for SecretsHandler {
    fn handle(
        &self,
        request: &Request,
        _identity: &Identity,
        trail: &str,
    ) -> Result<Reply, AppError> {
        match request.method {
            Method::Read => {
                let key = require_key(trail)?;
                match self.store.get(key)? {
                    Some(value) => Ok(Reply::bytes(
                        StatusCode::OK,
                        "application/octet-stream",
                        value,
                    )),
                    None => Err(AppError::not_found()),
                }
            }
            Method::Write => {
                let key = require_key(trail)?;
                let body = request
                    .body
                    .as_deref()
                    .filter(|body| !body.is_empty())
                    .ok_or_else(|| AppError::bad_request("a request body is required"))?;
                self.store.set(key, body)?;
                Ok(Reply::empty(StatusCode::CREATED))
            }
            Method::Delete => {
                let key = require_key(trail)?;
                self.store.delete(key)?;
                Ok(Reply::empty(StatusCode::NO_CONTENT))
            }
            Method::List => {
                let keys = self.store.list(trail)?;
                Ok(Reply::json(StatusCode::OK, &keys))
            }
        }
    }
}

fn require_key(trail: &str) -> Result<&str, AppError> {
    if trail.is_empty() || trail.ends_with('/') {
        return Err(AppError::bad_request("a secret name is required"));
    }
    Ok(trail)
}

#[derive(Serialize)]
struct ServerInfo<'a> {
    server: &'a str,
    version: &'a str,
}

/// Catch-all handler bound to `/` by default; answers reads with server
/// identification and rejects everything else.
pub struct InfoHandler {
    name: String,
}

impl InfoHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for InfoHandler {
    fn default() -> Self {
        Self::new("lockbox")
    }
}

impl Handler for InfoHandler {
    fn handle(
        &self,
        request: &Request,
        _identity: &Identity,
        _trail: &str,
    ) -> Result<Reply, AppError> {
        match request.method {
            Method::Read | Method::List => Ok(Reply::json(
                StatusCode::OK,
                &ServerInfo {
                    server: &self.name,
                    version: env!("CARGO_PKG_VERSION"),
                },
            )),
            Method::Write | Method::Delete => {
                Err(AppError::bad_request("unsupported operation"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Principal;
    use lockbox_core::MemoryStore;
    use std::collections::HashMap;

    fn identity() -> Identity {
        Identity {
            principal: Principal::Name("alice".into()),
            authenticator: "test".into(),
        }
    }

    fn request(method: Method, body: Option<&[u8]>) -> Request {
        Request {
            method,
            path: "/secrets/app/token".into(),
            headers: HashMap::new(),
            body: body.map(|b| b.to_vec()),
            peer: None,
        }
    }

    #[test]
    fn write_then_read_then_delete() {
        let handler = SecretsHandler::new(Arc::new(MemoryStore::new()));
        let id = identity();

        let reply = handler
            .handle(&request(Method::Write, Some(b"v")), &id, "app/token")
            .unwrap();
        assert_eq!(reply.status, StatusCode::CREATED);

        let reply = handler
            .handle(&request(Method::Read, None), &id, "app/token")
            .unwrap();
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body.as_deref(), Some(b"v".as_slice()));

        let reply = handler
            .handle(&request(Method::Delete, None), &id, "app/token")
            .unwrap();
        assert_eq!(reply.status, StatusCode::NO_CONTENT);
    }

    #[test]
    fn read_missing_is_not_found() {
        let handler = SecretsHandler::new(Arc::new(MemoryStore::new()));
        let err = handler
            .handle(&request(Method::Read, None), &identity(), "absent")
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn write_without_body_is_bad_request() {
        let handler = SecretsHandler::new(Arc::new(MemoryStore::new()));
        let err = handler
            .handle(&request(Method::Write, None), &identity(), "app/token")
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn container_operations_require_a_key() {
        let handler = SecretsHandler::new(Arc::new(MemoryStore::new()));
        for trail in ["", "app/"] {
            let err = handler
                .handle(&request(Method::Read, None), &identity(), trail)
                .unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn list_returns_keys_under_trail() {
        let store = Arc::new(MemoryStore::new());
        store.set("app/a", b"1").unwrap();
        store.set("app/b", b"2").unwrap();
        store.set("other/c", b"3").unwrap();
        let handler = SecretsHandler::new(store);

        let reply = handler
            .handle(&request(Method::List, None), &identity(), "app/")
            .unwrap();
        let keys: Vec<String> = serde_json::from_slice(&reply.body.unwrap()).unwrap();
        assert_eq!(keys, vec!["app/a".to_string(), "app/b".to_string()]);
    }

    #[test]
    fn info_handler_identifies_the_server() {
        let handler = InfoHandler::default();
        let reply = handler
            .handle(&request(Method::Read, None), &identity(), "")
            .unwrap();
        assert_eq!(reply.status, StatusCode::OK);

        let err = handler
            .handle(&request(Method::Write, Some(b"x")), &identity(), "")
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
