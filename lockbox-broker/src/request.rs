use axum::http::StatusCode;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Logical operation requested by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Read,
    Write,
    List,
    Delete,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::List => "list",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kernel-reported credentials of the process on the other end of the socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerCred {
    pub uid: u32,
    pub gid: u32,
    pub pid: Option<i32>,
}

/// One inbound request, immutable once dispatched.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    /// Header names are lower-cased at the transport edge.
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub peer: Option<PeerCred>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Principal descriptor produced by a successful authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Process-level caller attributes from the socket peer.
    Process { uid: u32, gid: u32 },
    /// Opaque authenticated name (header or token based schemes).
    Name(String),
}

impl Principal {
    /// Short label used for namespacing and audit output.
    pub fn label(&self) -> String {
        match self {
            Self::Process { uid, .. } => uid.to_string(),
            Self::Name(name) => name.clone(),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process { uid, gid } => write!(f, "uid={uid} gid={gid}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Authenticated identity, attached to the request for the rest of its
/// lifecycle and never persisted.
#[derive(Debug, Clone)]
pub struct Identity {
    pub principal: Principal,
    /// Name of the authenticator that produced this identity.
    pub authenticator: String,
}

/// Terminal outcome handed back to the transport layer.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: Option<&'static str>,
    pub body: Option<Vec<u8>>,
}

impl Reply {
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            content_type: None,
            body: None,
        }
    }

    pub fn bytes(status: StatusCode, content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: Some(content_type),
            body: Some(body),
        }
    }

    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        // Serialization of our own response types does not fail.
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self {
            status,
            content_type: Some("application/json"),
            body: Some(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("remote_user".to_string(), "alice".to_string());
        let request = Request {
            method: Method::Read,
            path: "/secrets/a".into(),
            headers,
            body: None,
            peer: None,
        };
        assert_eq!(request.header("REMOTE_USER"), Some("alice"));
    }

    #[test]
    fn principal_labels() {
        assert_eq!(Principal::Process { uid: 42, gid: 7 }.label(), "42");
        assert_eq!(Principal::Name("alice".into()).label(), "alice");
    }
}
