use crate::request::{Identity, Method};
use tracing::debug;

/// Single authorizer verdict. Abstaining counts as neither allow nor deny.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
    Abstain,
}

/// Decides whether an identity may perform a method on a path.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, identity: &Identity, path: &str, method: Method) -> Decision;
}

/// True when `path` equals `root` or sits below it on a component boundary.
pub(crate) fn path_within(path: &str, root: &str) -> bool {
    if root == "/" {
        return path.starts_with('/');
    }
    path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Allows any request whose path sits under one of the configured roots;
/// abstains everywhere else.
pub struct PathPrefixAuthz {
    roots: Vec<String>,
}

impl PathPrefixAuthz {
    pub fn new(roots: Vec<String>) -> Self {
        Self { roots }
    }
}

impl Authorizer for PathPrefixAuthz {
    fn authorize(&self, _identity: &Identity, path: &str, _method: Method) -> Decision {
        if self.roots.iter().any(|root| path_within(path, root)) {
            Decision::Allow
        } else {
            Decision::Abstain
        }
    }
}

/// Denies any request whose path sits under one of the configured roots.
pub struct DenyPathsAuthz {
    roots: Vec<String>,
}

impl DenyPathsAuthz {
    pub fn new(roots: Vec<String>) -> Self {
        Self { roots }
    }
}

impl Authorizer for DenyPathsAuthz {
    fn authorize(&self, _identity: &Identity, path: &str, _method: Method) -> Decision {
        if self.roots.iter().any(|root| path_within(path, root)) {
            Decision::Deny
        } else {
            Decision::Abstain
        }
    }
}

/// Per-identity namespaces under a common root.
///
/// `root/<label>/...` is allowed for the identity whose label matches the
/// first component and denied for everyone else; paths outside the root are
/// none of this authorizer's business.
pub struct NamespaceAuthz {
    root: String,
}

impl NamespaceAuthz {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }
}

impl Authorizer for NamespaceAuthz {
    fn authorize(&self, identity: &Identity, path: &str, _method: Method) -> Decision {
        if !path_within(path, &self.root) {
            return Decision::Abstain;
        }
        let rest = path[self.root.len()..].trim_start_matches('/');
        let namespace = rest.split('/').next().unwrap_or("");
        if namespace.is_empty() {
            return Decision::Deny;
        }
        if namespace == identity.principal.label() {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// Ordered set of authorizers aggregated with deny-overrides semantics.
#[derive(Default)]
pub struct AuthorizerChain {
    entries: Vec<(String, Box<dyn Authorizer>)>,
}

impl AuthorizerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, authorizer: Box<dyn Authorizer>) {
        self.entries.push((name.into(), authorizer));
    }

    /// Aggregate decision: allowed only when at least one authorizer allows
    /// and none deny. The first deny short-circuits the fold.
    pub fn authorize(&self, identity: &Identity, path: &str, method: Method) -> bool {
        let mut allowed = false;
        for (name, authorizer) in &self.entries {
            match authorizer.authorize(identity, path, method) {
                Decision::Deny => {
                    debug!(authorizer = %name, %path, %method, "explicit deny");
                    return false;
                }
                Decision::Allow => allowed = true,
                Decision::Abstain => {}
            }
        }
        allowed
    }
}
