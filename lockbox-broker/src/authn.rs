use crate::request::{Identity, Principal, Request};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Result of a single authenticator's inspection of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// The request carries credentials this authenticator vouches for.
    Granted(Principal),
    /// The request carries nothing this authenticator understands.
    Declined,
    /// The request carries credentials this authenticator understands and
    /// rejects. A hard failure; the chain stops here.
    Refused(String),
}

/// Inspects a request and either produces a principal or declines.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, request: &Request) -> Credential;
}

/// Verifies the connecting peer's uid/gid against configured allow-lists.
pub struct PeerCredAuth {
    uids: HashSet<u32>,
    gids: HashSet<u32>,
}

impl PeerCredAuth {
    pub fn new(uids: impl IntoIterator<Item = u32>, gids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            uids: uids.into_iter().collect(),
            gids: gids.into_iter().collect(),
        }
    }
}

impl Authenticator for PeerCredAuth {
    fn authenticate(&self, request: &Request) -> Credential {
        let Some(peer) = request.peer else {
            return Credential::Declined;
        };
        if self.uids.contains(&peer.uid) || self.gids.contains(&peer.gid) {
            Credential::Granted(Principal::Process {
                uid: peer.uid,
                gid: peer.gid,
            })
        } else {
            Credential::Declined
        }
    }
}

/// Accepts an identity asserted through a trusted request header.
///
/// With a value allow-list configured, a header value outside the list is a
/// hard failure rather than a decline: the caller presented credentials of
/// this scheme and they were wrong.
pub struct HeaderAuth {
    header: String,
    values: Option<HashSet<String>>,
}

impl HeaderAuth {
    pub fn new(header: impl Into<String>, values: Option<Vec<String>>) -> Self {
        Self {
            header: header.into(),
            values: values.map(|v| v.into_iter().collect()),
        }
    }
}

impl Authenticator for HeaderAuth {
    fn authenticate(&self, request: &Request) -> Credential {
        let Some(value) = request.header(&self.header) else {
            return Credential::Declined;
        };
        match &self.values {
            Some(allowed) if !allowed.contains(value) => {
                Credential::Refused(format!("{} carries a disallowed identity", self.header))
            }
            _ => Credential::Granted(Principal::Name(value.to_string())),
        }
    }
}

/// Matches a static bearer token in the `authorization` header.
pub struct BearerTokenAuth {
    token: String,
    principal: String,
}

impl BearerTokenAuth {
    pub fn new(token: impl Into<String>, principal: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            principal: principal.into(),
        }
    }
}

impl Authenticator for BearerTokenAuth {
    fn authenticate(&self, request: &Request) -> Credential {
        let Some(value) = request.header("authorization") else {
            return Credential::Declined;
        };
        let Some(token) = extract_bearer_token(value) else {
            return Credential::Refused("malformed authorization header".into());
        };
        if token == self.token {
            Credential::Granted(Principal::Name(self.principal.clone()))
        } else {
            Credential::Refused("invalid bearer token".into())
        }
    }
}

pub fn extract_bearer_token(value: &str) -> Option<&str> {
    let value = value.trim();
    if let Some(rest) = value.strip_prefix("Bearer ") {
        Some(rest.trim())
    } else if let Some(rest) = value.strip_prefix("bearer ") {
        Some(rest.trim())
    } else {
        None
    }
}

/// Ordered set of authenticators; the first to produce a principal wins.
#[derive(Default)]
pub struct AuthenticatorChain {
    entries: Vec<(String, Box<dyn Authenticator>)>,
}

impl AuthenticatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, authenticator: Box<dyn Authenticator>) {
        self.entries.push((name.into(), authenticator));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run the chain in configured order.
    ///
    /// A hard failure stops the chain: it is logged and the request stays
    /// unauthenticated, it is never passed on to later authenticators.
    pub fn authenticate(&self, request: &Request) -> Option<Identity> {
        for (name, authenticator) in &self.entries {
            match authenticator.authenticate(request) {
                Credential::Granted(principal) => {
                    debug!(authenticator = %name, principal = %principal, "authenticated");
                    return Some(Identity {
                        principal,
                        authenticator: name.clone(),
                    });
                }
                Credential::Declined => {}
                Credential::Refused(reason) => {
                    warn!(authenticator = %name, %reason, "authentication refused");
                    return None;
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Method, PeerCred};
    use std::collections::HashMap;

    fn request(peer: Option<PeerCred>, headers: &[(&str, &str)]) -> Request {
        Request {
            method: Method::Read,
            path: "/secrets/a".into(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            body: None,
            peer,
        }
    }

    #[test]
    fn peer_cred_matches_uid_or_gid() {
        let auth = PeerCredAuth::new([1000], [2000]);

        let by_uid = request(Some(PeerCred { uid: 1000, gid: 5, pid: None }), &[]);
        assert!(matches!(auth.authenticate(&by_uid), Credential::Granted(_)));

        let by_gid = request(Some(PeerCred { uid: 5, gid: 2000, pid: None }), &[]);
        assert!(matches!(auth.authenticate(&by_gid), Credential::Granted(_)));

        let neither = request(Some(PeerCred { uid: 5, gid: 5, pid: None }), &[]);
        assert_eq!(auth.authenticate(&neither), Credential::Declined);

        let no_peer = request(None, &[]);
        assert_eq!(auth.authenticate(&no_peer), Credential::Declined);
    }

    #[test]
    fn header_auth_allow_list() {
        let auth = HeaderAuth::new("remote_user", Some(vec!["alice".into()]));

        let ok = request(None, &[("remote_user", "alice")]);
        assert_eq!(
            auth.authenticate(&ok),
            Credential::Granted(Principal::Name("alice".into()))
        );

        let refused = request(None, &[("remote_user", "mallory")]);
        assert!(matches!(auth.authenticate(&refused), Credential::Refused(_)));

        let absent = request(None, &[]);
        assert_eq!(auth.authenticate(&absent), Credential::Declined);
    }

    #[test]
    fn bearer_token_auth() {
        let auth = BearerTokenAuth::new("s3cret", "ci-agent");

        let ok = request(None, &[("authorization", "Bearer s3cret")]);
        assert!(matches!(auth.authenticate(&ok), Credential::Granted(_)));

        let wrong = request(None, &[("authorization", "Bearer nope")]);
        assert!(matches!(auth.authenticate(&wrong), Credential::Refused(_)));

        let malformed = request(None, &[("authorization", "Basic abc")]);
        assert!(matches!(auth.authenticate(&malformed), Credential::Refused(_)));
    }

    #[test]
    fn chain_short_circuits_on_first_grant() {
        let mut chain = AuthenticatorChain::new();
        chain.push("creds", Box::new(PeerCredAuth::new([0], [])));
        chain.push("header", Box::new(HeaderAuth::new("remote_user", None)));

        let req = request(
            Some(PeerCred { uid: 0, gid: 0, pid: None }),
            &[("remote_user", "alice")],
        );
        let identity = chain.authenticate(&req).unwrap();
        assert_eq!(identity.authenticator, "creds");
    }

    #[test]
    fn hard_failure_stops_the_chain() {
        let mut chain = AuthenticatorChain::new();
        chain.push(
            "header",
            Box::new(HeaderAuth::new("remote_user", Some(vec!["alice".into()]))),
        );
        // Would authenticate anyone, but must never be consulted after a
        // refusal upstream.
        chain.push("fallback", Box::new(HeaderAuth::new("x-user", None)));

        let req = request(None, &[("remote_user", "mallory"), ("x-user", "mallory")]);
        assert!(chain.authenticate(&req).is_none());
    }

    #[test]
    fn all_declined_is_unauthenticated() {
        let mut chain = AuthenticatorChain::new();
        chain.push("creds", Box::new(PeerCredAuth::new([0], [])));
        assert!(chain.authenticate(&request(None, &[])).is_none());
    }
}
