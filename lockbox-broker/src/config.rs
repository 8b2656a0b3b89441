use crate::audit::TracingAuditSink;
use crate::authn::{AuthenticatorChain, BearerTokenAuth, HeaderAuth, PeerCredAuth};
use crate::authz::{AuthorizerChain, DenyPathsAuthz, NamespaceAuthz, PathPrefixAuthz};
use crate::dispatch::Dispatcher;
use crate::handlers::{InfoHandler, SecretsHandler};
use crate::router::PathRouter;
use anyhow::{bail, Context};
use lockbox_core::{EncryptedOverlay, EncryptionAlgorithm, FileStore, MemoryStore, Store};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Top-level TOML configuration for the daemon.
///
/// Authenticators and authorizers are arrays of tables because their order
/// is part of the chain semantics; stores and routes are keyed by name and
/// prefix respectively.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub stores: BTreeMap<String, StoreConfig>,
    #[serde(default)]
    pub authenticators: Vec<AuthenticatorEntry>,
    #[serde(default)]
    pub authorizers: Vec<AuthorizerEntry>,
    #[serde(default)]
    pub routes: BTreeMap<String, RouteConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub socket: PathBuf,
    #[serde(default = "default_server_name")]
    pub name: String,
}

fn default_server_name() -> String {
    "lockbox".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StoreConfig {
    Memory,
    File {
        root: PathBuf,
    },
    Encrypted {
        backing: String,
        master_key: PathBuf,
        #[serde(default)]
        algorithm: Option<String>,
        #[serde(default = "default_autogen")]
        autogen_master_key: bool,
    },
}

fn default_autogen() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AuthenticatorEntry {
    pub name: String,
    #[serde(flatten)]
    pub config: AuthenticatorConfig,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AuthenticatorConfig {
    PeerCreds {
        #[serde(default)]
        uids: Vec<u32>,
        #[serde(default)]
        gids: Vec<u32>,
    },
    Header {
        header: String,
        #[serde(default)]
        values: Option<Vec<String>>,
    },
    BearerToken {
        token: String,
        principal: String,
    },
}

#[derive(Debug, Deserialize)]
pub struct AuthorizerEntry {
    pub name: String,
    #[serde(flatten)]
    pub config: AuthorizerConfig,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AuthorizerConfig {
    Paths { paths: Vec<String> },
    DenyPaths { paths: Vec<String> },
    Namespace { root: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "handler", rename_all = "kebab-case")]
pub enum RouteConfig {
    Secrets { store: String },
    Info,
}

impl Config {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

/// Resolve the configuration into a ready dispatcher.
///
/// Store construction runs in two phases so `encrypted` entries can resolve
/// their backing store by name. Master-key problems abort startup here.
pub fn build_dispatcher(config: &Config) -> anyhow::Result<Dispatcher> {
    let stores = build_stores(&config.stores)?;
    let authenticators = build_authenticators(&config.authenticators);
    let authorizers = build_authorizers(&config.authorizers);
    let router = build_router(config, &stores)?;

    if authenticators.is_empty() {
        warn!("no authenticators configured; every request will be rejected");
    }

    Ok(Dispatcher::new(
        authenticators,
        authorizers,
        router,
        Arc::new(TracingAuditSink),
    ))
}

fn build_stores(
    configs: &BTreeMap<String, StoreConfig>,
) -> anyhow::Result<BTreeMap<String, Arc<dyn Store>>> {
    let mut stores: BTreeMap<String, Arc<dyn Store>> = BTreeMap::new();

    for (name, store) in configs {
        match store {
            StoreConfig::Memory => {
                stores.insert(name.clone(), Arc::new(MemoryStore::new()));
            }
            StoreConfig::File { root } => {
                stores.insert(name.clone(), Arc::new(FileStore::new(root)));
            }
            StoreConfig::Encrypted { .. } => {}
        }
    }

    for (name, store) in configs {
        let StoreConfig::Encrypted {
            backing,
            master_key,
            algorithm,
            autogen_master_key,
        } = store
        else {
            continue;
        };

        let inner = stores
            .get(backing)
            .cloned()
            .with_context(|| {
                format!("store `{name}` references unknown backing store `{backing}`")
            })?;
        let algorithm = match algorithm.as_deref() {
            Some(value) => value
                .parse::<EncryptionAlgorithm>()
                .with_context(|| format!("store `{name}` has an invalid algorithm"))?,
            None => EncryptionAlgorithm::default(),
        };
        let overlay =
            EncryptedOverlay::open_at(inner, master_key, algorithm, *autogen_master_key)
                .with_context(|| format!("failed to initialise encrypted store `{name}`"))?;
        stores.insert(name.clone(), Arc::new(overlay));
    }

    Ok(stores)
}

fn build_authenticators(entries: &[AuthenticatorEntry]) -> AuthenticatorChain {
    let mut chain = AuthenticatorChain::new();
    for entry in entries {
        match &entry.config {
            AuthenticatorConfig::PeerCreds { uids, gids } => chain.push(
                &entry.name,
                Box::new(PeerCredAuth::new(uids.iter().copied(), gids.iter().copied())),
            ),
            AuthenticatorConfig::Header { header, values } => chain.push(
                &entry.name,
                Box::new(HeaderAuth::new(header, values.clone())),
            ),
            AuthenticatorConfig::BearerToken { token, principal } => chain.push(
                &entry.name,
                Box::new(BearerTokenAuth::new(token, principal)),
            ),
        }
    }
    chain
}

fn build_authorizers(entries: &[AuthorizerEntry]) -> AuthorizerChain {
    let mut chain = AuthorizerChain::new();
    for entry in entries {
        match &entry.config {
            AuthorizerConfig::Paths { paths } => chain.push(
                &entry.name,
                Box::new(PathPrefixAuthz::new(paths.clone())),
            ),
            AuthorizerConfig::DenyPaths { paths } => chain.push(
                &entry.name,
                Box::new(DenyPathsAuthz::new(paths.clone())),
            ),
            AuthorizerConfig::Namespace { root } => {
                chain.push(&entry.name, Box::new(NamespaceAuthz::new(root)))
            }
        }
    }
    chain
}

fn build_router(
    config: &Config,
    stores: &BTreeMap<String, Arc<dyn Store>>,
) -> anyhow::Result<PathRouter> {
    if config.routes.is_empty() {
        bail!("configuration does not provide any routes");
    }

    let mut router = PathRouter::new();
    for (prefix, route) in &config.routes {
        match route {
            RouteConfig::Secrets { store } => {
                let store = stores.get(store).cloned().with_context(|| {
                    format!("route `{prefix}` references unknown store `{store}`")
                })?;
                router.route(prefix, Arc::new(SecretsHandler::new(store)))?;
            }
            RouteConfig::Info => {
                router.route(prefix, Arc::new(InfoHandler::new(&config.server.name)))?;
            }
        }
    }
    Ok(router)
}
