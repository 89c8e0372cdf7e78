//! Local nginx reverse proxy in front of the HTTP endpoints beneath it.
//!
//! A proxy directory holds:
//!
//! ```text
//! proxy.config.yml     name and listening port
//! proxy.nginx.conf     server block including every file in _paths/
//! _paths/<port>-path.conf
//!                      one location per proxied endpoint
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use super::{ManagedContainer, ensure_absent, read_config, write_config};
use crate::components::{
    ActionResult, Collaborators, Component, ComponentKind, ComponentTree, ComponentType, ComponentTypes,
    CreationData, Direction, HasHttpEndpoint, HasLogs, NodeId, Startable, TreeContext,
};
use crate::config::ProjectSettings;
use crate::core::DcError;
use crate::runner::{ContainerSpec, container_name};

/// Config file marking a local proxy.
pub const CONFIG_FILE: &str = "proxy.config.yml";

const NGINX_CONF: &str = "proxy.nginx.conf";
const PATHS_DIR: &str = "_paths";
const NGINX_IMAGE: &str = "nginx";

const DEFAULT_NGINX_CONF: &str = r"events {}

http {
    server {
        listen 80;

        include /etc/nginx/_paths/*.conf;
    }
}
";

/// `proxy.config.yml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    /// Proxy name.
    pub name: String,
    /// Proxy settings.
    pub settings: ProxySettings,
}

/// Settings of a local proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxySettings {
    /// Host port nginx listens on.
    pub port: u16,
}

#[derive(Debug)]
pub struct LocalProxy {
    path: PathBuf,
    config: ProxyConfig,
    container: ManagedContainer,
}

impl Component for LocalProxy {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::LocalProxy
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn as_startable(&self) -> Option<&(dyn Startable + 'static)> {
        Some(self)
    }

    fn as_logs(&self) -> Option<&(dyn HasLogs + 'static)> {
        Some(self)
    }

    fn as_http_endpoint(&self) -> Option<&(dyn HasHttpEndpoint + 'static)> {
        Some(self)
    }
}

#[async_trait]
impl Startable for LocalProxy {
    async fn start(&self, _ctx: &TreeContext<'_>) -> Result<ActionResult> {
        let spec = ContainerSpec::new(NGINX_IMAGE)
            .detached()
            .port(self.config.settings.port, 80)
            .volume(self.path.join(NGINX_CONF), "/etc/nginx/nginx.conf")
            .volume(self.path.join(PATHS_DIR), "/etc/nginx/_paths");
        self.container.start(spec).await
    }

    async fn stop(&self) -> Result<ActionResult> {
        self.container.stop().await
    }
}

#[async_trait]
impl HasLogs for LocalProxy {
    async fn logs(&self) -> Result<ActionResult> {
        self.container.logs().await
    }
}

impl HasHttpEndpoint for LocalProxy {
    fn base_url(&self) -> &str {
        "/"
    }

    fn port(&self) -> u16 {
        self.config.settings.port
    }
}

/// Finds `proxy.config.yml`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalProxyType;

impl LocalProxyType {
    fn proxy(dir: &Path, config: ProxyConfig, settings: &ProjectSettings, collaborators: &Collaborators) -> LocalProxy {
        let name = container_name(settings.project_name(), &format!("proxy-{}", config.name));
        LocalProxy {
            path: dir.to_path_buf(),
            container: ManagedContainer::new(name, collaborators.runner.clone()),
            config,
        }
    }
}

#[async_trait]
impl ComponentType for LocalProxyType {
    fn kind(&self) -> ComponentKind {
        ComponentKind::LocalProxy
    }

    async fn discover(
        &self,
        dir: &Path,
        settings: &ProjectSettings,
        collaborators: &Collaborators,
    ) -> Result<Vec<Arc<dyn Component>>> {
        Ok(read_config::<ProxyConfig>(&dir.join(CONFIG_FILE))
            .await?
            .map(|config| Arc::new(Self::proxy(dir, config, settings, collaborators)) as Arc<dyn Component>)
            .into_iter()
            .collect())
    }

    async fn materialize(
        &self,
        dir: &Path,
        data: &CreationData,
        settings: &ProjectSettings,
        collaborators: &Collaborators,
    ) -> Result<Option<Arc<dyn Component>>> {
        let CreationData::LocalProxy {
            name,
            port,
        } = data
        else {
            return Ok(None);
        };

        let file = dir.join(CONFIG_FILE);
        ensure_absent(&file, self.kind(), name)?;

        let port = match port {
            Some(port) => *port,
            None => {
                let answer = collaborators.prompter.ask(&format!("Port for proxy {name}:"))?;
                answer.trim().parse().map_err(|_| DcError::InvalidCreationData {
                    kind: self.kind().to_string(),
                    reason: format!("'{answer}' is not a valid port"),
                })?
            }
        };

        let config = ProxyConfig {
            name: name.clone(),
            settings: ProxySettings {
                port,
            },
        };
        write_config(&file, &config).await?;
        fs::write(dir.join(NGINX_CONF), DEFAULT_NGINX_CONF)
            .await
            .with_context(|| format!("Failed to write {NGINX_CONF} in {}", dir.display()))?;
        fs::create_dir_all(dir.join(PATHS_DIR)).await?;

        Ok(Some(Arc::new(Self::proxy(dir, config, settings, collaborators))))
    }
}

fn path_file(dir: &Path, port: u16) -> PathBuf {
    dir.join(PATHS_DIR).join(format!("{port}-path.conf"))
}

/// Routes `base_url` of the proxy at `dir` to the endpoint on `port`.
///
/// # Errors
///
/// Fails when `dir` holds no proxy.
pub async fn add_proxy_path(dir: &Path, base_url: &str, port: u16) -> Result<()> {
    if !dir.join(CONFIG_FILE).exists() {
        return Err(DcError::Other {
            message: format!("There is no proxy configured at {}", dir.display()),
        }
        .into());
    }

    let base = base_url.trim().trim_matches('/');
    let location = if base.is_empty() { "/".to_string() } else { format!("/{base}/") };
    let content = format!(
        "location {location} {{\n    proxy_pass http://host.docker.internal:{port}/;\n    proxy_set_header Host $host;\n}}\n"
    );

    let file = path_file(dir, port);
    fs::create_dir_all(dir.join(PATHS_DIR)).await?;
    fs::write(&file, content).await.with_context(|| format!("Failed to write {}", file.display()))
}

struct ProxyPlan {
    node: NodeId,
    dir: PathBuf,
    name: String,
    endpoints: Vec<(String, u16)>,
}

/// Puts a proxy in front of every topmost endpoint that has endpoints
/// beneath it, and routes each of them through it.
///
/// Proxies are created where missing; their port is prompted for unless
/// `assign_ports`, which picks a free one. Returns the number of routes
/// written; existing routes are kept.
pub async fn auto_proxy(
    tree: &mut ComponentTree,
    node: NodeId,
    types: &ComponentTypes,
    settings: &mut ProjectSettings,
    collaborators: &Collaborators,
    assign_ports: bool,
) -> Result<usize> {
    let plans: Vec<ProxyPlan> = tree
        .find_all_first_level::<dyn HasHttpEndpoint>(node)
        .into_iter()
        .filter(|top| top.component.kind() != ComponentKind::LocalProxy)
        .filter_map(|top| {
            let endpoints: Vec<(String, u16)> = tree
                .find_all::<dyn HasHttpEndpoint>(top.node, Direction::In)
                .into_iter()
                .filter(|e| e.component.kind() != ComponentKind::LocalProxy)
                .map(|e| (e.component.base_url().to_string(), e.component.port()))
                .collect();
            // a lone endpoint needs no proxy
            if endpoints.len() < 2 {
                return None;
            }
            Some(ProxyPlan {
                node: top.node,
                dir: tree.path(top.node).to_path_buf(),
                name: top.component.name().to_string(),
                endpoints,
            })
        })
        .collect();

    let mut written = 0;
    for plan in plans {
        if !plan.dir.join(CONFIG_FILE).exists() {
            let port = if assign_ports { Some(free_port().await?) } else { None };
            let data = CreationData::LocalProxy {
                name: plan.name.clone(),
                port,
            };
            tree.initialize(plan.node, &data, types, settings, collaborators).await?;
        }

        for (base_url, port) in &plan.endpoints {
            if path_file(&plan.dir, *port).exists() {
                tracing::debug!("{} already routes port {port}", plan.name);
                continue;
            }
            add_proxy_path(&plan.dir, base_url, *port).await?;
            written += 1;
        }
    }

    Ok(written)
}

async fn free_port() -> Result<u16> {
    let listener =
        tokio::net::TcpListener::bind("127.0.0.1:0").await.context("Failed to find a free port")?;
    Ok(listener.local_addr()?.port())
}
