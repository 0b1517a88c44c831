use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hickory_proto::op::Message;
use hickory_proto::rr::Name;
use tracing::debug;

use crate::error::ResolveError;
use crate::proto_utils::{canonical_name, first_query, reply_to, with_query_name};
use crate::reload::ModTimeCache;
use crate::resolver::forward::{ForwardOptions, ForwardingResolver, normalize_server};
use crate::resolver::Resolver;

pub const DEFAULT_RESOLV_CONF: &str = "/etc/resolv.conf";
const FALLBACK_NAMESERVER: &str = "127.0.0.1";

/// Servers and search list read from a resolv.conf style file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemConfig {
    pub servers: Vec<String>,
    pub search: Vec<String>,
}

impl SystemConfig {
    pub fn parse(path: &Path, raw: &str, default_port: u16) -> Result<Self, ResolveError> {
        let mut servers = Vec::new();
        let mut search = Vec::new();

        for (idx, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let Some(keyword) = fields.next() else {
                continue;
            };
            match keyword {
                "nameserver" => {
                    let server = fields.next().ok_or_else(|| ResolveError::ConfigParse {
                        path: path.to_path_buf(),
                        line: idx + 1,
                        reason: "nameserver without address".to_string(),
                    })?;
                    servers.push(normalize_server(server, default_port));
                }
                // the last search/domain line wins
                "search" | "domain" => {
                    search = fields.map(|s| s.trim_matches('.').to_ascii_lowercase()).collect();
                }
                _ => {}
            }
        }

        if servers.is_empty() {
            servers.push(normalize_server(FALLBACK_NAMESERVER, default_port));
        }
        Ok(Self { servers, search })
    }

    /// Candidate names for `name`: the name itself, then one per search suffix.
    pub fn name_list(&self, name: &str) -> Vec<String> {
        let name = canonical_name(name);
        let mut names = Vec::with_capacity(self.search.len() + 1);
        names.push(name.clone());
        for suffix in self.search.iter().filter(|s| !s.is_empty()) {
            names.push(format!("{name}{suffix}."));
        }
        names
    }
}

/// Resolves through the servers and search list of the local resolver
/// configuration, re-reading it whenever the file changes.
pub struct SystemResolver {
    config: ModTimeCache<SystemConfig>,
    opts: ForwardOptions,
}

impl SystemResolver {
    pub fn new(path: Option<&Path>, opts: ForwardOptions) -> Self {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RESOLV_CONF));
        Self {
            config: ModTimeCache::new(path),
            opts,
        }
    }

    pub fn path(&self) -> &Path {
        self.config.path()
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, request: &Message) -> Result<Option<Message>, ResolveError> {
        let default_port = self.opts.default_port;
        let config = self
            .config
            .get_or_reload(|path, raw| SystemConfig::parse(path, raw, default_port))
            .await?;

        let Some(query) = first_query(request) else {
            return Ok(None);
        };
        let names = config.name_list(&query.name().to_ascii());
        debug!(
            target = "system",
            qname = %query.name(),
            names = ?names,
            servers = ?config.servers,
            "resolving via system config"
        );

        for server in &config.servers {
            let forward = ForwardingResolver::new(server, self.opts);
            for candidate in &names {
                let Ok(name) = Name::from_ascii(candidate) else {
                    continue;
                };
                let aliased = with_query_name(request, name);
                let response = match forward.resolve(&aliased).await {
                    Ok(Some(response)) => response,
                    Ok(None) => continue,
                    Err(err) => {
                        debug!(target = "system", server = %server, qname = %candidate, error = %err, "candidate failed");
                        continue;
                    }
                };
                if response.answers().is_empty() {
                    continue;
                }
                // answer under the question that was actually asked
                let mut reply = reply_to(request);
                reply.set_response_code(response.response_code());
                reply.add_answers(response.answers().iter().cloned());
                return Ok(Some(reply));
            }
        }

        debug!(target = "system", qname = %query.name(), "no server had an answer");
        Ok(None)
    }

    fn describe(&self) -> String {
        format!("system({})", self.path().display())
    }
}
