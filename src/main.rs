mod config;
mod error;
mod proto_utils;
mod reload;
mod resolver;
mod rules;
mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Settings, load_settings};
use crate::resolver::chain::{ChainConfig, build_chain};
use crate::rules::RuleStore;
use crate::server::{Proxy, bind_udp, run_udp_worker};

#[derive(Parser, Debug)]
#[command(author, version, about = "dnsmock: mock, record and replay DNS answers", long_about = None)]
struct Args {
    /// Settings file (JSON, optional)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
    /// UDP listen address
    #[arg(long = "listen")]
    listen: Option<String>,
    /// Comma-separated downstreams; `localhost` uses the system config, `none` forwards nowhere
    #[arg(long = "downstreams")]
    downstreams: Option<String>,
    /// Record downstream answers
    #[arg(long = "record", default_value_t = false)]
    record: bool,
    /// Rule file to replay
    #[arg(long = "replay-file")]
    replay_file: Option<PathBuf>,
    /// Where to write the recording (stdout if unset)
    #[arg(long = "record-file")]
    record_file: Option<PathBuf>,
    /// Enable debug logging
    #[arg(short = 'v', long = "debug", default_value_t = false)]
    debug: bool,
    /// Number of UDP workers (defaults to CPU count)
    #[arg(long = "udp-workers")]
    udp_workers: Option<usize>,
}

impl Args {
    fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => load_settings(path).context("load config")?,
            None => Settings::default(),
        };
        if let Some(listen) = &self.listen {
            settings.listen_addr = listen.clone();
        }
        if let Some(downstreams) = &self.downstreams {
            settings.downstreams = downstreams.clone();
        }
        if self.record {
            settings.record = true;
        }
        if self.replay_file.is_some() {
            settings.replay_file = self.replay_file.clone();
        }
        if self.record_file.is_some() {
            settings.record_file = self.record_file.clone();
        }
        if let Some(workers) = self.udp_workers {
            settings.udp_workers = workers;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let settings = args.settings()?;
    let bind_addr: SocketAddr = settings.listen_addr.parse().context("parse listen addr")?;

    let store = match &settings.replay_file {
        Some(path) => Some(Arc::new(RuleStore::from_file(path).context("load replay rules")?)),
        None if settings.wants_store() => Some(Arc::new(RuleStore::new())),
        None => None,
    };

    let chain = build_chain(&ChainConfig::from_settings(&settings), store);
    info!(chain = %chain.resolver.describe(), "resolver chain built");

    let udp_workers = if settings.udp_workers > 0 {
        settings.udp_workers
    } else {
        num_cpus::get()
    };
    let sockets = bind_udp(bind_addr, udp_workers)?;
    let local = sockets[0].local_addr()?;
    info!(bind_udp = %local, udp_workers = sockets.len(), "dns server started");

    let proxy = Proxy::new(chain.resolver.clone());
    let mut udp_handles = Vec::with_capacity(sockets.len());
    for (worker_id, socket) in sockets.into_iter().enumerate() {
        let proxy = proxy.clone();
        udp_handles.push(tokio::spawn(async move {
            if let Err(err) = run_udp_worker(worker_id, Arc::new(socket), proxy).await {
                error!(worker_id, error = %err, "udp worker exited");
            }
        }));
    }

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("stopping dns server");
    for h in &udp_handles {
        h.abort();
    }

    if let Some(store) = chain.recording {
        persist_recording(&store, settings.record_file.as_deref())?;
    }
    Ok(())
}

fn persist_recording(store: &RuleStore, path: Option<&std::path::Path>) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            store.write_file(path)?;
            info!(path = %path.display(), rules = store.len(), "recording written");
        }
        None => println!("{}", store.to_json()?),
    }
    Ok(())
}

fn init_tracing(debug: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_level(true);

    let level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_defaults() {
        let args = Args::parse_from([
            "dnsmock",
            "--downstreams",
            "none",
            "--record",
            "--record-file",
            "/tmp/out.json",
            "--listen",
            "127.0.0.1:0",
        ]);
        let settings = args.settings().unwrap();
        assert_eq!(settings.downstreams(), vec!["none"]);
        assert!(settings.record);
        assert_eq!(settings.record_file, Some(PathBuf::from("/tmp/out.json")));
        assert_eq!(settings.listen_addr, "127.0.0.1:0");
        assert!(settings.wants_store());
    }

    #[test]
    fn defaults_use_system_resolver() {
        let args = Args::parse_from(["dnsmock"]);
        let settings = args.settings().unwrap();
        assert_eq!(settings.downstreams(), vec!["localhost"]);
        assert!(!settings.record);
    }

    #[test]
    fn persist_recording_writes_file() {
        let path = std::env::temp_dir().join(format!("dnsmock-persist-{}.json", std::process::id()));
        let store = RuleStore::new();
        store.add(
            "google.com.",
            hickory_proto::rr::RecordType::A,
            vec!["google.com. 300 IN A 4.3.2.1".into()],
        );
        persist_recording(&store, Some(&path)).unwrap();
        let loaded = RuleStore::from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(*loaded.rules(), *store.rules());
    }
}
