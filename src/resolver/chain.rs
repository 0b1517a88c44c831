use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{DOWNSTREAM_LOCALHOST, DOWNSTREAM_NONE, Settings};
use crate::resolver::forward::{ForwardOptions, ForwardingResolver};
use crate::resolver::multi::MultiResolver;
use crate::resolver::recorder::RecorderResolver;
use crate::resolver::replay::ReplayResolver;
use crate::resolver::system::SystemResolver;
use crate::resolver::Resolver;
use crate::rules::RuleStore;

/// Inputs for [`build_chain`].
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub downstreams: Vec<String>,
    pub record: bool,
    pub forward: ForwardOptions,
    pub resolv_conf: Option<PathBuf>,
}

impl ChainConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            downstreams: settings.downstreams(),
            record: settings.record,
            forward: settings.forward_options(),
            resolv_conf: Some(settings.resolv_conf.clone()),
        }
    }
}

/// The assembled resolver plus the store recordings go into, if any.
pub struct Chain {
    pub resolver: Arc<dyn Resolver>,
    pub recording: Option<Arc<RuleStore>>,
}

/// Turn configuration into a resolver graph.
///
/// A non-empty `rules` store is replayed first, then each downstream in
/// order: `none` adds nothing, `localhost` the system resolver, anything else
/// is an upstream address. With recording on, the whole chain is wrapped in
/// a recorder writing into `rules` (or a fresh store). Nothing here does I/O.
pub fn build_chain(cfg: &ChainConfig, rules: Option<Arc<RuleStore>>) -> Chain {
    let mut resolvers: Vec<Arc<dyn Resolver>> = Vec::new();

    if let Some(store) = rules.as_ref().filter(|s| !s.is_empty()) {
        resolvers.push(Arc::new(ReplayResolver::new(store.clone())));
    }

    for downstream in &cfg.downstreams {
        match downstream.as_str() {
            DOWNSTREAM_NONE => continue,
            DOWNSTREAM_LOCALHOST => resolvers.push(Arc::new(SystemResolver::new(
                cfg.resolv_conf.as_deref(),
                cfg.forward,
            ))),
            server => resolvers.push(Arc::new(ForwardingResolver::new(server, cfg.forward))),
        }
    }
    let multi = MultiResolver::new(resolvers);

    if cfg.record {
        let store = rules.unwrap_or_default();
        Chain {
            resolver: Arc::new(RecorderResolver::new(multi, store.clone())),
            recording: Some(store),
        }
    } else {
        Chain {
            resolver: Arc::new(multi),
            recording: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::testing::{first_a, make_question, spawn_record_upstream, spawn_upstream};
    use crate::rules::Rule;
    use hickory_proto::rr::{Name, RData, Record, RecordType};
    use hickory_proto::serialize::txt::RDataParser;
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    fn google_store() -> Arc<RuleStore> {
        Arc::new(RuleStore::from_rules(vec![
            Rule::new("google.com.").with_records("A", &["google.com. 300 IN A 4.3.2.1"]),
        ]))
    }

    fn cfg(downstreams: &str, record: bool) -> ChainConfig {
        let settings = Settings {
            downstreams: downstreams.to_string(),
            record,
            ..Default::default()
        };
        ChainConfig::from_settings(&settings)
    }

    #[test]
    fn none_leaves_only_replay() {
        let chain = build_chain(&cfg("none", false), Some(google_store()));
        assert_eq!(chain.resolver.describe(), "multi[replay]");
        assert!(chain.recording.is_none());
    }

    #[test]
    fn explicit_servers_with_recording() {
        let store = google_store();
        let chain = build_chain(&cfg("8.8.8.8,1.1.1.1:53", true), Some(store.clone()));
        assert_eq!(
            chain.resolver.describe(),
            "recorder(multi[replay, forward(8.8.8.8:53), forward(1.1.1.1:53)])"
        );
        let recording = chain.recording.expect("recording store");
        assert!(Arc::ptr_eq(&recording, &store));
    }

    #[test]
    fn explicit_servers_without_recording() {
        let chain = build_chain(&cfg("8.8.8.8,1.1.1.1:53", false), Some(google_store()));
        assert_eq!(
            chain.resolver.describe(),
            "multi[replay, forward(8.8.8.8:53), forward(1.1.1.1:53)]"
        );
    }

    #[test]
    fn localhost_selects_system_config() {
        let chain = build_chain(&cfg("localhost", false), Some(google_store()));
        assert_eq!(
            chain.resolver.describe(),
            "multi[replay, system(/etc/resolv.conf)]"
        );
    }

    #[test]
    fn empty_store_is_not_replayed_but_still_recorded_into() {
        let store = Arc::new(RuleStore::new());
        let chain = build_chain(&cfg("8.8.8.8", true), Some(store.clone()));
        assert_eq!(chain.resolver.describe(), "recorder(multi[forward(8.8.8.8:53)])");
        assert!(Arc::ptr_eq(&chain.recording.unwrap(), &store));
    }

    #[test]
    fn recording_without_store_gets_a_fresh_one() {
        let chain = build_chain(&cfg("none", true), None);
        assert_eq!(chain.resolver.describe(), "recorder(multi[])");
        assert!(chain.recording.expect("store").is_empty());
    }

    #[tokio::test]
    async fn replay_wins_over_downstream_and_misses_are_recorded() {
        let upstream = spawn_upstream(vec!["bing.com."], Ipv4Addr::new(9, 9, 9, 9)).await;
        let store = google_store();
        let chain = build_chain(&cfg(&upstream.to_string(), true), Some(store.clone()));

        let res = chain
            .resolver
            .resolve(&make_question("google.com.", RecordType::A))
            .await
            .unwrap()
            .expect("replayed");
        assert_eq!(first_a(&res), Some(Ipv4Addr::new(4, 3, 2, 1)));
        assert_eq!(store.len(), 1);

        let res = chain
            .resolver
            .resolve(&make_question("bing.com.", RecordType::A))
            .await
            .unwrap()
            .expect("forwarded");
        assert_eq!(first_a(&res), Some(Ipv4Addr::new(9, 9, 9, 9)));
        assert_eq!(store.len(), 2);

        // the recorded answer is now replayed
        let replayed = store.find("bing.com.", RecordType::A).unwrap().unwrap();
        assert_eq!(replayed, res.answers().to_vec());
    }

    #[tokio::test]
    async fn recorded_records_of_any_type_replay() {
        let owner = Name::from_str("host.test.").unwrap();
        let hinfo = Record::from_rdata(
            owner.clone(),
            60,
            RData::try_from_str(RecordType::HINFO, "cpu os").unwrap(),
        );
        let caa = Record::from_rdata(
            owner,
            60,
            RData::try_from_str(RecordType::CAA, "0 issue \"letsencrypt.org\"").unwrap(),
        );

        let store = Arc::new(RuleStore::new());
        for (rtype, record) in [(RecordType::HINFO, hinfo), (RecordType::CAA, caa)] {
            let upstream = spawn_record_upstream(vec![record.clone()]).await;
            let recording = build_chain(&cfg(&upstream.to_string(), true), Some(store.clone()));
            let q = make_question("host.test.", rtype);
            recording.resolver.resolve(&q).await.unwrap().expect("recorded");

            let replay = build_chain(&cfg("none", false), Some(store.clone()));
            let res = replay.resolver.resolve(&q).await.unwrap().expect("replayed");
            assert_eq!(res.answers(), &[record]);
        }
        assert_eq!(store.len(), 1);
        assert_eq!(store.rules()[0].records.len(), 2);
    }
}
