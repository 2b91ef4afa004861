//! Result aggregation
//!
//! Runs the requested stages in a fixed order (passive, active, cloud, ml,
//! plugin), merges each stage's output into one [`AggregateRecord`] per
//! target, then hands non-empty records to the report emitter.
//!
//! Gating rules:
//! - passive runs when asked for, or when none of active/cloud/ml/report is
//! - ml runs only for targets whose record already holds `passive`
//! - report runs only for targets with a non-empty record

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use aref_core::{AggregateRecord, Profile, Target};
use aref_stages::{MlAnalyzer, PluginRegistry, ReportEmitter, ReportOptions, Stage};

use crate::{run_parallel, StatusPrinter};

/// Key the plugin output is stored under
pub const PLUGIN_KEY: &str = "plugin";

/// Which stages a run asks for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconPlan {
    pub passive: bool,
    pub active: bool,
    pub cloud: bool,
    pub ml: bool,
    pub report: bool,
    pub plugin: Option<String>,
}

impl ReconPlan {
    /// Passive is the default stage when nothing else is selected
    pub fn runs_passive(&self) -> bool {
        self.passive || !(self.active || self.cloud || self.ml || self.report)
    }
}

/// Runs a [`ReconPlan`] against one or more targets
pub struct Orchestrator {
    profile: Arc<Profile>,
    passive: Option<Arc<dyn Stage>>,
    active: Option<Arc<dyn Stage>>,
    cloud: Option<Arc<dyn Stage>>,
    ml: Option<Arc<MlAnalyzer>>,
    plugins: PluginRegistry,
    reporter: Option<Arc<dyn ReportEmitter>>,
    status: StatusPrinter,
}

impl Orchestrator {
    pub fn new(profile: Arc<Profile>) -> Self {
        Self {
            profile,
            passive: None,
            active: None,
            cloud: None,
            ml: None,
            plugins: PluginRegistry::default(),
            reporter: None,
            status: StatusPrinter::default(),
        }
    }

    pub fn with_passive(mut self, stage: Arc<dyn Stage>) -> Self {
        self.passive = Some(stage);
        self
    }

    pub fn with_active(mut self, stage: Arc<dyn Stage>) -> Self {
        self.active = Some(stage);
        self
    }

    pub fn with_cloud(mut self, stage: Arc<dyn Stage>) -> Self {
        self.cloud = Some(stage);
        self
    }

    pub fn with_ml(mut self, analyzer: Arc<MlAnalyzer>) -> Self {
        self.ml = Some(analyzer);
        self
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ReportEmitter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_status(mut self, status: StatusPrinter) -> Self {
        self.status = status;
        self
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Run the plan against a single target
    pub async fn run(&self, target: &Target, plan: &ReconPlan) -> AggregateRecord {
        self.run_many(std::slice::from_ref(target), plan)
            .await
            .remove(target)
            .unwrap_or_default()
    }

    /// Run the plan against every target, one record per target
    pub async fn run_many(
        &self,
        targets: &[Target],
        plan: &ReconPlan,
    ) -> HashMap<Target, AggregateRecord> {
        let run_id = Uuid::new_v4();
        let span = info_span!("recon", run = %run_id, profile = %self.profile.name);

        async {
            let mut records: HashMap<Target, AggregateRecord> = targets
                .iter()
                .map(|target| (target.clone(), AggregateRecord::new()))
                .collect();

            if plan.runs_passive() {
                self.scheduled("passive", self.passive.clone(), targets, &mut records)
                    .await;
            }
            if plan.active {
                self.scheduled("active", self.active.clone(), targets, &mut records)
                    .await;
            }
            if plan.cloud {
                self.scheduled("cloud", self.cloud.clone(), targets, &mut records)
                    .await;
            }
            if plan.ml {
                self.analyze(&mut records).await;
            }
            if let Some(name) = &plan.plugin {
                self.plugin(name, targets, &mut records).await;
            }
            if plan.report {
                self.report(&records).await;
            }

            info!(
                "Run finished: {} of {} targets produced output",
                records.values().filter(|r| !r.is_empty()).count(),
                records.len()
            );
            records
        }
        .instrument(span)
        .await
    }

    async fn merge(
        &self,
        key: &str,
        stage: Arc<dyn Stage>,
        targets: &[Target],
        records: &mut HashMap<Target, AggregateRecord>,
    ) {
        let output = run_parallel(targets.iter().cloned(), stage, self.profile.clone()).await;
        for (target, result) in output {
            if let Some(record) = records.get_mut(&target) {
                record.insert(key, result);
            }
        }
    }

    async fn scheduled(
        &self,
        name: &str,
        stage: Option<Arc<dyn Stage>>,
        targets: &[Target],
        records: &mut HashMap<Target, AggregateRecord>,
    ) {
        let Some(stage) = stage else {
            warn!("No {} stage configured, skipping", name);
            return;
        };
        self.status.line(&format!("Running {name} recon..."));
        self.merge(name, stage, targets, records).await;
    }

    async fn analyze(&self, records: &mut HashMap<Target, AggregateRecord>) {
        let Some(analyzer) = &self.ml else {
            warn!("No ML analyzer configured, skipping");
            return;
        };

        let ready: Vec<(Target, _)> = records
            .iter()
            .filter_map(|(target, record)| {
                record.get("passive").map(|passive| (target.clone(), passive.clone()))
            })
            .collect();
        if ready.is_empty() {
            return;
        }

        self.status.line("Analyzing with ML...");
        let analyses = join_all(
            ready
                .iter()
                .map(|(_, passive)| analyzer.analyze(passive, &self.profile)),
        )
        .await;

        for ((target, _), analysis) in ready.into_iter().zip(analyses) {
            if let Some(record) = records.get_mut(&target) {
                record.insert("ml", analysis);
            }
        }
    }

    async fn plugin(
        &self,
        name: &str,
        targets: &[Target],
        records: &mut HashMap<Target, AggregateRecord>,
    ) {
        let Some(stage) = self.plugins.get(name) else {
            warn!(
                "Unknown plugin '{}' (available: {})",
                name,
                self.plugins.names().collect::<Vec<_>>().join(", ")
            );
            return;
        };
        self.status.line(&format!("Running plugin: {name}"));
        self.merge(PLUGIN_KEY, stage, targets, records).await;
    }

    async fn report(&self, records: &HashMap<Target, AggregateRecord>) {
        let Some(reporter) = &self.reporter else {
            warn!("No report emitter configured, skipping");
            return;
        };
        let options = ReportOptions {
            verbose: self.status.verbosity().is_verbose(),
        };

        for (target, record) in records.iter().filter(|(_, r)| !r.is_empty()) {
            self.status.line("Generating report...");
            match reporter.emit(target, record, options).await {
                Ok(summary) => self.status.announce(&summary.status_line()),
                Err(e) => self.status.line(&format!("Report failed for {target}: {e}")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aref_core::{StageCache, StageResult};
    use aref_stages::{
        DnsSource, FileReportEmitter, HostIntel, HostIntelSource, LinearScorer, PassiveRecon,
        StageError, WhoisSource,
    };
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;

    struct Fixed(&'static str, Value);

    #[async_trait]
    impl Stage for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn run(&self, target: &Target, _: &Profile) -> Result<StageResult, StageError> {
            Ok(StageResult::new()
                .with("target", target.as_str())
                .with("data", self.1.clone()))
        }
    }

    struct Failing(&'static str);

    #[async_trait]
    impl Stage for Failing {
        fn name(&self) -> &str {
            self.0
        }

        async fn run(&self, _: &Target, _: &Profile) -> Result<StageResult, StageError> {
            Err(StageError::Network("unreachable".to_string()))
        }
    }

    struct DownIntel;

    #[async_trait]
    impl HostIntelSource for DownIntel {
        fn source(&self) -> &str {
            "shodan"
        }

        async fn host(&self, _: &Target, _: &Profile) -> Result<HostIntel, StageError> {
            Err(StageError::Network("API error".to_string()))
        }
    }

    struct NoWhois;

    #[async_trait]
    impl WhoisSource for NoWhois {
        async fn whois(&self, _: &Target, _: &Profile) -> Result<Value, StageError> {
            Ok(json!({}))
        }
    }

    struct StaticDns;

    #[async_trait]
    impl DnsSource for StaticDns {
        async fn records(&self, _: &Target, record_type: &str) -> Result<Vec<String>, StageError> {
            Ok(vec![format!("{record_type}-record")])
        }
    }

    fn profile() -> Arc<Profile> {
        Arc::new(Profile {
            timeout: Duration::from_secs(5),
            threads: 4,
            cache_ttl: Duration::from_secs(3600),
            ..Default::default()
        })
    }

    fn analyzer() -> Arc<MlAnalyzer> {
        Arc::new(MlAnalyzer::new(Vec::new(), Arc::new(LinearScorer::default())))
    }

    fn target(name: &str) -> Target {
        Target::parse(name).unwrap()
    }

    #[test]
    fn test_passive_is_default() {
        assert!(ReconPlan::default().runs_passive());
        assert!(ReconPlan {
            plugin: Some("http_headers".to_string()),
            ..Default::default()
        }
        .runs_passive());
        assert!(!ReconPlan {
            active: true,
            ..Default::default()
        }
        .runs_passive());
        assert!(!ReconPlan {
            report: true,
            ..Default::default()
        }
        .runs_passive());
    }

    #[tokio::test]
    async fn test_ml_skipped_when_passive_absent() {
        let orchestrator = Orchestrator::new(profile())
            .with_passive(Arc::new(Failing("passive")))
            .with_ml(analyzer());
        let plan = ReconPlan {
            passive: true,
            ml: true,
            ..Default::default()
        };

        let record = orchestrator.run(&target("example.com"), &plan).await;

        assert!(!record.contains("passive"));
        assert!(!record.contains("ml"));
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn test_ml_alone_does_not_run_passive() {
        let orchestrator = Orchestrator::new(profile())
            .with_passive(Arc::new(Fixed("passive", json!({}))))
            .with_ml(analyzer());
        let plan = ReconPlan {
            ml: true,
            ..Default::default()
        };

        let record = orchestrator.run(&target("example.com"), &plan).await;
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn test_shodan_failure_end_to_end() {
        let cache_dir = tempfile::tempdir().unwrap();
        let passive = PassiveRecon::new(
            Arc::new(DownIntel),
            Arc::new(NoWhois),
            Arc::new(StaticDns),
            StageCache::new(cache_dir.path()),
        );
        let orchestrator = Orchestrator::new(profile())
            .with_passive(Arc::new(passive))
            .with_ml(analyzer());
        let plan = ReconPlan {
            passive: true,
            ml: true,
            ..Default::default()
        };

        let record = orchestrator.run(&target("example.com"), &plan).await;

        let passive = record.get("passive").unwrap();
        assert_eq!(passive.pointer("osint.shodan"), Some(&json!({"error": "Network error: API error"})));
        assert_eq!(passive.get("dns").and_then(Value::as_array).map(Vec::len), Some(4));
        assert_eq!(
            record.get("ml").unwrap().get("prediction"),
            Some(&json!({"vulnerability_score": 0.1}))
        );
    }

    #[tokio::test]
    async fn test_failed_stage_is_absent_siblings_survive() {
        let orchestrator = Orchestrator::new(profile())
            .with_passive(Arc::new(Fixed("passive", json!({"dns": []}))))
            .with_active(Arc::new(Failing("active")))
            .with_cloud(Arc::new(Fixed("cloud", json!({"aws": {"instances": 2}}))));
        let plan = ReconPlan {
            passive: true,
            active: true,
            cloud: true,
            ..Default::default()
        };

        let record = orchestrator.run(&target("example.com"), &plan).await;

        assert_eq!(record.stage_names().collect::<Vec<_>>(), vec!["cloud", "passive"]);
    }

    #[tokio::test]
    async fn test_plugin_runs_and_unknown_is_skipped() {
        let plugins = PluginRegistry::builder()
            .register(Arc::new(Fixed("banner", json!("SSH-2.0"))))
            .build()
            .unwrap();
        let orchestrator = Orchestrator::new(profile())
            .with_active(Arc::new(Fixed("active", json!({}))))
            .with_plugins(plugins);

        let known = ReconPlan {
            active: true,
            plugin: Some("banner".to_string()),
            ..Default::default()
        };
        let record = orchestrator.run(&target("example.com"), &known).await;
        assert_eq!(
            record.get(PLUGIN_KEY).unwrap().get("data"),
            Some(&json!("SSH-2.0"))
        );

        let unknown = ReconPlan {
            active: true,
            plugin: Some("nope".to_string()),
            ..Default::default()
        };
        let record = orchestrator.run(&target("example.com"), &unknown).await;
        assert!(!record.contains(PLUGIN_KEY));
        assert!(record.contains("active"));
    }

    #[tokio::test]
    async fn test_report_only_for_non_empty_records() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(profile())
            .with_passive(Arc::new(Fixed("passive", json!({}))))
            .with_reporter(Arc::new(FileReportEmitter::new(dir.path())));

        let empty = ReconPlan {
            report: true,
            ..Default::default()
        };
        let record = orchestrator.run(&target("example.com"), &empty).await;
        assert!(record.is_empty());
        assert!(!dir.path().join("example.com_report.json").exists());

        let with_passive = ReconPlan {
            passive: true,
            report: true,
            ..Default::default()
        };
        orchestrator.run(&target("example.com"), &with_passive).await;
        assert!(dir.path().join("example.com_report.json").exists());
    }

    #[tokio::test]
    async fn test_run_many_single_worker() {
        let orchestrator = Orchestrator::new(Arc::new(Profile {
            threads: 1,
            ..Default::default()
        }))
        .with_passive(Arc::new(Fixed("passive", json!({}))));
        let targets = vec![target("example.com"), target("93.184.216.34")];

        let records = orchestrator.run_many(&targets, &ReconPlan::default()).await;

        assert_eq!(records.len(), 2);
        for t in &targets {
            assert_eq!(
                records[t].get("passive").unwrap().get("target"),
                Some(&json!(t.as_str()))
            );
        }
    }
}
