//! Fetch-and-write cycles for one target
//!
//! A run moves through `Detecting → Planning → Fetching → Writing` and ends
//! in `Completed` or `Failed`. Schema classes are fetched concurrently and
//! written independently; only the data entities class decides whether the
//! target gets linked to the version. A version counts as synced only after a
//! run wrote every class, so partial runs are repeated by later syncs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::CacheConfig;
use crate::error::{RegistryError, SourceError, StoreError, SyncError};
use crate::metadata::labels::{apply_label_texts, unresolved_label_ids};
use crate::metadata::source::MetadataSource;
use crate::metadata::types::{DataEntity, Enumeration, Label, PublicEntity, SchemaClass};
use crate::store::MetadataStore;
use crate::sync::cancel::CancellationToken;
use crate::sync::guard::SyncGuards;
use crate::sync::progress::{ProgressCallback, ProgressReporter, SyncPhase, SyncProgress};
use crate::sync::strategy::SyncStrategy;
use crate::version::detector::VersionDetector;
use crate::version::registry::{GlobalVersion, GlobalVersionRegistry};

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub strategy: SyncStrategy,
    /// Sync into this version instead of detecting one
    pub global_version_id: Option<i64>,
    /// Fetch even when the target is already on a synced version
    pub force: bool,
    pub cancel: CancellationToken,
}

impl SyncOptions {
    pub fn new(strategy: SyncStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn for_version(mut self, global_version_id: i64) -> Self {
        self.global_version_id = Some(global_version_id);
        self
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// What happened to one schema class during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClassOutcome {
    Written { count: usize },
    Failed { error: String },
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub duration_ms: u64,
    pub entity_count: usize,
    pub public_entity_count: usize,
    pub action_count: usize,
    pub enumeration_count: usize,
    pub label_count: usize,
    /// Strategy actually executed (`SharingMode` falls back to `Full`)
    pub strategy: SyncStrategy,
    pub global_version_id: Option<i64>,
    /// True when the target's active link changed
    pub linked: bool,
    pub class_outcomes: BTreeMap<SchemaClass, ClassOutcome>,
    pub error: Option<String>,
}

impl SyncResult {
    fn new(strategy: SyncStrategy) -> Self {
        Self {
            success: false,
            duration_ms: 0,
            entity_count: 0,
            public_entity_count: 0,
            action_count: 0,
            enumeration_count: 0,
            label_count: 0,
            strategy,
            global_version_id: None,
            linked: false,
            class_outcomes: BTreeMap::new(),
            error: None,
        }
    }
}

/// Outcome of [`SyncEngine::check_version`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionCheck {
    pub target_id: i64,
    pub global_version_id: i64,
    pub fingerprint: String,
    /// A new global version row was created by this check
    pub created: bool,
    pub sync_needed: bool,
}

enum Plan {
    /// Reuse an already-synced version
    Link(i64),
    Fetch(SyncStrategy),
}

/// Progress bookkeeping and partial result of one run
struct Run<'a> {
    reporter: &'a ProgressReporter,
    completed_steps: usize,
    total_steps: usize,
    result: SyncResult,
}

impl<'a> Run<'a> {
    fn new(reporter: &'a ProgressReporter, strategy: SyncStrategy) -> Self {
        Self {
            reporter,
            completed_steps: 0,
            // detect, plan, link; class steps are added once planned
            total_steps: 3,
            result: SyncResult::new(strategy),
        }
    }

    fn report(&self, phase: SyncPhase, operation: impl Into<String>) {
        self.reporter.report(&SyncProgress {
            phase,
            current_operation: operation.into(),
            completed_steps: self.completed_steps,
            total_steps: self.total_steps,
        });
    }

    fn advance(&mut self) {
        self.completed_steps = (self.completed_steps + 1).min(self.total_steps);
    }

    fn record(&mut self, class: SchemaClass, outcome: ClassOutcome) {
        self.result.class_outcomes.insert(class, outcome);
    }
}

pub struct SyncEngine {
    store: Arc<MetadataStore>,
    registry: Arc<GlobalVersionRegistry>,
    detector: VersionDetector,
    guards: SyncGuards,
    progress: ProgressReporter,
    fetch_timeout: Duration,
    label_ttl_ms: i64,
    language: String,
}

impl SyncEngine {
    pub fn new(
        store: Arc<MetadataStore>,
        registry: Arc<GlobalVersionRegistry>,
        config: &CacheConfig,
    ) -> Self {
        let fetch_timeout = config.sync.fetch_timeout_duration();
        Self {
            store,
            registry,
            detector: VersionDetector::new(fetch_timeout),
            guards: SyncGuards::new(),
            progress: ProgressReporter::new(),
            fetch_timeout,
            label_ttl_ms: config.labels.ttl,
            language: config.language.clone(),
        }
    }

    pub fn guards(&self) -> &SyncGuards {
        &self.guards
    }

    pub fn on_progress(&self, callback: ProgressCallback) {
        self.progress.subscribe(callback);
    }

    /// Detect the target's version and register it, without fetching schema.
    ///
    /// The only side effects are registering the target and, for an unseen
    /// fingerprint, creating a global version row.
    pub async fn check_version(&self, source: &dyn MetadataSource) -> Result<VersionCheck, SyncError> {
        let target_id = self.registry.ensure_target(&source.base_url())?;
        let detected = self.detector.detect(source).await?;
        let (global_version_id, created) = self
            .registry
            .resolve_or_create(&detected.fingerprint, &detected.modules)?;

        let active = self.registry.active_version(target_id)?;
        let synced = self
            .registry
            .get_version(global_version_id)?
            .is_some_and(|v| v.is_synced());
        let sync_needed = !synced || active.map(|v| v.id) != Some(global_version_id);

        debug!(
            "Version check for target {}: version {} (created: {}, sync needed: {})",
            target_id, global_version_id, created, sync_needed
        );

        Ok(VersionCheck {
            target_id,
            global_version_id,
            fingerprint: detected.fingerprint,
            created,
            sync_needed,
        })
    }

    /// Suggest a strategy for syncing `target_id` to `global_version_id`
    pub fn recommend_sync_strategy(
        &self,
        target_id: i64,
        global_version_id: i64,
    ) -> Result<SyncStrategy, RegistryError> {
        let version = self.registry.get_version(global_version_id)?;
        if version.is_some_and(|v| v.is_synced()) {
            return Ok(SyncStrategy::SharingMode);
        }

        let active = self.registry.active_version(target_id)?;
        if active.is_some_and(|v| v.is_synced()) {
            return Ok(SyncStrategy::Incremental);
        }

        Ok(SyncStrategy::Full)
    }

    /// Run one sync for the source's target.
    ///
    /// Returns `Err(SyncError::AlreadyRunning)` without doing anything when
    /// another run holds the target. Every other failure is reported in the
    /// returned [`SyncResult`].
    pub async fn sync(
        &self,
        source: &dyn MetadataSource,
        options: SyncOptions,
    ) -> Result<SyncResult, SyncError> {
        let target_id = self.registry.ensure_target(&source.base_url())?;
        let Some(_permit) = self.guards.try_acquire(target_id, options.strategy) else {
            return Err(SyncError::AlreadyRunning(target_id));
        };

        info!(
            "Starting {} sync for target {} ({})",
            options.strategy,
            target_id,
            source.base_url()
        );

        let started = Instant::now();
        let mut run = Run::new(&self.progress, options.strategy);
        let outcome = self.run(target_id, source, &options, &mut run).await;

        run.completed_steps = run.total_steps;
        run.result.duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => {
                run.result.success = true;
                run.report(SyncPhase::Completed, "sync completed");
                info!(
                    "Sync for target {} completed in {}ms: {} entities, {} public entities, {} enumerations, {} labels",
                    target_id,
                    run.result.duration_ms,
                    run.result.entity_count,
                    run.result.public_entity_count,
                    run.result.enumeration_count,
                    run.result.label_count
                );
            }
            Err(e) => {
                error!("Sync for target {} failed: {}", target_id, e);
                run.result.error = Some(e.to_string());
                run.report(SyncPhase::Failed, e.to_string());
            }
        }

        Ok(run.result)
    }

    async fn run(
        &self,
        target_id: i64,
        source: &dyn MetadataSource,
        options: &SyncOptions,
        run: &mut Run<'_>,
    ) -> Result<(), SyncError> {
        run.report(SyncPhase::Detecting, "detecting installed modules");
        let version = self.resolve_version(source, options.global_version_id).await?;
        run.result.global_version_id = Some(version.id);
        run.advance();
        options.cancel.check()?;

        let active = self.registry.active_version(target_id)?;
        if !options.force && version.is_synced() && active.map(|v| v.id) == Some(version.id) {
            info!(
                "Target {} is already on synced version {}, nothing to fetch",
                target_id, version.id
            );
            return Ok(());
        }

        run.report(SyncPhase::Planning, "choosing sync strategy");
        let plan = self.plan(options, &version)?;
        run.advance();
        options.cancel.check()?;

        let strategy = match plan {
            Plan::Link(shared_id) => {
                info!(
                    "Sharing synced version {} with target {}",
                    shared_id, target_id
                );
                run.result.global_version_id = Some(shared_id);
                run.report(SyncPhase::Writing, "linking target");
                run.result.linked = self.registry.link_target(target_id, shared_id)?;
                return Ok(());
            }
            Plan::Fetch(strategy) => strategy,
        };
        run.result.strategy = strategy;

        let classes = strategy.classes();
        run.total_steps += classes.len() * 2;
        for class in SchemaClass::ALL {
            if !classes.contains(&class) {
                run.record(class, ClassOutcome::Skipped);
            }
        }

        run.report(
            SyncPhase::Fetching,
            format!(
                "fetching {}",
                classes
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        );
        let wants = |class: SchemaClass| classes.contains(&class);
        let (mut data_entities, mut public_entities, mut enumerations) = futures::join!(
            self.fetch_if(
                wants(SchemaClass::DataEntities),
                SchemaClass::DataEntities,
                source.fetch_data_entities()
            ),
            self.fetch_if(
                wants(SchemaClass::PublicEntities),
                SchemaClass::PublicEntities,
                source.fetch_public_entities()
            ),
            self.fetch_if(
                wants(SchemaClass::Enumerations),
                SchemaClass::Enumerations,
                source.fetch_enumerations()
            ),
        );
        for fetched in [
            data_entities.is_some(),
            public_entities.is_some(),
            enumerations.is_some(),
        ] {
            if fetched {
                run.advance();
            }
        }

        if !strategy.includes_actions() {
            if let Some(Ok(entities)) = public_entities.as_mut() {
                entities.iter_mut().for_each(|e| e.actions.clear());
            }
        }

        let labels = if wants(SchemaClass::Labels) {
            let ids = collect_label_ids(&data_entities, &public_entities, &enumerations);
            let labels = self.fetch_labels(source, ids).await;
            run.advance();
            Some(labels)
        } else {
            None
        };

        if let Some(Ok(resolved)) = &labels {
            if let Some(Ok(items)) = data_entities.as_mut() {
                apply_label_texts(items, resolved);
            }
            if let Some(Ok(items)) = public_entities.as_mut() {
                apply_label_texts(items, resolved);
            }
            if let Some(Ok(items)) = enumerations.as_mut() {
                apply_label_texts(items, resolved);
            }
        }

        options.cancel.check()?;

        let version_id = version.id;
        let mut entities_error = None;

        if let Some(fetched) = data_entities {
            run.report(SyncPhase::Writing, "writing data entities");
            let written = self.write_class(run, &options.cancel, SchemaClass::DataEntities, fetched, |items| {
                self.store.upsert_data_entities(version_id, items)
            })?;
            match written {
                Ok(count) => run.result.entity_count = count,
                Err(e) => entities_error = Some(e),
            }
            run.advance();
        }

        if let Some(fetched) = public_entities {
            run.report(SyncPhase::Writing, "writing public entities");
            let action_count = fetched
                .as_ref()
                .map(|items| items.iter().map(|e| e.actions.len()).sum())
                .unwrap_or(0);
            let written = self.write_class(run, &options.cancel, SchemaClass::PublicEntities, fetched, |items| {
                if strategy.includes_actions() {
                    self.store.upsert_public_entities(version_id, items)
                } else {
                    self.store.upsert_public_entities_without_actions(version_id, items)
                }
            })?;
            if let Ok(count) = written {
                run.result.public_entity_count = count;
                run.result.action_count = action_count;
            }
            run.advance();
        }

        if let Some(fetched) = enumerations {
            run.report(SyncPhase::Writing, "writing enumerations");
            let written = self.write_class(run, &options.cancel, SchemaClass::Enumerations, fetched, |items| {
                self.store.upsert_enumerations(version_id, items)
            })?;
            if let Ok(count) = written {
                run.result.enumeration_count = count;
            }
            run.advance();
        }

        if let Some(fetched) = labels {
            run.report(SyncPhase::Writing, "writing labels");
            let language = self.language.clone();
            let fetched = fetched.map(|resolved| {
                resolved
                    .into_iter()
                    .map(|(id, value)| Label {
                        id,
                        language: language.clone(),
                        value,
                    })
                    .collect::<Vec<_>>()
            });
            let written = self.write_class(run, &options.cancel, SchemaClass::Labels, fetched, |items| {
                self.store.upsert_labels(version_id, items, self.label_ttl_ms)
            })?;
            if let Ok(count) = written {
                run.result.label_count = count;
            }
            run.advance();
        }

        if let Some(e) = entities_error {
            warn!(
                "Data entities failed for version {}, target {} keeps its current link",
                version_id, target_id
            );
            return Err(e);
        }
        options.cancel.check()?;

        run.report(SyncPhase::Writing, "linking target");
        run.result.linked = self.registry.link_target(target_id, version_id)?;

        let all_written = classes.iter().all(|class| {
            matches!(
                run.result.class_outcomes.get(class),
                Some(ClassOutcome::Written { .. })
            )
        });
        if strategy.is_complete() && all_written {
            self.registry.mark_synced(version_id)?;
        } else {
            info!(
                "Version {} is incomplete after {} sync, later syncs will fetch it again",
                version_id, strategy
            );
        }
        run.advance();

        Ok(())
    }

    async fn resolve_version(
        &self,
        source: &dyn MetadataSource,
        requested: Option<i64>,
    ) -> Result<GlobalVersion, SyncError> {
        let version_id = match requested {
            Some(id) => id,
            None => {
                let detected = self.detector.detect(source).await?;
                self.registry
                    .resolve_or_create(&detected.fingerprint, &detected.modules)?
                    .0
            }
        };

        let version = self
            .registry
            .get_version(version_id)?
            .ok_or(RegistryError::UnknownVersion(version_id))?;
        Ok(version)
    }

    fn plan(&self, options: &SyncOptions, version: &GlobalVersion) -> Result<Plan, SyncError> {
        match options.strategy {
            SyncStrategy::SharingMode if !options.force => {
                let compatible = self.registry.find_compatible(&version.modules, true)?;
                if let Some(shared) = compatible.iter().find(|v| v.is_synced()) {
                    return Ok(Plan::Link(shared.id));
                }
                debug!(
                    "No synced version shares fingerprint {}, falling back to full sync",
                    version.fingerprint
                );
                Ok(Plan::Fetch(SyncStrategy::Full))
            }
            SyncStrategy::SharingMode => Ok(Plan::Fetch(SyncStrategy::Full)),
            SyncStrategy::Incremental => {
                debug!("Incremental sync runs as a full sync");
                Ok(Plan::Fetch(SyncStrategy::Incremental))
            }
            strategy => Ok(Plan::Fetch(strategy)),
        }
    }

    async fn fetch_if<T, F>(
        &self,
        wanted: bool,
        class: SchemaClass,
        fetch: F,
    ) -> Option<Result<Vec<T>, SyncError>>
    where
        F: Future<Output = Result<Vec<T>, SourceError>>,
    {
        if !wanted {
            return None;
        }
        Some(self.fetch_class(class, fetch).await)
    }

    async fn fetch_class<T, F>(&self, class: SchemaClass, fetch: F) -> Result<T, SyncError>
    where
        F: Future<Output = Result<T, SourceError>>,
    {
        let result = match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(Ok(items)) => Ok(items),
            Ok(Err(source)) => Err(SyncError::Fetch { class, source }),
            Err(_) => Err(SyncError::Timeout {
                class,
                timeout: self.fetch_timeout,
            }),
        };
        result.inspect_err(|e| warn!("{}", e))
    }

    async fn fetch_labels(
        &self,
        source: &dyn MetadataSource,
        ids: Vec<String>,
    ) -> Result<HashMap<String, String>, SyncError> {
        if ids.is_empty() {
            return Ok(Default::default());
        }
        debug!("Resolving {} label ids in {}", ids.len(), self.language);
        self.fetch_class(
            SchemaClass::Labels,
            source.fetch_labels_batch(&ids, &self.language),
        )
        .await
    }

    /// Write one fetched class and record its outcome.
    ///
    /// The outer error stops the run (cancellation); the inner one is the
    /// class failure, already recorded.
    fn write_class<T>(
        &self,
        run: &mut Run<'_>,
        cancel: &CancellationToken,
        class: SchemaClass,
        fetched: Result<Vec<T>, SyncError>,
        write: impl FnOnce(&[T]) -> Result<usize, StoreError>,
    ) -> Result<Result<usize, SyncError>, SyncError> {
        let items = match fetched {
            Ok(items) => items,
            Err(e) => {
                run.record(class, ClassOutcome::Failed { error: e.to_string() });
                return Ok(Err(e));
            }
        };

        cancel.check()?;

        match write(&items) {
            Ok(count) => {
                info!("Wrote {} {}", count, class);
                run.record(class, ClassOutcome::Written { count });
                Ok(Ok(count))
            }
            Err(source) => {
                let e = SyncError::Write { class, source };
                error!("{}", e);
                run.record(class, ClassOutcome::Failed { error: e.to_string() });
                Ok(Err(e))
            }
        }
    }
}

fn collect_label_ids(
    data_entities: &Option<Result<Vec<DataEntity>, SyncError>>,
    public_entities: &Option<Result<Vec<PublicEntity>, SyncError>>,
    enumerations: &Option<Result<Vec<Enumeration>, SyncError>>,
) -> Vec<String> {
    let mut ids = BTreeSet::new();
    if let Some(Ok(items)) = data_entities {
        ids.extend(unresolved_label_ids(items));
    }
    if let Some(Ok(items)) = public_entities {
        ids.extend(unresolved_label_ids(items));
    }
    if let Some(Ok(items)) = enumerations {
        ids.extend(unresolved_label_ids(items));
    }
    ids.into_iter().collect()
}
