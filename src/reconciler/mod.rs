pub mod state;

use std::fmt;

use serde_json::Value;
use tracing::{Level, info, instrument, warn};

use self::state::ResourceState;
use crate::config::timeouts::OperationTimeouts;
use crate::kubernetes_objects::job_store::JobStore;
use crate::resource::data::{ConfigStore, ConfigTree};
use crate::resource::error::ResourceError;
use crate::resource::{COMPUTED_PATHS, JobResource, ManagedResource, force_immutable_changes};

const PLANNED_ROOTS: [&str; 2] = ["metadata", "spec"];

/// What applying a manifest against the recorded state will do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    Create,
    Replace { forced: Vec<String> },
    Update { changed: Vec<String> },
    NoChange,
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannedAction::Create => f.write_str("create"),
            PlannedAction::Replace { forced } => {
                write!(f, "replace (forced by {})", forced.join(", "))
            }
            PlannedAction::Update { changed } => {
                write!(f, "update in place ({})", changed.join(", "))
            }
            PlannedAction::NoChange => f.write_str("no changes"),
        }
    }
}

/// Drives [`JobResource`] over a recorded state and a desired manifest.
#[derive(Debug)]
pub struct Reconciler<S> {
    resource: JobResource,
    store: S,
    timeouts: OperationTimeouts,
}

impl<S: JobStore> Reconciler<S> {
    pub fn new(resource: JobResource, store: S, timeouts: OperationTimeouts) -> Self {
        Reconciler {
            resource,
            store,
            timeouts,
        }
    }

    #[instrument("reconciler/plan", level = Level::TRACE, skip_all)]
    pub async fn plan(
        &self,
        state: &ResourceState,
        manifest: Value,
    ) -> Result<PlannedAction, ResourceError> {
        let tree = self.planned_tree(state, manifest).await?;
        Ok(planned_action(&tree))
    }

    /// Applies `manifest` and records the outcome into `state`.
    ///
    /// On failure only the identifier is carried over, so an object created before the
    /// error stays tracked while its configuration is planned again on the next run.
    #[instrument("reconciler/apply", level = Level::TRACE, skip_all)]
    pub async fn apply(
        &self,
        state: &mut ResourceState,
        manifest: Value,
    ) -> Result<PlannedAction, ResourceError> {
        let mut tree = self.planned_tree(state, manifest).await?;
        let action = planned_action(&tree);
        info!("Applying plan: {}", action);

        let result = match &action {
            PlannedAction::Create => self.resource.create(&mut tree, &self.store).await,
            PlannedAction::Replace { .. } => self.replace(&mut tree).await,
            PlannedAction::Update { .. } => self.resource.update(&mut tree, &self.store).await,
            PlannedAction::NoChange => Ok(()),
        };

        match result {
            Ok(()) => {
                *state = tree.into();
                Ok(action)
            }
            Err(e) => {
                state.id = tree.id().map(str::to_string);
                Err(e)
            }
        }
    }

    #[instrument("reconciler/refresh", level = Level::TRACE, skip_all)]
    pub async fn refresh(&self, state: &mut ResourceState) -> Result<(), ResourceError> {
        let mut tree = self.recorded_tree(state);
        self.resource.read(&mut tree, &self.store).await?;
        *state = tree.into();
        Ok(())
    }

    #[instrument("reconciler/destroy", level = Level::TRACE, skip_all)]
    pub async fn destroy(&self, state: &mut ResourceState) -> Result<(), ResourceError> {
        let mut tree = self.recorded_tree(state);
        self.resource.delete(&mut tree, &self.store).await?;
        *state = ResourceState::default();
        Ok(())
    }

    #[instrument("reconciler/import", level = Level::TRACE, skip(self, state))]
    pub async fn import(&self, id: &str, state: &mut ResourceState) -> Result<(), ResourceError> {
        if let Some(previous) = state.id.as_deref().filter(|_| state.is_managed()) {
            warn!("State already tracks job '{}'; it will be replaced by '{}'.", previous, id);
        }
        let mut tree = ConfigTree::default().with_timeouts(self.timeouts.clone());
        self.resource.import(id, &mut tree, &self.store).await?;
        *state = tree.into();
        Ok(())
    }

    async fn planned_tree(
        &self,
        state: &ResourceState,
        manifest: Value,
    ) -> Result<ConfigTree, ResourceError> {
        let (id, recorded) = self.live_recorded(state).await?;
        let mut tree = ConfigTree::new(id, recorded, normalize_manifest(manifest))
            .with_timeouts(self.timeouts.clone());
        tree.carry_computed(&COMPUTED_PATHS)?;
        force_immutable_changes(&mut tree)?;
        self.resource.customize_diff(&mut tree, &self.store).await?;
        Ok(tree)
    }

    /// The recorded side of a plan, read back from the live Job first.
    async fn live_recorded(
        &self,
        state: &ResourceState,
    ) -> Result<(Option<String>, Value), ResourceError> {
        if !state.is_managed() {
            return Ok((None, Value::Null));
        }
        let mut tree = self.recorded_tree(state);
        self.resource.read(&mut tree, &self.store).await?;
        if tree.id().is_none() {
            info!("Recorded job is gone; it will be created again.");
            return Ok((None, Value::Null));
        }
        Ok(tree.into_recorded())
    }

    async fn replace(&self, tree: &mut ConfigTree) -> Result<(), ResourceError> {
        self.resource.delete(tree, &self.store).await?;
        tree.start_replacement();
        self.resource.create(tree, &self.store).await
    }

    fn recorded_tree(&self, state: &ResourceState) -> ConfigTree {
        ConfigTree::from_recorded(state.id.clone(), state.resource.clone())
            .with_timeouts(self.timeouts.clone())
    }
}

fn planned_action(tree: &ConfigTree) -> PlannedAction {
    if tree.id().is_none() {
        return PlannedAction::Create;
    }
    if tree.requires_new() {
        return PlannedAction::Replace {
            forced: tree.forced_new().map(str::to_string).collect(),
        };
    }
    let changed = tree.changed(&PLANNED_ROOTS);
    if changed.is_empty() {
        PlannedAction::NoChange
    } else {
        PlannedAction::Update {
            changed: changed.into_iter().map(str::to_string).collect(),
        }
    }
}

/// The recorded TTL is a string; YAML manifests may spell it as a number.
fn normalize_manifest(mut manifest: Value) -> Value {
    if let Some(ttl) = manifest.pointer_mut("/spec/0/ttl_seconds_after_finished")
        && ttl.is_number()
    {
        *ttl = Value::String(ttl.to_string());
    }
    manifest
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::config::polling::PollingConfig;
    use crate::kubernetes_objects::job_ref::JobRef;
    use crate::kubernetes_objects::job_store::fake::{Call, FakeJobStore};
    use crate::retry::{Shutdown, ShutdownTrigger};

    fn reconciler(store: FakeJobStore) -> (ShutdownTrigger, Reconciler<FakeJobStore>) {
        let (trigger, shutdown) = Shutdown::manual();
        let polling = PollingConfig {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(4),
            backoff_factor: 2,
        };
        let resource = JobResource::new(polling, shutdown);
        (trigger, Reconciler::new(resource, store, OperationTimeouts::default()))
    }

    fn manifest(ttl: Value, app: &str) -> Value {
        json!({
            "metadata": [{ "name": "batch-job-7", "namespace": "prod", "labels": { "app": app } }],
            "spec": [{
                "backoff_limit": 2,
                "ttl_seconds_after_finished": ttl,
                "template": { "spec": { "restartPolicy": "Never", "containers": [{ "name": "main", "image": "busybox" }] } }
            }],
            "wait_for_completion": false,
        })
    }

    fn job() -> JobRef {
        JobRef::new("prod", "batch-job-7")
    }

    async fn applied(reconciler: &Reconciler<FakeJobStore>) -> ResourceState {
        let mut state = ResourceState::default();
        let action = reconciler.apply(&mut state, manifest(json!("30"), "batch")).await.unwrap();
        assert_eq!(action, PlannedAction::Create);
        state
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let (_trigger, reconciler) = reconciler(FakeJobStore::default());
        let mut state = applied(&reconciler).await;

        assert_eq!(state.id.as_deref(), Some("prod,batch-job-7"));
        assert_eq!(state.resource["metadata"][0]["uid"], json!("uid-batch-job-7"));

        let action = reconciler.apply(&mut state, manifest(json!("30"), "batch")).await.unwrap();
        assert_eq!(action, PlannedAction::NoChange);
    }

    #[tokio::test]
    async fn test_numeric_ttl_matches_recorded_string() {
        let (_trigger, reconciler) = reconciler(FakeJobStore::default());
        let state = applied(&reconciler).await;

        let action = reconciler.plan(&state, manifest(json!(30), "batch")).await.unwrap();

        assert_eq!(action, PlannedAction::NoChange);
    }

    #[tokio::test]
    async fn test_expired_job_with_same_ttl_is_left_alone() {
        let (_trigger, reconciler) = reconciler(FakeJobStore::default());
        let mut state = applied(&reconciler).await;
        reconciler.store.delete(&job()).await.unwrap();
        let recorded = state.clone();

        let action = reconciler.apply(&mut state, manifest(json!("30"), "other")).await.unwrap();

        assert_eq!(action, PlannedAction::NoChange);
        assert_eq!(state, recorded);
    }

    #[tokio::test]
    async fn test_expired_job_with_new_ttl_is_recreated() {
        let (_trigger, reconciler) = reconciler(FakeJobStore::default());
        let mut state = applied(&reconciler).await;
        reconciler.store.delete(&job()).await.unwrap();

        let action = reconciler.apply(&mut state, manifest(json!("60"), "batch")).await.unwrap();

        assert_eq!(
            action,
            PlannedAction::Replace {
                forced: vec!["spec.0.ttl_seconds_after_finished".to_string()]
            }
        );
        assert_eq!(state.resource["spec"][0]["ttl_seconds_after_finished"], json!("60"));
        let stored = reconciler.store.stored(&job()).unwrap();
        assert_eq!(stored.spec.unwrap().ttl_seconds_after_finished, Some(60));
    }

    #[tokio::test]
    async fn test_label_change_updates_in_place() {
        let (_trigger, reconciler) = reconciler(FakeJobStore::default());
        let mut state = applied(&reconciler).await;

        let action = reconciler.apply(&mut state, manifest(json!("30"), "nightly")).await.unwrap();

        assert_eq!(
            action,
            PlannedAction::Update {
                changed: vec!["metadata".to_string()]
            }
        );
        assert!(reconciler.store.calls().contains(&Call::Patch(job(), 1)));
        assert_eq!(state.resource["metadata"][0]["labels"]["app"], json!("nightly"));
    }

    #[tokio::test]
    async fn test_job_deleted_without_ttl_is_created_again() {
        let (_trigger, reconciler) = reconciler(FakeJobStore::default());
        let mut state = ResourceState::default();
        reconciler.apply(&mut state, manifest(json!(""), "batch")).await.unwrap();
        reconciler.store.delete(&job()).await.unwrap();

        let planned = reconciler.plan(&state, manifest(json!(""), "batch")).await.unwrap();
        let action = reconciler.apply(&mut state, manifest(json!(""), "batch")).await.unwrap();

        assert_eq!(planned, PlannedAction::Create);
        assert_eq!(action, PlannedAction::Create);
        assert!(reconciler.store.stored(&job()).is_some());
        assert_eq!(state.id.as_deref(), Some("prod,batch-job-7"));
    }

    #[tokio::test]
    async fn test_template_change_replaces_job() {
        let (_trigger, reconciler) = reconciler(FakeJobStore::default());
        let mut state = applied(&reconciler).await;
        let mut changed = manifest(json!("30"), "batch");
        changed["spec"][0]["template"]["spec"]["containers"][0]["image"] = json!("busybox:1.37");

        let action = reconciler.apply(&mut state, changed).await.unwrap();

        assert_eq!(
            action,
            PlannedAction::Replace {
                forced: vec!["spec.0.template".to_string()]
            }
        );
        assert!(reconciler.store.calls().contains(&Call::Delete(job())));
        let stored = reconciler.store.stored(&job()).unwrap();
        let pod = stored.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.containers[0].image.as_deref(), Some("busybox:1.37"));
    }

    #[tokio::test]
    async fn test_expired_job_ignores_template_change() {
        let (_trigger, reconciler) = reconciler(FakeJobStore::default());
        let state = applied(&reconciler).await;
        reconciler.store.delete(&job()).await.unwrap();
        let mut changed = manifest(json!("30"), "batch");
        changed["spec"][0]["template"]["spec"]["containers"][0]["image"] = json!("busybox:1.37");

        let action = reconciler.plan(&state, changed).await.unwrap();

        assert_eq!(action, PlannedAction::NoChange);
    }

    #[tokio::test]
    async fn test_failed_create_keeps_no_state() {
        let (_trigger, reconciler) = reconciler(FakeJobStore::default());
        let mut state = ResourceState::default();

        let err = reconciler
            .apply(&mut state, manifest(json!("soon"), "batch"))
            .await
            .unwrap_err();

        assert!(matches!(err, ResourceError::InvalidConfig(_)));
        assert_eq!(state, ResourceState::default());
    }

    #[tokio::test]
    async fn test_refresh_drops_job_gone_without_ttl() {
        let (_trigger, reconciler) = reconciler(FakeJobStore::default());
        let mut state = ResourceState::default();
        reconciler.apply(&mut state, manifest(json!(""), "batch")).await.unwrap();
        reconciler.store.delete(&job()).await.unwrap();

        reconciler.refresh(&mut state).await.unwrap();

        assert!(!state.is_managed());
    }

    #[tokio::test]
    async fn test_destroy() {
        let (_trigger, reconciler) = reconciler(FakeJobStore::default());
        let mut state = applied(&reconciler).await;

        reconciler.destroy(&mut state).await.unwrap();
        reconciler.destroy(&mut state).await.unwrap();

        assert_eq!(state, ResourceState::default());
        assert!(reconciler.store.stored(&job()).is_none());
    }

    #[tokio::test]
    async fn test_import_then_plan() {
        let (_trigger, reconciler) = reconciler(FakeJobStore::default());
        let created = applied(&reconciler).await;
        let mut state = ResourceState::default();

        reconciler.import("prod,batch-job-7", &mut state).await.unwrap();

        assert_eq!(state.id, created.id);
        assert_eq!(state.resource["metadata"], created.resource["metadata"]);
    }

    #[test]
    fn test_planned_action_display() {
        assert_eq!(PlannedAction::Create.to_string(), "create");
        assert_eq!(
            PlannedAction::Replace {
                forced: vec!["spec.0.ttl_seconds_after_finished".to_string()]
            }
            .to_string(),
            "replace (forced by spec.0.ttl_seconds_after_finished)"
        );
    }
}
