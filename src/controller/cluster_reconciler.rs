//! Reconciliation loop for RedisSentinel.
//!
//! This module contains the reconcile function driven by the kube runtime
//! controller. It owns the Kubernetes side of a pass: finalizers, defaulting
//! and validation, the auth Secret, status persistence, metrics and the
//! choice of requeue interval. The topology work itself happens in
//! [`ClusterHandler::handle`](crate::controller::handler::ClusterHandler::handle).

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret};
use kube::api::{DeleteParams, ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, error, info, warn};

use crate::controller::common::{FINALIZER, add_finalizer, remove_finalizer};
use crate::controller::context::Context;
use crate::controller::error::Error;
use crate::controller::events::{ClusterEvent, EventSink};
use crate::controller::handler::PassOutcome;
use crate::controller::meta_cache::ClusterKey;
use crate::controller::topology::AuthConfig;
use crate::controller::validation;
use crate::crd::{AuthSpec, RedisSentinel, RedisSentinelStatus};
use crate::health::ClusterMetrics;
use crate::resources::FIELD_MANAGER;
use crate::resources::common::{Component, label_selector};

/// Reconcile a RedisSentinel
///
/// This is the main reconciliation function called by the controller.
/// It handles the full lifecycle: creation, updates, and deletion.
pub async fn reconcile(obj: Arc<RedisSentinel>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start_time = Instant::now();
    let name = obj.name_any();
    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;

    debug!(name = %name, namespace = %namespace, "Reconciling RedisSentinel");

    let api: Api<RedisSentinel> = Api::namespaced(ctx.client.clone(), &namespace);

    if obj.metadata.deletion_timestamp.is_some() {
        return handle_deletion(&obj, &ctx, &namespace).await;
    }

    if !obj.finalizers().iter().any(|f| f == FINALIZER) {
        info!(name = %name, "Adding finalizer");
        add_finalizer(&api, &obj).await?;
        return Ok(Action::requeue(std::time::Duration::from_secs(1)));
    }

    if validation::generation_changed(&obj) {
        info!(
            name = %name,
            generation = ?obj.metadata.generation,
            "Spec changed, reconciling"
        );
    }

    let events = ctx.event_sink(&obj);
    let mut status = obj.status.clone().unwrap_or_default();
    status.observed_generation = obj.metadata.generation;

    let spec = match validation::prepare(&obj) {
        Ok(spec) => spec,
        Err(e) => {
            error!(name = %name, error = %e, "Validation failed");
            let message = e.to_string();
            status.set_failed(&message);
            events.publish(ClusterEvent::Failed(message)).await;
            if let Some(health_state) = &ctx.health_state {
                health_state.set_cluster_error(&namespace, &name);
            }
            update_status(&api, &name, &status).await?;
            return Err(e);
        }
    };

    let auth = resolve_auth(&ctx.client, &namespace, spec.auth.as_ref()).await?;
    let mut desired = (*obj).clone();
    desired.spec = spec;

    let pass_timeout = ctx.config.pass_timeout;
    let outcome = match tokio::time::timeout(
        pass_timeout,
        ctx.handler.handle(&desired, auth, &mut status, &events),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(_) => {
            let err = Error::PassTimeout(pass_timeout);
            warn!(name = %name, error = %err, "Reconciliation pass cancelled");
            let message = err.to_string();
            status.set_failed(&message);
            events.publish(ClusterEvent::Failed(message)).await;
            if let Some(health_state) = &ctx.health_state {
                health_state.set_cluster_error(&namespace, &name);
            }
            PassOutcome::Fatal(err)
        }
    };

    update_status(&api, &name, &status).await?;

    if let Some(health_state) = &ctx.health_state {
        let duration = start_time.elapsed().as_secs_f64();
        health_state
            .metrics
            .record_reconcile(&namespace, &name, duration);
        let key = ClusterKey::new(namespace.as_str(), name.as_str());
        if let Some(meta) = ctx.meta_cache.get(&key) {
            health_state.metrics.record_transition(meta.phase.as_str());
        }
        if matches!(outcome, PassOutcome::Converged { .. }) {
            let now = jiff::Timestamp::now().as_second();
            health_state
                .last_reconcile
                .store(u64::try_from(now).unwrap_or(0), Ordering::Relaxed);
        }
    }

    match outcome {
        PassOutcome::Converged {
            sentinels_pending: false,
        } => Ok(Action::requeue(ctx.config.reconcile_interval)),
        PassOutcome::Converged {
            sentinels_pending: true,
        } => {
            debug!(name = %name, "Sentinel replicas not ready yet");
            Ok(Action::requeue(ctx.config.requeue_delay))
        }
        PassOutcome::Retry(delay) => Ok(Action::requeue(delay)),
        PassOutcome::Fatal(e) => Err(e),
    }
}

/// Error policy for the controller
pub fn error_policy(obj: Arc<RedisSentinel>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_error(&namespace, &name);
    }

    if error.is_not_found() {
        debug!(name = %name, "Resource not found (likely deleted)");
        return Action::await_change();
    }

    let delay = error.requeue_after(ctx.config.requeue_delay);
    if error.is_retryable() {
        warn!(name = %name, error = %error, "Retryable error, will retry");
    } else {
        error!(name = %name, error = %error, "Non-retryable error");
    }
    Action::requeue(delay)
}

/// Handle deletion of a RedisSentinel
///
/// Owned workloads are garbage collected through owner references. PVCs
/// created from the StatefulSet template are not, so they are removed here
/// unless the spec asks to keep them.
async fn handle_deletion(
    obj: &RedisSentinel,
    ctx: &Context,
    namespace: &str,
) -> Result<Action, Error> {
    let name = obj.name_any();
    info!(name = %name, "Handling deletion");

    let key = ClusterKey::new(namespace, name.as_str());
    if ctx.meta_cache.delete(&key) {
        debug!(cluster = %key, "Dropped cached spec");
    }
    if let Some(health_state) = &ctx.health_state {
        health_state.metrics.forget_cluster(namespace, &name);
    }

    if !obj.spec.storage.keep_after_deletion {
        let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(ctx.client.clone(), namespace);
        let selector = label_selector(&name, Component::Redis);
        match pvcs
            .delete_collection(&DeleteParams::default(), &ListParams::default().labels(&selector))
            .await
        {
            Ok(_) => debug!(name = %name, "Deleted Redis data volumes"),
            Err(kube::Error::Api(e)) if e.code == 404 => {}
            Err(e) => return Err(e.into()),
        }
    }

    let api: Api<RedisSentinel> = Api::namespaced(ctx.client.clone(), namespace);
    remove_finalizer(&api, &name).await?;

    Ok(Action::await_change())
}

/// Read the cluster password from its Secret.
///
/// A missing Secret or key is logged and treated as no password; the Redis
/// pods cannot start without it, so the pass will wait on them.
async fn resolve_auth(
    client: &Client,
    namespace: &str,
    auth: Option<&AuthSpec>,
) -> Result<AuthConfig, Error> {
    let Some(auth) = auth else {
        return Ok(AuthConfig::default());
    };
    let secret_name = &auth.secret_ref.name;
    let secret_key = &auth.secret_ref.key;
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);

    match secrets.get_opt(secret_name).await? {
        Some(secret) => {
            if let Some(bytes) = secret.data.as_ref().and_then(|d| d.get(secret_key)) {
                let password = String::from_utf8(bytes.0.clone())
                    .map_err(|e| Error::Validation(format!("Invalid password encoding: {e}")))?;
                return Ok(AuthConfig::new(Some(password)));
            }
            warn!(secret = %secret_name, key = %secret_key, "Password key not found in secret");
            Ok(AuthConfig::default())
        }
        None => {
            warn!(secret = %secret_name, "Auth secret not found");
            Ok(AuthConfig::default())
        }
    }
}

/// Persist the status subresource.
async fn update_status(
    api: &Api<RedisSentinel>,
    name: &str,
    status: &RedisSentinelStatus,
) -> Result<(), Error> {
    let patch = serde_json::json!({
        "status": status
    });
    api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;
    Ok(())
}
