//! Finalizer helpers.

use kube::api::{Patch, PatchParams};
use kube::{Api, ResourceExt};

use crate::controller::error::Error;
use crate::crd::RedisSentinel;

/// Finalizer name for graceful deletion
pub const FINALIZER: &str = "redisoperator.dev/finalizer";

/// Finalizer list with `finalizer` appended, or `None` when already present.
pub fn with_finalizer(current: &[String], finalizer: &str) -> Option<Vec<String>> {
    if current.iter().any(|f| f == finalizer) {
        return None;
    }
    let mut finalizers = current.to_vec();
    finalizers.push(finalizer.to_string());
    Some(finalizers)
}

/// Finalizer list without `finalizer`, or `None` when it is absent.
pub fn without_finalizer(current: &[String], finalizer: &str) -> Option<Vec<String>> {
    let pos = current.iter().position(|f| f == finalizer)?;
    let mut finalizers = current.to_vec();
    finalizers.remove(pos);
    Some(finalizers)
}

/// Add [`FINALIZER`] to a RedisSentinel.
pub async fn add_finalizer(api: &Api<RedisSentinel>, obj: &RedisSentinel) -> Result<(), Error> {
    if let Some(finalizers) = with_finalizer(obj.finalizers(), FINALIZER) {
        patch_finalizers(api, &obj.name_any(), finalizers).await?;
    }
    Ok(())
}

/// Remove [`FINALIZER`] from a RedisSentinel. A resource that is already
/// gone is not an error.
pub async fn remove_finalizer(api: &Api<RedisSentinel>, name: &str) -> Result<(), Error> {
    let obj = match api.get(name).await {
        Ok(obj) => obj,
        Err(kube::Error::Api(e)) if e.code == 404 => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if let Some(finalizers) = without_finalizer(obj.finalizers(), FINALIZER) {
        patch_finalizers(api, name, finalizers).await?;
    }
    Ok(())
}

async fn patch_finalizers(
    api: &Api<RedisSentinel>,
    name: &str,
    finalizers: Vec<String>,
) -> Result<(), Error> {
    let patch = serde_json::json!({
        "metadata": {
            "finalizers": finalizers
        }
    });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}
