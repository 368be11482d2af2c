//! Startup reconciliation of configured actors against the repository.

use std::collections::{BTreeMap, HashMap};

use {
    relaygram_bridge::{ActorId, ActorRepository, ActorSessionData},
    serde::Serialize,
    tracing::info,
};

use crate::error::Result;

/// What [`reconcile_actors`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub added: Vec<ActorId>,
    pub updated: Vec<ActorId>,
    pub removed: Vec<ActorId>,
}

impl ReconcileReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Make the repository hold exactly the configured actors.
///
/// An empty configuration leaves the repository untouched, so a deployment
/// that provisions actors elsewhere is not wiped by a bare config file.
pub async fn reconcile_actors(
    repository: &dyn ActorRepository,
    configured: &BTreeMap<ActorId, ActorSessionData>,
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();
    if configured.is_empty() {
        info!("no actors configured, repository left unchanged");
        return Ok(report);
    }

    let persisted: HashMap<ActorId, ActorSessionData> =
        repository.list_actors().await?.into_iter().collect();

    let mut stale: Vec<ActorId> = persisted
        .keys()
        .filter(|id| !configured.contains_key(id))
        .copied()
        .collect();
    stale.sort();
    for actor_id in stale {
        repository.remove_actor(actor_id).await?;
        info!(%actor_id, "actor removed");
        report.removed.push(actor_id);
    }

    for (actor_id, data) in configured {
        match persisted.get(actor_id) {
            None => {
                repository.add_actor(*actor_id, data.clone()).await?;
                info!(%actor_id, "actor added");
                report.added.push(*actor_id);
            },
            Some(current) if current != data => {
                repository.update_actor(*actor_id, data.clone()).await?;
                info!(%actor_id, "actor updated");
                report.updated.push(*actor_id);
            },
            Some(_) => {},
        }
    }

    Ok(report)
}
