// ── Link convergence ──
//
// Creating and deleting current links, both from pushed discovery
// events and from the full sync's diff against the baseline. Every
// create or delete decision for a link identity is taken while holding
// that identity's lock from the registry.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use super::{MonitorInner, SessionCtx};
use crate::error::CoreError;
use crate::link_diff::{DiffLink, Endpoint, compute_link_diff};
use crate::model::{Action, ExternalLink, Link};
use crate::store::{TopologyStore, diff_link};

// ── Primitives ───────────────────────────────────────────────────────

impl MonitorInner {
    /// Persist `link` and cache the stored copy. Caller holds the link lock.
    async fn insert_link(&self, ctx: &SessionCtx, key: &str, link: Link) -> Result<Link, CoreError> {
        ctx.ensure_live()?;
        let created = self.repo.create_link(ctx.project_id, link).await?;
        self.store.current_links.set(key.to_owned(), created.clone());
        debug!(link = %key, link_id = created.id, "current link created");
        self.notify_link(ctx.project_id, Action::Create, &created);
        Ok(created)
    }

    /// Delete `link` from the project and every view. Caller holds the link lock.
    pub(super) async fn drop_link(
        &self,
        ctx: &SessionCtx,
        key: &str,
        link: &Link,
    ) -> Result<(), CoreError> {
        ctx.ensure_live()?;
        self.repo.delete_link(ctx.project_id, link.id).await?;
        self.store.current_links.delete(&key.to_owned());
        self.store.sfp_links.delete(&link.id);
        debug!(link = %key, link_id = link.id, "current link deleted");
        self.notify_link(ctx.project_id, Action::Delete, link);
        Ok(())
    }

    /// A current link spanning the observed link's ports, not yet persisted.
    fn resolve_observed(&self, ext: &ExternalLink, speed_mbps: u64) -> Option<Link> {
        let src = self.store.current_device_by_ip(&ext.from.ip)?;
        let dst = self.store.current_device_by_ip(&ext.to.ip)?;
        Some(Link::unsaved(
            (src.id, ext.from.port),
            (dst.id, ext.to.port),
            speed_mbps,
        ))
    }

    // ── Push path ────────────────────────────────────────────────────

    /// Create the current link for an observed one unless it already exists.
    pub(super) async fn materialize_link(&self, ctx: &SessionCtx, ext: &ExternalLink) {
        let dl = ext.diff_link();
        if let Err(reason) = dl.validate() {
            debug!(link = %dl, %reason, "ignoring invalid observed link");
            return;
        }
        let key = dl.to_string();
        if self.store.current_links.contains(&key) {
            return;
        }

        let lock = self.store.link_locks.get(&key);
        let _guard = lock.lock().await;
        if self.store.current_links.contains(&key) {
            return;
        }
        let Some(link) = self.resolve_observed(ext, ext.speed_mbps()) else {
            debug!(link = %key, "link endpoints are not current devices");
            return;
        };
        if let Err(e) = self.insert_link(ctx, &key, link).await {
            warn!(error = %e, link = %key, "failed to create observed link");
        }
    }

    /// Delete the current link stored under `key`, if any.
    pub(super) async fn retire_link(&self, ctx: &SessionCtx, key: &str) {
        let lock = self.store.link_locks.get(key);
        let _guard = lock.lock().await;
        let Some(link) = self.store.current_links.get(&key.to_owned()) else {
            return;
        };
        if let Err(e) = self.drop_link(ctx, key, &link).await {
            warn!(error = %e, link = %key, "failed to delete current link");
        }
    }

    // ── Full sync: links ─────────────────────────────────────────────

    /// Converge current links on the diff between baseline and observed links.
    pub(super) async fn sync_links(&self, ctx: &SessionCtx) {
        let baseline: BTreeMap<String, Link> =
            self.store.baseline_links.get_all().into_iter().collect();
        let observed: BTreeMap<String, ExternalLink> = self
            .store
            .external_links
            .get_all()
            .into_iter()
            .filter(|(_, l)| l.is_up() && !l.touches_localhost())
            .collect();

        let diff = compute_link_diff(
            baseline
                .values()
                .filter_map(|l| diff_link(l, &self.store.baseline_devices).ok()),
            observed.values().map(ExternalLink::diff_link),
        );
        let mut view = LinkView::load(&self.store);

        // Current links nobody asked for any more.
        let stale: Vec<String> = view
            .links
            .keys()
            .filter(|key| {
                !baseline.contains_key(*key)
                    && !diff.unchanged.contains_key(*key)
                    && !diff.new.contains_key(*key)
            })
            .cloned()
            .collect();
        for key in stale {
            self.evict(ctx, &mut view, &key).await;
        }

        for key in diff.unchanged.keys() {
            if view.links.contains_key(key) {
                continue;
            }
            let Some(ext) = observed.get(key) else {
                continue;
            };
            let speed = match ext.speed_mbps() {
                0 => baseline.get(key).map_or(0, |l| l.speed_mbps),
                mbps => mbps,
            };
            self.place_link(ctx, &mut view, key, ext, speed, true)
                .await;
        }

        let fresh = diff.new.keys().filter(|k| !diff.is_rewired(k));
        for key in fresh {
            if view.links.contains_key(key) {
                continue;
            }
            let Some(ext) = observed.get(key).filter(|l| l.speed_mbps() > 0) else {
                continue;
            };
            self.place_link(ctx, &mut view, key, ext, ext.speed_mbps(), false)
                .await;
        }

        for key in diff.rewired.keys() {
            if view.links.contains_key(key) {
                continue;
            }
            let Some(ext) = observed.get(key).filter(|l| l.speed_mbps() > 0) else {
                continue;
            };
            self.place_link(ctx, &mut view, key, ext, ext.speed_mbps(), true)
                .await;
        }

        for (key, link) in &baseline {
            if !view.links.contains_key(key) {
                self.restore_baseline_link(ctx, &mut view, key, link)
                    .await;
            }
        }
    }

    /// Create the link for `key`, evicting whatever holds its ports.
    ///
    /// With `skip_same`, nothing happens when both ports are held by one
    /// and the same current link.
    async fn place_link(
        &self,
        ctx: &SessionCtx,
        view: &mut LinkView,
        key: &str,
        ext: &ExternalLink,
        speed_mbps: u64,
        skip_same: bool,
    ) {
        let dl = ext.diff_link();
        let mut occupants: Vec<String> = dl
            .endpoints()
            .iter()
            .filter_map(|ep| view.occupant(ep).cloned())
            .collect();
        if skip_same && matches!(occupants.as_slice(), [a, b] if a == b) {
            debug!(link = %key, "ports already joined by one current link");
            return;
        }
        let Some(link) = self.resolve_observed(ext, speed_mbps) else {
            debug!(link = %key, "link endpoints are not current devices");
            return;
        };

        occupants.dedup();
        for occupant in occupants.iter().filter(|k| k.as_str() != key) {
            self.evict(ctx, view, occupant).await;
        }

        let lock = self.store.link_locks.get(key);
        let _guard = lock.lock().await;
        if let Some(existing) = self.store.current_links.get(&key.to_owned()) {
            view.insert(key, &dl, existing);
            return;
        }
        match self.insert_link(ctx, key, link).await {
            Ok(created) => view.insert(key, &dl, created),
            Err(e) => warn!(error = %e, link = %key, "failed to create link"),
        }
    }

    /// Bring back a baseline link once both of its ports are free.
    async fn restore_baseline_link(
        &self,
        ctx: &SessionCtx,
        view: &mut LinkView,
        key: &str,
        baseline: &Link,
    ) {
        let Ok(dl) = diff_link(baseline, &self.store.baseline_devices) else {
            return;
        };
        if dl.endpoints().iter().any(|ep| view.occupant(ep).is_some()) {
            return;
        }
        let src = self
            .store
            .baseline_devices
            .get(&baseline.source_device_id)
            .and_then(|d| self.store.current_device_by_ip(&d.ip));
        let dst = self
            .store
            .baseline_devices
            .get(&baseline.destination_device_id)
            .and_then(|d| self.store.current_device_by_ip(&d.ip));
        let (Some(src), Some(dst)) = (src, dst) else {
            debug!(link = %key, "baseline link endpoints are not current devices");
            return;
        };

        let lock = self.store.link_locks.get(key);
        let _guard = lock.lock().await;
        if let Some(existing) = self.store.current_links.get(&key.to_owned()) {
            view.insert(key, &dl, existing);
            return;
        }
        let restored = Link::unsaved(
            (src.id, baseline.source_interface_id),
            (dst.id, baseline.destination_interface_id),
            baseline.speed_mbps,
        );
        match self.insert_link(ctx, key, restored).await {
            Ok(created) => view.insert(key, &dl, created),
            Err(e) => warn!(error = %e, link = %key, "failed to restore baseline link"),
        }
    }

    async fn evict(&self, ctx: &SessionCtx, view: &mut LinkView, key: &str) {
        let lock = self.store.link_locks.get(key);
        let _guard = lock.lock().await;
        if let Some(link) = self.store.current_links.get(&key.to_owned()) {
            if let Err(e) = self.drop_link(ctx, key, &link).await {
                warn!(error = %e, link = %key, "failed to delete current link");
                return;
            }
        }
        view.remove(key);
    }

    // ── Full sync: link speed ────────────────────────────────────────

    pub(super) async fn sync_link_speed(&self, ctx: &SessionCtx) {
        let project_id = ctx.project_id;
        for (key, link) in self.store.current_links.get_all() {
            let Some(ext) = self.store.external_links.get(&key) else {
                continue;
            };
            let speed = ext.speed_mbps();
            if speed == 0 || speed == link.speed_mbps {
                continue;
            }

            let lock = self.store.link_locks.get(&key);
            let _guard = lock.lock().await;
            let Some(current) = self.store.current_links.get(&key) else {
                continue;
            };
            if current.speed_mbps == speed {
                continue;
            }
            if ctx.token.is_cancelled() {
                return;
            }
            let updated = Link {
                speed_mbps: speed,
                ..current
            };
            match self.repo.update_link(project_id, &updated).await {
                Ok(()) => {
                    self.store.current_links.set(key.clone(), updated.clone());
                    self.notify_link(project_id, Action::Update, &updated);
                }
                Err(e) => warn!(error = %e, link = %key, "failed to update link speed"),
            }
        }
    }
}

// ── Working view ─────────────────────────────────────────────────────

/// Current links of one sync pass plus which link holds each port.
#[derive(Debug, Default)]
struct LinkView {
    links: BTreeMap<String, Link>,
    /// `ip:port` -> key of the current link holding that port.
    occupants: HashMap<String, String>,
}

impl LinkView {
    fn load(store: &TopologyStore) -> Self {
        let mut view = Self::default();
        for (key, link) in store.current_links.get_all() {
            match diff_link(&link, &store.current_devices) {
                Ok(dl) => view.insert(&key, &dl, link),
                Err(_) => {
                    view.links.insert(key, link);
                }
            }
        }
        view
    }

    fn insert(&mut self, key: &str, dl: &DiffLink, link: Link) {
        for ep in dl.endpoints() {
            self.occupants.insert(ep.to_string(), key.to_owned());
        }
        self.links.insert(key.to_owned(), link);
    }

    fn remove(&mut self, key: &str) {
        self.links.remove(key);
        self.occupants.retain(|_, holder| holder != key);
    }

    fn occupant(&self, endpoint: &Endpoint) -> Option<&String> {
        self.occupants.get(&endpoint.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::memory::RepoOp;
    use crate::model::{LinkEnd, PortStatus};
    use crate::monitor::tests::running;

    fn observed(speed_bps: u64) -> ExternalLink {
        let end = |ip: &str| LinkEnd {
            ip: ip.into(),
            port: 1,
            ..LinkEnd::default()
        };
        ExternalLink {
            from: end("10.0.0.2"),
            to: end("10.0.0.1"),
            speed_bps,
            status: PortStatus::Up,
            ..ExternalLink::default()
        }
    }

    fn link(id: i64) -> Link {
        Link {
            id,
            ..Link::unsaved((1, 1), (2, 1), 100)
        }
    }

    #[test]
    fn view_tracks_port_occupancy() {
        let mut view = LinkView::default();
        let dl = DiffLink::new("10.0.0.1", 1, "10.0.0.2", 1);
        view.insert(&dl.to_string(), &dl, link(7));

        let port = Endpoint::new("10.0.0.2", 1);
        assert_eq!(view.occupant(&port).map(String::as_str), Some("10.0.0.1:1-10.0.0.2:1"));

        view.remove(&dl.to_string());
        assert!(view.occupant(&port).is_none());
        assert!(view.links.is_empty());
    }

    #[tokio::test]
    async fn push_and_pull_agree_on_one_link() {
        let (m, repo, ctx) = running();
        let inner = &m.inner;
        let ext = observed(100_000_000);
        let key = ext.key();
        inner.store.external_links.set(key.clone(), ext.clone());

        tokio::join!(
            inner.materialize_link(&ctx, &ext),
            inner.sync_links(&ctx),
            inner.materialize_link(&ctx, &ext),
        );
        assert_eq!(repo.call_count(RepoOp::CreateLink), 1);
        assert_eq!(inner.store.current_links.len(), 1);

        inner.store.external_links.delete(&key);
        tokio::join!(inner.retire_link(&ctx, &key), inner.sync_links(&ctx));
        assert_eq!(repo.call_count(RepoOp::DeleteLink), 1);
        assert!(inner.store.current_links.is_empty());
        assert!(repo.snapshot(1).unwrap().links.is_empty());
    }

    #[tokio::test]
    async fn sub_megabit_report_keeps_link_speed() {
        let (m, repo, ctx) = running();
        let inner = &m.inner;
        let ext = observed(100_000_000);
        let key = ext.key();
        inner.store.external_links.set(key.clone(), ext.clone());
        inner.materialize_link(&ctx, &ext).await;

        inner.store.external_links.set(key.clone(), observed(500_000));
        inner.sync_link_speed(&ctx).await;
        assert_eq!(inner.store.current_links.get(&key).unwrap().speed_mbps, 100);
        assert_eq!(repo.call_count(RepoOp::UpdateLink), 0);

        inner.store.external_links.set(key.clone(), observed(1_000_000_000));
        inner.sync_link_speed(&ctx).await;
        assert_eq!(inner.store.current_links.get(&key).unwrap().speed_mbps, 1000);
        assert_eq!(repo.snapshot(1).unwrap().links[0].speed_mbps, 1000);
    }
}
