// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `subnamespace.rs`

#[cfg(test)]
mod tests {
    use crate::config::ControllerConfig;
    use crate::constants::{
        HNC_SUBNAMESPACE_OF_ANNOTATION, KIND_SUBNAMESPACE_ANCHOR, SUBNAMESPACE_FINALIZER,
    };
    use crate::context::Context;
    use crate::crd::{Organization, OrganizationSpec, Space, SpaceSpec, SubnamespaceAnchor};
    use crate::engine::{Action, Reconciler};
    use crate::errors::ReconcileError;
    use crate::reconcilers::finalizers::has_finalizer;
    use crate::reconcilers::status::find_condition;
    use crate::reconcilers::subnamespace::{
        anchor_owner, namespace_owner, SubnamespaceReconciler, Tenant,
    };
    use crate::status_reasons::{
        CONDITION_SUBNAMESPACE_READY, REASON_SUBNAMESPACE_CONFLICT, REASON_SUBNAMESPACE_CREATED,
        REASON_SUBNAMESPACE_PENDING, STATUS_FALSE, STATUS_TRUE,
    };
    use crate::store::memory::{MemoryStore, WriteOp};
    use crate::store::{is_deleting, to_dynamic, ObjectKey, ResourceStore};
    use k8s_openapi::api::core::v1::Namespace;
    use kube::api::ObjectMeta;
    use kube::ResourceExt;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    const ROOT: &str = "cf";

    fn setup(memory: MemoryStore) -> (Arc<MemoryStore>, Arc<Context>) {
        let memory = Arc::new(memory);
        let store: Arc<dyn ResourceStore> = memory.clone();
        let config = ControllerConfig {
            deletion_poll_interval: Duration::from_millis(10),
            deletion_timeout: Duration::from_secs(5),
            ..ControllerConfig::default()
        };
        let ctx = Arc::new(Context::new(store, config));
        (memory, ctx)
    }

    fn org(name: &str) -> Organization {
        let mut org = Organization::new(
            name,
            OrganizationSpec {
                display_name: name.to_string(),
            },
        );
        org.metadata.namespace = Some(ROOT.to_string());
        org
    }

    fn space(org: &str, name: &str) -> Space {
        let mut space = Space::new(
            name,
            SpaceSpec {
                display_name: name.to_string(),
            },
        );
        space.metadata.namespace = Some(org.to_string());
        space
    }

    fn foreign_namespace(name: &str, parent: &str) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                annotations: Some(BTreeMap::from([(
                    HNC_SUBNAMESPACE_OF_ANNOTATION.to_string(),
                    parent.to_string(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    async fn provision_org(ctx: &Arc<Context>, name: &str) {
        ctx.namespaced::<Organization>(ROOT)
            .create(&org(name))
            .await
            .unwrap();
        SubnamespaceReconciler::<Organization>::new(ctx.clone())
            .reconcile(&ObjectKey::namespaced(ROOT, name))
            .await
            .unwrap();
    }

    async fn provision_space(ctx: &Arc<Context>, org: &str, name: &str) {
        ctx.namespaced::<Space>(org)
            .create(&space(org, name))
            .await
            .unwrap();
        SubnamespaceReconciler::<Space>::new(ctx.clone())
            .reconcile(&ObjectKey::namespaced(org, name))
            .await
            .unwrap();
    }

    /// Act as the Space controller while an Organization cascade waits for its
    /// namespace to terminate.
    async fn release_spaces(ctx: &Arc<Context>, org: &str) {
        let spaces = ctx.namespaced::<Space>(org);
        let reconciler = SubnamespaceReconciler::<Space>::new(ctx.clone());
        for _ in 0..500 {
            let remaining = spaces.list().await.unwrap();
            if remaining.is_empty() {
                return;
            }
            for space in remaining.iter().filter(|s| is_deleting(*s)) {
                reconciler
                    .reconcile(&ObjectKey::namespaced(org, space.name_any()))
                    .await
                    .unwrap();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("spaces in {org} were never released");
    }

    #[tokio::test]
    async fn test_organization_gets_subnamespace() {
        let (_, ctx) = setup(MemoryStore::with_namespace_hierarchy());
        provision_org(&ctx, "org-a").await;

        let anchor = ctx
            .namespaced::<SubnamespaceAnchor>(ROOT)
            .get("org-a")
            .await
            .unwrap();
        assert!(anchor.is_some());
        assert!(ctx.all::<Namespace>().get("org-a").await.unwrap().is_some());

        let stored = ctx
            .namespaced::<Organization>(ROOT)
            .get("org-a")
            .await
            .unwrap()
            .unwrap();
        assert!(has_finalizer(&stored, SUBNAMESPACE_FINALIZER));
        let conditions = stored.conditions();
        let ready = find_condition(&conditions, CONDITION_SUBNAMESPACE_READY).unwrap();
        assert_eq!(ready.status, STATUS_TRUE);
        assert_eq!(ready.reason, REASON_SUBNAMESPACE_CREATED);
    }

    #[tokio::test]
    async fn test_reconcile_twice_writes_nothing() {
        let (memory, ctx) = setup(MemoryStore::with_namespace_hierarchy());
        provision_org(&ctx, "org-a").await;

        let writes = memory.writes();
        let action = SubnamespaceReconciler::<Organization>::new(ctx.clone())
            .reconcile(&ObjectKey::namespaced(ROOT, "org-a"))
            .await
            .unwrap();
        assert_eq!(action, Action::AwaitChange);
        assert_eq!(memory.writes(), writes);
    }

    #[tokio::test]
    async fn test_namespace_under_other_parent_conflicts() {
        let (_, ctx) = setup(MemoryStore::with_namespace_hierarchy());
        ctx.all::<Namespace>()
            .create(&foreign_namespace("org-a", "somewhere-else"))
            .await
            .unwrap();
        ctx.namespaced::<Organization>(ROOT)
            .create(&org("org-a"))
            .await
            .unwrap();

        let err = SubnamespaceReconciler::<Organization>::new(ctx.clone())
            .reconcile(&ObjectKey::namespaced(ROOT, "org-a"))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, ReconcileError::Terminal { reason, .. } if reason == REASON_SUBNAMESPACE_CONFLICT)
        );

        let stored = ctx
            .namespaced::<Organization>(ROOT)
            .get("org-a")
            .await
            .unwrap()
            .unwrap();
        let conditions = stored.conditions();
        let ready = find_condition(&conditions, CONDITION_SUBNAMESPACE_READY).unwrap();
        assert_eq!(ready.status, STATUS_FALSE);
        assert_eq!(ready.reason, REASON_SUBNAMESPACE_CONFLICT);
    }

    #[tokio::test]
    async fn test_missing_namespace_reports_pending() {
        let (_, ctx) = setup(MemoryStore::new());
        provision_org(&ctx, "org-a").await;

        let stored = ctx
            .namespaced::<Organization>(ROOT)
            .get("org-a")
            .await
            .unwrap()
            .unwrap();
        let conditions = stored.conditions();
        let ready = find_condition(&conditions, CONDITION_SUBNAMESPACE_READY).unwrap();
        assert_eq!(ready.status, STATUS_FALSE);
        assert_eq!(ready.reason, REASON_SUBNAMESPACE_PENDING);
    }

    #[tokio::test]
    async fn test_space_waits_for_organization() {
        let (_, ctx) = setup(MemoryStore::with_namespace_hierarchy());
        ctx.namespaced::<Space>("org-a")
            .create(&space("org-a", "space-a"))
            .await
            .unwrap();

        let err = SubnamespaceReconciler::<Space>::new(ctx.clone())
            .reconcile(&ObjectKey::namespaced("org-a", "space-a"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(ctx
            .namespaced::<SubnamespaceAnchor>("org-a")
            .get("space-a")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_space_not_provisioned_under_deleting_organization() {
        let (_, ctx) = setup(MemoryStore::with_namespace_hierarchy());
        provision_org(&ctx, "org-a").await;
        ctx.namespaced::<Organization>(ROOT)
            .delete("org-a")
            .await
            .unwrap();
        ctx.namespaced::<Space>("org-a")
            .create(&space("org-a", "space-a"))
            .await
            .unwrap();

        SubnamespaceReconciler::<Space>::new(ctx.clone())
            .reconcile(&ObjectKey::namespaced("org-a", "space-a"))
            .await
            .unwrap();
        assert!(ctx
            .namespaced::<SubnamespaceAnchor>("org-a")
            .get("space-a")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_organization_delete_cascades_children_first() {
        let (memory, ctx) = setup(MemoryStore::with_namespace_hierarchy());
        provision_org(&ctx, "org-a").await;
        provision_space(&ctx, "org-a", "space-a").await;
        provision_space(&ctx, "org-a", "space-b").await;

        ctx.namespaced::<Organization>(ROOT)
            .delete("org-a")
            .await
            .unwrap();
        let reconciler = SubnamespaceReconciler::<Organization>::new(ctx.clone());
        let key = ObjectKey::namespaced(ROOT, "org-a");
        let (result, ()) = tokio::join!(reconciler.reconcile(&key), release_spaces(&ctx, "org-a"));
        result.unwrap();

        let anchor_deletes: Vec<ObjectKey> = memory
            .write_log()
            .into_iter()
            .filter(|w| w.op == WriteOp::Delete && w.kind == KIND_SUBNAMESPACE_ANCHOR)
            .map(|w| w.key)
            .collect();
        assert_eq!(anchor_deletes.len(), 3);
        assert_eq!(
            anchor_deletes.last(),
            Some(&ObjectKey::namespaced(ROOT, "org-a"))
        );

        let namespaces = ctx.all::<Namespace>();
        for name in ["org-a", "space-a", "space-b"] {
            assert!(namespaces.get(name).await.unwrap().is_none(), "{name}");
        }
        assert!(ctx
            .namespaced::<Organization>(ROOT)
            .get("org-a")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_failed_child_keeps_parent() {
        let (memory, ctx) = setup(MemoryStore::with_namespace_hierarchy());
        provision_org(&ctx, "org-a").await;
        provision_space(&ctx, "org-a", "space-a").await;
        provision_space(&ctx, "org-a", "space-b").await;
        memory.fail_deletes_of(KIND_SUBNAMESPACE_ANCHOR, "space-a");

        ctx.namespaced::<Organization>(ROOT)
            .delete("org-a")
            .await
            .unwrap();
        let reconciler = SubnamespaceReconciler::<Organization>::new(ctx.clone());
        let key = ObjectKey::namespaced(ROOT, "org-a");
        let err = reconciler.reconcile(&key).await.unwrap_err();
        assert!(err.is_transient());

        let orgs = ctx.namespaced::<Organization>(ROOT);
        let held = orgs.get("org-a").await.unwrap().unwrap();
        assert!(has_finalizer(&held, SUBNAMESPACE_FINALIZER));
        assert!(ctx
            .namespaced::<SubnamespaceAnchor>(ROOT)
            .get("org-a")
            .await
            .unwrap()
            .is_some());
        // the healthy sibling still went
        assert!(ctx.all::<Namespace>().get("space-b").await.unwrap().is_none());

        memory.allow_deletes_of(KIND_SUBNAMESPACE_ANCHOR, "space-a");
        let (result, ()) = tokio::join!(reconciler.reconcile(&key), release_spaces(&ctx, "org-a"));
        result.unwrap();
        assert!(orgs.get("org-a").await.unwrap().is_none());
        assert!(ctx.all::<Namespace>().get("org-a").await.unwrap().is_none());
    }

    #[test]
    fn test_watch_mappers_split_by_scope() {
        let org_anchor = to_dynamic(&{
            let mut a = SubnamespaceAnchor::new("org-a", Default::default());
            a.metadata.namespace = Some(ROOT.to_string());
            a
        })
        .unwrap();
        let space_anchor = to_dynamic(&{
            let mut a = SubnamespaceAnchor::new("space-a", Default::default());
            a.metadata.namespace = Some("org-a".to_string());
            a
        })
        .unwrap();

        assert_eq!(
            anchor_owner::<Organization>(ROOT, &org_anchor),
            vec![ObjectKey::namespaced(ROOT, "org-a")]
        );
        assert!(anchor_owner::<Space>(ROOT, &org_anchor).is_empty());
        assert_eq!(
            anchor_owner::<Space>(ROOT, &space_anchor),
            vec![ObjectKey::namespaced("org-a", "space-a")]
        );

        let ns = to_dynamic(&foreign_namespace("space-a", "org-a")).unwrap();
        assert_eq!(
            namespace_owner::<Space>(ROOT, &ns),
            vec![ObjectKey::namespaced("org-a", "space-a")]
        );
        assert!(namespace_owner::<Organization>(ROOT, &ns).is_empty());
    }
}
