//! End-to-end orchestrator tests over the mock platform

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use strata_core::{EnvRefValue, Kind, PlatformId, Status};
use strata_engine::{
    ApplyOptions, BucketRecord, BucketService, EndpointRecord, EngineError, ExportOptions,
    MockPlatform, NotificationRuleService, Orchestrator, OrgExportFilter, StateStatus,
};
use strata_stack::{AdditionalResource, MemoryStore, StackUpdate};
use tokio_util::sync::CancellationToken;

const ORG: PlatformId = PlatformId(100);

fn orchestrator(platform: &Arc<MockPlatform>, store: &Arc<MemoryStore>) -> Orchestrator {
    Orchestrator::builder()
        .with_platform(platform.clone())
        .with_store(store.clone())
        .build()
        .unwrap()
}

fn harness() -> (Arc<MockPlatform>, Arc<MemoryStore>, Orchestrator, CancellationToken) {
    let platform = Arc::new(MockPlatform::new());
    platform.seed_org(ORG);
    let store = Arc::new(MemoryStore::new());
    let svc = orchestrator(&platform, &store);
    (platform, store, svc, CancellationToken::new())
}

fn template(source: &str) -> strata_core::Template {
    strata_core::Template::from_yaml(source).unwrap()
}

const KITCHEN_SINK: &str = r##"
---
kind: Label
metadata:
  name: label-1
spec:
  color: "#aabbcc"
  description: important
---
kind: Bucket
metadata:
  name: bkt-1
spec:
  name: rucket-11
  retention: 30h
  associations:
    - label-1
---
kind: Variable
metadata:
  name: var-1
spec:
  args:
    type: constant
    values: ["a", "b"]
---
kind: Telegraf
metadata:
  name: tele-1
spec:
  config: "[[inputs.cpu]]"
---
kind: CheckThreshold
metadata:
  name: check-1
spec:
  every: 1m
  query: 'from(bucket: "rucket-11")'
  thresholds:
    - level: CRIT
      type: greater
      value: 90.0
---
kind: NotificationEndpointHTTP
metadata:
  name: endpoint-0
spec:
  url: https://hooks.example.com/alerts
---
kind: NotificationRule
metadata:
  name: rule-0
spec:
  endpointName: endpoint-0
  every: 10m
  statusRules:
    - current: CRIT
---
kind: Task
metadata:
  name: task-1
spec:
  query: buckets()
  every: 1h
"##;

#[tokio::test]
async fn test_bucket_update_plans_one_change() {
    // S1: live bucket differs in description and retention
    let (platform, _store, svc, ctx) = harness();
    platform.seed_bucket(BucketRecord {
        id: PlatformId::ZERO,
        org_id: ORG,
        name: "rucket-11".to_string(),
        description: Some("old".to_string()),
        retention: Some(Duration::from_secs(30 * 3600)),
    });

    let source = r#"
kind: Bucket
metadata:
  name: bkt-1
spec:
  name: rucket-11
  description: bucket 1 description
  retention: 1h
"#;
    let opts = ApplyOptions::new().with_template(template(source));
    let summary = svc.dry_run(&ctx, ORG, opts.clone()).await.unwrap();

    assert_eq!(summary.diffs.buckets.len(), 1);
    let diff = &summary.diffs.buckets[0];
    assert_eq!(diff.identifier.state, StateStatus::Exists);
    assert!(diff.has_change());
    assert_eq!(
        diff.old.as_ref().unwrap().retention,
        Some(Duration::from_secs(30 * 3600))
    );
    assert_eq!(diff.new.as_ref().unwrap().retention, Some(Duration::from_secs(3600)));

    svc.apply(&ctx, ORG, opts).await.unwrap();
    assert_eq!(platform.op_count("bucket", "update"), 1);
    assert_eq!(platform.op_count("bucket", "create"), 0);
}

#[tokio::test]
async fn test_label_create_failure_rolls_back_earlier_creates() {
    // S2: the third label create fails; the first two are deleted
    let (platform, _store, svc, ctx) = harness();
    platform.fail_on("label", "create", 3);

    let source = r#"
---
kind: Label
metadata:
  name: l1
---
kind: Label
metadata:
  name: l2
---
kind: Label
metadata:
  name: l3
"#;
    let err = svc
        .apply(&ctx, ORG, ApplyOptions::new().with_template(template(source)))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Rollback { .. }));
    assert!(platform.op_count("label", "delete") >= 2);
    assert_eq!(platform.live_count("label"), 0);
}

#[tokio::test]
async fn test_rule_binds_to_existing_endpoint_by_name() {
    // S3: live endpoint with the declared name; no new endpoint created
    let (platform, _store, svc, ctx) = harness();
    let live = platform.seed_endpoint(EndpointRecord {
        id: PlatformId(1),
        org_id: ORG,
        name: "endpoint-0".to_string(),
        description: None,
        status: Status::Active,
        spec: strata_core::EndpointSpec::Http(strata_core::HttpEndpointSpec {
            url: "https://hooks.example.com/alerts".to_string(),
            ..http_spec_defaults()
        }),
    });
    assert_eq!(live.id, PlatformId(1));

    let source = r#"
---
kind: NotificationEndpointHTTP
metadata:
  name: endpoint-0
spec:
  url: https://hooks.example.com/alerts
---
kind: NotificationRule
metadata:
  name: rule-0
spec:
  endpointName: endpoint-0
  every: 10m
  statusRules:
    - current: CRIT
"#;
    svc.apply(&ctx, ORG, ApplyOptions::new().with_template(template(source)))
        .await
        .unwrap();

    assert_eq!(platform.op_count("endpoint", "create"), 0);
    let rule = platform
        .find_rule_by_name(&ctx, ORG, "rule-0")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rule.endpoint_id, PlatformId(1));
}

#[tokio::test]
async fn test_missing_secret_is_reported_without_error() {
    // S4: referenced secret key absent from the store
    let (platform, _store, svc, ctx) = harness();
    platform.seed_secret_keys(ORG, &["rando-1", "rando-2"]);

    let source = r#"
kind: NotificationEndpointPagerDuty
metadata:
  name: pd
spec:
  routingKey:
    secretRef:
      key: routing-key
"#;
    let summary = svc
        .dry_run(&ctx, ORG, ApplyOptions::new().with_template(template(source)))
        .await
        .unwrap();
    assert_eq!(summary.missing_secrets, vec!["routing-key".to_string()]);
}

#[tokio::test]
async fn test_provided_secrets_suppress_missing_report() {
    let (_platform, _store, svc, ctx) = harness();
    let source = r#"
kind: NotificationEndpointPagerDuty
metadata:
  name: pd
spec:
  routingKey:
    secretRef:
      key: routing-key
"#;
    let opts = ApplyOptions::new()
        .with_template(template(source))
        .with_secrets(HashMap::from([("routing-key".to_string(), "shh".to_string())]));
    let summary = svc.dry_run(&ctx, ORG, opts).await.unwrap();
    assert!(summary.missing_secrets.is_empty());
}

#[tokio::test]
async fn test_stack_update_renames_meta_name_collision() {
    // S5: two adopted resources collide with an owned meta-name
    let (_platform, _store, svc, ctx) = harness();
    let stack = svc.init_stack(&ctx, ORG, "s", "", vec![]).await.unwrap();

    svc.update_stack(stack.id, StackUpdate {
        additional_resources: vec![AdditionalResource {
            kind: Kind::Label,
            id: PlatformId(1),
            meta_name: "meta-label".to_string(),
        }],
        ..StackUpdate::default()
    })
    .await
    .unwrap();

    let updated = svc
        .update_stack(stack.id, StackUpdate {
            additional_resources: vec![
                AdditionalResource {
                    kind: Kind::Label,
                    id: PlatformId(1),
                    meta_name: "meta-label".to_string(),
                },
                AdditionalResource {
                    kind: Kind::Label,
                    id: PlatformId(2),
                    meta_name: "meta-label".to_string(),
                },
            ],
            ..StackUpdate::default()
        })
        .await
        .unwrap();

    let resources = &updated.latest_event().resources;
    assert_eq!(resources.len(), 2);
    let kept = resources.iter().find(|r| r.meta_name == "meta-label").unwrap();
    assert_eq!(kept.id, PlatformId(1));
    let renamed = resources.iter().find(|r| r.meta_name != "meta-label").unwrap();
    assert_eq!(renamed.id, PlatformId(2));
    assert!(renamed.meta_name.starts_with("collision-1-"));
}

#[tokio::test]
async fn test_template_urls_are_normalized() {
    // S6: file URLs dropped, raw github rewritten
    let (_platform, _store, svc, ctx) = harness();
    let stack = svc.init_stack(&ctx, ORG, "s", "", vec![]).await.unwrap();

    let updated = svc
        .update_stack(stack.id, StackUpdate {
            template_urls: Some(vec![
                "file:///x".to_string(),
                "https://raw.githubusercontent.com/o/r/main/f.yml".to_string(),
            ]),
            ..StackUpdate::default()
        })
        .await
        .unwrap();

    assert_eq!(
        updated.latest_event().template_urls,
        vec!["https://github.com/o/r/blob/main/f.yml".to_string()]
    );
}

#[tokio::test]
async fn test_apply_then_dry_run_is_idempotent() {
    // Property 1: a second plan after apply reports nothing to do
    let (_platform, _store, svc, ctx) = harness();
    let applied = svc
        .apply(&ctx, ORG, ApplyOptions::new().with_template(template(KITCHEN_SINK)))
        .await
        .unwrap();
    let stack_id = applied.stack_id.unwrap();

    let summary = svc
        .dry_run(
            &ctx,
            ORG,
            ApplyOptions::new()
                .with_template(template(KITCHEN_SINK))
                .with_stack_id(stack_id),
        )
        .await
        .unwrap();

    assert_eq!(summary.diffs.count_in_state(StateStatus::New), 0);
    assert_eq!(summary.diffs.count_in_state(StateStatus::Remove), 0);
    assert_eq!(summary.diffs.changed_count(), 0);
}

#[tokio::test]
async fn test_apply_export_dry_run_round_trip_is_a_noop() {
    // Property 2: exporting the org and re-planning changes nothing
    let (_platform, _store, svc, ctx) = harness();
    svc.apply(&ctx, ORG, ApplyOptions::new().with_template(template(KITCHEN_SINK)))
        .await
        .unwrap();

    let exported = svc
        .export(
            &ctx,
            ExportOptions::new().with_all_org_resources(OrgExportFilter {
                org_id: ORG,
                resource_kinds: vec![],
                label_names: vec![],
            }),
        )
        .await
        .unwrap();

    // The export must round-trip its encoding
    let reparsed = strata_core::Template::from_yaml(&exported.to_yaml().unwrap()).unwrap();
    let summary = svc
        .dry_run(&ctx, ORG, ApplyOptions::new().with_template(reparsed))
        .await
        .unwrap();

    assert_eq!(summary.diffs.count_in_state(StateStatus::New), 0);
    assert_eq!(summary.diffs.changed_count(), 0);
}

#[tokio::test]
async fn test_rollback_leaves_zero_net_resources() {
    // Property 3: an injected failure at any write leaves nothing behind
    for (resource, op, nth) in [
        ("bucket", "create", 1),
        ("check", "create", 1),
        ("endpoint", "create", 1),
        ("rule", "create", 1),
        ("task", "create", 1),
        ("mapping", "create", 1),
    ] {
        let (platform, _store, svc, ctx) = harness();
        platform.fail_on(resource, op, nth);

        let err = svc
            .apply(&ctx, ORG, ApplyOptions::new().with_template(template(KITCHEN_SINK)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Rollback { .. }), "{resource} {op}");
        assert_eq!(platform.total_live(), 0, "leaked resources after {resource} {op} failure");
        assert_eq!(platform.live_count("mapping"), 0);
    }
}

#[tokio::test]
async fn test_stack_meta_names_stay_unique_across_updates() {
    // Property 4
    let (_platform, _store, svc, ctx) = harness();
    let stack = svc.init_stack(&ctx, ORG, "s", "", vec![]).await.unwrap();

    for round in 0..4u64 {
        svc.update_stack(stack.id, StackUpdate {
            additional_resources: (0..3)
                .map(|i| AdditionalResource {
                    kind: Kind::Bucket,
                    id: PlatformId(round * 10 + i + 1),
                    meta_name: "shared".to_string(),
                })
                .collect(),
            ..StackUpdate::default()
        })
        .await
        .unwrap();
    }

    let latest = svc.read_stack(stack.id).await.unwrap();
    let resources = &latest.latest_event().resources;
    let mut identities: Vec<(Kind, String)> = resources
        .iter()
        .map(|r| (r.kind, r.meta_name.clone()))
        .collect();
    identities.sort();
    identities.dedup();
    assert_eq!(identities.len(), resources.len());
}

#[tokio::test]
async fn test_skips_never_increase_diff_counts() {
    // Property 5
    let (_platform, _store, svc, ctx) = harness();
    let base = svc
        .dry_run(&ctx, ORG, ApplyOptions::new().with_template(template(KITCHEN_SINK)))
        .await
        .unwrap();

    for kind in [Kind::Check, Kind::Label, Kind::NotificationEndpoint, Kind::Task] {
        let skipped = svc
            .dry_run(
                &ctx,
                ORG,
                ApplyOptions::new()
                    .with_template(template(KITCHEN_SINK))
                    .with_kind_skip(kind),
            )
            .await
            .unwrap();
        assert!(skipped.diffs.total() < base.diffs.total(), "skip of {kind} dropped nothing");
    }

    let resource_skip = svc
        .dry_run(
            &ctx,
            ORG,
            ApplyOptions::new()
                .with_template(template(KITCHEN_SINK))
                .with_resource_skip(Kind::Bucket, "bkt-1"),
        )
        .await
        .unwrap();
    assert_eq!(resource_skip.diffs.total(), base.diffs.total() - 1);
    assert!(resource_skip.diffs.buckets.is_empty());
}

#[tokio::test]
async fn test_kind_skip_excludes_resources_from_apply() {
    let (platform, _store, svc, ctx) = harness();
    svc.apply(
        &ctx,
        ORG,
        ApplyOptions::new()
            .with_template(template(KITCHEN_SINK))
            .with_kind_skip(Kind::Check)
            .with_kind_skip(Kind::NotificationRule),
    )
    .await
    .unwrap();

    assert_eq!(platform.live_count("check"), 0);
    assert_eq!(platform.live_count("rule"), 0);
    assert_eq!(platform.live_count("bucket"), 1);
}

#[tokio::test]
async fn test_removed_resources_are_deleted_on_next_apply() {
    let (platform, _store, svc, ctx) = harness();
    let two_labels = r#"
---
kind: Label
metadata:
  name: l1
---
kind: Label
metadata:
  name: l2
"#;
    let applied = svc
        .apply(&ctx, ORG, ApplyOptions::new().with_template(template(two_labels)))
        .await
        .unwrap();
    assert_eq!(platform.live_count("label"), 2);

    let one_label = "kind: Label\nmetadata:\n  name: l1\n";
    let summary = svc
        .apply(
            &ctx,
            ORG,
            ApplyOptions::new()
                .with_template(template(one_label))
                .with_stack_id(applied.stack_id.unwrap()),
        )
        .await
        .unwrap();

    assert_eq!(platform.live_count("label"), 1);
    assert_eq!(summary.diffs.count_in_state(StateStatus::Remove), 1);
}

#[tokio::test]
async fn test_label_associations_create_mappings() {
    let (platform, _store, svc, ctx) = harness();
    svc.apply(&ctx, ORG, ApplyOptions::new().with_template(template(KITCHEN_SINK)))
        .await
        .unwrap();
    // bucket-1 carries the only association in the template
    assert_eq!(platform.live_count("mapping"), 1);
}

#[tokio::test]
async fn test_unbound_env_ref_fails_apply_but_not_dry_run() {
    let (_platform, _store, svc, ctx) = harness();
    let source = r#"
kind: Bucket
metadata:
  name: bkt-env
spec:
  name:
    envRef:
      key: bucket-name
"#;
    let summary = svc
        .dry_run(&ctx, ORG, ApplyOptions::new().with_template(template(source)))
        .await
        .unwrap();
    assert_eq!(summary.missing_env_refs, vec!["bucket-name".to_string()]);

    let err = svc
        .apply(&ctx, ORG, ApplyOptions::new().with_template(template(source)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));
}

#[tokio::test]
async fn test_env_ref_binding_flows_into_the_plan() {
    let (platform, _store, svc, ctx) = harness();
    let source = r#"
kind: Bucket
metadata:
  name: bkt-env
spec:
  name:
    envRef:
      key: bucket-name
"#;
    let opts = ApplyOptions::new()
        .with_template(template(source))
        .with_env_refs(HashMap::from([(
            "bucket-name".to_string(),
            EnvRefValue::from("prod-metrics"),
        )]));
    svc.apply(&ctx, ORG, opts).await.unwrap();

    let found = platform
        .find_bucket_by_name(&ctx, ORG, "prod-metrics")
        .await
        .unwrap();
    assert!(found.is_some());
}

#[tokio::test]
async fn test_validation_defects_are_aggregated() {
    let (_platform, _store, svc, ctx) = harness();
    let source = r#"
---
kind: Label
metadata:
  name: l1
spec:
  color: nope
---
kind: Task
metadata:
  name: t1
spec:
  query: ""
"#;
    let err = svc
        .dry_run(&ctx, ORG, ApplyOptions::new().with_template(template(source)))
        .await
        .unwrap_err();
    match err {
        EngineError::Validation { defects } => assert_eq!(defects.len(), 3),
        other => panic!("expected Validation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_dangling_rule_reference_is_reported() {
    let (_platform, _store, svc, ctx) = harness();
    let source = r#"
kind: NotificationRule
metadata:
  name: rule-0
spec:
  endpointName: ghost
  every: 1m
  statusRules:
    - current: CRIT
"#;
    let err = svc
        .dry_run(&ctx, ORG, ApplyOptions::new().with_template(template(source)))
        .await
        .unwrap_err();
    match err {
        EngineError::RefMissing { missing } => {
            assert_eq!(missing.len(), 1);
            assert_eq!(missing[0].reference, "ghost");
        }
        other => panic!("expected RefMissing, got {other:?}"),
    }
}

#[tokio::test]
async fn test_uninstall_deletes_owned_resources_and_is_terminal() {
    let (platform, _store, svc, ctx) = harness();
    let applied = svc
        .apply(&ctx, ORG, ApplyOptions::new().with_template(template(KITCHEN_SINK)))
        .await
        .unwrap();
    let stack_id = applied.stack_id.unwrap();
    assert!(platform.total_live() > 0);

    let stack = svc.uninstall(&ctx, ORG, stack_id).await.unwrap();
    assert!(stack.is_uninstalled());
    assert_eq!(platform.total_live(), 0);

    let err = svc
        .apply(
            &ctx,
            ORG,
            ApplyOptions::new()
                .with_template(template(KITCHEN_SINK))
                .with_stack_id(stack_id),
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_init_stack_requires_existing_org() {
    let (_platform, _store, svc, ctx) = harness();
    let err = svc
        .init_stack(&ctx, PlatformId(999), "s", "", vec![])
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_cancellation_aborts_apply_with_rollback() {
    let (platform, _store, svc, ctx) = harness();
    ctx.cancel();

    let err = svc
        .apply(&ctx, ORG, ApplyOptions::new().with_template(template(KITCHEN_SINK)))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(platform.total_live(), 0);
}

#[tokio::test]
async fn test_export_by_stack_reproduces_owned_resources() {
    let (_platform, _store, svc, ctx) = harness();
    let applied = svc
        .apply(&ctx, ORG, ApplyOptions::new().with_template(template(KITCHEN_SINK)))
        .await
        .unwrap();

    let exported = svc
        .export(
            &ctx,
            ExportOptions::new().with_stack_id(applied.stack_id.unwrap()),
        )
        .await
        .unwrap();

    // label, bucket, variable, telegraf, check, endpoint, rule, task
    assert_eq!(exported.len(), 8);
    let kinds: Vec<Kind> = exported.objects().map(|o| o.kind).collect();
    assert!(kinds.contains(&Kind::CheckThreshold));
    assert!(kinds.contains(&Kind::NotificationEndpointHttp));
}

#[tokio::test]
async fn test_export_strips_task_option_preamble() {
    let (platform, _store, svc, ctx) = harness();
    let task = platform.seed_task(strata_engine::TaskRecord {
        id: PlatformId::ZERO,
        org_id: ORG,
        name: "daily-rollup".to_string(),
        description: None,
        flux: "option task = { name: \"daily-rollup\", every: 1d }\nfrom(bucket: \"b\")".to_string(),
        every: Some(Duration::from_secs(86_400)),
        cron: None,
        offset: None,
        status: Status::Active,
        task_type: "system".to_string(),
    });

    let exported = svc
        .export(
            &ctx,
            ExportOptions::new().with_resources(vec![strata_engine::ResourceToClone {
                kind: Kind::Task,
                id: task.id,
                name: None,
            }]),
        )
        .await
        .unwrap();

    let object = exported.objects().next().unwrap();
    assert_eq!(object.spec["query"], "from(bucket: \"b\")");
    assert_eq!(object.spec["every"], "1day");
}

#[tokio::test]
async fn test_org_export_excludes_check_owned_tasks() {
    let (platform, _store, svc, ctx) = harness();
    // A check whose platform task must not surface as a standalone task
    let check = platform.seed_check(strata_engine::CheckRecord {
        id: PlatformId::ZERO,
        org_id: ORG,
        task_id: PlatformId::ZERO,
        name: "cpu".to_string(),
        description: None,
        every: Duration::from_secs(60),
        offset: None,
        status_message_template: String::new(),
        status: Status::Active,
        tags: Default::default(),
        spec: strata_core::CheckSpec::Threshold(strata_core::ThresholdCheckSpec {
            query: "q".to_string(),
            thresholds: vec![],
        }),
    });
    platform.seed_task(strata_engine::TaskRecord {
        id: check.task_id,
        org_id: ORG,
        name: "cpu (check task)".to_string(),
        description: None,
        flux: "checks()".to_string(),
        every: Some(Duration::from_secs(60)),
        cron: None,
        offset: None,
        status: Status::Active,
        task_type: "system".to_string(),
    });

    let exported = svc
        .export(
            &ctx,
            ExportOptions::new().with_all_org_resources(OrgExportFilter {
                org_id: ORG,
                resource_kinds: vec![],
                label_names: vec![],
            }),
        )
        .await
        .unwrap();

    let kinds: Vec<Kind> = exported.objects().map(|o| o.kind).collect();
    assert_eq!(kinds, vec![Kind::CheckThreshold]);
}

#[tokio::test]
async fn test_export_name_override_becomes_meta_name() {
    let (platform, _store, svc, ctx) = harness();
    let bucket = platform.seed_bucket(BucketRecord {
        id: PlatformId::ZERO,
        org_id: ORG,
        name: "live-name".to_string(),
        description: None,
        retention: None,
    });

    let exported = svc
        .export(
            &ctx,
            ExportOptions::new().with_resources(vec![strata_engine::ResourceToClone {
                kind: Kind::Bucket,
                id: bucket.id,
                name: Some("renamed".to_string()),
            }]),
        )
        .await
        .unwrap();

    let object = exported.objects().next().unwrap();
    assert_eq!(object.meta_name, "renamed");
    assert_eq!(object.spec["name"], "renamed");
}

fn http_spec_defaults() -> strata_core::HttpEndpointSpec {
    strata_core::HttpEndpointSpec {
        url: String::new(),
        method: strata_core::HttpMethod::Post,
        auth_method: strata_core::HttpAuthMethod::None,
        username: None,
        password: None,
        token: None,
        content_template: None,
    }
}
