//! Provisioning and teardown against the in-memory cloud

mod common;

use common::{config, Answer, FakeCloud, NoHelper, Unreachable, ACCOUNT, CLUSTER, REGION};

use irsa::config::Parameters;
use irsa::document::{PolicySource, TrustPolicy};
use irsa::iam::{ensure_attached, ensure_policy, ensure_role, MAX_POLICY_VERSIONS};
use irsa::metadata::ClusterMetadata;
use irsa::oidc::{OidcOptions, ThumbprintStrategy, ROOT_CA_THUMBPRINT};
use irsa::prompt::Confirm;
use irsa::provision::{provision, ProvisionRequest};
use irsa::teardown::{teardown, StepStatus};
use irsa::Error;

fn request() -> ProvisionRequest {
    ProvisionRequest {
        policy: PolicySource::default(),
        oidc: OidcOptions {
            strategy: ThumbprintStrategy::Auto,
            dry_run: false,
        },
    }
}

async fn provision_fresh(cloud: &FakeCloud) -> irsa::provision::Provisioned {
    provision(cloud, cloud, &NoHelper, &Unreachable, &config(), &request())
        .await
        .unwrap()
}

// =============================================================================
// Story: Parameters resolve against the cloud
// =============================================================================

#[tokio::test]
async fn parameters_resolve_account_issuer_and_network() {
    let cloud = FakeCloud::new();
    let params = Parameters {
        cluster_name: CLUSTER.to_string(),
        region: REGION.to_string(),
        namespace: "orders".to_string(),
        service_account: "orders-api".to_string(),
        resource_name: Some("orders".to_string()),
        ..Default::default()
    };

    let resolved = params.resolve(&cloud, &cloud).await.unwrap();
    assert_eq!(resolved, config());
}

#[tokio::test]
async fn cluster_without_federation_is_a_precondition_failure() {
    let cloud = FakeCloud::new();
    cloud
        .state()
        .clusters
        .get_mut(CLUSTER)
        .unwrap()
        .issuer = None;
    let params = Parameters {
        cluster_name: CLUSTER.to_string(),
        region: REGION.to_string(),
        namespace: "orders".to_string(),
        service_account: "orders-api".to_string(),
        ..Default::default()
    };

    let err = params.resolve(&cloud, &cloud).await.unwrap_err();
    assert!(matches!(err, Error::Precondition { .. }));
    assert_eq!(
        err.hint(),
        Some("eksctl utils associate-iam-oidc-provider --cluster prod-east --region us-east-1 --approve")
    );
}

// =============================================================================
// Story: Scenario A - everything absent
// =============================================================================

#[tokio::test]
async fn fresh_account_gets_role_policy_and_attachment() {
    let cloud = FakeCloud::new();
    let cfg = config();

    let trust = TrustPolicy::for_config(&cfg).to_json().unwrap();
    let role_arn = ensure_role(&cloud, &cfg.role_name, &trust).await.unwrap();
    let policy_arn = ensure_policy(&cloud, &cfg.policy_name, &cfg.policy_arn(), "{\"doc\":1}")
        .await
        .unwrap();
    ensure_attached(&cloud, &role_arn, &policy_arn).await.unwrap();

    let policy = cloud.policy(&policy_arn).unwrap();
    assert_eq!(policy.versions.len(), 1);
    assert!(policy.versions[0].is_default);
    assert_eq!(cloud.role(&cfg.role_name).unwrap().attached, vec![policy_arn]);

    // A later lookup sees the same role
    let again = ensure_role(&cloud, &cfg.role_name, &trust).await.unwrap();
    assert_eq!(again, role_arn);
}

#[tokio::test]
async fn full_provisioning_registers_the_provider_with_the_root_ca_fallback() {
    let cloud = FakeCloud::new();
    let out = provision_fresh(&cloud).await;

    let cfg = config();
    assert_eq!(out.provider_arn, cfg.oidc_provider_arn());
    assert!(cloud.state().providers.contains_key(&out.provider_arn));
    assert_eq!(out.role_arn, cfg.role_arn());
    assert_eq!(out.policy_arn, cfg.policy_arn());
    assert_eq!(cloud.count_calls("iam:CreateOpenIDConnectProvider"), 1);
    assert_eq!(ROOT_CA_THUMBPRINT.len(), 40);
}

#[tokio::test]
async fn trust_policy_admits_exactly_the_service_account() {
    let cloud = FakeCloud::new();
    provision_fresh(&cloud).await;

    let cfg = config();
    let stored = cloud.role(&cfg.role_name).unwrap().trust;
    let trust: TrustPolicy = serde_json::from_str(&stored).unwrap();
    assert_eq!(trust.subject(), Some("system:serviceaccount:orders:orders-api"));
    assert_eq!(trust.audience(), Some("sts.amazonaws.com"));
    assert_eq!(trust.statement.len(), 1);
    assert_eq!(trust.statement[0].principal.federated, cfg.oidc_provider_arn());
}

// =============================================================================
// Story: Idempotence
// =============================================================================

#[tokio::test]
async fn provisioning_twice_converges() {
    let cloud = FakeCloud::new();
    let first = provision_fresh(&cloud).await;
    let second = provision_fresh(&cloud).await;

    assert_eq!(first, second);
    assert_eq!(cloud.count_calls("iam:CreateRole"), 1);
    assert_eq!(cloud.count_calls("iam:CreatePolicy"), 1);
    assert_eq!(cloud.count_calls("iam:CreateOpenIDConnectProvider"), 1);
    assert_eq!(cloud.state().roles.len(), 1);

    let cfg = config();
    let policy = cloud.policy(&cfg.policy_arn()).unwrap();
    assert_eq!(policy.versions.len(), 2);
    assert_eq!(cloud.role(&cfg.role_name).unwrap().attached.len(), 1);
}

#[tokio::test]
async fn rerun_overwrites_the_trust_document() {
    let cloud = FakeCloud::new();
    provision_fresh(&cloud).await;

    let mut cfg = config();
    cfg.service_account = "orders-worker".to_string();
    provision(&cloud, &cloud, &NoHelper, &Unreachable, &cfg, &request())
        .await
        .unwrap();

    let stored = cloud.role(&cfg.role_name).unwrap().trust;
    assert!(stored.contains("system:serviceaccount:orders:orders-worker"));
    assert!(!stored.contains("orders-api\""));
}

// =============================================================================
// Story: Scenario B and the version ceiling
// =============================================================================

#[tokio::test]
async fn full_policy_evicts_the_oldest_non_default_version() {
    let cloud = FakeCloud::new();
    let cfg = config();
    let arn = cfg.policy_arn();
    cloud.seed_policy(&arn, &cfg.policy_name, 5);

    ensure_policy(&cloud, &cfg.policy_name, &arn, "{\"doc\":\"new\"}")
        .await
        .unwrap();

    let policy = cloud.policy(&arn).unwrap();
    let ids: Vec<&str> = policy.versions.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, vec!["v2", "v3", "v4", "v5", "v6"]);
    assert_eq!(policy.default_version().unwrap().id, "v6");
    assert_eq!(policy.default_version().unwrap().document, "{\"doc\":\"new\"}");
}

#[tokio::test]
async fn version_ceiling_holds_across_many_publishes() {
    let cloud = FakeCloud::new();
    let cfg = config();
    let arn = cfg.policy_arn();

    for n in 0..12 {
        ensure_policy(&cloud, &cfg.policy_name, &arn, &format!("{{\"doc\":{}}}", n))
            .await
            .unwrap();
        let policy = cloud.policy(&arn).unwrap();
        assert!(policy.versions.len() <= MAX_POLICY_VERSIONS);
        assert_eq!(policy.versions.iter().filter(|v| v.is_default).count(), 1);
        assert_eq!(
            policy.default_version().unwrap().document,
            format!("{{\"doc\":{}}}", n)
        );
    }
    assert_eq!(cloud.count_calls("iam:CreatePolicy"), 1);
}

// =============================================================================
// Story: Best-effort teardown
// =============================================================================

#[tokio::test]
async fn teardown_removes_role_and_policy_but_keeps_the_provider() {
    let cloud = FakeCloud::new();
    let out = provision_fresh(&cloud).await;
    provision_fresh(&cloud).await;
    let cfg = config();

    let report = teardown(&cloud, &cfg.role_name, &out.policy_arn).await;

    assert!(report.is_clean(), "{}", report);
    assert!(cloud.role(&cfg.role_name).is_none());
    assert!(cloud.policy(&out.policy_arn).is_none());
    assert!(cloud.state().providers.contains_key(&out.provider_arn));
}

#[tokio::test]
async fn teardown_of_nothing_is_already_clean() {
    let cloud = FakeCloud::new();
    let cfg = config();

    let report = teardown(&cloud, &cfg.role_name, &cfg.policy_arn()).await;

    assert!(report.is_clean());
    assert!(report
        .steps
        .iter()
        .all(|s| s.status == StepStatus::AlreadyClean));
}

#[tokio::test]
async fn teardown_continues_past_failures() {
    let cloud = FakeCloud::new();
    let out = provision_fresh(&cloud).await;
    cloud.fail("iam:DeleteRole");
    let cfg = config();

    let report = teardown(&cloud, &cfg.role_name, &out.policy_arn).await;

    assert!(!report.is_clean());
    assert_eq!(report.skipped().count(), 1);
    assert!(cloud.role(&cfg.role_name).is_some());
    assert!(cloud.policy(&out.policy_arn).is_none());
}

// =============================================================================
// Story: Failure semantics while provisioning
// =============================================================================

#[tokio::test]
async fn provider_failure_aborts_without_rollback() {
    let cloud = FakeCloud::new();
    cloud.fail("iam:AttachRolePolicy");

    let err = provision(&cloud, &cloud, &NoHelper, &Unreachable, &config(), &request())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Provider(_)));

    // Earlier steps stay; a re-run converges
    let cfg = config();
    assert!(cloud.role(&cfg.role_name).is_some());
    assert!(cloud.policy(&cfg.policy_arn()).is_some());
    cloud.state().failing.clear();
    provision_fresh(&cloud).await;
    assert_eq!(cloud.role(&cfg.role_name).unwrap().attached.len(), 1);
}

#[tokio::test]
async fn declined_prompt_answers_false() {
    assert!(!Answer(false).confirm("delete?").await.unwrap());
}

// =============================================================================
// Story: Cluster metadata
// =============================================================================

#[tokio::test]
async fn metadata_reflects_the_provisioned_role() {
    let cloud = FakeCloud::new();
    let out = provision_fresh(&cloud).await;

    let meta = ClusterMetadata::for_config(&config(), &out.role_arn)
        .with_target_group(&cloud, Some("orders-tg"))
        .await
        .unwrap();

    assert_eq!(meta.cluster_name, CLUSTER);
    assert_eq!(meta.region, REGION);
    assert_eq!(meta.vpc_id.as_deref(), Some("vpc-0abc123"));
    assert!(meta
        .target_group_arn
        .as_deref()
        .unwrap()
        .contains(&format!("{}:targetgroup/orders-tg", ACCOUNT)));
}
