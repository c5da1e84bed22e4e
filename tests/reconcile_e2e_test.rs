// End-to-end reconciliation scenarios against a scripted HTTP client.
// Each test drives the full workflow and asserts on the exact calls made.

use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use wgprov::api::RelayApiClient;
use wgprov::config::ClientOptions;
use wgprov::identity::{AccountIdentity, IdentityStore};
use wgprov::keys;
use wgprov::profile::ProfileWriter;
use wgprov::reconcile::{ActivationPrompt, EntitlementReconciler, ReconcileError};
use wgprov::test_utils::MockHttpClient;

struct NeverPrompt;
impl ActivationPrompt for NeverPrompt {
    fn confirm_activation(&self) -> bool {
        false
    }
}

struct AlwaysPrompt;
impl ActivationPrompt for AlwaysPrompt {
    fn confirm_activation(&self) -> bool {
        true
    }
}

/// Fails the test if the workflow consults the prompt at all.
struct PanicPrompt;
impl ActivationPrompt for PanicPrompt {
    fn confirm_activation(&self) -> bool {
        panic!("activation prompt must not be consulted");
    }
}

struct Harness {
    mock: Arc<MockHttpClient>,
    api: RelayApiClient,
    store: IdentityStore,
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        let mock = Arc::new(MockHttpClient::new());
        let api = RelayApiClient::new(
            mock.clone(),
            ClientOptions {
                api_base: "https://relay.test/v0".to_string(),
                verify_tls: true,
            },
        );
        let dir = TempDir::new().unwrap();
        let store = IdentityStore::new(dir.path().join("identity.json"));
        Self {
            mock,
            api,
            store,
            dir,
        }
    }

    async fn seed_identity(&self, license_key: &str) -> AccountIdentity {
        let identity = AccountIdentity {
            account_id: "A1".to_string(),
            access_token: "T1".to_string(),
            private_key: keys::generate_private_key().unwrap(),
            license_key: license_key.to_string(),
        };
        self.store.save(&identity).await.unwrap();
        identity
    }

    fn profile_path(&self) -> PathBuf {
        self.dir.path().join("profile.conf")
    }

    async fn run(&self, prompt: &dyn ActivationPrompt) -> Result<wgprov::reconcile::ReconcileOutcome, ReconcileError> {
        EntitlementReconciler::new(&self.api, &self.store, prompt)
            .run()
            .await
    }
}

fn config_body(warp_enabled: bool, account: Option<(&str, bool, &str)>) -> String {
    let account_json = match account {
        Some((account_type, warp_plus, license)) => format!(
            r#""account": {{"account_type": "{account_type}", "warp_plus": {warp_plus}, "license": "{license}"}},"#
        ),
        None => String::new(),
    };
    format!(
        r#"{{
            "warp_enabled": {warp_enabled},
            {account_json}
            "config": {{
                "interface": {{"addresses": {{"v4": "172.16.0.2", "v6": "fd01:5ca1:ab1e::2"}}}},
                "peers": [{{
                    "public_key": "bmXOC+F1FxEMF9dyiK2H5/1SUtzH0JuVo51h2wPfgyo=",
                    "endpoint": {{
                        "host": "engage.cloudflareclient.com:2408",
                        "v4": "162.159.192.1:2408",
                        "v6": "[2606:4700:d0::1]:2408"
                    }}
                }}]
            }}
        }}"#
    )
}

fn devices_body(entries: &[(&str, bool)]) -> String {
    let items: Vec<String> = entries
        .iter()
        .map(|(id, active)| format!(r#"{{"id": "{id}", "active": {active}}}"#))
        .collect();
    format!("[{}]", items.join(","))
}

#[tokio::test]
async fn fresh_run_registers_enables_warp_and_writes_profile() {
    let h = Harness::new();
    h.mock.push_response(
        200,
        r#"{"id": "A1", "token": "T1", "account": {"license": "L1"}}"#,
    );
    h.mock
        .push_response(200, &config_body(false, Some(("free", false, "L1"))));
    h.mock.push_response(200, &devices_body(&[("A1", true)]));
    h.mock.push_response(200, r#"{"warp_enabled": true}"#);

    let outcome = h.run(&NeverPrompt).await.unwrap();
    assert!(outcome.config.warp_enabled);
    assert!(outcome.device_active);

    let methods: Vec<String> = h.mock.requests().iter().map(|r| r.method.clone()).collect();
    assert_eq!(methods, ["POST", "GET", "GET", "PATCH"]);

    let stored = h.store.load().await.unwrap().unwrap();
    assert_eq!(stored.account_id, "A1");
    assert_eq!(stored.access_token, "T1");
    assert_eq!(stored.license_key, "L1");
    assert_eq!(stored, outcome.identity);

    ProfileWriter::new(h.profile_path())
        .write(&outcome.identity, &outcome.config)
        .await
        .unwrap();
    let profile = tokio::fs::read_to_string(h.profile_path()).await.unwrap();
    assert!(profile.contains(&format!(
        "PrivateKey = {}",
        outcome.identity.private_key.to_base64()
    )));
    assert!(profile.contains("Endpoint = engage.cloudflareclient.com:2408"));
}

#[tokio::test]
async fn converged_state_issues_zero_mutating_calls() {
    let h = Harness::new();
    h.seed_identity("L1").await;

    // Two consecutive runs against identical, already-converged server state.
    for _ in 0..2 {
        h.mock
            .push_response(200, &config_body(true, Some(("free", false, "L1"))));
        h.mock.push_response(200, &devices_body(&[("A1", true)]));
        let outcome = h.run(&PanicPrompt).await.unwrap();
        assert!(outcome.config.warp_enabled);
        assert!(!outcome.activation_recommended);
    }

    assert_eq!(h.mock.mutating_request_count(), 0);
    let stored = h.store.load().await.unwrap().unwrap();
    assert_eq!(stored.license_key, "L1");
}

#[tokio::test]
async fn stale_license_is_pushed_refetched_and_adopted() {
    let h = Harness::new();
    h.seed_identity("OLD").await;

    h.mock
        .push_response(200, &config_body(true, Some(("free", false, "NEW"))));
    h.mock
        .push_response(200, r#"{"warp_plus": true, "license": "NEW"}"#);
    h.mock
        .push_response(200, &config_body(true, Some(("free", true, "NEW"))));
    h.mock.push_response(200, &devices_body(&[("A1", true)]));

    let outcome = h.run(&NeverPrompt).await.unwrap();
    assert!(outcome.config.warp_plus_enabled);

    let requests = h.mock.requests();
    let puts = requests.iter().filter(|r| r.method == "PUT").count();
    assert_eq!(puts, 1);
    let config_fetches = requests
        .iter()
        .filter(|r| r.method == "GET" && r.url.ends_with("/reg/A1"))
        .count();
    assert_eq!(config_fetches, 2, "license update must force a refetch");

    let stored = h.store.load().await.unwrap().unwrap();
    assert_eq!(stored.license_key, "NEW");
}

#[tokio::test]
async fn whitespace_only_license_difference_is_not_stale() {
    let h = Harness::new();
    h.seed_identity("ABC123").await;

    h.mock
        .push_response(200, &config_body(true, Some(("free", false, " ABC123 "))));
    h.mock.push_response(200, &devices_body(&[("A1", true)]));

    h.run(&NeverPrompt).await.unwrap();

    assert_eq!(h.mock.mutating_request_count(), 0);
    let stored = h.store.load().await.unwrap().unwrap();
    assert_eq!(stored.license_key, "ABC123");
}

#[tokio::test]
async fn unlimited_account_adopts_license_without_pushing() {
    let h = Harness::new();
    h.seed_identity("OLD").await;

    // The license push short-circuits client-side for unlimited accounts,
    // so the script goes straight to the refetch.
    h.mock
        .push_response(200, &config_body(true, Some(("unlimited", true, "NEW"))));
    h.mock
        .push_response(200, &config_body(true, Some(("unlimited", true, "NEW"))));
    h.mock.push_response(200, &devices_body(&[("A1", true)]));

    let outcome = h.run(&NeverPrompt).await.unwrap();
    assert!(outcome.config.warp_plus_enabled);

    let puts = h
        .mock
        .requests()
        .iter()
        .filter(|r| r.method == "PUT")
        .count();
    assert_eq!(puts, 0);
    let stored = h.store.load().await.unwrap().unwrap();
    assert_eq!(stored.license_key, "NEW");
}

#[tokio::test]
async fn unregistered_device_halts_before_profile_write() {
    let h = Harness::new();
    h.seed_identity("L1").await;

    h.mock
        .push_response(200, &config_body(true, Some(("free", false, "L1"))));
    h.mock.push_response(200, &devices_body(&[]));

    let err = h.run(&PanicPrompt).await.unwrap_err();
    assert!(matches!(err, ReconcileError::DeviceNotRegistered));
    assert_eq!(h.mock.mutating_request_count(), 0);
    assert!(!h.profile_path().exists());
}

#[tokio::test]
async fn inactive_warp_plus_device_is_activated_on_consent() {
    let h = Harness::new();
    h.seed_identity("L1").await;

    h.mock
        .push_response(200, &config_body(true, Some(("free", true, "L1"))));
    h.mock.push_response(200, &devices_body(&[("A1", false)]));
    h.mock.push_response(200, &devices_body(&[("A1", true)]));

    let outcome = h.run(&AlwaysPrompt).await.unwrap();
    assert!(outcome.activation_recommended);
    assert!(outcome.device_active);

    let requests = h.mock.requests();
    let activation = requests
        .iter()
        .filter(|r| r.method == "PATCH" && r.url.ends_with("/account/reg/A1"))
        .count();
    assert_eq!(activation, 1);
}

#[tokio::test]
async fn declined_activation_is_reported_but_not_performed() {
    let h = Harness::new();
    h.seed_identity("L1").await;

    h.mock
        .push_response(200, &config_body(true, Some(("free", true, "L1"))));
    h.mock.push_response(200, &devices_body(&[("A1", false)]));

    let outcome = h.run(&NeverPrompt).await.unwrap();
    assert!(outcome.activation_recommended);
    assert!(!outcome.device_active);
    assert_eq!(h.mock.mutating_request_count(), 0);
}

#[tokio::test]
async fn inactive_device_without_warp_plus_never_prompts() {
    let h = Harness::new();
    h.seed_identity("L1").await;

    h.mock
        .push_response(200, &config_body(true, Some(("free", false, "L1"))));
    h.mock.push_response(200, &devices_body(&[("A1", false)]));

    let outcome = h.run(&PanicPrompt).await.unwrap();
    assert!(!outcome.activation_recommended);
    assert!(!outcome.device_active);
    assert_eq!(h.mock.mutating_request_count(), 0);
}

#[tokio::test]
async fn registration_failure_leaves_no_identity_behind() {
    let h = Harness::new();
    h.mock.push_response(403, r#"{"error": "denied"}"#);

    let err = h.run(&PanicPrompt).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Api(_)));
    assert!(h.store.load().await.unwrap().is_none());
}
