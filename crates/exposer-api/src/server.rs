//! HTTP server

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use exposer_admission::AdmissionController;
use exposer_workload::{Reconciler, WorkloadCompiler};
use tokio::net::TcpListener;
use tracing::info;

use crate::instant_launches::{
    defaults_by_version_handler, latest_defaults_handler, latest_user_mapping_handler,
    list_defaults_handler, list_instant_launches_handler, InstantLaunchStore,
};
use crate::launch::launch_handler;

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    /// Admission checks for launches
    pub admission: AdmissionController,
    /// Job to object compiler
    pub compiler: Arc<WorkloadCompiler>,
    /// Applies compiled objects to the cluster
    pub reconciler: Reconciler,
    /// Instant launch storage
    pub instant_launches: Arc<dyn InstantLaunchStore>,
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/vice/launch", post(launch_handler))
        .route("/instantlaunches", get(list_instant_launches_handler))
        .route("/instantlaunches/default", get(list_defaults_handler))
        .route("/instantlaunches/default/latest", get(latest_defaults_handler))
        .route(
            "/instantlaunches/default/{version}",
            get(defaults_by_version_handler),
        )
        .route(
            "/instantlaunches/user/{username}",
            get(latest_user_mapping_handler),
        )
        .with_state(state)
}

/// Serve until ctrl-c
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            // An error here means no signal handler; run until killed.
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            info!("shutting down");
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use exposer_admission::{
        AnalysisStatusStore, DeploymentLister, JobLimitStore, Overage, QuotaClient,
        RunningJobCounter,
    };
    use exposer_common::job::{
        ContainerDescriptor, ContainerImage, PortDescriptor, Step, StepComponent,
    };
    use exposer_common::{Error, Job};
    use exposer_workload::reconciler::{ExistingObject, ObjectKind};
    use exposer_workload::WorkloadKubeClient;
    use mockall::mock;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::instant_launches::{
        DefaultInstantLaunchMapping, InstantLaunch, InstantLaunchMapping, InstantLaunchSelector,
        MockInstantLaunchStore, UserInstantLaunchMapping,
    };

    // Local mocks: the automock types of the other crates only exist in
    // their own test builds.
    mock! {
        pub Lister {}

        #[async_trait]
        impl DeploymentLister for Lister {
            async fn list_labels(
                &self,
                namespace: &str,
                selector: &str,
            ) -> Result<Vec<BTreeMap<String, String>>, Error>;
        }
    }

    mock! {
        pub Statuses {}

        #[async_trait]
        impl AnalysisStatusStore for Statuses {
            async fn analysis_id_by_external_id(&self, external_id: &str) -> Result<String, Error>;
            async fn analysis_status(&self, analysis_id: &str) -> Result<String, Error>;
        }
    }

    mock! {
        pub Limits {}

        #[async_trait]
        impl JobLimitStore for Limits {
            async fn user_job_limit(&self, username: &str) -> Result<Option<i32>, Error>;
            async fn default_job_limit(&self) -> Result<Option<i32>, Error>;
        }
    }

    mock! {
        pub Quota {}

        #[async_trait]
        impl QuotaClient for Quota {
            async fn user_overages(&self, username: &str) -> Result<Vec<Overage>, Error>;
        }
    }

    mock! {
        pub Kube {}

        #[async_trait]
        impl WorkloadKubeClient for Kube {
            async fn lookup(
                &self,
                kind: ObjectKind,
                namespace: &str,
                name: &str,
            ) -> Result<Option<ExistingObject>, Error>;
            async fn create(
                &self,
                kind: ObjectKind,
                namespace: &str,
                object: &Value,
            ) -> Result<(), Error>;
            async fn replace(
                &self,
                kind: ObjectKind,
                namespace: &str,
                name: &str,
                object: &Value,
            ) -> Result<(), Error>;
        }
    }

    struct Fixture {
        running: usize,
        default_limit: Option<i32>,
        overages: Vec<Overage>,
        kube: MockKube,
        instant_launches: MockInstantLaunchStore,
    }

    impl Default for Fixture {
        fn default() -> Self {
            Self {
                running: 0,
                default_limit: Some(2),
                overages: vec![],
                kube: empty_cluster(),
                instant_launches: MockInstantLaunchStore::new(),
            }
        }
    }

    impl Fixture {
        fn app(self) -> Router {
            let running = self.running;
            let mut lister = MockLister::new();
            lister.expect_list_labels().returning(move |_, _| {
                Ok((0..running)
                    .map(|i| BTreeMap::from([("app".to_string(), format!("job-{i}"))]))
                    .collect())
            });

            let default_limit = self.default_limit;
            let mut limits = MockLimits::new();
            limits.expect_user_job_limit().returning(|_| Ok(None));
            limits
                .expect_default_job_limit()
                .returning(move || Ok(default_limit));

            let overages = self.overages;
            let mut quota = MockQuota::new();
            quota
                .expect_user_overages()
                .returning(move |_| Ok(overages.clone()));

            let counter = RunningJobCounter::new(
                Arc::new(lister),
                Arc::new(MockStatuses::new()),
                "vice-apps",
            );

            router(AppState {
                admission: AdmissionController::new(counter, Arc::new(limits), Arc::new(quota)),
                compiler: Arc::new(WorkloadCompiler::default()),
                reconciler: Reconciler::new(Arc::new(self.kube)),
                instant_launches: Arc::new(self.instant_launches),
            })
        }
    }

    fn empty_cluster() -> MockKube {
        let mut kube = MockKube::new();
        kube.expect_lookup().returning(|_, _, _| Ok(None));
        kube.expect_create().returning(|_, _, _| Ok(()));
        kube.expect_replace().never();
        kube
    }

    fn job() -> Job {
        Job {
            invocation_id: "07b04ce2-7757-4b21-9e15-0b4c2f44be26".to_string(),
            app_name: "JupyterLab".to_string(),
            submitter: "ipcdev@iplantcollaborative.org".to_string(),
            execution_target: "interapps".to_string(),
            job_type: "Interactive".to_string(),
            steps: vec![Step {
                component: StepComponent {
                    name: "jupyter".to_string(),
                    container: ContainerDescriptor {
                        image: ContainerImage {
                            name: "discoenv/jupyterlab".to_string(),
                            tag: "beta".to_string(),
                        },
                        ports: vec![PortDescriptor {
                            container_port: 8888,
                            ..Default::default()
                        }],
                        ..Default::default()
                    },
                },
                config: Default::default(),
            }],
            ..Default::default()
        }
    }

    fn launch_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/vice/launch")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    // ===== Story: Health =====

    #[tokio::test]
    async fn healthz_is_ok() {
        let resp = Fixture::default().app().oneshot(get("/healthz")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    // ===== Story: Launching =====

    #[tokio::test]
    async fn admitted_launch_creates_objects() {
        let mut kube = MockKube::new();
        kube.expect_lookup().returning(|_, _, _| Ok(None));
        // excludes ConfigMap, Deployment, Service; no ticketless inputs
        kube.expect_create()
            .withf(|_, ns, _| ns == "vice-apps")
            .times(3)
            .returning(|_, _, _| Ok(()));

        let app = Fixture {
            kube,
            ..Default::default()
        }
        .app();
        let resp = app
            .oneshot(launch_request(serde_json::to_vec(&job()).unwrap()))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["invocationId"], "07b04ce2-7757-4b21-9e15-0b4c2f44be26");
    }

    #[tokio::test]
    async fn denial_is_bad_request_and_provisions_nothing() {
        let mut kube = MockKube::new();
        kube.expect_lookup().never();
        kube.expect_create().never();

        let app = Fixture {
            running: 2,
            kube,
            ..Default::default()
        }
        .app();
        let resp = app
            .oneshot(launch_request(serde_json::to_vec(&job()).unwrap()))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["errorCode"], "ERR_LIMIT_REACHED");
        assert_eq!(body["details"]["jobCount"], 2);
    }

    #[tokio::test]
    async fn overage_is_reported_with_details() {
        let app = Fixture {
            overages: vec![Overage {
                resource_name: "cpu.hours".to_string(),
                usage: 12.0,
                quota: 10.0,
            }],
            ..Default::default()
        }
        .app();
        let resp = app
            .oneshot(launch_request(serde_json::to_vec(&job()).unwrap()))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["errorCode"], "ERR_RESOURCE_OVERAGE");
        assert!(body["details"]["cpu.hours"].is_string());
    }

    #[tokio::test]
    async fn non_interactive_job_is_rejected() {
        let mut j = job();
        j.execution_target = "condor".to_string();
        let resp = Fixture::default()
            .app()
            .oneshot(launch_request(serde_json::to_vec(&j).unwrap()))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["errorCode"], "ERR_UNSUPPORTED_JOB_TYPE");
    }

    #[tokio::test]
    async fn job_without_steps_is_bad_request() {
        let mut j = job();
        j.steps.clear();
        let resp = Fixture::default()
            .app()
            .oneshot(launch_request(serde_json::to_vec(&j).unwrap()))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["errorCode"], "ERR_BAD_REQUEST");
    }

    #[tokio::test]
    async fn unparseable_body_is_bad_request() {
        let resp = Fixture::default()
            .app()
            .oneshot(launch_request(b"{\"uuid\": 7".to_vec()))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["errorCode"], "ERR_BAD_REQUEST");
    }

    #[tokio::test]
    async fn cluster_failure_is_internal_error() {
        let mut kube = MockKube::new();
        kube.expect_lookup().returning(|_, _, _| Ok(None));
        kube.expect_create()
            .returning(|_, _, _| Err(Error::internal("apiserver unavailable")));

        let app = Fixture {
            kube,
            ..Default::default()
        }
        .app();
        let resp = app
            .oneshot(launch_request(serde_json::to_vec(&job()).unwrap()))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(resp).await["errorCode"], "ERR_INTERNAL");
    }

    #[tokio::test]
    async fn missing_default_limit_is_internal_error() {
        let app = Fixture {
            default_limit: None,
            ..Default::default()
        }
        .app();
        let resp = app
            .oneshot(launch_request(serde_json::to_vec(&job()).unwrap()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    // ===== Story: Instant launch mappings =====

    fn jupyter() -> InstantLaunch {
        InstantLaunch {
            id: "il-jupyter".to_string(),
            quick_launch_id: "ql-jupyter".to_string(),
            added_by: "ipcdev".to_string(),
            added_on: Utc.with_ymd_and_hms(2021, 3, 4, 17, 2, 11).unwrap(),
        }
    }

    fn selectors() -> InstantLaunchMapping {
        BTreeMap::from([(
            "*.ipynb".to_string(),
            InstantLaunchSelector {
                pattern: "*.ipynb".to_string(),
                kind: "glob".to_string(),
                default: jupyter(),
                compatible: vec![],
            },
        )])
    }

    fn mapping(version: i32) -> DefaultInstantLaunchMapping {
        DefaultInstantLaunchMapping {
            id: format!("mapping-{version}"),
            version,
            mapping: selectors(),
        }
    }

    #[tokio::test]
    async fn latest_defaults_are_returned() {
        let mut store = MockInstantLaunchStore::new();
        store
            .expect_latest_defaults()
            .returning(|| Ok(Some(mapping(3))));

        let app = Fixture {
            instant_launches: store,
            ..Default::default()
        }
        .app();
        let resp = app
            .oneshot(get("/instantlaunches/default/latest"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["version"], 3);
        assert_eq!(body["mapping"]["*.ipynb"]["default"]["id"], "il-jupyter");
    }

    #[tokio::test]
    async fn unknown_version_is_not_found() {
        let mut store = MockInstantLaunchStore::new();
        store
            .expect_defaults_by_version()
            .withf(|v| *v == 9)
            .returning(|_| Ok(None));

        let app = Fixture {
            instant_launches: store,
            ..Default::default()
        }
        .app();
        let resp = app
            .oneshot(get("/instantlaunches/default/9"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(resp).await["errorCode"], "ERR_NOT_FOUND");
    }

    #[tokio::test]
    async fn non_numeric_version_is_bad_request() {
        let mut store = MockInstantLaunchStore::new();
        store.expect_defaults_by_version().never();

        let app = Fixture {
            instant_launches: store,
            ..Default::default()
        }
        .app();
        let resp = app
            .oneshot(get("/instantlaunches/default/newest"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn all_defaults_are_listed() {
        let mut store = MockInstantLaunchStore::new();
        store
            .expect_list_defaults()
            .returning(|| Ok(vec![mapping(1), mapping(2)]));

        let app = Fixture {
            instant_launches: store,
            ..Default::default()
        }
        .app();
        let resp = app.oneshot(get("/instantlaunches/default")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body.as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn user_mapping_is_returned() {
        let mut store = MockInstantLaunchStore::new();
        store
            .expect_latest_user_mapping()
            .withf(|username| username == "ipcdev")
            .returning(|_| {
                Ok(Some(UserInstantLaunchMapping {
                    id: "user-mapping".to_string(),
                    version: 2,
                    user_id: "u-1".to_string(),
                    mapping: selectors(),
                }))
            });

        let app = Fixture {
            instant_launches: store,
            ..Default::default()
        }
        .app();
        let resp = app.oneshot(get("/instantlaunches/user/ipcdev")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["user_id"], "u-1");
        assert_eq!(body["mapping"]["*.ipynb"]["kind"], "glob");
    }

    #[tokio::test]
    async fn user_without_mapping_is_not_found() {
        let mut store = MockInstantLaunchStore::new();
        store.expect_latest_user_mapping().returning(|_| Ok(None));

        let app = Fixture {
            instant_launches: store,
            ..Default::default()
        }
        .app();
        let resp = app.oneshot(get("/instantlaunches/user/nobody")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
