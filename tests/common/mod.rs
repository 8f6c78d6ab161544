use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use casetrack::auth::jwt::JwtService;
use casetrack::config::AppConfig;
use casetrack::db::{self, PgPool};
use casetrack::routes;
use casetrack::state::AppState;
use casetrack::storage::{BlobStorage, StoredBlob};
use diesel::connection::SimpleConnection;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Deserialize)]
pub struct Envelope<T> {
    #[allow(dead_code)]
    pub success: bool,
    pub data: T,
}

#[derive(Deserialize)]
pub struct ListEnvelope<T> {
    #[allow(dead_code)]
    pub success: bool,
    pub count: usize,
    pub data: Vec<T>,
}

#[derive(Deserialize)]
pub struct ErrorEnvelope {
    #[allow(dead_code)]
    pub success: bool,
    pub message: String,
}

#[allow(dead_code)]
#[derive(Clone)]
pub struct StoredObject {
    pub opaque_id: String,
    pub namespace: String,
    pub extension: String,
    pub bytes: Vec<u8>,
}

/// In-memory stand-in for the blob store provider. The `fail_next_*` toggles
/// let tests exercise the enumerated partial-failure states of attach/remove.
#[derive(Default)]
pub struct FakeBlobStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
    fail_next_put: AtomicBool,
    fail_next_resolve: AtomicBool,
    fail_next_delete: AtomicBool,
}

#[async_trait]
impl BlobStorage for FakeBlobStorage {
    async fn put(&self, bytes: Vec<u8>, namespace: &str, extension: &str) -> Result<StoredBlob> {
        if self.fail_next_put.swap(false, Ordering::SeqCst) {
            bail!("injected put failure");
        }
        let opaque_id = if extension.is_empty() {
            format!("{namespace}/{}", Uuid::new_v4())
        } else {
            format!("{namespace}/{}.{extension}", Uuid::new_v4())
        };
        let stored = StoredObject {
            opaque_id: opaque_id.clone(),
            namespace: namespace.to_string(),
            extension: extension.to_string(),
            bytes,
        };
        let mut guard = self.objects.lock().await;
        guard.insert(opaque_id.clone(), stored);
        Ok(StoredBlob {
            url: format!("fake://{opaque_id}"),
            opaque_id,
        })
    }

    async fn resolve_secure_url(&self, opaque_id: &str) -> Result<String> {
        if self.fail_next_resolve.swap(false, Ordering::SeqCst) {
            bail!("injected resolve failure");
        }
        let guard = self.objects.lock().await;
        ensure!(guard.contains_key(opaque_id), "blob {opaque_id} missing");
        Ok(format!("https://fake-storage/secure/{opaque_id}"))
    }

    async fn delete(&self, opaque_id: &str) -> Result<()> {
        if self.fail_next_delete.swap(false, Ordering::SeqCst) {
            bail!("injected delete failure");
        }
        let mut guard = self.objects.lock().await;
        guard.remove(opaque_id);
        Ok(())
    }
}

impl FakeBlobStorage {
    #[allow(dead_code)]
    pub async fn get(&self, opaque_id: &str) -> Option<StoredObject> {
        let guard = self.objects.lock().await;
        guard.get(opaque_id).cloned()
    }

    #[allow(dead_code)]
    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }

    #[allow(dead_code)]
    pub fn fail_next_put(&self) {
        self.fail_next_put.store(true, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn fail_next_resolve(&self) {
        self.fail_next_resolve.store(true, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn fail_next_delete(&self) {
        self.fail_next_delete.store(true, Ordering::SeqCst);
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeBlobStorage>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "us-east-1".to_string(),
            s3_bucket: "test-bucket".to_string(),
        };

        let pool = db::init_pool(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeBlobStorage::default());
        let storage_for_state: Arc<dyn BlobStorage> = storage.clone();
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool.clone(), config, storage_for_state, jwt);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            storage,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            truncate_all(&mut conn)?;
            Ok(())
        })
        .await
        .context("cleanup task panicked")?
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<FakeBlobStorage> {
        self.storage.clone()
    }

    /// Mints an identity token the way the upstream provider would.
    pub fn token_for(&self, user_id: Uuid, role: &str) -> Result<String> {
        self.state.jwt.generate_token(user_id, role)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PUT, path, payload, token).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let builder = Request::builder().method(Method::DELETE).uri(path);
        let builder = if let Some(token) = token {
            builder.header("authorization", format!("Bearer {token}"))
        } else {
            builder
        };
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn upload_document(
        &self,
        case_id: Uuid,
        filename: &str,
        title: &str,
        document_type: &str,
        data: &[u8],
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend(data);
        body.extend(b"\r\n");

        for (name, value) in [("title", title), ("document_type", document_type)] {
            if value.is_empty() {
                continue;
            }
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            body.extend(value.as_bytes());
            body.extend(b"\r\n");
        }

        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/cases/{case_id}/documents"))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(body))?;

        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn parse_body<T: DeserializeOwned>(body: Body) -> Result<T> {
    let bytes = body_to_vec(body).await?;
    serde_json::from_slice(&bytes)
        .map_err(|err| anyhow!("failed to parse response body: {err}"))
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE updates, documents, cases, case_sequences RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
