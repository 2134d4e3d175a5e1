//! In-process OCI registry serving the subset of the distribution API the
//! client uses.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;

const DIGEST_HEADER: &str = "docker-content-digest";
const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// Registry contents and request log.
#[derive(Debug, Default)]
pub struct Store {
    /// Blobs by digest.
    pub blobs: HashMap<String, Vec<u8>>,
    /// Manifests by `<repository>@<tag or digest>`.
    pub manifests: HashMap<String, Vec<u8>>,
    /// `METHOD /path` of every request, in order.
    pub requests: Vec<String>,
    /// `Authorization` header values received.
    pub authorizations: Vec<String>,
    /// Leave out the digest header on manifest responses.
    pub omit_digest_header: bool,
    /// Fail every blob upload with a server error.
    pub reject_blob_uploads: bool,
    next_upload: usize,
}

/// A running fake registry.
#[derive(Debug, Clone)]
pub struct FakeRegistry {
    /// `host:port` to put in references.
    pub host: String,
    /// Shared state.
    pub store: Arc<Mutex<Store>>,
}

impl FakeRegistry {
    /// Binds to an ephemeral port and serves in the background.
    pub async fn start() -> Self {
        let store = Arc::new(Mutex::new(Store::default()));
        let app = Router::new().fallback(handle).with_state(store.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            host: format!("127.0.0.1:{port}"),
            store,
        }
    }

    /// Returns a `br:` reference to `repository:tag` on this registry.
    pub fn reference(&self, repository_and_tag: &str) -> String {
        format!("br:{}/{repository_and_tag}", self.host)
    }

    /// Number of logged requests starting with `prefix`.
    pub fn count_requests(&self, prefix: &str) -> usize {
        self.store
            .lock()
            .requests
            .iter()
            .filter(|request| request.starts_with(prefix))
            .count()
    }

    /// Stored manifest for `repository@tag`.
    pub fn manifest(&self, repository_and_tag: &str) -> Option<Vec<u8>> {
        self.store.lock().manifests.get(repository_and_tag).cloned()
    }

    /// Flips the first byte of every stored blob, keeping its size.
    pub fn corrupt_blobs(&self) {
        for data in self.store.lock().blobs.values_mut() {
            if let Some(byte) = data.first_mut() {
                *byte ^= 0xFF;
            }
        }
    }
}

fn sha256(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

fn respond(status: StatusCode) -> Response {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .unwrap()
}

async fn handle(
    axum::extract::State(store): axum::extract::State<Arc<Mutex<Store>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let mut store = store.lock();
    store.requests.push(format!("{method} {path}"));
    if let Some(auth) = headers.get(header::AUTHORIZATION) {
        store
            .authorizations
            .push(auth.to_str().unwrap_or_default().to_string());
    }

    let Some(rest) = path.strip_prefix("/v2/") else {
        return respond(StatusCode::NOT_FOUND);
    };

    if let Some(repository) = rest.strip_suffix("/blobs/uploads/") {
        if method != Method::POST {
            return respond(StatusCode::METHOD_NOT_ALLOWED);
        }
        store.next_upload += 1;
        return Response::builder()
            .status(StatusCode::ACCEPTED)
            .header(
                header::LOCATION,
                format!("/v2/{repository}/blobs/uploads/{}", store.next_upload),
            )
            .body(Body::empty())
            .unwrap();
    }

    if rest.contains("/blobs/uploads/") {
        if method != Method::PUT {
            return respond(StatusCode::METHOD_NOT_ALLOWED);
        }
        if store.reject_blob_uploads {
            return respond(StatusCode::INTERNAL_SERVER_ERROR);
        }
        let digest = url::form_urlencoded::parse(uri.query().unwrap_or_default().as_bytes())
            .find(|(key, _)| key == "digest")
            .map(|(_, value)| value.into_owned());
        let Some(digest) = digest else {
            return respond(StatusCode::BAD_REQUEST);
        };
        if sha256(&body) != digest {
            return Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"errors":[{"code":"DIGEST_INVALID","message":"provided digest did not match uploaded content"}]}"#,
                ))
                .unwrap();
        }
        store.blobs.insert(digest, body.to_vec());
        return respond(StatusCode::CREATED);
    }

    if let Some((repository, reference)) = rest.rsplit_once("/manifests/") {
        if method == Method::PUT {
            let digest = sha256(&body);
            store
                .manifests
                .insert(format!("{repository}@{reference}"), body.to_vec());
            store
                .manifests
                .insert(format!("{repository}@{digest}"), body.to_vec());
            return Response::builder()
                .status(StatusCode::CREATED)
                .header(DIGEST_HEADER, digest)
                .body(Body::empty())
                .unwrap();
        }
        if method != Method::GET && method != Method::HEAD {
            return respond(StatusCode::METHOD_NOT_ALLOWED);
        }
        let Some(manifest) = store.manifests.get(&format!("{repository}@{reference}")) else {
            return Response::builder()
                .status(StatusCode::NOT_FOUND)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"errors":[{"code":"MANIFEST_UNKNOWN","message":"manifest unknown"}]}"#,
                ))
                .unwrap();
        };
        let mut response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, MANIFEST_MEDIA_TYPE);
        if !store.omit_digest_header {
            response = response.header(DIGEST_HEADER, sha256(manifest));
        }
        let body = if method == Method::HEAD {
            Body::empty()
        } else {
            Body::from(manifest.clone())
        };
        return response.body(body).unwrap();
    }

    if let Some((_, digest)) = rest.rsplit_once("/blobs/") {
        return match store.blobs.get(digest) {
            Some(_) if method == Method::HEAD => respond(StatusCode::OK),
            Some(data) if method == Method::GET => Response::builder()
                .status(StatusCode::OK)
                .body(Body::from(data.clone()))
                .unwrap(),
            _ => respond(StatusCode::NOT_FOUND),
        };
    }

    respond(StatusCode::NOT_FOUND)
}
