//! Request routing and the wire pipeline:
//! authorize → decode → run → encode, with every failure mapped to an
//! `ErrorResponse` body and its HTTP status.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use prost::Message;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use vss_auth::Authorizer;
use vss_kv::KvEngine;
use vss_metrics::VssMetrics;
use vss_proto::{
    ApiError, DeleteObjectRequest, DeleteObjectResponse, ErrorCode, GetObjectRequest,
    GetObjectResponse, ListKeyVersionsRequest, ListKeyVersionsResponse, PutObjectRequest,
    PutObjectResponse,
};

const BASE_PATH: &str = "/vss";
const CONTENT_TYPE: &str = "application/octet-stream";

/// The VSS endpoint service. Cheap to clone; one clone serves each
/// connection.
#[derive(Clone)]
pub struct VssService {
    engine: Arc<KvEngine>,
    authorizer: Arc<dyn Authorizer>,
    max_body_bytes: usize,
}

impl VssService {
    pub fn new(
        engine: Arc<KvEngine>,
        authorizer: Arc<dyn Authorizer>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            engine,
            authorizer,
            max_body_bytes,
        }
    }
}

impl Service<Request<Incoming>> for VssService {
    type Response = Response<Full<Bytes>>;
    type Error = hyper::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { service.route(req).await })
    }
}

impl VssService {
    async fn route(self, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let path = req.uri().path().to_owned();
        let op = match path.strip_prefix(BASE_PATH).unwrap_or_default() {
            "/getObject" => "get",
            "/putObjects" => "put",
            "/deleteObject" => "delete",
            "/listKeyVersions" => "list",
            _ => {
                return Ok(plain_response(
                    StatusCode::BAD_REQUEST,
                    "invalid request path",
                ))
            }
        };

        if req.method() != Method::POST {
            return Ok(plain_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "only POST is supported",
            ));
        }

        let _timer = VssMetrics::global().record_request(op);

        match op {
            "get" => self.handle(op, req, run_get).await,
            "put" => self.handle(op, req, run_put).await,
            "delete" => self.handle(op, req, run_delete).await,
            _ => self.handle(op, req, run_list).await,
        }
    }

    /// The shared pipeline for all four endpoints.
    async fn handle<Req, Resp, Run, Fut>(
        self,
        op: &'static str,
        req: Request<Incoming>,
        run: Run,
    ) -> Result<Response<Full<Bytes>>, hyper::Error>
    where
        Req: Message + Default,
        Resp: Message,
        Run: FnOnce(Arc<KvEngine>, String, Req) -> Fut + Send,
        Fut: Future<Output = Result<Resp, ApiError>> + Send,
    {
        let (parts, body) = req.into_parts();

        let user_token = match self.authorizer.authorize(&parts.headers).await {
            Ok(user_token) => user_token,
            Err(err) => return Ok(error_response(op, &err)),
        };

        let limited = Limited::new(body, self.max_body_bytes);
        let bytes = match limited.collect().await {
            Ok(collected) => collected.to_bytes(),
            // The only collect failure mode for a `Limited` body over a
            // live connection is exceeding the cap.
            Err(_) => {
                return Ok(plain_response(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "request body too large",
                ))
            }
        };

        let request = match Req::decode(bytes) {
            Ok(request) => request,
            Err(_) => {
                let err = ApiError::InvalidRequest("error decoding request body".to_string());
                return Ok(error_response(op, &err));
            }
        };

        match run(self.engine, user_token, request).await {
            Ok(response) => Ok(Response::builder()
                .header("content-type", CONTENT_TYPE)
                .body(Full::new(Bytes::from(response.encode_to_vec())))
                .expect("valid HTTP response")),
            Err(err) => Ok(error_response(op, &err)),
        }
    }
}

async fn run_get(
    engine: Arc<KvEngine>,
    user_token: String,
    request: GetObjectRequest,
) -> Result<GetObjectResponse, ApiError> {
    let request_id: u64 = rand::random();
    tracing::trace!(request_id, store_id = %request.store_id, key = %request.key, "getObject");
    let result = engine.get(&user_token, request).await;
    if let Err(ref e) = result {
        tracing::debug!(request_id, "getObject failed: {}", e);
    }
    result
}

async fn run_put(
    engine: Arc<KvEngine>,
    user_token: String,
    request: PutObjectRequest,
) -> Result<PutObjectResponse, ApiError> {
    let request_id: u64 = rand::random();
    tracing::trace!(
        request_id,
        store_id = %request.store_id,
        writes = request.transaction_items.len(),
        deletes = request.delete_items.len(),
        global_version = ?request.global_version,
        "putObjects"
    );
    let result = engine.put(&user_token, request).await;
    if let Err(ref e) = result {
        tracing::debug!(request_id, "putObjects failed: {}", e);
    }
    result
}

async fn run_delete(
    engine: Arc<KvEngine>,
    user_token: String,
    request: DeleteObjectRequest,
) -> Result<DeleteObjectResponse, ApiError> {
    let request_id: u64 = rand::random();
    tracing::trace!(
        request_id,
        store_id = %request.store_id,
        key = ?request.key_value.as_ref().map(|kv| &kv.key),
        "deleteObject"
    );
    let result = engine.delete(&user_token, request).await;
    if let Err(ref e) = result {
        tracing::debug!(request_id, "deleteObject failed: {}", e);
    }
    result
}

async fn run_list(
    engine: Arc<KvEngine>,
    user_token: String,
    request: ListKeyVersionsRequest,
) -> Result<ListKeyVersionsResponse, ApiError> {
    let request_id: u64 = rand::random();
    tracing::trace!(
        request_id,
        store_id = %request.store_id,
        key_prefix = ?request.key_prefix,
        page_size = ?request.page_size,
        page_token = ?request.page_token,
        "listKeyVersions"
    );
    let result = engine.list_key_versions(&user_token, request).await;
    if let Err(ref e) = result {
        tracing::debug!(request_id, "listKeyVersions failed: {}", e);
    }
    result
}

/// Encode an error as its HTTP status plus an `ErrorResponse` body, and
/// record it.
fn error_response(op: &'static str, err: &ApiError) -> Response<Full<Bytes>> {
    let metrics = VssMetrics::global();
    metrics.record_failure(op, code_label(err.code()));
    match err {
        ApiError::Conflict(_) => metrics.record_conflict(),
        ApiError::Auth(_) => metrics.record_auth_rejection(),
        _ => {}
    }

    Response::builder()
        .status(StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
        .header("content-type", CONTENT_TYPE)
        .body(Full::new(Bytes::from(err.to_response().encode_to_vec())))
        .expect("valid HTTP response")
}

fn plain_response(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(message)))
        .expect("valid HTTP response")
}

fn code_label(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::Unknown => "unknown",
        ErrorCode::Conflict => "conflict",
        ErrorCode::InvalidRequest => "invalid_request",
        ErrorCode::Internal => "internal",
        ErrorCode::NoSuchKey => "no_such_key",
        ErrorCode::Auth => "auth",
    }
}
