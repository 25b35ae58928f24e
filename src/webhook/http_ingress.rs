use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use http_body_util::{BodyExt, Full};
use hyper::{
    Method, Request, Response, StatusCode,
    body::{Body, Bytes, Incoming},
    header::CONTENT_TYPE,
    server::conn::http1::Builder as Http1Builder,
    service::service_fn,
};
use hyper_util::rt::tokio::TokioIo;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use uuid::Uuid;

use crate::conversation::IntentDispatcher;
use crate::error::LifecycleError;
use crate::lifecycle::AccountLifecycle;
use crate::operator_log;
use crate::webhook::fulfilment::{FulfilmentRequest, encode_response};
use crate::workshop::{DeleteRequest, WorkshopRequest};

#[derive(Clone)]
pub struct WebhookConfig {
    pub bind_addr: SocketAddr,
    pub dispatcher: Arc<IntentDispatcher>,
    pub lifecycle: Arc<AccountLifecycle>,
}

pub struct WebhookServer {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl WebhookServer {
    pub async fn start(config: WebhookConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .with_context(|| format!("failed to bind webhook listener on {}", config.bind_addr))?;
        let local_addr = listener.local_addr().context("webhook listener address")?;
        operator_log::info(
            module_path!(),
            format!(
                "webhook listening on http://{} intents={}",
                local_addr,
                config.dispatcher.intents().join(",")
            ),
        );
        let state = Arc::new(WebhookState {
            dispatcher: config.dispatcher,
            lifecycle: config.lifecycle,
        });
        let (tx, mut shutdown) = oneshot::channel();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    accept = listener.accept() => match accept {
                        Ok((stream, _peer)) => {
                            let connection_state = state.clone();
                            tokio::spawn(async move {
                                let service = service_fn(move |req| {
                                    handle_request(req, connection_state.clone())
                                });
                                let stream = TokioIo::new(stream);
                                if let Err(err) = Http1Builder::new()
                                    .serve_connection(stream, service)
                                    .await
                                {
                                    operator_log::error(
                                        module_path!(),
                                        format!("webhook connection error: {err}"),
                                    );
                                }
                            });
                        }
                        Err(err) => {
                            operator_log::error(
                                module_path!(),
                                format!("webhook accept error: {err}"),
                            );
                        }
                    },
                }
            }
        });
        Ok(Self {
            local_addr,
            shutdown: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|err| anyhow::anyhow!("webhook server panicked: {err:?}"))?;
        }
        Ok(())
    }
}

struct WebhookState {
    dispatcher: Arc<IntentDispatcher>,
    lifecycle: Arc<AccountLifecycle>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Route {
    Fulfilment,
    CreateBatch,
    DeleteBatch,
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<WebhookState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match handle_request_inner(req, state).await {
        Ok(response) => response,
        Err(response) => response,
    };
    Ok(response)
}

async fn handle_request_inner(
    req: Request<Incoming>,
    state: Arc<WebhookState>,
) -> Result<Response<Full<Bytes>>, Response<Full<Bytes>>> {
    if req.method() != Method::POST {
        return Err(error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "only POST allowed",
        ));
    }
    let route = parse_route(req.uri().path())
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "unknown route"))?;
    let correlation_id = req
        .headers()
        .get("x-correlation-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let body = read_body(req.into_body(), &correlation_id).await?;
    operator_log::debug(
        module_path!(),
        format!(
            "request received route={:?} corr_id={} payload_len={}",
            route,
            correlation_id,
            body.len()
        ),
    );
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(error_response(StatusCode::BAD_REQUEST, "body is mandatory"));
    }

    match route {
        Route::Fulfilment => fulfil(&state, &body, &correlation_id).await,
        Route::CreateBatch => create_batch(&state, &body).await,
        Route::DeleteBatch => delete_batch(&state, &body).await,
    }
}

async fn fulfil(
    state: &WebhookState,
    body: &[u8],
    correlation_id: &str,
) -> Result<Response<Full<Bytes>>, Response<Full<Bytes>>> {
    let request: FulfilmentRequest = decode(body)?;
    let turn = request.into_turn();
    operator_log::info(
        module_path!(),
        format!(
            "fulfilment intent={} session={} corr_id={}",
            turn.intent_name, turn.session_id, correlation_id
        ),
    );
    let response = state.dispatcher.process(&turn).await.map_err(|err| {
        operator_log::error(
            module_path!(),
            format!("intent {} failed corr_id={correlation_id}: {err:#}", turn.intent_name),
        );
        error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
    })?;
    let (status, body) = encode_response(&response)
        .map_err(|err| error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    let status = StatusCode::from_u16(status)
        .map_err(|err| error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::from(Bytes::from(body.unwrap_or_default())))
        .map_err(|err| error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
}

async fn create_batch(
    state: &WebhookState,
    body: &[u8],
) -> Result<Response<Full<Bytes>>, Response<Full<Bytes>>> {
    let request: WorkshopRequest = decode(body)?;
    let accounts = state
        .lifecycle
        .create_batch(&request)
        .await
        .map_err(lifecycle_error_response)?;
    Ok(json_response(StatusCode::OK, json!({ "accounts": accounts })))
}

async fn delete_batch(
    state: &WebhookState,
    body: &[u8],
) -> Result<Response<Full<Bytes>>, Response<Full<Bytes>>> {
    let request: DeleteRequest = decode(body)?;
    let deletions = state
        .lifecycle
        .delete_batch(&request)
        .await
        .map_err(lifecycle_error_response)?;
    let complete = deletions.iter().all(|item| item.is_deleted());
    let status = if complete {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok(json_response(
        status,
        json!({ "complete": complete, "deletions": deletions }),
    ))
}

async fn read_body<B>(body: B, correlation_id: &str) -> Result<Bytes, Response<Full<Bytes>>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    match body.collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) => {
            operator_log::warn(
                module_path!(),
                format!("request body read failed corr_id={correlation_id}: {err}"),
            );
            Err(error_response(
                StatusCode::BAD_REQUEST,
                format!("unable to read request body: {err}"),
            ))
        }
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, Response<Full<Bytes>>> {
    serde_json::from_slice(body).map_err(|err| {
        error_response(StatusCode::BAD_REQUEST, format!("invalid JSON body: {err}"))
    })
}

fn lifecycle_error_response(err: LifecycleError) -> Response<Full<Bytes>> {
    let message = operator_log::describe_error(&err);
    match err {
        LifecycleError::Validation(_) => error_response(StatusCode::BAD_REQUEST, message),
        LifecycleError::Schedule { accounts, .. } => json_response(
            StatusCode::BAD_GATEWAY,
            json!({ "success": false, "message": message, "accounts": accounts }),
        ),
        _ => error_response(StatusCode::BAD_GATEWAY, message),
    }
}

fn parse_route(path: &str) -> Option<Route> {
    let segments = path
        .trim_start_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();
    match segments.as_slice() {
        [] | [_] => Some(Route::Fulfilment),
        ["accounts", "create"] | [_, "accounts", "create"] => Some(Route::CreateBatch),
        ["accounts", "delete"] | [_, "accounts", "delete"] => Some(Route::DeleteBatch),
        _ => None,
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response<Full<Bytes>> {
    let body = json!({
        "success": false,
        "message": message.into()
    });
    json_response(status, body)
}

fn json_response(status: StatusCode, value: serde_json::Value) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::from(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}
