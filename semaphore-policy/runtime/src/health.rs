use crate::k8s::WatchHealth;
use anyhow::Result;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use std::{convert::Infallible, future::Future, net::SocketAddr};
use tokio::net::TcpListener;
use tracing::{debug, info, instrument, warn};

/// Serves `/healthz`, which succeeds while the pod watch is healthy.
#[instrument(skip_all, fields(port = %addr.port()))]
pub async fn serve(
    addr: SocketAddr,
    health: WatchHealth,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Health server listening");

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => {
                debug!("Health server shutting down");
                return Ok(());
            }

            res = listener.accept() => {
                let (io, client) = match res {
                    Ok(conn) => conn,
                    Err(error) => {
                        warn!(%error, "Failed to accept connection");
                        continue;
                    }
                };

                let health = health.clone();
                tokio::spawn(async move {
                    let svc = service_fn(move |req| {
                        let rsp = handle(&health, &req);
                        async move { Ok::<_, Infallible>(rsp) }
                    });
                    if let Err(error) = http1::Builder::new()
                        .serve_connection(TokioIo::new(io), svc)
                        .await
                    {
                        debug!(%client, %error, "Connection failed");
                    }
                });
            }
        }
    }
}

pub(crate) fn handle<B>(health: &WatchHealth, req: &Request<B>) -> Response<Full<Bytes>> {
    if req.uri().path() != "/healthz" {
        return mk_rsp(StatusCode::NOT_FOUND, "");
    }

    match *req.method() {
        Method::GET | Method::HEAD => {
            if health.is_healthy() {
                mk_rsp(StatusCode::OK, "ok\n")
            } else {
                mk_rsp(StatusCode::SERVICE_UNAVAILABLE, "pod watch unhealthy\n")
            }
        }
        _ => mk_rsp(StatusCode::METHOD_NOT_ALLOWED, ""),
    }
}

fn mk_rsp(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut rsp = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *rsp.status_mut() = status;
    if !body.is_empty() {
        rsp.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    }
    rsp
}
