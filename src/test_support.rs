//! Helpers shared by the in-crate HTTP tests.

use axum::body::to_bytes;
use axum::response::Response;
use axum::Router;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral local port, standing in for the upstream catalog or image host.
pub async fn spawn_upstream(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
    let addr = listener.local_addr().expect("upstream addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("upstream server");
    });
    addr
}

pub async fn read_json<T: DeserializeOwned>(resp: Response) -> T {
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}
