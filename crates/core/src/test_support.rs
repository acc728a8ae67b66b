use axum::Router;

/// Serves `app` on an ephemeral local port and returns its base url.
pub(crate) async fn spawn_stub(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub listener addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server run");
    });

    format!("http://{addr}")
}
