//! In-process stand-in for the REST backend, used by the HTTP-facing tests.

use axum::Router;
use tokio::net::TcpListener;

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn spawn_backend(app: Router) -> String {
  let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock backend");
  let addr = listener.local_addr().expect("local addr");
  tokio::spawn(async move {
    axum::serve(listener, app).await.expect("mock backend");
  });
  format!("http://{}", addr)
}

/// Fresh scratch directory under the system temp dir.
pub fn temp_dir() -> std::path::PathBuf {
  let dir = std::env::temp_dir().join(format!("lingodeck-test-{}", uuid::Uuid::new_v4()));
  std::fs::create_dir_all(&dir).expect("create temp dir");
  dir
}
