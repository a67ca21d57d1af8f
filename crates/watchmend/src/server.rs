use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use rust_embed::RustEmbed;
use serde::de::IgnoredAny;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener};
use tower_http::cors::CorsLayer;

use crate::dispatch;
use crate::supervisor::Supervisor;

const MAX_PAYLOAD: usize = 16 * 1024 * 1024;

#[derive(RustEmbed)]
#[folder = "panel/"]
struct PanelAssets;

/// Serve the JSON-array protocol on a Unix socket. A stale socket file is
/// removed first.
pub async fn run_sock_server(supervisor: Arc<Supervisor>, socket_path: &Path) {
	if let Some(parent) = socket_path.parent() {
		let _ = std::fs::create_dir_all(parent);
	}
	if socket_path.exists() {
		let _ = std::fs::remove_file(socket_path);
	}

	let listener = match UnixListener::bind(socket_path) {
		Ok(l) => l,
		Err(e) => {
			tracing::error!("failed to bind socket {}: {}", socket_path.display(), e);
			return;
		}
	};

	tracing::info!("listening on {}", socket_path.display());

	loop {
		let (stream, _) = match listener.accept().await {
			Ok(s) => s,
			Err(e) => {
				tracing::error!("accept error: {}", e);
				continue;
			}
		};

		let sup = Arc::clone(&supervisor);
		tokio::spawn(async move {
			if let Err(e) = serve_connection(&sup, stream).await {
				tracing::warn!("sock connection: {}", e);
			}
		});
	}
}

/// Same protocol over TCP.
pub async fn run_tcp_server(supervisor: Arc<Supervisor>, addr: &str) {
	let listener = match TcpListener::bind(addr).await {
		Ok(l) => l,
		Err(e) => {
			tracing::error!("failed to bind TCP on {}: {}", addr, e);
			return;
		}
	};

	tracing::info!("TCP listening on {}", addr);

	loop {
		let (stream, peer) = match listener.accept().await {
			Ok(s) => s,
			Err(e) => {
				tracing::error!("accept error: {}", e);
				continue;
			}
		};

		let sup = Arc::clone(&supervisor);
		tokio::spawn(async move {
			if let Err(e) = serve_connection(&sup, stream).await {
				tracing::warn!("socket connection from {}: {}", peer, e);
			}
		});
	}
}

/// One request batch per connection: read it, answer it, close.
pub async fn serve_connection<S>(supervisor: &Supervisor, mut stream: S) -> io::Result<()>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	let payload = read_payload(&mut stream).await?;
	let response = dispatch::handle_payload(supervisor, &payload).await;
	stream.write_all(&response).await?;
	stream.flush().await?;
	stream.shutdown().await
}

/// Read until the buffer holds one complete JSON document or the peer
/// closes its side.
async fn read_payload<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
	let mut payload = Vec::new();
	let mut buf = [0u8; 8192];
	loop {
		let n = reader.read(&mut buf).await?;
		if n == 0 {
			break;
		}
		payload.extend_from_slice(&buf[..n]);
		if closes_document(&payload) && serde_json::from_slice::<IgnoredAny>(&payload).is_ok() {
			break;
		}
		if payload.len() > MAX_PAYLOAD {
			return Err(io::Error::new(
				io::ErrorKind::InvalidData,
				"request payload too large",
			));
		}
	}
	Ok(payload)
}

/// A JSON array or object can only be complete once the last
/// non-whitespace byte closes it.
fn closes_document(payload: &[u8]) -> bool {
	matches!(
		payload.iter().rev().find(|b| !b.is_ascii_whitespace()),
		Some(b']') | Some(b'}')
	)
}

/// GET serves the bundled panel; any other method carries an RPC batch.
pub fn router(supervisor: Arc<Supervisor>) -> Router {
	Router::new()
		.fallback(handle_http)
		.layer(CorsLayer::permissive())
		.with_state(supervisor)
}

pub async fn run_http_server(supervisor: Arc<Supervisor>, addr: &str) {
	let app = router(supervisor);
	let listener = match TcpListener::bind(addr).await {
		Ok(l) => l,
		Err(e) => {
			tracing::error!("failed to bind HTTP on {}: {}", addr, e);
			return;
		}
	};
	tracing::info!("HTTP listening on {}", addr);
	if let Err(e) = axum::serve(listener, app).await {
		tracing::error!("HTTP server error: {}", e);
	}
}

async fn handle_http(
	State(supervisor): State<Arc<Supervisor>>,
	method: Method,
	uri: Uri,
	body: Bytes,
) -> Response {
	if method == Method::GET {
		return static_handler(&uri);
	}
	let response = dispatch::handle_payload(&supervisor, &body).await;
	([(header::CONTENT_TYPE, "application/json")], response).into_response()
}

fn static_handler(uri: &Uri) -> Response {
	let path = match uri.path().trim_start_matches('/') {
		"" => "index.html",
		path => path,
	};

	match PanelAssets::get(path) {
		Some(content) => {
			let mime = mime_guess::from_path(path).first_or_octet_stream();
			(
				[(header::CONTENT_TYPE, mime.as_ref().to_string())],
				content.data.into_owned(),
			)
				.into_response()
		}
		None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
	}
}
