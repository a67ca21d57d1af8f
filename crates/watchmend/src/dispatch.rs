use watchmen_core::protocol::{Command, Request, Response};

use crate::supervisor::Supervisor;

/// Route one request to its supervisor operation and wrap the outcome.
pub async fn dispatch(supervisor: &Supervisor, request: Request) -> Response {
	let name = request.command.name();
	let result = match request.command {
		Command::Run(task) => supervisor.run(task).await.map(Response::statuses),
		Command::Add(task) => supervisor.add(task).await.map(Response::message),
		Command::Reload(task) => supervisor.reload(task).await.map(Response::statuses),
		Command::Start(flag) => supervisor.start(&flag).await.map(Response::message),
		Command::Stop(flag) => supervisor.stop(&flag).await.map(Response::message),
		Command::Restart(flag) => supervisor.restart(&flag).await.map(Response::message),
		Command::Remove(flag) => supervisor.remove(&flag).await.map(Response::message),
		Command::Pause(flag) => supervisor.pause(&flag).await.map(Response::message),
		Command::Resume(flag) => supervisor.resume(&flag).await.map(Response::message),
		Command::List(flag) => supervisor.list(flag.as_ref()).await.map(Response::statuses),
	};
	result.unwrap_or_else(|e| {
		tracing::warn!("{} failed: {}", name, e);
		Response::failed(e.to_string())
	})
}

/// Answer a JSON array of requests with a JSON array of responses in the
/// same order. An element that is not a valid request gets a `wrong`
/// response in its slot.
pub async fn handle_batch(supervisor: &Supervisor, body: &[u8]) -> Vec<Response> {
	let items: Vec<serde_json::Value> = match serde_json::from_slice(body) {
		Ok(items) => items,
		Err(e) => {
			tracing::warn!("invalid request batch: {}", e);
			return vec![Response::wrong(format!("invalid request: {}", e))];
		}
	};

	let mut responses = Vec::with_capacity(items.len());
	for item in items {
		let response = match serde_json::from_value::<Request>(item) {
			Ok(request) => dispatch(supervisor, request).await,
			Err(e) => Response::wrong(format!("invalid request: {}", e)),
		};
		responses.push(response);
	}
	responses
}

/// Bytes-in, bytes-out entry point shared by every transport.
pub async fn handle_payload(supervisor: &Supervisor, body: &[u8]) -> Vec<u8> {
	let responses = handle_batch(supervisor, body).await;
	serde_json::to_vec(&responses).unwrap_or_else(|e| {
		tracing::error!("failed to serialize responses: {}", e);
		b"[]".to_vec()
	})
}
