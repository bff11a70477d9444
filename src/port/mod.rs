//! Line-delimited JSON port protocol
//!
//! The host runtime writes one request per line and reads one response per
//! line:
//!
//! ```text
//! -> {"id":1,"call":"notify","args":[{"binary":"Build"}, ...]}
//! <- {"id":1,"reply":{"atom":"ok"}}
//! ```
//!
//! All calls funnel through a single dispatcher that owns the [`Session`],
//! so they run one at a time no matter how many front-ends feed it.

pub mod socket;

use crate::bridge::{Reply, Session};
use crate::errors::{BridgeError, Result};
use crate::native::StringAllocator;
use crate::notify::NotificationService;
use crate::term::Term;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Pending requests the dispatcher will buffer before senders wait
const DISPATCH_QUEUE: usize = 64;

/// Call request from the host
#[derive(Debug, Deserialize)]
pub struct Request {
    /// Correlation id echoed back in the response
    #[serde(default)]
    pub id: Option<u64>,
    pub call: String,
    #[serde(default)]
    pub args: Vec<Term>,
}

/// Reply to a single request
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub id: Option<u64>,
    pub reply: Term,
}

/// Decode one request line and run it against `session`
pub fn handle_line<S, A>(session: &Session<S, A>, line: &str) -> Response
where
    S: NotificationService,
    A: StringAllocator,
{
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, input_len = line.len(), "Malformed request line");
            return Response {
                id: None,
                reply: Reply::BadArg.to_term(),
            };
        }
    };

    let result = match request.call.as_str() {
        "notify" => session.notify(&request.args),
        other => {
            tracing::warn!(call = other, "Unknown call");
            Err(BridgeError::BadArgument("unknown call"))
        }
    };

    if let Err(e) = &result {
        tracing::debug!(id = ?request.id, error = %e, "Call failed");
    }

    Response {
        id: request.id,
        reply: Reply::from_result(&result).to_term(),
    }
}

/// A request line waiting for the dispatcher
#[derive(Debug)]
pub struct Job {
    line: String,
    reply: oneshot::Sender<Response>,
}

/// Move `session` onto a blocking worker that runs jobs in arrival order.
///
/// The session is dropped, tearing down the service, once every sender is
/// gone and the queue has drained.
pub fn spawn_dispatcher<S, A>(session: Session<S, A>) -> (mpsc::Sender<Job>, JoinHandle<()>)
where
    S: NotificationService + Send + 'static,
    A: StringAllocator + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Job>(DISPATCH_QUEUE);

    let handle = tokio::task::spawn_blocking(move || {
        while let Some(job) = rx.blocking_recv() {
            let response = handle_line(&session, &job.line);
            // Requester may have hung up; nothing to do
            let _ = job.reply.send(response);
        }
        tracing::debug!("Dispatcher queue closed");
        drop(session);
    });

    (tx, handle)
}

/// Send `line` to the dispatcher and wait for its response
pub async fn dispatch(jobs: &mpsc::Sender<Job>, line: String) -> Result<Response> {
    let (reply, rx) = oneshot::channel();
    jobs.send(Job { line, reply })
        .await
        .map_err(|_| BridgeError::DispatcherStopped)?;
    rx.await.map_err(|_| BridgeError::DispatcherStopped)
}

/// Serve requests from `reader`, writing responses to `writer`, until EOF
pub async fn serve<R, W>(reader: R, mut writer: W, jobs: mpsc::Sender<Job>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut served: u64 = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = dispatch(&jobs, line).await?;
        let mut data = serde_json::to_vec(&response)?;
        data.push(b'\n');
        writer.write_all(&data).await?;
        writer.flush().await?;
        served += 1;
    }

    tracing::info!(served, "Port input closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::testing::CountingAllocator;
    use crate::notify::testing::{Call, RecordingService};

    const BUILD_REQUEST: &str = r#"{"id":7,"call":"notify","args":[
        {"binary":"Build"},{"binary":"3 errors"},{"binary":""},{"binary":"build"},
        {"int":1},{"int":5000},
        {"list":[{"atom":"urgent"},{"tuple":[{"atom":"progress"},{"int":42}]}]}]}"#;

    fn session(service: &RecordingService) -> Session<RecordingService, CountingAllocator> {
        Session::with_service("bridge-test", service.clone(), CountingAllocator::default()).unwrap()
    }

    fn one_line(json: &str) -> String {
        json.lines().map(str::trim).collect()
    }

    #[test]
    fn test_handle_notify_line() {
        let service = RecordingService::default();
        let response = handle_line(&session(&service), &one_line(BUILD_REQUEST));
        assert_eq!(
            response,
            Response {
                id: Some(7),
                reply: Term::atom("ok"),
            }
        );
        assert!(service.calls().contains(&Call::HintInt32("progress".into(), 42)));
    }

    #[test]
    fn test_malformed_line_is_badarg() {
        let service = RecordingService::default();
        let response = handle_line(&session(&service), "{not json");
        assert_eq!(response.id, None);
        assert_eq!(response.reply, Term::atom("badarg"));
    }

    #[test]
    fn test_unknown_call_is_badarg() {
        let service = RecordingService::default();
        let response = handle_line(&session(&service), r#"{"id":3,"call":"close","args":[]}"#);
        assert_eq!(response.id, Some(3));
        assert_eq!(response.reply, Term::atom("badarg"));
        assert!(service.calls().is_empty());
    }

    #[test]
    fn test_response_wire_format() {
        let response = Response {
            id: Some(1),
            reply: Reply::NoMemory.to_term(),
        };
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"id":1,"reply":{"tuple":[{"atom":"error"},{"atom":"enomem"}]}}"#
        );
    }

    #[tokio::test]
    async fn test_serve_round_trip_and_teardown() {
        let service = RecordingService::default();
        let (jobs, dispatcher) = spawn_dispatcher(session(&service));

        let input = format!(
            "{}\n\n{}\n",
            one_line(BUILD_REQUEST),
            r#"{"id":8,"call":"notify","args":[]}"#
        );
        let mut output = Vec::new();
        serve(input.as_bytes(), &mut output, jobs).await.unwrap();
        dispatcher.await.unwrap();

        let responses: Vec<Response> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].reply, Term::atom("ok"));
        assert_eq!(responses[1].id, Some(8));
        assert_eq!(responses[1].reply, Term::atom("badarg"));

        // Session torn down once the port closed
        assert_eq!(service.calls().last(), Some(&Call::Shutdown));
        assert_eq!(service.count(&Call::Show), 1);
    }

    #[tokio::test]
    async fn test_dispatcher_serves_while_any_sender_lives() {
        let service = RecordingService::default();
        let (jobs, dispatcher) = spawn_dispatcher(session(&service));
        let other = jobs.clone();
        drop(jobs);

        let response = dispatch(&other, one_line(BUILD_REQUEST)).await.unwrap();
        assert_eq!(response.reply, Term::atom("ok"));
        assert!(!service.calls().contains(&Call::Shutdown));

        drop(other);
        dispatcher.await.unwrap();
        assert_eq!(service.calls().last(), Some(&Call::Shutdown));
    }

    #[tokio::test]
    async fn test_dispatch_to_stopped_dispatcher_fails() {
        let (dead, rx) = mpsc::channel::<Job>(1);
        drop(rx);
        let err = dispatch(&dead, "{}".to_string()).await.unwrap_err();
        assert!(matches!(err, BridgeError::DispatcherStopped));
    }
}
