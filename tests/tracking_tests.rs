use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cubetrack::controller::{ControllerOptions, CurrentTask, TrackingController};
use cubetrack::device::{LineTransport, OrientationStream, StreamOptions};
use cubetrack::models::{AuthCredential, Face, Session, TaskId, TaskMapping};
use cubetrack::remote::{Activity, RemoteError, RetryPolicy, TimeTrackingApi};
use cubetrack::repo::MemoryCredentialStore;
use cubetrack::session::SessionClient;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

/// In-memory Hackaru that records every start/stop
#[derive(Clone, Default)]
struct RecordingApi {
    calls: Arc<Mutex<Vec<String>>>,
    next_id: Arc<Mutex<i64>>,
}

impl RecordingApi {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TimeTrackingApi for RecordingApi {
    async fn login(&self, _email: &str, _password: &str) -> Result<AuthCredential, RemoteError> {
        Ok(AuthCredential::new("7", "secret"))
    }

    async fn working(&self, _credential: &AuthCredential) -> Result<Option<Activity>, RemoteError> {
        Ok(None)
    }

    async fn start(
        &self,
        _credential: &AuthCredential,
        task: &TaskId,
        started_at: DateTime<Utc>,
    ) -> Result<Activity, RemoteError> {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        self.calls.lock().unwrap().push(format!("start {}", task.project_id));
        Ok(Activity {
            id: *next_id,
            description: Some(task.description.clone()),
            project_id: Some(task.project_id),
            project: None,
            started_at: Some(started_at),
            stopped_at: None,
        })
    }

    async fn stop(
        &self,
        _credential: &AuthCredential,
        activity_id: i64,
        _stopped_at: DateTime<Utc>,
    ) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(format!("stop {}", activity_id));
        Ok(())
    }
}

fn mapping() -> TaskMapping {
    TaskMapping::new()
        .with(Face(1), TaskId::new("writing", 12, "Docs"))
        .with(Face(2), TaskId::new("review", 13, ""))
        .with(Face(4), TaskId::new("writing-again", 12, "Docs"))
}

async fn track(script: &'static str) -> (Vec<String>, CurrentTask) {
    let api = RecordingApi::default();
    let cancel = CancellationToken::new();

    let mut client = SessionClient::new(
        api.clone(),
        Box::new(MemoryCredentialStore::new(None)),
        RetryPolicy::new(1, Duration::from_millis(10)),
        cancel.clone(),
    )
    .with_mapping(mapping());
    client.resume(AuthCredential::new("7", "secret")).await.unwrap();
    assert_eq!(client.session(), &Session::None);

    let transport = Arc::new(LineTransport::new(BufReader::new(script.as_bytes())));
    let options = StreamOptions {
        debounce: Duration::from_secs(1),
        ..StreamOptions::default()
    };
    let stream = OrientationStream::connect(transport, "AA:BB:CC:DD:EE:FF", options, cancel.clone())
        .await
        .unwrap();

    let mut controller = TrackingController::new(client, mapping(), ControllerOptions::default());
    controller.run(stream.events, cancel.clone()).await;
    stream.worker.await.unwrap().unwrap();

    (api.calls(), controller.current().clone())
}

#[tokio::test(start_paused = true)]
async fn test_turning_between_tasks() {
    let (calls, current) = track("1\nsleep 2s\n2\nsleep 2s\n").await;
    // The last task is stopped when the stream ends
    assert_eq!(calls, vec!["start 12", "stop 1", "start 13", "stop 2"]);
    assert_eq!(current, CurrentTask::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_brief_face_is_ignored() {
    let (calls, _) = track("1\nsleep 2s\n2\nsleep 300ms\n1\nsleep 2s\n").await;
    assert_eq!(calls, vec!["start 12", "stop 1"]);
}

#[tokio::test(start_paused = true)]
async fn test_unmapped_face_stops_tracking() {
    let (calls, current) = track("1\nsleep 2s\n7\nsleep 2s\n0\nsleep 2s\n").await;
    assert_eq!(calls, vec!["start 12", "stop 1"]);
    assert_eq!(current, CurrentTask::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_faces_sharing_a_task_do_not_restart() {
    let (calls, _) = track("1\nsleep 2s\n4\nsleep 2s\n").await;
    assert_eq!(calls, vec!["start 12", "stop 1"]);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_lines_are_skipped() {
    let (calls, _) = track("# warm up\nnot-a-face\n\n2\nsleep 2s\n").await;
    assert_eq!(calls, vec!["start 13", "stop 1"]);
}
