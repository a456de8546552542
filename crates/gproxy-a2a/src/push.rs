//! Push-notification delivery (§4.9 "Push notifications"): a bounded worker
//! pool that signs and POSTs every status transition and artifact append to
//! each configured webhook, with bounded retry and a delivery log.
//!
//! Grounded on the teacher's `events::EventHub` emit-to-sinks pattern
//! (`tokio::spawn` per fan-out target, fire-and-forget) generalized to a
//! fixed-size worker pool feeding off one `mpsc` queue instead of one task
//! per event, since webhook delivery needs ordered backoff retries per
//! destination rather than a single best-effort write.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::{Mutex, mpsc};

use crate::model::{PushConfig, TaskId};

type HmacSha256 = Hmac<Sha256>;

const BACKOFF: [Duration; 3] = [Duration::from_secs(1), Duration::from_secs(3), Duration::from_secs(9)];
const MAX_ATTEMPTS: u32 = 3;
const QUEUE_CAPACITY: usize = 1024;

/// `(attemptCount, lastStatus, lastError)` delivery log row (§4.9).
#[derive(Debug, Clone, Default)]
pub struct DeliveryLogRow {
    pub attempt_count: u32,
    pub last_status: Option<u16>,
    pub last_error: Option<String>,
}

/// Replaceable sink for delivery log rows (§6 collaborator pattern).
pub trait PushDeliveryLog: Send + Sync {
    fn record(&self, task_id: &TaskId, url: &str, row: DeliveryLogRow);
}

/// In-memory default: last row per `(task_id, url)`, overwritten on retry.
#[derive(Default)]
pub struct InMemoryDeliveryLog {
    rows: DashMap<(TaskId, String), DeliveryLogRow>,
}

impl InMemoryDeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task_id: &TaskId, url: &str) -> Option<DeliveryLogRow> {
        self.rows.get(&(task_id.clone(), url.to_string())).map(|row| row.clone())
    }
}

impl PushDeliveryLog for InMemoryDeliveryLog {
    fn record(&self, task_id: &TaskId, url: &str, row: DeliveryLogRow) {
        self.rows.insert((task_id.clone(), url.to_string()), row);
    }
}

struct Job {
    task_id: TaskId,
    config: PushConfig,
    body: Vec<u8>,
    attempt: u32,
}

/// Bounded-pool webhook delivery. `dispatch` is fire-and-forget: the queue
/// is bounded (§4.10 "must not block the dispatcher"), so a full queue drops
/// the notification rather than stalling the caller — overflow is logged,
/// never silently swallowed.
pub struct PushDispatcher {
    tx: mpsc::Sender<Job>,
}

impl PushDispatcher {
    pub fn new(worker_count: usize, signing_secret: Arc<[u8]>, client: reqwest::Client, log: Arc<dyn PushDeliveryLog>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));
        for worker_id in 0..worker_count.max(1) {
            let rx = rx.clone();
            let client = client.clone();
            let secret = signing_secret.clone();
            let log = log.clone();
            tokio::spawn(async move { worker_loop(worker_id, rx, client, secret, log).await });
        }
        Self { tx }
    }

    /// Signs `body` (the raw outgoing JSON bytes — SPEC_FULL.md push
    /// signing Supplement) and enqueues one delivery attempt per configured
    /// endpoint.
    pub fn notify(&self, task_id: &TaskId, configs: &[PushConfig], body: Vec<u8>) {
        for config in configs {
            let job = Job {
                task_id: task_id.clone(),
                config: config.clone(),
                body: body.clone(),
                attempt: 0,
            };
            if self.tx.try_send(job).is_err() {
                tracing::warn!(task_id = %task_id, url = %config.url, "push delivery queue full, dropping notification");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    client: reqwest::Client,
    secret: Arc<[u8]>,
    log: Arc<dyn PushDeliveryLog>,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            match rx.recv().await {
                Some(job) => job,
                None => return,
            }
        };
        deliver(worker_id, job, &client, &secret, log.as_ref()).await;
    }
}

async fn deliver(worker_id: usize, mut job: Job, client: &reqwest::Client, secret: &[u8], log: &dyn PushDeliveryLog) {
    loop {
        job.attempt += 1;
        let signature = sign(secret, &job.body);
        let mut request = client
            .post(&job.config.url)
            .header("X-Gproxy-Signature", signature)
            .header("Content-Type", "application/json")
            .body(job.body.clone());
        if let Some(token) = &job.config.token {
            request = request.bearer_auth(token);
        }
        for (name, value) in &job.config.headers {
            request = request.header(name, value);
        }

        let outcome = request.send().await;
        let (row, retry) = match outcome {
            Ok(response) => {
                let status = response.status();
                let row = DeliveryLogRow {
                    attempt_count: job.attempt,
                    last_status: Some(status.as_u16()),
                    last_error: None,
                };
                let retry = !status.is_success() && should_retry_status(status.as_u16());
                (row, retry)
            }
            Err(err) => {
                let row = DeliveryLogRow {
                    attempt_count: job.attempt,
                    last_status: None,
                    last_error: Some(err.to_string()),
                };
                (row, true)
            }
        };
        log.record(&job.task_id, &job.config.url, row.clone());

        if row.last_status.map(|status| (200..300).contains(&status)).unwrap_or(false) {
            return;
        }
        if !retry || job.attempt >= MAX_ATTEMPTS {
            if retry {
                tracing::warn!(worker = worker_id, task_id = %job.task_id, url = %job.config.url, "push delivery exhausted retries");
            }
            return;
        }
        tokio::time::sleep(BACKOFF[(job.attempt - 1) as usize]).await;
    }
}

fn should_retry_status(status: u16) -> bool {
    match status {
        408 | 429 => true,
        400..=499 => false,
        _ => true,
    }
}

fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts key of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use mock_server::MockServer;

    /// A minimal hand-rolled HTTP/1.1 responder, since no mock-HTTP crate is
    /// in this workspace's dependency set: accepts one connection per
    /// request, plays back one status code per call from `responses` (in
    /// order), and records every request's headers and body for inspection.
    pub(crate) mod mock_server {
        use std::net::SocketAddr;
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::{TcpListener, TcpStream};
        use tokio::sync::Mutex;

        #[derive(Clone)]
        pub struct RecordedRequest {
            pub headers: Vec<(String, String)>,
            pub body: Vec<u8>,
        }

        pub struct MockServer {
            addr: SocketAddr,
            requests: Arc<Mutex<Vec<RecordedRequest>>>,
            served: Arc<AtomicUsize>,
        }

        impl MockServer {
            pub async fn start(responses: Vec<u16>) -> Self {
                let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind an ephemeral local port");
                let addr = listener.local_addr().unwrap();
                let requests = Arc::new(Mutex::new(Vec::new()));
                let served = Arc::new(AtomicUsize::new(0));

                let task_requests = requests.clone();
                let task_served = served.clone();
                tokio::spawn(async move {
                    loop {
                        let (mut stream, _) = match listener.accept().await {
                            Ok(pair) => pair,
                            Err(_) => return,
                        };
                        let index = task_served.fetch_add(1, Ordering::SeqCst);
                        let Some(&status) = responses.get(index) else { return };
                        let (headers, body) = read_request(&mut stream).await;
                        task_requests.lock().await.push(RecordedRequest { headers, body });
                        let reason = if status == 200 { "OK" } else { "Error" };
                        let response = format!("HTTP/1.1 {status} {reason}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
                        let _ = stream.write_all(response.as_bytes()).await;
                        let _ = stream.shutdown().await;
                    }
                });

                Self { addr, requests, served }
            }

            pub fn url(&self) -> String {
                format!("http://{}/webhook", self.addr)
            }

            pub async fn requests(&self) -> Vec<RecordedRequest> {
                self.requests.lock().await.clone()
            }

            pub fn served_count(&self) -> usize {
                self.served.load(Ordering::SeqCst)
            }
        }

        async fn read_request(stream: &mut TcpStream) -> (Vec<(String, String)>, Vec<u8>) {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = stream.read(&mut chunk).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                    continue;
                };
                let header_text = String::from_utf8_lossy(&buf[..header_end]).to_string();
                let headers: Vec<(String, String)> = header_text
                    .split("\r\n")
                    .skip(1)
                    .filter_map(|line| line.split_once(": "))
                    .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                    .collect();
                let content_length: usize = headers
                    .iter()
                    .find(|(k, _)| k == "content-length")
                    .and_then(|(_, v)| v.parse().ok())
                    .unwrap_or(0);
                let body_start = header_end + 4;
                while buf.len() < body_start + content_length {
                    let n = stream.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let body = buf[body_start..(body_start + content_length).min(buf.len())].to_vec();
                return (headers, body);
            }
            (Vec::new(), Vec::new())
        }
    }

    fn find_signature(headers: &[(String, String)]) -> Option<String> {
        headers.iter().find(|(k, _)| k == "x-gproxy-signature").map(|(_, v)| v.clone())
    }

    // S6 — a 500 on the first delivery is retried once and succeeds; both
    // attempts carry the identical signed body (property #8: a receiver
    // keying idempotence off the signature sees the retry as a duplicate,
    // not a distinct event).
    #[tokio::test]
    async fn push_retries_after_failure_with_an_identical_signed_body() {
        let server = MockServer::start(vec![500, 200]).await;
        let log = Arc::new(InMemoryDeliveryLog::new());
        let dispatcher = PushDispatcher::new(1, Arc::from(b"shh".as_slice()), reqwest::Client::new(), log.clone());

        let config = PushConfig {
            url: server.url(),
            token: None,
            headers: Default::default(),
        };
        let task_id = "task-1".to_string();
        let body = br#"{"hello":"world"}"#.to_vec();
        dispatcher.notify(&task_id, std::slice::from_ref(&config), body.clone());

        tokio::time::sleep(Duration::from_millis(1700)).await;

        assert_eq!(server.served_count(), 2, "exactly one retry after the 500");
        let row = log.get(&task_id, &config.url).unwrap();
        assert_eq!(row.attempt_count, 2);
        assert_eq!(row.last_status, Some(200));

        let requests = server.requests().await;
        assert_eq!(requests.len(), 2);
        let sig0 = find_signature(&requests[0].headers).expect("first attempt is signed");
        let sig1 = find_signature(&requests[1].headers).expect("retry is signed");
        assert_eq!(sig0, sig1, "retries resend an identical signature over an identical body");
        assert_eq!(requests[0].body, body);
        assert_eq!(requests[1].body, body);
    }

    #[tokio::test]
    async fn push_gives_up_after_the_attempt_ceiling() {
        let server = MockServer::start(vec![500, 500, 500]).await;
        let log = Arc::new(InMemoryDeliveryLog::new());
        let dispatcher = PushDispatcher::new(1, Arc::from(b"shh".as_slice()), reqwest::Client::new(), log.clone());

        let config = PushConfig {
            url: server.url(),
            token: None,
            headers: Default::default(),
        };
        let task_id = "task-2".to_string();
        dispatcher.notify(&task_id, std::slice::from_ref(&config), b"{}".to_vec());

        // Backoffs are 1s then 3s; give the third (final) attempt time to land.
        tokio::time::sleep(Duration::from_millis(4600)).await;

        assert_eq!(server.served_count(), 3, "stops at MAX_ATTEMPTS, does not retry forever");
        let row = log.get(&task_id, &config.url).unwrap();
        assert_eq!(row.attempt_count, 3);
        assert_eq!(row.last_status, Some(500));
    }

    #[tokio::test]
    async fn notify_is_a_no_op_when_no_push_configs_are_present() {
        let log = Arc::new(InMemoryDeliveryLog::new());
        let dispatcher = PushDispatcher::new(1, Arc::from(b"shh".as_slice()), reqwest::Client::new(), log.clone());
        dispatcher.notify(&"task-3".to_string(), &[], b"{}".to_vec());
        // No configured endpoint: nothing should ever be recorded.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(log.get(&"task-3".to_string(), "https://example.invalid").is_none());
    }
}
