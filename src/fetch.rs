// ═══════════════════════════════════════════════════════════
// JSON fetch — HTTP GET into a classified Task<serde_json::Value>
// ═══════════════════════════════════════════════════════════
//
//  fetcher.fetch_json(url, label)
//      transport failure      → LookupError::Network
//      non-2xx status         → LookupError::HttpStatus { status, label }
//      2xx, body not JSON     → LookupError::Network
//      2xx, JSON body         → Ok(value)
//      transport panicked     → LookupError::Network
//
// The request itself blocks, so it runs on a scheduler worker thread;
// the task settles back on the scheduler thread.
// ═══════════════════════════════════════════════════════════

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::{LookupError, Outcome};
use crate::scheduler::{Scheduler, WorkerPanic};
use crate::task::Task;

/// Status and body of a response that made it back from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues blocking GET requests. Only a missing response is an `Err`;
/// any status code, good or bad, comes back as an `HttpResponse`.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, LookupError>;
}

// ── ureq transport ────────────────────────────────────────────────────────────

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .timeout_read(read_timeout)
            .build();
        UreqTransport { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(30))
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, LookupError> {
        match self.agent.get(url).set("Accept", "application/json").call() {
            Ok(resp) => {
                let status = resp.status();
                let body = resp.into_string().map_err(|e| LookupError::Network(e.to_string()))?;
                Ok(HttpResponse { status, body })
            }
            // ureq reports 4xx/5xx as errors; they still carry a response.
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Ok(HttpResponse { status, body })
            }
            Err(ureq::Error::Transport(e)) => Err(LookupError::Network(e.to_string())),
        }
    }
}

// ── Fetcher ───────────────────────────────────────────────────────────────────

/// Turns blocking transport calls into tasks on one scheduler.
#[derive(Clone)]
pub struct Fetcher {
    scheduler: Scheduler,
    transport: Arc<dyn Transport>,
}

impl Fetcher {
    pub fn new(scheduler: &Scheduler, transport: Arc<dyn Transport>) -> Self {
        Fetcher { scheduler: scheduler.clone(), transport }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// fetch_json(url, label) -> Task<Value>
    ///
    /// `label` names the failure when the server answers with a bad status,
    /// e.g. "Country not found" becomes "Country not found (404)".
    ///
    ///   fetcher.fetch_json("https://restcountries.com/v2/name/portugal", "Country not found")
    ///       .register(|json| ..., |err| ...);
    pub fn fetch_json(&self, url: &str, label: &str) -> Task<Value> {
        let url = url.to_string();
        let label = label.to_string();
        let transport = Arc::clone(&self.transport);

        Task::new(&self.scheduler, |settler| {
            tracing::debug!(%url, "GET");
            let work_url = url.clone();
            let spawned = self.scheduler.spawn_blocking(
                move || classify(transport.get(&work_url), &label),
                {
                    let settler = settler.clone();
                    move |completion: Result<Outcome<Value>, WorkerPanic>| {
                        let outcome = completion
                            .unwrap_or_else(|panicked| Err(LookupError::Network(panicked.to_string())));
                        if let Err(error) = &outcome {
                            tracing::warn!(%url, %error, "request failed");
                        }
                        settler.settle(outcome);
                    }
                },
            );
            if let Err(e) = spawned {
                settler.fail(LookupError::Network(format!("could not start request: {}", e)));
            }
        })
    }
}

fn classify(response: Result<HttpResponse, LookupError>, label: &str) -> Outcome<Value> {
    let response = response?;
    if !response.is_success() {
        return Err(LookupError::http_status(response.status, label));
    }
    serde_json::from_str(&response.body).map_err(|e| LookupError::Network(format!("malformed response body: {}", e)))
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fetcher(sched: &Scheduler) -> Fetcher {
        Fetcher::new(sched, Arc::new(UreqTransport::new(Duration::from_secs(2), Duration::from_secs(2))))
    }

    #[test]
    fn test_json_body_on_success() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/v2/name/portugal")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"name": "Portugal"}]"#)
            .create();

        let sched = Scheduler::new();
        let task = fetcher(&sched).fetch_json(&format!("{}/v2/name/portugal", server.url()), "Country not found");
        assert!(task.is_pending());
        sched.run();

        mock.assert();
        assert_eq!(task.outcome(), Some(Ok(json!([{"name": "Portugal"}]))));
    }

    #[test]
    fn test_bad_status_carries_label() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/v2/name/adfkljasdf").with_status(404).with_body(r#"{"status":404}"#).create();

        let sched = Scheduler::new();
        let task = fetcher(&sched).fetch_json(&format!("{}/v2/name/adfkljasdf", server.url()), "Country not found");
        sched.run();

        assert_eq!(task.outcome(), Some(Err(LookupError::http_status(404, "Country not found"))));
    }

    #[test]
    fn test_malformed_body_is_network_error() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/broken").with_status(200).with_body("<html>oops").create();

        let sched = Scheduler::new();
        let task = fetcher(&sched).fetch_json(&format!("{}/broken", server.url()), "unused");
        sched.run();

        assert!(matches!(task.outcome(), Some(Err(LookupError::Network(_)))));
    }

    #[test]
    fn test_unreachable_host_is_network_error() {
        let sched = Scheduler::new();
        // port 1 on loopback refuses connections
        let task = fetcher(&sched).fetch_json("http://127.0.0.1:1/v2/name/portugal", "Country not found");
        sched.run();

        assert!(matches!(task.outcome(), Some(Err(LookupError::Network(_)))));
    }

    struct PanickingTransport;

    impl Transport for PanickingTransport {
        fn get(&self, _url: &str) -> Result<HttpResponse, LookupError> {
            panic!("connection pool poisoned")
        }
    }

    #[test]
    fn test_panicking_transport_is_network_error() {
        let sched = Scheduler::new();
        let fetcher = Fetcher::new(&sched, Arc::new(PanickingTransport));
        let task = fetcher.fetch_json("http://countries.test/v2/name/portugal", "Country not found");
        sched.run();

        assert_eq!(
            task.outcome(),
            Some(Err(LookupError::Network("worker thread panicked: connection pool poisoned".into())))
        );
        assert!(!sched.has_work());
    }

    #[test]
    fn test_classify_boundaries() {
        let ok = |status| Ok(HttpResponse { status, body: "{}".into() });
        assert_eq!(classify(ok(200), "x"), Ok(json!({})));
        assert_eq!(classify(ok(299), "x"), Ok(json!({})));
        assert_eq!(classify(ok(300), "x"), Err(LookupError::http_status(300, "x")));
        assert_eq!(classify(ok(500), "x"), Err(LookupError::http_status(500, "x")));
        assert_eq!(
            classify(Err(LookupError::Network("reset".into())), "x"),
            Err(LookupError::Network("reset".into()))
        );
    }
}
