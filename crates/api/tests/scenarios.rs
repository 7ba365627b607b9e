use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ami_api::{AmiClient, NO_CERT_FIELD, Transport, TransportError, TransportRequest, TransportResponse};
use ami_types::{ExecutionOptions, FailureKind, Payload, RowsetBindings, guest_user_info};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};

const ENDPOINT: &str = "https://ami.example.org/AMI/FrontEnd";

/// Answers every request with the same body and records what it was sent.
struct StaticTransport {
    body: String,
    requests: Mutex<Vec<TransportRequest>>,
}

impl StaticTransport {
    fn new(body: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            body: body.into(),
            requests: Mutex::default(),
        })
    }

    fn last_request(&self) -> TransportRequest {
        self.requests
            .lock()
            .expect("lock")
            .last()
            .cloned()
            .expect("one request sent")
    }
}

#[async_trait]
impl Transport for StaticTransport {
    async fn post_form(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().expect("lock").push(request);
        Ok(TransportResponse::ok(self.body.clone()))
    }
}

/// Never answers.
struct PendingTransport;

#[async_trait]
impl Transport for PendingTransport {
    async fn post_form(&self, _request: TransportRequest) -> Result<TransportResponse, TransportError> {
        std::future::pending().await
    }
}

/// Answers after a delay and flags when it got to answer.
struct SlowTransport {
    delay: Duration,
    answered: AtomicBool,
}

#[async_trait]
impl Transport for SlowTransport {
    async fn post_form(&self, _request: TransportRequest) -> Result<TransportResponse, TransportError> {
        tokio::time::sleep(self.delay).await;
        self.answered.store(true, Ordering::SeqCst);
        Ok(TransportResponse::ok(r#"{"AMIMessage":[{"info":[{"$":"late"}]}]}"#))
    }
}

/// Answers after a delay picked by the command name.
struct PerCommandDelayTransport {
    delays: Vec<(&'static str, Duration)>,
}

#[async_trait]
impl Transport for PerCommandDelayTransport {
    async fn post_form(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let command = form_fields(&request.body)
            .into_iter()
            .find(|(key, _)| key == "Command")
            .map(|(_, value)| value)
            .unwrap_or_default();
        let delay = self
            .delays
            .iter()
            .find(|(name, _)| command == *name)
            .map(|(_, delay)| *delay)
            .unwrap_or_default();
        tokio::time::sleep(delay).await;
        Ok(TransportResponse::ok(format!(r#"{{"AMIMessage":[{{"info":[{{"$":"{}"}}]}}]}}"#, command)))
    }
}

struct FailingTransport(TransportError);

#[async_trait]
impl Transport for FailingTransport {
    async fn post_form(&self, _request: TransportRequest) -> Result<TransportResponse, TransportError> {
        Err(self.0.clone())
    }
}

fn client(transport: Arc<dyn Transport>) -> AmiClient {
    AmiClient::with_transport(ENDPOINT, transport).expect("valid endpoint")
}

fn form_fields(body: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(body.as_bytes()).into_owned().collect()
}

#[tokio::test]
async fn password_command_with_info_envelope_succeeds() {
    let transport = StaticTransport::new(r#"{"AMIMessage":[{"info":[{"$":"ok"}]}]}"#);
    let client = client(transport.clone());

    let outcome = client
        .execute(
            "GetSessionInfo -AMIUser=? -AMIPass=?",
            ExecutionOptions::new().with_params(["alice", "s3cr3t"]),
        )
        .await
        .expect("command succeeds");

    assert_eq!(outcome.message, "ok");
    assert!(outcome.diagnostic_url.starts_with("https://ami.example.org/AMI/FrontEnd?Command="));

    let request = transport.last_request();
    assert_eq!(request.endpoint, ENDPOINT);
    assert_eq!(request.accept, "application/json");
    assert_eq!(
        form_fields(&request.body),
        vec![
            (
                "Command".to_string(),
                r#"GetSessionInfo -AMIUser="alice" -AMIPass="s3cr3t""#.to_string()
            ),
            ("Converter".to_string(), "AMIXmlToJson.xsl".to_string()),
        ]
    );
}

#[tokio::test]
async fn error_envelope_fails_with_the_server_message_and_payload() {
    let body = r#"{"AMIMessage":[{"error":[{"$":"bad password"}]}]}"#;
    let client = client(StaticTransport::new(body));

    let failure = client
        .execute(
            "GetSessionInfo -AMIUser=? -AMIPass=?",
            ExecutionOptions::new().with_params(["alice", "wrong"]),
        )
        .await
        .expect_err("command fails");

    assert_eq!(failure.kind, FailureKind::Application);
    assert_eq!(failure.message, "bad password");
    assert_eq!(failure.payload, Payload::Json(serde_json::from_str::<Value>(body).expect("valid json")));
}

#[tokio::test]
async fn unanswered_command_times_out() {
    let client = client(Arc::new(PendingTransport));

    let start = Instant::now();
    let failure = client
        .execute("GetSessionInfo", ExecutionOptions::new().with_timeout_ms(50))
        .await
        .expect_err("command times out");

    assert!(start.elapsed() < Duration::from_millis(200), "took {:?}", start.elapsed());
    assert!(failure.is_timeout());
    assert_eq!(failure.message, "timeout");
    let envelope = failure.payload.as_json().expect("structured payload");
    assert_eq!(envelope, &json!({"AMIMessage": [{"error": [{"$": "timeout"}]}]}));
}

#[tokio::test]
async fn late_response_cannot_settle_a_timed_out_call() {
    let transport = Arc::new(SlowTransport {
        delay: Duration::from_millis(200),
        answered: AtomicBool::new(false),
    });
    let client = client(transport.clone());

    let failure = client
        .execute("GetSessionInfo", ExecutionOptions::new().with_timeout_ms(50))
        .await
        .expect_err("command times out");
    assert_eq!(failure.kind, FailureKind::Timeout);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!transport.answered.load(Ordering::SeqCst), "request was dropped with the timeout");
}

#[tokio::test]
async fn concurrent_calls_keep_their_own_timers() {
    let client = client(Arc::new(PerCommandDelayTransport {
        delays: vec![("Slow", Duration::from_millis(300)), ("Fast", Duration::from_millis(30))],
    }));

    let (slow, fast) = tokio::join!(
        client.execute("Slow", ExecutionOptions::new().with_timeout_ms(50)),
        client.execute("Fast", ExecutionOptions::new().with_timeout_ms(60)),
    );

    assert_eq!(slow.expect_err("slow call times out").kind, FailureKind::Timeout);
    assert_eq!(fast.expect("fast call succeeds").message, "Fast");
}

#[tokio::test]
async fn finished_call_is_not_rejected_when_its_timer_would_fire() {
    let client = client(Arc::new(PerCommandDelayTransport {
        delays: vec![("Fast", Duration::from_millis(10))],
    }));

    let outcome = client
        .execute("Fast", ExecutionOptions::new().with_timeout_ms(40))
        .await
        .expect("call succeeds before its timeout");
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(outcome.message, "Fast");
    assert_eq!(outcome.payload.as_json(), Some(&json!({"AMIMessage": [{"info": [{"$": "Fast"}]}]})));
}

#[tokio::test]
async fn transport_failures_are_normalized() {
    let client = client(Arc::new(FailingTransport(TransportError::network("connection refused"))));
    let failure = client
        .execute("GetSessionInfo", ExecutionOptions::new())
        .await
        .expect_err("network error");
    assert_eq!(failure.kind, FailureKind::Transport);
    assert_eq!(failure.message, "service temporarily unreachable");

    let client = self::client(Arc::new(FailingTransport(TransportError::Status {
        status: StatusCode::BAD_GATEWAY,
    })));
    let failure = client
        .execute("GetSessionInfo", ExecutionOptions::new())
        .await
        .expect_err("status error");
    assert_eq!(failure.kind, FailureKind::Transport);

    let client = self::client(StaticTransport::new("<html>maintenance</html>"));
    let failure = client
        .execute("GetSessionInfo", ExecutionOptions::new())
        .await
        .expect_err("undecodable body");
    assert_eq!(failure.kind, FailureKind::Decode);
    assert_eq!(failure.message, "resource temporarily unreachable");
}

#[tokio::test]
async fn raw_converter_returns_body_text() {
    let transport = StaticTransport::new("<AMIMessage/>");
    let client = client(transport.clone());

    let outcome = client
        .execute(
            "SearchQuery -sql=?",
            ExecutionOptions::new().with_converter("").with_param("SELECT \"x\""),
        )
        .await
        .expect("raw command succeeds");

    assert_eq!(outcome.payload, Payload::Text("<AMIMessage/>".into()));
    assert_eq!(outcome.message, "<AMIMessage/>");
    assert_eq!(transport.last_request().accept, "text/plain");

    let client = self::client(Arc::new(FailingTransport(TransportError::network("reset"))));
    let failure = client
        .execute("SearchQuery", ExecutionOptions::new().with_converter("AMIXmlToXml.xsl"))
        .await
        .expect_err("network error");
    assert_eq!(failure.payload, Payload::Text("service temporarily unreachable".into()));
}

#[tokio::test]
async fn raw_body_read_failure_is_a_resource_failure() {
    let client = client(Arc::new(FailingTransport(TransportError::body("connection closed mid-body"))));

    let failure = client
        .execute("SearchQuery", ExecutionOptions::new().with_converter(""))
        .await
        .expect_err("body read fails");

    assert_eq!(failure.kind, FailureKind::Decode);
    assert_eq!(failure.message, "resource temporarily unreachable");
    assert_eq!(failure.payload.as_text(), Some("resource temporarily unreachable"));
}

#[tokio::test]
async fn per_call_endpoint_and_extras_are_sent() {
    let transport = StaticTransport::new("{}");
    let client = client(transport.clone());

    client
        .execute(
            "ListCatalogs",
            ExecutionOptions::new()
                .with_endpoint(" https://other.example.org/AMI/FrontEnd ")
                .with_extra("AMIAppName", Some("demo".into()))
                .with_extra("Flag", None),
        )
        .await
        .expect("command succeeds");

    let request = transport.last_request();
    assert_eq!(request.endpoint, "https://other.example.org/AMI/FrontEnd");
    let fields = form_fields(&request.body);
    assert_eq!(fields[2], ("AMIAppName".to_string(), "demo".to_string()));
    assert_eq!(fields[3], ("Flag".to_string(), String::new()));
}

#[tokio::test]
async fn sign_in_folds_the_session_and_ignores_certificates() {
    let body = json!({"AMIMessage": [{
        "info": [{"$": "welcome"}],
        "Result": [{"rowset": [
            {"@type": "user", "row": [{"field": [{"@name": "AMIUser", "$": "alice"}]}]},
            {"@type": "role", "row": [
                {"field": [{"@name": "name", "$": "admin"}]},
                {"field": [{"@name": "name", "$": "user"}]}
            ]}
        ]}]
    }]});
    let transport = StaticTransport::new(body.to_string());
    let client = client(transport.clone());

    let outcome = client
        .sign_in_by_password("alice", "s3cr3t", ExecutionOptions::new().with_converter("ignored.xsl"))
        .await
        .expect("sign-in succeeds");

    assert_eq!(outcome.message(), "welcome");
    assert_eq!(outcome.session().user_name(), Some("alice"));
    assert_eq!(outcome.session().role_info.len(), 2);
    assert!(outcome.session().bookmark_info.is_empty());

    let fields = form_fields(&transport.last_request().body);
    assert_eq!(fields[1], ("Converter".to_string(), "AMIXmlToJson.xsl".to_string()));
    assert_eq!(fields[2], (NO_CERT_FIELD.to_string(), String::new()));
}

#[tokio::test]
async fn certificate_sign_in_presents_the_certificate() {
    let transport = StaticTransport::new("{}");
    let client = client(transport.clone());

    let outcome = client
        .sign_in_by_certificate(ExecutionOptions::new())
        .await
        .expect("sign-in succeeds");
    assert!(outcome.session().user_info.is_empty());

    let fields = form_fields(&transport.last_request().body);
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0], ("Command".to_string(), "GetSessionInfo".to_string()));
}

#[tokio::test]
async fn code_token_and_sign_out_commands() {
    let transport = StaticTransport::new("{}");
    let client = client(transport.clone());

    client.sign_in_by_code("123456", ExecutionOptions::new()).await.expect("code sign-in");
    assert_eq!(form_fields(&transport.last_request().body)[0].1, r#"GetSessionInfo -AMICode="123456""#);

    client.sign_in_by_token("tok", ExecutionOptions::new()).await.expect("token sign-in");
    assert_eq!(form_fields(&transport.last_request().body)[0].1, r#"GetSessionInfo -AMIToken="tok""#);

    client.sign_out(ExecutionOptions::new()).await.expect("sign-out");
    assert_eq!(
        form_fields(&transport.last_request().body)[0].1,
        r#"GetSessionInfo -AMIUser="" -AMIPass="""#
    );
}

#[tokio::test]
async fn failed_sign_in_falls_back_to_guest() {
    let client = client(StaticTransport::new(r#"{"AMIMessage":[{"error":[{"$":"bad password"}]}]}"#));

    let failure = client
        .sign_in_by_password("alice", "wrong", ExecutionOptions::new())
        .await
        .expect_err("sign-in fails");

    assert_eq!(failure.to_string(), "bad password");
    assert_eq!(failure.session().user_info, guest_user_info());
    assert!(failure.session().is_guest());
    assert!(failure.session().role_info.is_empty());

    let client = self::client(Arc::new(PendingTransport)).with_rowset_bindings(RowsetBindings::legacy());
    let failure = client
        .sign_in_by_token("tok", ExecutionOptions::new().with_timeout_ms(20))
        .await
        .expect_err("sign-in times out");
    assert!(failure.failure.is_timeout());
    assert!(failure.session().dashboard_info.as_keyed().is_some());
}
