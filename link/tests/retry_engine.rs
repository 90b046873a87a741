mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{throttled, ScriptedTransport, Step};
use warehouse_link::{
    BackoffPolicy, FailureCategory, HttpRequest, HttpTransport, LinkError, RequestContext,
    RetryBudget, RetryEngine, TransportFailureKind,
};

const URL: &str = "https://warehouse.example.com/api/2.0/sql/statements";

fn engine(transport: &Arc<ScriptedTransport>, budget: RetryBudget) -> RetryEngine {
    let transport: Arc<dyn HttpTransport> = transport.clone();
    RetryEngine::new(transport, budget, BackoffPolicy::default())
}

fn assert_gaps(actual: &[Duration], expected_secs: &[u64]) {
    assert_eq!(actual.len(), expected_secs.len(), "gaps: {:?}", actual);
    for (gap, secs) in actual.iter().zip(expected_secs) {
        let expected = Duration::from_secs(*secs);
        assert!(
            *gap >= expected && *gap < expected + Duration::from_millis(5),
            "gap {:?} != {:?}",
            gap,
            expected
        );
    }
}

#[tokio::test(start_paused = true)]
async fn throttled_without_retry_after_fails_on_first_attempt() {
    for status in [429u16, 503] {
        let transport = ScriptedTransport::new();
        transport.respond(status, "busy").respond(200, "{}");

        let err = engine(&transport, RetryBudget::default())
            .send(HttpRequest::post(URL), &RequestContext::new().with_statement("s-1"))
            .await
            .unwrap_err();

        match err {
            LinkError::ImmediateRetryDenied {
                statement_id,
                status: got,
                attempts,
                ..
            } => {
                assert_eq!(statement_id.as_deref(), Some("s-1"));
                assert_eq!(got, status);
                assert_eq!(attempts, 1);
            },
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(transport.calls(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn temp_unavailable_attempts_follow_window_over_retry_after() {
    // window 900s: r=300 -> 3 attempts, r=400 -> 3 attempts, r=450 -> 2 attempts
    for (retry_after, expected_attempts) in [(300u64, 3u32), (400, 3), (450, 2)] {
        let transport = ScriptedTransport::new();
        transport.always(Step::Respond(throttled(503, retry_after)));

        let err = engine(&transport, RetryBudget::default())
            .send(HttpRequest::get(URL), &RequestContext::new())
            .await
            .unwrap_err();

        match err {
            LinkError::RetryBudgetExceeded {
                category, attempts, ..
            } => {
                assert_eq!(category, FailureCategory::Status(503));
                assert_eq!(attempts, expected_attempts);
            },
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(transport.calls(), expected_attempts as usize);
        let expected = vec![retry_after; expected_attempts as usize - 1];
        assert_gaps(&transport.gaps(), &expected);
    }
}

#[tokio::test(start_paused = true)]
async fn rate_limit_attempts_follow_window_over_retry_after() {
    // window 120s: r=30 -> 4 attempts, r=50 -> 3 attempts
    for (retry_after, expected_attempts) in [(30u64, 4u32), (50, 3)] {
        let transport = ScriptedTransport::new();
        transport.always(Step::Respond(throttled(429, retry_after)));

        let err = engine(&transport, RetryBudget::default())
            .send(HttpRequest::post(URL), &RequestContext::new())
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), Some(expected_attempts));
        assert_eq!(err.status_code(), Some(429));
        assert_eq!(transport.calls(), expected_attempts as usize);
        assert_gaps(&transport.gaps(), &vec![retry_after; expected_attempts as usize - 1]);
    }
}

#[tokio::test(start_paused = true)]
async fn throttled_request_succeeds_within_window() {
    let transport = ScriptedTransport::new();
    transport
        .respond_retry_after(503, 2)
        .respond_retry_after(429, 3)
        .respond(200, r#"{"ok":true}"#);

    let response = engine(&transport, RetryBudget::default())
        .send(HttpRequest::get(URL), &RequestContext::new())
        .await
        .unwrap();

    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(transport.calls(), 3);
    assert_gaps(&transport.gaps(), &[2, 3]);
}

#[tokio::test(start_paused = true)]
async fn delete_is_never_sent_twice() {
    let cases = vec![
        Step::Respond(throttled(429, 1)),
        Step::Respond(throttled(503, 1)),
        Step::Respond(common::response(500, "boom")),
        Step::Respond(common::response(502, "bad gateway")),
        Step::Respond(common::response(404, "gone")),
    ];
    for step in cases {
        let transport = ScriptedTransport::new();
        transport.push(step);
        transport.respond(200, "{}");

        let err = engine(&transport, RetryBudget::default())
            .send(HttpRequest::delete(URL), &RequestContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, LinkError::Http { attempts: 1, .. }), "{:?}", err);
        assert_eq!(transport.calls(), 1);
    }

    let transport = ScriptedTransport::new();
    transport.fail(TransportFailureKind::Connect).respond(200, "{}");
    let err = engine(&transport, RetryBudget::default())
        .send(HttpRequest::delete(URL), &RequestContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::Transport { attempts: 1, .. }), "{:?}", err);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_errors_back_off_exponentially_up_to_max_attempts() {
    let transport = ScriptedTransport::new();
    transport.always(Step::Respond(common::response(500, "internal")));

    let err = engine(&transport, RetryBudget::default())
        .send(HttpRequest::get(URL), &RequestContext::new())
        .await
        .unwrap_err();

    match err {
        LinkError::RetryBudgetExceeded {
            category, attempts, ..
        } => {
            assert_eq!(category, FailureCategory::Status(500));
            assert_eq!(attempts, 6);
        },
        other => panic!("unexpected error {:?}", other),
    }
    assert_gaps(&transport.gaps(), &[1, 2, 4, 8, 10]);
}

#[tokio::test(start_paused = true)]
async fn network_failure_is_retried_then_succeeds() {
    let transport = ScriptedTransport::new();
    transport
        .fail(TransportFailureKind::Io)
        .respond(200, "{}");

    let response = engine(&transport, RetryBudget::default())
        .send(HttpRequest::post(URL), &RequestContext::new())
        .await
        .unwrap();

    assert!(response.is_success());
    assert_eq!(transport.calls(), 2);
    assert_gaps(&transport.gaps(), &[1]);
}

#[tokio::test(start_paused = true)]
async fn disabled_class_is_terminal_even_with_retry_after() {
    let transport = ScriptedTransport::new();
    transport.respond_retry_after(503, 5).respond(200, "{}");
    let budget = RetryBudget {
        retry_temp_unavailable: false,
        ..RetryBudget::default()
    };

    let err = engine(&transport, budget)
        .send(HttpRequest::get(URL), &RequestContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, LinkError::Http { status: 503, .. }), "{:?}", err);
    assert!(!err.is_retryable_by_caller());
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn terminal_status_surfaces_server_error_body() {
    let transport = ScriptedTransport::new();
    transport.respond(
        400,
        r#"{"error_code":"INVALID_PARAMETER_VALUE","message":"Unknown warehouse"}"#,
    );

    let err = engine(&transport, RetryBudget::default())
        .send(HttpRequest::post(URL), &RequestContext::new().with_statement("s-2"))
        .await
        .unwrap_err();

    match err {
        LinkError::Http {
            statement_id,
            status,
            error_code,
            message,
            attempts,
        } => {
            assert_eq!(statement_id.as_deref(), Some("s-2"));
            assert_eq!(status, 400);
            assert_eq!(error_code.as_deref(), Some("INVALID_PARAMETER_VALUE"));
            assert_eq!(message, "Unknown warehouse");
            assert_eq!(attempts, 1);
        },
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn overall_deadline_stops_retries_before_window_is_spent() {
    let transport = ScriptedTransport::new();
    transport.always(Step::Respond(throttled(503, 3)));
    let ctx = RequestContext::new().with_budget(Some(Duration::from_secs(5)));

    let err = engine(&transport, RetryBudget::default())
        .send(HttpRequest::get(URL), &ctx)
        .await
        .unwrap_err();

    match err {
        LinkError::RetryBudgetExceeded {
            category, attempts, ..
        } => {
            assert_eq!(category, FailureCategory::Status(503));
            assert_eq!(attempts, 2);
        },
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancel_interrupts_backoff_sleep() {
    let transport = ScriptedTransport::new();
    transport.always(Step::Respond(throttled(503, 100)));
    let engine = engine(&transport, RetryBudget::default());
    let token = CancellationToken::new();
    let ctx = RequestContext::new().with_cancel(token.clone());

    let started = tokio::time::Instant::now();
    let task = tokio::spawn(async move { engine.send(HttpRequest::get(URL), &ctx).await });
    tokio::time::sleep(Duration::from_secs(10)).await;
    token.cancel();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(LinkError::Cancelled)));
    assert_eq!(transport.calls(), 1);
    assert!(started.elapsed() < Duration::from_secs(100));
}

#[tokio::test(start_paused = true)]
async fn disabled_budget_sends_once() {
    let transport = ScriptedTransport::new();
    transport.respond(502, "bad gateway").respond(200, "{}");
    let budget = RetryBudget::disabled();

    let err = engine(&transport, budget)
        .send(HttpRequest::get(URL), &RequestContext::new())
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(502));
    assert_eq!(err.attempts(), Some(1));
    assert_eq!(transport.calls(), 1);
}
