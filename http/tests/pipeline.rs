//! End-to-end pipeline behavior against an in-process HTTP server.

use concord_http::{Client, ClientBuilder, Request, RequestAnswer, Route};
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Method, Request as HyperRequest, Response, Server, StatusCode,
};
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::time::Instant;

type Handler = Arc<dyn Fn(HyperRequest<Body>) -> Response<Body> + Send + Sync>;

fn serve(handler: Handler) -> SocketAddr {
    let make = make_service_fn(move |_conn| {
        let handler = Arc::clone(&handler);

        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let handler = Arc::clone(&handler);

                async move { Ok::<_, Infallible>(handler(req)) }
            }))
        }
    });

    let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make);
    let addr = server.local_addr();

    tokio::spawn(server);

    addr
}

fn builder(addr: SocketAddr) -> ClientBuilder {
    Client::builder()
        .token("test-token".to_owned())
        .proxy(addr.to_string(), true)
}

fn route() -> Route {
    Route::new(Method::GET, "v1/x", "v1/x")
}

fn epoch_millis_in(duration: Duration) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;

    now + duration.as_millis() as u64
}

#[tokio::test]
async fn single_success_carries_snapshot_and_context() {
    let addr = serve(Arc::new(|_req| {
        Response::builder()
            .status(StatusCode::OK)
            .header("x-ratelimit-remaining", "4")
            .header("x-ratelimit-limit", "5")
            .header(
                "x-ratelimit-reset",
                epoch_millis_in(Duration::from_millis(1000)).to_string(),
            )
            .body(Body::from(r#"{"ok":true}"#))
            .unwrap()
    }));

    let client = builder(addr).build();
    let mut flow = client.request_flow::<Value, u64>();

    flow.send(Request::builder(route(), 42).build())
        .await
        .unwrap();

    match flow.recv().await.unwrap() {
        RequestAnswer::Response {
            context,
            data,
            limit,
            remaining,
            til_reset,
            ..
        } => {
            assert_eq!(42, context);
            assert_eq!(json!({ "ok": true }), data);
            assert_eq!(5, limit);
            assert_eq!(4, remaining);
            assert!(til_reset > Duration::from_millis(500));
            assert!(til_reset <= Duration::from_millis(1100));
        }
        other => panic!("expected a response, got {other:?}"),
    }
}

#[tokio::test]
async fn global_ratelimit_gates_unrelated_routes() {
    let addr = serve(Arc::new(|_req| {
        Response::builder()
            .status(StatusCode::TOO_MANY_REQUESTS)
            .header("retry-after", "2000")
            .header("x-ratelimit-global", "true")
            .body(Body::empty())
            .unwrap()
    }));

    let client = builder(addr)
        .max_allowed_wait(Duration::from_millis(500))
        .build();
    let mut flow = client.request_flow::<Value, u64>();

    flow.send(Request::builder(route(), 1).build())
        .await
        .unwrap();

    match flow.recv().await.unwrap() {
        RequestAnswer::Ratelimited {
            global, til_reset, ..
        } => {
            assert!(global);
            assert_eq!(Duration::from_millis(2000), til_reset);
        }
        other => panic!("expected a rate limited answer, got {other:?}"),
    }

    // An unrelated raw route submitted while the global gate holds must be
    // dropped once the allowed wait runs out.
    let unrelated = Route::new(Method::GET, "v1/y", "v1/y");
    let start = Instant::now();

    flow.send(Request::builder(unrelated, 2).build())
        .await
        .unwrap();

    match flow.recv().await.unwrap() {
        RequestAnswer::Dropped { context, .. } => {
            assert_eq!(2, context);
            assert!(start.elapsed() >= Duration::from_millis(400));
            assert!(start.elapsed() < Duration::from_millis(1500));
        }
        other => panic!("expected a dropped answer, got {other:?}"),
    }
}

#[tokio::test]
async fn retry_flow_retries_until_success() {
    let hits = Arc::new(AtomicUsize::new(0));
    let handler_hits = Arc::clone(&hits);

    let addr = serve(Arc::new(move |_req| {
        let hit = handler_hits.fetch_add(1, Ordering::SeqCst) + 1;

        if hit < 3 {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::empty())
                .unwrap()
        } else {
            Response::builder()
                .status(StatusCode::OK)
                .body(Body::from(r#"{"ok":true}"#))
                .unwrap()
        }
    }));

    let client = builder(addr).max_retry_count(3).build();
    let (sender, mut answers) = client.retry_request_flow::<Value, u64>().split();

    sender
        .send(Request::builder(route(), 7).build())
        .await
        .unwrap();
    drop(sender);

    let answer = answers.recv().await.unwrap();
    assert!(answer.is_response());
    assert_eq!(7, *answer.context());

    // Exactly one success and nothing more.
    assert!(answers.recv().await.is_none());
    assert_eq!(3, hits.load(Ordering::SeqCst));
}

#[tokio::test]
async fn retry_flow_spends_at_most_the_attempt_budget() {
    let hits = Arc::new(AtomicUsize::new(0));
    let handler_hits = Arc::clone(&hits);

    let addr = serve(Arc::new(move |_req| {
        handler_hits.fetch_add(1, Ordering::SeqCst);

        Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Body::empty())
            .unwrap()
    }));

    let client = builder(addr).max_retry_count(3).build();
    let (sender, mut answers) = client.retry_request_flow::<Value, u64>().split();

    sender
        .send(Request::builder(route(), 1).build())
        .await
        .unwrap();
    drop(sender);

    // The request fails every attempt and is discarded, so the pipeline
    // completes without emitting anything.
    assert!(answers.recv().await.is_none());
    assert_eq!(3, hits.load(Ordering::SeqCst));
}

#[tokio::test]
async fn routes_with_one_template_share_a_bucket() {
    let hits = Arc::new(AtomicUsize::new(0));
    let handler_hits = Arc::clone(&hits);

    let addr = serve(Arc::new(move |_req| {
        let hit = handler_hits.fetch_add(1, Ordering::SeqCst) + 1;
        let remaining = if hit == 1 { "0" } else { "1" };

        Response::builder()
            .status(StatusCode::OK)
            .header("x-ratelimit-remaining", remaining)
            .header("x-ratelimit-limit", "1")
            .header("retry-after", "500")
            .body(Body::from("{}"))
            .unwrap()
    }));

    let client = builder(addr).build();
    let mut flow = client.request_flow::<Value, u64>();

    let first = Route::new(
        Method::GET,
        "users/111/messages",
        "users/{user_id}/messages",
    );
    flow.send(Request::builder(first, 1).build()).await.unwrap();
    assert!(flow.recv().await.unwrap().is_response());

    // The first response exhausted the shared bucket for 500ms, so the
    // second concrete URI has to sit at the gate until the reset.
    let second = Route::new(
        Method::GET,
        "users/222/messages",
        "users/{user_id}/messages",
    );
    let start = Instant::now();

    flow.send(Request::builder(second, 2).build())
        .await
        .unwrap();

    let answer = flow.recv().await.unwrap();
    assert!(answer.is_response());
    assert_eq!(2, *answer.context());
    assert!(start.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn every_request_gets_exactly_one_answer_with_its_context() {
    let addr = serve(Arc::new(|req| {
        let body = json!({ "path": req.uri().path() });

        Response::builder()
            .status(StatusCode::OK)
            .body(Body::from(body.to_string()))
            .unwrap()
    }));

    let client = builder(addr).build();
    let mut flow = client.request_flow::<Value, usize>();

    for id in 0..12 {
        let route = Route::new(Method::GET, format!("items/{id}"), "items/{item_id}");

        flow.send(Request::builder(route, id).build()).await.unwrap();
    }

    let mut seen = vec![false; 12];

    for _ in 0..12 {
        let answer = flow.recv().await.unwrap();
        let (data, context) = answer.into_data().unwrap();

        // Context fidelity: the answer's payload is the one produced for
        // exactly this request.
        assert_eq!(
            json!({ "path": format!("/api/v9/items/{context}") }),
            data,
        );
        assert!(!seen[context], "context {context} answered twice");
        seen[context] = true;
    }

    assert!(seen.iter().all(|answered| *answered));
}

#[tokio::test]
async fn flow_without_ratelimit_skips_the_gate() {
    let addr = serve(Arc::new(|_req| {
        Response::builder()
            .status(StatusCode::TOO_MANY_REQUESTS)
            .header("retry-after", "5000")
            .header("x-ratelimit-global", "true")
            .body(Body::empty())
            .unwrap()
    }));

    let client = builder(addr)
        .max_allowed_wait(Duration::from_millis(100))
        .build();
    let mut flow = client.request_flow_without_ratelimit::<Value, u64>();

    let start = Instant::now();

    for context in 0..2 {
        flow.send(Request::builder(route(), context).build())
            .await
            .unwrap();

        assert!(matches!(
            flow.recv().await.unwrap(),
            RequestAnswer::Ratelimited { .. }
        ));
    }

    // Neither request waited at the gate nor fed the global gate back.
    assert!(start.elapsed() < Duration::from_millis(1000));
}

#[tokio::test]
async fn audit_reason_is_transmitted_verbatim() {
    let addr = serve(Arc::new(|req| {
        let reason = req
            .headers()
            .get("x-audit-log-reason")
            .map(|value| value.to_str().unwrap().to_owned())
            .unwrap_or_default();

        Response::builder()
            .status(StatusCode::OK)
            .body(Body::from(json!({ "reason": reason }).to_string()))
            .unwrap()
    }));

    let client = builder(addr).build();
    let mut flow = client.request_flow::<Value, u64>();

    let request = Request::builder(route(), 1)
        .reason("cleaning up spam")
        .unwrap()
        .build();

    flow.send(request).await.unwrap();

    let (data, _context) = flow.recv().await.unwrap().into_data().unwrap();
    assert_eq!(json!({ "reason": "cleaning up spam" }), data);
}

#[tokio::test]
async fn no_content_decodes_as_null() {
    let addr = serve(Arc::new(|_req| {
        Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Body::empty())
            .unwrap()
    }));

    let client = builder(addr).build();
    let mut flow = client.request_flow::<Value, u64>();

    flow.send(Request::builder(route(), 1).build())
        .await
        .unwrap();

    let (data, _context) = flow.recv().await.unwrap().into_data().unwrap();
    assert_eq!(Value::Null, data);
}

#[tokio::test]
async fn non_success_status_becomes_an_error_answer() {
    let addr = serve(Arc::new(|_req| {
        Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from(r#"{"message":"unknown"}"#))
            .unwrap()
    }));

    let client = builder(addr).build();
    let mut flow = client.request_flow::<Value, u64>();

    flow.send(Request::builder(route(), 1).build())
        .await
        .unwrap();

    match flow.recv().await.unwrap() {
        RequestAnswer::Error { context, source, .. } => {
            assert_eq!(1, context);

            match source.kind() {
                concord_http::ErrorType::Response { body, status } => {
                    assert_eq!(StatusCode::NOT_FOUND, *status);
                    assert_eq!(br#"{"message":"unknown"}"#.to_vec(), *body);
                }
                other => panic!("expected a response error, got {other:?}"),
            }
        }
        other => panic!("expected an error answer, got {other:?}"),
    }
}

#[tokio::test]
async fn ordered_flow_preserves_order() {
    let addr = serve(Arc::new(|req| {
        let body = json!({ "path": req.uri().path() });

        Response::builder()
            .status(StatusCode::OK)
            .body(Body::from(body.to_string()))
            .unwrap()
    }));

    let client = builder(addr).build();
    let mut flow = client.request_flow::<Value, usize>().ordered();

    for id in 0..4 {
        let route = Route::new(Method::GET, format!("items/{id}"), "items/{item_id}");
        let request = Request::builder(route, id).build();

        let answer = flow.send_and_recv(request).await.unwrap().unwrap();
        let (data, context) = answer.into_data().unwrap();

        assert_eq!(id, context);
        assert_eq!(json!({ "path": format!("/api/v9/items/{id}") }), data);
    }
}
