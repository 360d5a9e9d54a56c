mod common;

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use http::{HeaderValue, StatusCode};
use restplate::{
    CodecRegistry, Dispatcher, DispatcherOptions, Request, RequestInterceptor, RequestState,
    RootResolver,
    ports::{InterceptorContext, TransportResponse},
};

use common::{ScriptedTransport, Step, capture};

/// Finishes on another task after a delay, adding a header.
struct DelayedAuth {
    delay: Duration,
}

impl RequestInterceptor for DelayedAuth {
    fn intercept(&self, context: InterceptorContext) {
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            context.with_request(|request| {
                request
                    .headers
                    .insert("authorization", HeaderValue::from_static("Bearer t0k3n"));
            });
            context.proceed();
        });
    }
}

/// Adds a query parameter synchronously.
struct ApiVersion;

impl RequestInterceptor for ApiVersion {
    fn intercept(&self, context: InterceptorContext) {
        context.with_request(|request| request.url.set_query_parameter("v", "2"));
        context.proceed();
    }
}

/// Holds every context it receives and never proceeds.
#[derive(Default)]
struct Gate {
    held: Mutex<Vec<InterceptorContext>>,
    seen: AtomicUsize,
}

impl RequestInterceptor for Gate {
    fn intercept(&self, context: InterceptorContext) {
        self.seen.fetch_add(1, Ordering::SeqCst);
        self.held.lock().unwrap().push(context);
    }
}

fn dispatcher(
    transport: Arc<ScriptedTransport>,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
) -> Dispatcher {
    Dispatcher::new(
        transport,
        DispatcherOptions {
            roots: RootResolver::new("http://api.test"),
            codecs: CodecRegistry::new(),
            interceptors,
        },
    )
}

#[tokio::test]
async fn test_request_waits_for_every_interceptor() {
    let transport = ScriptedTransport::new(vec![Step::Respond(TransportResponse::new(
        StatusCode::OK,
    ))]);
    let dispatcher = dispatcher(
        transport.clone(),
        vec![
            Arc::new(DelayedAuth {
                delay: Duration::from_millis(30),
            }),
            Arc::new(ApiVersion),
        ],
    );

    let (builder, mut outcomes) = capture(
        Request::<()>::builder("GET", "/items/{id}?q={term}")
            .path_param("id", "5")
            .query_param("term", "red"),
    );
    dispatcher
        .send(builder.build().unwrap())
        .unwrap()
        .finished()
        .await;

    assert!(matches!(outcomes.recv().await, Some(Ok(()))));
    let seen = transport.requests();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].url, "http://api.test/items/5?q=red&v=2");
    assert_eq!(seen[0].headers["authorization"], "Bearer t0k3n");
}

#[tokio::test]
async fn test_interceptor_that_never_proceeds_blocks_the_request() {
    let transport = ScriptedTransport::new(vec![Step::Respond(TransportResponse::new(
        StatusCode::OK,
    ))]);
    let gate = Arc::new(Gate::default());
    let gated: Arc<dyn RequestInterceptor> = gate.clone();
    let dispatcher = dispatcher(transport.clone(), vec![Arc::new(ApiVersion), gated]);

    let (builder, mut outcomes) = capture(Request::<()>::builder("GET", "/blocked"));
    let handle = dispatcher.send(builder.build().unwrap()).unwrap();
    let control = handle.abort_handle();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gate.seen.load(Ordering::SeqCst), 1);
    assert_eq!(transport.calls(), 0);
    assert_eq!(control.state(), RequestState::Sent);

    // Aborting releases the pipeline even though the gate never proceeds.
    assert!(control.abort());
    tokio::time::timeout(Duration::from_secs(5), handle.finished())
        .await
        .unwrap();
    assert_eq!(control.state(), RequestState::Aborted);
    assert_eq!(transport.calls(), 0);
    assert!(outcomes.recv().await.is_none());
}

#[tokio::test]
async fn test_late_proceed_releases_the_request() {
    let transport = ScriptedTransport::new(vec![Step::Respond(TransportResponse::new(
        StatusCode::OK,
    ))]);
    let gate = Arc::new(Gate::default());
    let gated: Arc<dyn RequestInterceptor> = gate.clone();
    let dispatcher = dispatcher(transport.clone(), vec![gated]);

    let (builder, mut outcomes) = capture(Request::<()>::builder("GET", "/gated"));
    let handle = dispatcher.send(builder.build().unwrap()).unwrap();

    while gate.seen.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }
    let context = gate.held.lock().unwrap().pop().unwrap();
    context.proceed();

    handle.finished().await;
    assert!(matches!(outcomes.recv().await, Some(Ok(()))));
    assert_eq!(transport.calls(), 1);
}
