use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::extract::Request;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use quota_limit::UpstreamError;
use tower::BoxError;
use tower::ServiceBuilder;
use tower::service_fn;
use tower::util::BoxCloneSyncService;
use tower_quota::Admission;
use tower_quota::AdmissionConfig;
use tower_quota::CallerId;
use tower_quota::CallerLimitLayer;
use tower_quota::GatewayError;
use tower_quota::Reply;

type Upstream = BoxCloneSyncService<String, String, BoxError>;

#[derive(Clone)]
struct Gateway {
    admission: Admission,
    upstream: Upstream,
}

// Stands in for the hosted completion API: every third call fails once
fn flaky_upstream() -> Upstream {
    let calls = Arc::new(AtomicUsize::new(0));
    BoxCloneSyncService::new(service_fn(move |prompt: String| {
        let n = calls.fetch_add(1, Ordering::Relaxed);
        async move {
            if n % 3 == 2 {
                Err(BoxError::from(UpstreamError::transient("503 Service Unavailable")))
            } else {
                Ok(format!("You asked: {prompt}"))
            }
        }
    }))
}

async fn complete(
    State(gateway): State<Gateway>,
    prompt: String,
) -> Result<Reply<String>, GatewayError> {
    gateway
        .admission
        .perform(move || prompt.clone(), gateway.upstream.clone())
        .await
}

// A real deployment would authenticate; here the header is trusted
fn identify(mut req: Request) -> Request {
    let caller = req
        .headers()
        .get("x-caller-id")
        .and_then(|value| value.to_str().ok())
        .map(|value| CallerId(value.to_string()));
    if let Some(caller) = caller {
        req.extensions_mut().insert(caller);
    }
    req
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AdmissionConfig::load()?;
    let gateway = Gateway {
        admission: config.build(),
        upstream: flaky_upstream(),
    };

    let mut app = Router::new()
        .route("/complete", post(complete))
        .with_state(gateway);

    if let Some(window) = config.caller_window() {
        app = app.layer(
            ServiceBuilder::new()
                // Catches BoxError and returns a Response
                .layer(HandleErrorLayer::new(handle_gateway_error))
                .map_request(identify)
                .layer(CallerLimitLayer::new(Arc::new(window)))
                // Route is Infallible; the caller limit wants BoxError
                .map_err(BoxError::from),
        );
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    println!("📡 Listening on http://127.0.0.1:3000");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn handle_gateway_error(err: BoxError) -> impl IntoResponse {
    if let Some(gateway_err) = err.downcast_ref::<GatewayError>() {
        gateway_err.clone().into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Service Error").into_response()
    }
}
