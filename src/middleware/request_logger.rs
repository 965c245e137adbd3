//! Request logging middleware with correlation ids.
//!
//! Every request carries a correlation id: the caller's `X-Correlation-Id`
//! when it is usable, a fresh UUID otherwise. The id is attached to every log
//! line of the request, stored in the request extensions and echoed on the
//! response.

use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{Error, HttpMessage};
use futures_util::future::LocalBoxFuture;
use std::future::{Ready, ready};
use std::time::Instant;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::config::CORRELATION_ID_HEADER;

const MAX_CORRELATION_ID_LEN: usize = 128;

/// Correlation id of the current request, available through request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

/// Use the caller's id when it is short printable ASCII, otherwise mint one.
fn correlation_id_from(header: Option<&HeaderValue>) -> String {
    header
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| {
            !id.is_empty()
                && id.len() <= MAX_CORRELATION_ID_LEN
                && id.bytes().all(|b| b.is_ascii_graphic())
        })
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Request logger middleware factory.
pub struct RequestLogger;

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggerMiddleware { service }))
    }
}

/// Request logger middleware service.
pub struct RequestLoggerMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start = Instant::now();
        let correlation_id = correlation_id_from(req.headers().get(CORRELATION_ID_HEADER));
        let method = req.method().to_string();
        let path = req.path().to_string();
        let query = req.query_string().to_string();
        let remote_addr = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();

        req.extensions_mut()
            .insert(CorrelationId(correlation_id.clone()));

        let span = info_span!("request", correlation_id = %correlation_id);

        span.in_scope(|| {
            info!(
                target: "api",
                method = %method,
                path = %path,
                query = %query,
                remote_addr = %remote_addr,
                "→ Request started"
            )
        });

        let fut = span.in_scope(|| self.service.call(req));

        Box::pin(
            async move {
                let mut res = fut.await?;
                let elapsed = start.elapsed();
                let status = res.status();
                let status_code = status.as_u16();

                if let Ok(value) = HeaderValue::from_str(&correlation_id) {
                    res.headers_mut()
                        .insert(HeaderName::from_static("x-correlation-id"), value);
                }

                if status.is_success() {
                    info!(
                        target: "api",
                        method = %method,
                        path = %path,
                        status = %status_code,
                        duration_ms = %elapsed.as_millis(),
                        "← Request completed"
                    );
                } else if status.is_client_error() {
                    warn!(
                        target: "api",
                        method = %method,
                        path = %path,
                        status = %status_code,
                        duration_ms = %elapsed.as_millis(),
                        "← Client error"
                    );
                } else {
                    warn!(
                        target: "api",
                        method = %method,
                        path = %path,
                        status = %status_code,
                        duration_ms = %elapsed.as_millis(),
                        "← Server error"
                    );
                }

                Ok(res)
            }
            .instrument(span),
        )
    }
}
