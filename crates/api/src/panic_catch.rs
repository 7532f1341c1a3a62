//! 请求处理的panic防护。
//!
//! 把处理过程中的panic转为500响应，响应体携带panic信息和调用栈，
//! 便于排查。

use std::any::Any;
use std::backtrace::Backtrace;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use tracing::error;

pub async fn catch_panic(req: Request, next: Next) -> Response {
    match std::panic::AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(rsp) => rsp,
        Err(panic) => {
            let detail = panic_message(panic);
            let backtrace = Backtrace::force_capture();
            error!("Request handler panicked: {detail}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("panic: {detail}\n{backtrace}"),
            )
                .into_response()
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
