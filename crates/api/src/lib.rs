//! HTTP外部接口层。

pub mod error;
pub mod handlers;
pub mod panic_catch;
pub mod response;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use response::CommonResponse;
pub use routes::{create_routes, AppState};
