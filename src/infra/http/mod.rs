mod api;
mod middleware;

pub use api::error::{ApiError, codes};
pub use api::{ApiState, build_router};
pub use middleware::{REQUEST_ID_HEADER, RequestContext};
