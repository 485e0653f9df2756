pub mod comics;
pub mod common;
pub mod convert;
pub mod ebooks;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod params;
pub mod podcasts;
pub mod proxy;
pub mod routes;
pub mod videos;

pub use error::{ApiError, ErrorResponse};
pub use routes::create_router;
