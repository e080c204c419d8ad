//! HTTP surface: router assembly and health endpoint

mod routes;

pub use routes::build_router;
