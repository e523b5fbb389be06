//! HTTP surface: `/health` and the `/ws` upgrade (spec §6)

mod routes;

pub use routes::build_router;
