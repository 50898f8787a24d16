pub mod api;
pub mod config;
pub mod item_endpoint;
pub mod normalize;
pub mod prometheus;
pub mod router;
pub mod server;
pub mod store;
pub mod stream;
pub mod time;
