pub mod api;
pub mod db;
pub mod platform_http;
pub mod provider_http;
pub mod remote;
