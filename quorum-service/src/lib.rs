pub mod api;
pub mod apps;
pub mod service;
