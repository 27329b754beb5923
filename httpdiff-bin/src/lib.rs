pub mod config;
pub mod diff;
pub mod dispatcher;
pub mod interrupt;
pub mod mask;
pub mod reporting;
pub mod request;
pub mod task;
pub mod timing;
