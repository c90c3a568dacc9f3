pub mod app;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod export;
pub mod output;
pub mod runtime;
pub mod status;

pub use app::run;
