pub mod app_state;
pub mod clock;
pub mod config;
pub mod errors;
pub mod fees;
pub mod handlers;
pub mod models;
pub mod payment;
pub mod rate_limit;
pub mod router;
pub mod service;
pub mod store;
pub mod validation;

pub use app_state::AppState;
pub use config::Config;
pub use errors::*;
pub use models::*;
pub use rate_limit::build_rate_limiter;
pub use router::build_router;
pub use service::LibraryService;
