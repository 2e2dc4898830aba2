pub mod limits;
pub mod logging;

pub use limits::body_size_limit;
pub use logging::request_logging;
