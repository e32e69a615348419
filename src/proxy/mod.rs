pub mod context;
pub mod dispatcher;
pub mod forward;
pub mod sticky;
pub mod upgrade;

pub use context::BoxBody;
pub use dispatcher::handle_request;
