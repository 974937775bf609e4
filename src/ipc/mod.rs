mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use error::err;
pub use router::{fire_due_search, handle_request, next_due};
pub use types::{AppState, Request};
