//! Search domain actions - entry points and completion tracking

pub mod completion;
mod create_search;
mod get_search_status;

pub use completion::maybe_mark_done;
pub use create_search::create_search;
pub use get_search_status::get_search_status;
