pub mod credits;
pub mod pipeline;
pub mod searches;
