pub mod extract;
pub mod handlers;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod prompts;
