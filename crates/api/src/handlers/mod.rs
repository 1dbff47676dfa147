pub mod common;
pub mod health;
pub mod search;
pub mod sources;
pub mod summarize;

pub use health::{health, ready};
pub use search::post_search;
pub use sources::get_sources;
pub use summarize::post_summarize;
