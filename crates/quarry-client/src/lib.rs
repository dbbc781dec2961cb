pub mod annotator;
pub mod client;
pub mod resolver;

pub use annotator::KeywordAnnotator;
pub use client::ApiClient;
pub use resolver::{ApiResolver, ChannelRef};
