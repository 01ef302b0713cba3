//! Read-serving pipeline: Markdown pages through layouts, images, page list

mod gateway;
pub mod markdown;

pub use gateway::{CmsGateway, RenderedPage, DEFAULT_LAYOUT, NOT_FOUND_TEXT};
pub use markdown::markdown_to_html;
