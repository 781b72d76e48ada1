pub mod annotator;
pub mod constants;
pub mod extractor;
pub mod page;
