pub mod course_parser;
pub mod errors;
pub mod manifest;
pub mod models;
pub mod parser_trait;
pub mod resolver;
pub mod stream_locator;

pub use course_parser::{CourseScanner, CourseTarget};
pub use manifest::ManifestScanner;
pub use parser_trait::ContentScanner;
pub use resolver::ResolverHandle;
