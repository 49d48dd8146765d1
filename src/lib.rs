pub mod analyzer;
pub mod config;
pub mod db;
pub mod error;
pub mod migrate;
pub mod parser;
pub mod sitemap;

pub use analyzer::catalog::TemplateCatalog;
pub use analyzer::{classify_document, RankedRecommendations};
pub use error::{ConvertError, ConvertResult};
pub use parser::blocks::{Align, BlockKind, BlockRecord, ImageRef};
pub use parser::{convert_html, convert_to_markup};
