//! 工具层：目录条目、内部工具注册表、分类器、执行器与具体内部工具

pub mod catalog;
pub mod classifier;
pub mod echo;
pub mod executor;
pub mod registry;
pub mod retriever;
pub mod scrape;
pub mod search;
pub mod tavily;

pub use catalog::{merge_catalogs, CatalogEntry, ParameterSpec};
pub use classifier::{classify, ClassifiedPlan};
pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use registry::{Tool, ToolError, ToolRegistry};
pub use retriever::{DocumentIndex, IndexedDocument, RetrieverTool};
pub use scrape::WebScrapTool;
pub use search::WebSearchTool;
pub use tavily::TavilyClient;
