pub mod chart_renderer;
pub mod data_extractor;
pub mod grader;
pub mod llm_analyzer;
pub mod page_renderer;

pub use chart_renderer::{ChartRenderer, PlotRenderer};
pub use data_extractor::{DataExtractor, FileDataExtractor};
pub use grader::{GradeResponse, Grader, HttpGrader, Submission};
pub use llm_analyzer::{AnalysisInput, LlmAnalyzer, QuestionAnalyzer};
pub use page_renderer::{BrowserRenderer, PageRenderer};
