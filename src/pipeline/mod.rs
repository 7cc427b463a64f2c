pub mod reports;
pub mod videos;

pub use reports::ReportPipeline;
pub use videos::VideoPipeline;
