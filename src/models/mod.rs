pub mod answer;
pub mod chain;
pub mod page;
pub mod trigger;

pub use answer::{AnswerCandidate, ChartKind, ChartRequest, DeclaredType, WireValue};
pub use chain::{
    ChainReport, ChainState, ChainStatus, Directive, PriorAttempt, QuizStep, StepOutcome,
    StepRecord, StepResult, StepStage,
};
pub use page::{DownloadedFile, PageLink, RenderedPage, TabularData};
pub use trigger::{Accepted, QuizRequest};
