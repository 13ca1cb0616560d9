//! 单元测试用的脚本化外部能力

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::error::{AnalysisError, FetchError, SubmitError};
use crate::infrastructure::ScratchSpace;
use crate::models::{AnswerCandidate, DeclaredType, DownloadedFile, PageLink, RenderedPage};
use crate::services::{
    AnalysisInput, FileDataExtractor, GradeResponse, Grader, PageRenderer, PlotRenderer,
    QuestionAnalyzer, Submission,
};
use crate::workflow::step_executor::Collaborators;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderBehavior {
    Ok,
    Fail,
    Hang,
}

/// 按脚本渲染页面；脚本用完后总是成功
#[derive(Default)]
pub struct ScriptedRenderer {
    script: Mutex<VecDeque<RenderBehavior>>,
    files: HashMap<String, String>,
    renders: Mutex<Vec<String>>,
    downloads: AtomicUsize,
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, behavior: RenderBehavior) -> Self {
        self.script.lock().unwrap().push_back(behavior);
        self
    }

    pub fn with_file(mut self, url: &str, content: &str) -> Self {
        self.files.insert(url.to_string(), content.to_string());
        self
    }

    pub fn rendered_urls(&self) -> Vec<String> {
        self.renders.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageRenderer for ScriptedRenderer {
    async fn render(&self, url: &str, _timeout: Duration) -> Result<RenderedPage, FetchError> {
        self.renders.lock().unwrap().push(url.to_string());
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RenderBehavior::Ok);

        match behavior {
            RenderBehavior::Ok => {
                let mut files: Vec<PageLink> = self
                    .files
                    .keys()
                    .map(|url| PageLink {
                        url: url.clone(),
                        text: String::new(),
                    })
                    .collect();
                files.sort_by(|a, b| a.url.cmp(&b.url));
                Ok(RenderedPage {
                    url: url.to_string(),
                    text: format!("Question at {}", url),
                    links: files.clone(),
                    files,
                    ..Default::default()
                })
            }
            RenderBehavior::Fail => Err(FetchError::NavigationFailed {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
            RenderBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(FetchError::NavigationFailed {
                    url: url.to_string(),
                    message: "hung".to_string(),
                })
            }
        }
    }

    async fn download(
        &self,
        link: &PageLink,
        scratch: &ScratchSpace,
    ) -> Result<DownloadedFile, FetchError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let content = self
            .files
            .get(&link.url)
            .ok_or_else(|| FetchError::DownloadFailed {
                url: link.url.clone(),
                message: "HTTP 404".to_string(),
            })?;
        let name = link.file_name();
        let path = scratch.file_path(&name);
        std::fs::write(&path, content).map_err(|e| FetchError::DownloadFailed {
            url: link.url.clone(),
            message: e.to_string(),
        })?;
        Ok(DownloadedFile {
            name,
            path,
            source_url: link.url.clone(),
        })
    }
}

/// 按脚本返回候选答案；脚本用完后返回解析错误
#[derive(Default)]
pub struct ScriptedAnalyzer {
    script: Mutex<VecDeque<Result<AnswerCandidate, AnalysisError>>>,
    hang: bool,
    calls: AtomicUsize,
    table_counts: Mutex<Vec<usize>>,
    prior_counts: Mutex<Vec<usize>>,
}

impl ScriptedAnalyzer {
    pub fn scripted(script: Vec<Result<AnswerCandidate, AnalysisError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    pub fn answering(answers: Vec<AnswerCandidate>) -> Self {
        Self::scripted(answers.into_iter().map(Ok).collect())
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn table_counts(&self) -> Vec<usize> {
        self.table_counts.lock().unwrap().clone()
    }

    pub fn prior_counts(&self) -> Vec<usize> {
        self.prior_counts.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuestionAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, input: AnalysisInput<'_>) -> Result<AnswerCandidate, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.table_counts.lock().unwrap().push(input.tables.len());
        self.prior_counts.lock().unwrap().push(input.prior.len());

        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AnalysisError::UnparsableResponse("script exhausted".into())))
    }
}

/// 按脚本返回评分结果，并记录收到的提交
#[derive(Default)]
pub struct ScriptedGrader {
    script: Mutex<VecDeque<Result<GradeResponse, SubmitError>>>,
    submissions: Mutex<Vec<Submission>>,
}

impl ScriptedGrader {
    pub fn new(responses: Vec<GradeResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Grader for ScriptedGrader {
    async fn submit(
        &self,
        submit_url: &str,
        submission: &Submission,
        _timeout: Duration,
    ) -> Result<GradeResponse, SubmitError> {
        self.submissions.lock().unwrap().push(submission.clone());
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(SubmitError::RequestFailed {
                endpoint: submit_url.to_string(),
                message: "HTTP 503".to_string(),
            })
        })
    }
}

pub fn number(text: &str) -> AnswerCandidate {
    AnswerCandidate::new(json!(text), DeclaredType::Number)
}

pub fn graded(correct: bool, url: Option<&str>, reason: Option<&str>) -> GradeResponse {
    GradeResponse {
        correct,
        url: url.map(str::to_string),
        reason: reason.map(str::to_string),
    }
}

pub fn collaborators(
    renderer: Arc<ScriptedRenderer>,
    analyzer: Arc<ScriptedAnalyzer>,
    grader: Arc<ScriptedGrader>,
) -> Collaborators {
    Collaborators {
        renderer,
        analyzer,
        extractor: Arc::new(FileDataExtractor::new()),
        charts: Arc::new(PlotRenderer::new(160, 120)),
        grader,
    }
}
