pub mod normalizer;
pub mod retry_policy;
pub mod step_ctx;
pub mod step_executor;

#[cfg(test)]
pub(crate) mod test_support;

pub use normalizer::normalize;
pub use retry_policy::RetryPolicy;
pub use step_ctx::StepCtx;
pub use step_executor::{Collaborators, Credentials, StepExecutor};
