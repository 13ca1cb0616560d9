pub mod logging;
pub mod numbers;
