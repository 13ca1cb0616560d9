pub mod connection;
pub mod headless;

use chromiumoxide::Browser;

use crate::config::Config;
use crate::error::FetchError;

pub use connection::connect_to_browser;
pub use headless::launch_headless_browser;

/// 按配置连接已有浏览器或启动新的无头浏览器
pub async fn open_browser(config: &Config) -> Result<Browser, FetchError> {
    match config.browser_debug_port {
        Some(port) => connect_to_browser(port).await,
        None => launch_headless_browser(config).await,
    }
}
