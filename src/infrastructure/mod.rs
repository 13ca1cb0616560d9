pub mod browser_tab;
pub mod scratch;

pub use browser_tab::{BrowserTab, CloseOnDrop};
pub use scratch::ScratchSpace;
