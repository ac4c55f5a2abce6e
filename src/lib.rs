pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod skins;
pub mod state;
pub mod storage;
pub mod utils;
