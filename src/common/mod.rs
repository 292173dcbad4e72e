pub mod client {
    pub mod client;
    pub mod error;
    pub mod fetcher;
}

pub mod logger;
pub mod utils;
