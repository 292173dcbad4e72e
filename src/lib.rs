//! 课程视频备份：内容扫描 -> 地址解析 -> 多线程下载 的两级流水线。

pub mod auth;
pub mod cli;
pub mod common;
pub mod downloader;
pub mod parser;
pub mod pipeline;
