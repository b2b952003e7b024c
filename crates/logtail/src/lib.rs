#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`tailer`]: 파일 감시 기반 라인 팔로워 (로테이션 감지, 백오프)
//! - [`status`]: `Time:` 상태 라인 파서
//! - [`error`]: 도메인 에러 타입

pub mod error;
pub mod status;
pub mod tailer;

// --- 주요 타입 re-export ---

pub use error::LogTailError;
pub use status::parse_status_line;
pub use tailer::{Tailer, TailerOptions};
