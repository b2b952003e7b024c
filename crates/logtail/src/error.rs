//! 로그 테일링 에러 타입
//!
//! [`LogTailError`]는 테일러 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<LogTailError> for Mg7dError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use mg7d_core::error::{Mg7dError, PipelineError};

/// 로그 테일링 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum LogTailError {
    /// 파일시스템 감시자 생성/등록 실패 — 유일한 치명적 에러
    #[error("watcher error: {0}")]
    Watcher(String),

    /// 경로 해석 실패
    #[error("invalid path {path}: {reason}")]
    Path {
        /// 대상 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LogTailError> for Mg7dError {
    fn from(err: LogTailError) -> Self {
        Mg7dError::Pipeline(PipelineError::InitFailed(err.to_string()))
    }
}
