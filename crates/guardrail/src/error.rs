//! 가드레일 에러 타입
//!
//! [`GuardrailError`]는 텔넷 클라이언트와 액션 어플라이어에서 발생하는
//! 모든 에러를 표현합니다. 정책 평가기는 전건(total)이므로 에러 타입이
//! 없습니다.

use mg7d_core::error::{Mg7dError, PipelineError};

/// 가드레일 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum GuardrailError {
    /// 클라이언트가 이미 종료됨
    #[error("telnet: client closed")]
    Closed,

    /// 텔넷 명령 큐가 가득 참
    #[error("telnet: command queue full")]
    CommandQueueFull,

    /// 어플라이어 액션 큐가 가득 참
    #[error("applier: queue full")]
    QueueFull,

    /// 서킷 브레이커가 열려 있어 즉시 실패
    #[error("circuit breaker open")]
    CircuitOpen,

    /// 명령 전송이 제한 시간을 초과함
    #[error("command timeout")]
    CommandTimeout,

    /// 취소 토큰 발동으로 중단됨
    #[error("operation cancelled")]
    Cancelled,

    /// 연결이 도중에 닫힘
    #[error("connection closed")]
    ConnectionClosed,

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<GuardrailError> for Mg7dError {
    fn from(err: GuardrailError) -> Self {
        Mg7dError::Pipeline(PipelineError::InitFailed(err.to_string()))
    }
}
