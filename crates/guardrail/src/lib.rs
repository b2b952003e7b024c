#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`engine`]: `Policy` trait과 정책 실행기
//! - [`fps_guard`]: FPS 가드레일 상태 기계
//! - [`applier`]: 액션 큐 소비 및 감사 기록
//! - [`telnet`]: 원격 제어 프로토콜 클라이언트
//! - [`commands`]: 와이어 명령 빌더
//! - [`error`]: 도메인 에러 타입
//!
//! # 데이터 흐름
//!
//! ```text
//! Snapshot -> PolicyEngine -> Action -> Applier -> TelnetClient -> 원격 서버
//!                                          |
//!                                      AuditRing
//! ```

pub mod applier;
pub mod commands;
pub mod engine;
pub mod error;
pub mod fps_guard;
pub mod telnet;

// --- 주요 타입 re-export ---

pub use applier::Applier;
pub use commands::Command;
pub use engine::{Policy, PolicyEngine};
pub use error::GuardrailError;
pub use fps_guard::FpsGuard;
pub use telnet::{CommandSink, TelnetClient, TelnetConfig};
