#![doc = include_str!("../README.md")]

pub mod action;
pub mod audit;
pub mod config;
pub mod error;
pub mod metrics;
pub mod ring;
pub mod snapshot;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{ConfigError, Mg7dError, PipelineError};

// 설정
pub use config::AgentConfig;

// 데이터 모델
pub use action::{Action, ActionKind};
pub use audit::{AuditEvent, AuditRing, AuditStatus};
pub use ring::Ring;
pub use snapshot::{Snapshot, SnapshotStore};
