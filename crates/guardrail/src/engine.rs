//! 정책 엔진 — 스냅샷마다 정책들을 평가하고 액션을 수집
//!
//! [`Policy`]는 전건(total) 평가 함수 계약입니다. 평가기는 실패할 수
//! 없으며, 스냅샷 하나에 대해 0개 이상의 액션을 반환합니다.
//! [`PolicyEngine`]은 설정 파일 선언 순서대로 정책을 실행하고 출력을
//! 이어 붙입니다.

use mg7d_core::config::InstanceConfig;
use mg7d_core::{Action, Snapshot};

use crate::fps_guard::FpsGuard;

/// 정책 계약 — 스냅샷을 받아 0개 이상의 액션을 방출합니다.
///
/// 새로운 가드레일을 추가하려면 이 trait을 구현하고
/// [`PolicyEngine::register`]로 등록합니다.
///
/// # 구현 예시
/// ```ignore
/// struct HeapGuard;
///
/// impl Policy for HeapGuard {
///     fn name(&self) -> &str { "heap_guard" }
///
///     fn evaluate(&self, snap: &Snapshot) -> Vec<Action> {
///         if snap.heap_mb > 4096.0 {
///             vec![Action::say("inst", "heap high", "server heap high")]
///         } else {
///             Vec::new()
///         }
///     }
/// }
/// ```
pub trait Policy: Send + Sync {
    /// 정책 이름
    fn name(&self) -> &str;

    /// 스냅샷 하나를 평가합니다. 상태 전이 시에만 액션을 방출합니다.
    fn evaluate(&self, snapshot: &Snapshot) -> Vec<Action>;
}

/// 인스턴스 하나의 정책 실행기
///
/// 정책은 등록 순서(설정 파일 선언 순서)대로 평가됩니다.
#[derive(Default)]
pub struct PolicyEngine {
    policies: Vec<Box<dyn Policy>>,
}

impl PolicyEngine {
    /// 빈 엔진을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 인스턴스 설정에서 활성화된 정책들을 조립합니다.
    ///
    /// 현재는 FPS 가드만 존재합니다. 비활성화된 정책은 등록되지 않습니다.
    pub fn from_instance(cfg: &InstanceConfig) -> Self {
        let mut engine = Self::new();
        if let Some(guard_cfg) = &cfg.policy.fps_guard {
            if guard_cfg.enabled {
                engine.register(Box::new(FpsGuard::new(
                    cfg.name.clone(),
                    guard_cfg.clone(),
                    cfg.actions.throttle_profiles.clone(),
                )));
            }
        }
        engine
    }

    /// 정책을 등록합니다.
    pub fn register(&mut self, policy: Box<dyn Policy>) {
        tracing::debug!(policy = policy.name(), "policy registered");
        self.policies.push(policy);
    }

    /// 등록된 정책 수를 반환합니다.
    pub fn policy_count(&self) -> usize {
        self.policies.len()
    }

    /// 모든 정책을 선언 순서대로 평가하고 액션을 이어 붙여 반환합니다.
    pub fn evaluate(&self, snapshot: &Snapshot) -> Vec<Action> {
        let mut out = Vec::new();
        for policy in &self.policies {
            out.extend(policy.evaluate(snapshot));
        }
        out
    }
}
