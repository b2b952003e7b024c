//! FPS 가드레일 — 히스테리시스와 쿨다운을 갖춘 스로틀 상태 기계
//!
//! 최근 윈도우의 FPS를 관찰하여 스냅샷당 최대 한 개의 액션을
//! 방출합니다. 두 상태(Normal / Throttled)를 오가며:
//!
//! - 윈도우 내 low 샘플이 `require_low_samples` 이상이면 스로틀
//!   프로파일의 다음 스텝을 적용합니다. 연속 스텝 사이에는
//!   `cooldown_seconds`가 지나야 합니다.
//! - `threshold_restore` 이상이 `restore_stable_seconds` 동안 연속으로
//!   유지되면 베이스라인을 복원합니다. 회복 타이머는 단조적이어서
//!   한 번이라도 하락하면 처음부터 다시 셉니다.
//!
//! `threshold_low < threshold_restore`인 히스테리시스 구성에서는 한
//! 스냅샷이 스로틀과 복원을 동시에 트리거할 수 없습니다. 윈도우가
//! 아직 low로 가득한데 최신 샘플만 높은 경계 상황에서는 low 집계가
//! 우선합니다.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use mg7d_core::config::{FpsGuardConfig, ThrottleProfile};
use mg7d_core::{Action, Ring, Snapshot};

use crate::engine::Policy;

const DEFAULT_SAMPLE_WINDOW: usize = 60;
const DEFAULT_REQUIRE_LOW_SAMPLES: usize = 3;

/// 가드 내부 상태 — 하나의 락이 평가 한 번 동안 유지됩니다.
struct GuardState {
    /// FPS 샘플 윈도우
    ring: Ring<f64>,
    /// 스로틀 적용 중 여부
    throttled: bool,
    /// 마지막으로 적용한 스텝 인덱스
    last_step: usize,
    /// 마지막 액션 시각
    last_action: Option<Instant>,
    /// 회복 구간 시작 시각. 하락 시 리셋됨
    restore_at: Option<Instant>,
    /// 최초 low 판정 시각
    #[allow(dead_code)]
    low_since: Option<Instant>,
}

/// FPS 가드레일 정책
pub struct FpsGuard {
    instance: String,
    cfg: FpsGuardConfig,
    profiles: HashMap<String, ThrottleProfile>,
    state: Mutex<GuardState>,
}

impl FpsGuard {
    /// 새 FPS 가드를 생성합니다.
    ///
    /// `sample_window_samples`와 `require_low_samples`가 0이면 각각
    /// 60과 3으로 보정됩니다.
    pub fn new(
        instance: String,
        mut cfg: FpsGuardConfig,
        profiles: HashMap<String, ThrottleProfile>,
    ) -> Self {
        if cfg.sample_window_samples == 0 {
            cfg.sample_window_samples = DEFAULT_SAMPLE_WINDOW;
        }
        if cfg.require_low_samples == 0 {
            cfg.require_low_samples = DEFAULT_REQUIRE_LOW_SAMPLES;
        }
        let ring = Ring::new(cfg.sample_window_samples);
        Self {
            instance,
            cfg,
            profiles,
            state: Mutex::new(GuardState {
                ring,
                throttled: false,
                last_step: 0,
                last_action: None,
                restore_at: None,
                low_since: None,
            }),
        }
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.cfg.cooldown_seconds.max(0.0))
    }

    fn restore_stable(&self) -> Duration {
        Duration::from_secs_f64(self.cfg.restore_stable_seconds.max(0.0))
    }
}

impl Policy for FpsGuard {
    fn name(&self) -> &str {
        "fps_guard"
    }

    fn evaluate(&self, snapshot: &Snapshot) -> Vec<Action> {
        if !self.cfg.enabled {
            return Vec::new();
        }

        let mut st = self.state.lock().expect("fps guard lock poisoned");
        let now = Instant::now();

        st.ring.push(snapshot.fps);
        if st.ring.len() < self.cfg.require_low_samples {
            return Vec::new();
        }

        // 윈도우 내 low 샘플 집계 (음수 샘플은 제외)
        let low_count = st
            .ring
            .snapshot()
            .iter()
            .filter(|&&fps| fps < self.cfg.threshold_low && fps >= 0.0)
            .count();

        let Some(profile) = self.profiles.get(&self.cfg.throttle_profile) else {
            return Vec::new();
        };
        if profile.steps.is_empty() {
            return Vec::new();
        }

        let low_dominates = low_count >= self.cfg.require_low_samples;
        if low_dominates {
            if !st.throttled {
                st.throttled = true;
                st.low_since = Some(now);
                st.last_action = Some(now);
                st.last_step = 0;
                let step = &profile.steps[0];
                tracing::info!(
                    instance = %self.instance,
                    low_count,
                    pref = %step.pref,
                    value = %step.value,
                    "fps guard engaging throttle"
                );
                return vec![Action::set_game_pref(
                    &self.instance,
                    "fps_guardrail: FPS below threshold",
                    &step.pref,
                    &step.value,
                )];
            }

            // 이미 스로틀 중: 쿨다운이 지났을 때만 다음 스텝으로 에스컬레이션
            let cooled = st
                .last_action
                .is_none_or(|t| now.duration_since(t) >= self.cooldown());
            if st.last_step + 1 < profile.steps.len() && cooled {
                st.last_step += 1;
                st.last_action = Some(now);
                let step = &profile.steps[st.last_step];
                tracing::info!(
                    instance = %self.instance,
                    step = st.last_step,
                    pref = %step.pref,
                    value = %step.value,
                    "fps guard stepping throttle"
                );
                return vec![Action::set_game_pref(
                    &self.instance,
                    "fps_guardrail: stepping throttle",
                    &step.pref,
                    &step.value,
                )];
            }
            // 낼 수 있는 스텝이 없으면 복원 검사로 진행한다.
            // low 집계는 스텝 "방출"에만 우선하며 복원 타이머를 멈추지 않는다.
        }

        // 복원: threshold_restore 이상이 restore_stable_seconds 동안 유지
        if st.throttled {
            if snapshot.fps >= self.cfg.threshold_restore {
                let since = *st.restore_at.get_or_insert(now);
                if now.duration_since(since) >= self.restore_stable() {
                    st.throttled = false;
                    st.restore_at = None;
                    st.last_action = Some(now);
                    tracing::info!(instance = %self.instance, "fps guard restoring baseline");
                    return vec![Action::restore_baseline(
                        &self.instance,
                        "fps_guardrail: FPS stable, restore baseline",
                    )];
                }
            } else {
                st.restore_at = None;
            }
        }

        Vec::new()
    }
}
