//! 액션 — 정책이 방출하는 원격 제어 명령의 도메인 표현
//!
//! [`Action`]은 닫힌 변형 집합([`ActionKind`])과 식별 메타데이터를
//! 담습니다. 액션 ID는 프로세스 전역 단조 증가 카운터에서 할당됩니다.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// 프로세스 전역 액션 ID 카운터
static ACTION_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 새 액션 ID를 할당합니다 (`act-<n>`, 프로세스 내 고유·단조 증가).
fn next_action_id() -> String {
    let n = ACTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("act-{n}")
}

/// 액션 변형 — 닫힌 집합
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// 게임 설정값 변경
    SetGamePref {
        /// 설정 이름
        pref: String,
        /// 설정 값
        value: String,
    },
    /// 채팅 메시지 전송
    Say {
        /// 전송할 메시지
        message: String,
    },
    /// 모든 설정을 베이스라인으로 복원
    RestoreBaseline,
    /// 아무 동작 없음
    Noop,
}

/// 정책이 방출하는 하나의 제어 액션
///
/// 생성 시점에 ID와 생성 시각이 부여되며 이후 불변입니다.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// 프로세스 전역 단조 증가 ID (예: "act-17")
    pub id: String,
    /// 생성 시각
    pub created_at: SystemTime,
    /// 대상 인스턴스 이름
    pub instance: String,
    /// 방출 사유 (자유 형식)
    pub reason: String,
    /// 액션 변형
    pub kind: ActionKind,
}

impl Action {
    fn new(instance: impl Into<String>, reason: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            id: next_action_id(),
            created_at: SystemTime::now(),
            instance: instance.into(),
            reason: reason.into(),
            kind,
        }
    }

    /// `SetGamePref` 액션을 생성합니다.
    pub fn set_game_pref(
        instance: impl Into<String>,
        reason: impl Into<String>,
        pref: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(
            instance,
            reason,
            ActionKind::SetGamePref {
                pref: pref.into(),
                value: value.into(),
            },
        )
    }

    /// `Say` 액션을 생성합니다.
    pub fn say(
        instance: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            instance,
            reason,
            ActionKind::Say {
                message: message.into(),
            },
        )
    }

    /// `RestoreBaseline` 액션을 생성합니다.
    pub fn restore_baseline(instance: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(instance, reason, ActionKind::RestoreBaseline)
    }

    /// `Noop` 액션을 생성합니다.
    pub fn noop(instance: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(instance, reason, ActionKind::Noop)
    }

    /// 변형 이름을 반환합니다 (감사 이벤트의 `action_type`).
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ActionKind::SetGamePref { .. } => "SetGamePref",
            ActionKind::Say { .. } => "Say",
            ActionKind::RestoreBaseline => "RestoreBaseline",
            ActionKind::Noop => "Noop",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Action[{}] type={} instance={} reason={}",
            self.id,
            self.kind_name(),
            self.instance,
            self.reason,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = Action::noop("test", "first");
        let b = Action::noop("test", "second");
        let na: u64 = a.id.trim_start_matches("act-").parse().unwrap();
        let nb: u64 = b.id.trim_start_matches("act-").parse().unwrap();
        assert!(nb > na);
    }

    #[test]
    fn ids_unique_across_threads() {
        use std::collections::HashSet;
        use std::thread;

        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| (0..100).map(|_| Action::noop("t", "r").id).collect::<Vec<_>>()))
            .collect();
        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "duplicate action id");
            }
        }
    }

    #[test]
    fn set_game_pref_carries_fields() {
        let a = Action::set_game_pref("alpha", "fps low", "MaxSpawnedZombies", "30");
        assert_eq!(a.kind_name(), "SetGamePref");
        assert_eq!(a.instance, "alpha");
        match &a.kind {
            ActionKind::SetGamePref { pref, value } => {
                assert_eq!(pref, "MaxSpawnedZombies");
                assert_eq!(value, "30");
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn kind_names() {
        assert_eq!(Action::say("i", "r", "hello").kind_name(), "Say");
        assert_eq!(
            Action::restore_baseline("i", "r").kind_name(),
            "RestoreBaseline"
        );
        assert_eq!(Action::noop("i", "r").kind_name(), "Noop");
    }

    #[test]
    fn display_contains_id_and_type() {
        let a = Action::restore_baseline("beta", "stable again");
        let s = a.to_string();
        assert!(s.contains(&a.id));
        assert!(s.contains("RestoreBaseline"));
        assert!(s.contains("beta"));
    }
}
