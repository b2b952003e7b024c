//! 어플라이어 — 액션을 직렬로 적용하고 생애주기를 감사에 기록
//!
//! 정책 평가기를 절대 블록하지 않도록 [`Applier::enqueue`]는
//! 논블로킹이며, 큐가 가득 차면 `dropped` 감사 이벤트를 남기고 즉시
//! 실패합니다. [`Applier::run`]은 큐를 엄격한 FIFO로 소비하며 동시에
//! 전송 중인 액션은 항상 정확히 하나입니다. 재시도는 하지 않습니다.
//! 실패한 명령은 failure 감사 이벤트로 드러나고 다음 액션이 진행됩니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::RwLock as StdRwLock;
use std::time::SystemTime;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mg7d_core::{Action, ActionKind, AuditEvent, AuditRing, AuditStatus};

use crate::commands::Command;
use crate::error::GuardrailError;
use crate::telnet::CommandSink;

const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// 액션 어플라이어
///
/// 명령 전송은 [`CommandSink`]를 통해 이루어지므로 테스트에서 목
/// 싱크로 대체할 수 있습니다.
pub struct Applier<S: CommandSink> {
    sink: Arc<S>,
    audit: Arc<AuditRing>,
    baseline: StdRwLock<HashMap<String, String>>,
    queue_tx: mpsc::Sender<Action>,
    queue_rx: StdMutex<Option<mpsc::Receiver<Action>>>,
}

impl<S: CommandSink> Applier<S> {
    /// 새 어플라이어를 생성합니다. `queue_capacity`가 0이면 32가
    /// 적용됩니다.
    pub fn new(sink: Arc<S>, audit: Arc<AuditRing>, queue_capacity: usize) -> Self {
        let capacity = if queue_capacity == 0 {
            DEFAULT_QUEUE_CAPACITY
        } else {
            queue_capacity
        };
        let (queue_tx, queue_rx) = mpsc::channel(capacity);
        Self {
            sink,
            audit,
            baseline: StdRwLock::new(HashMap::new()),
            queue_tx,
            queue_rx: StdMutex::new(Some(queue_rx)),
        }
    }

    /// `RestoreBaseline`이 복원할 pref 맵을 원자적으로 교체합니다.
    pub fn set_baseline(&self, baseline: HashMap<String, String>) {
        *self.baseline.write().expect("baseline lock poisoned") = baseline;
    }

    /// 액션을 큐에 적재합니다. 블록하지 않습니다.
    ///
    /// 적재에 성공하면 `queued` 감사 이벤트를, 큐가 가득 차면
    /// `dropped` 이벤트를 남기고 즉시 실패합니다.
    pub fn enqueue(&self, action: Action) -> Result<(), GuardrailError> {
        let queued_at = SystemTime::now();
        self.audit.append(AuditEvent {
            queued_at: Some(queued_at),
            ..AuditEvent::new(&action.id, action.kind_name(), AuditStatus::Queued)
        });

        match self.queue_tx.try_send(action) {
            Ok(()) => Ok(()),
            Err(e) => {
                let action = match e {
                    mpsc::error::TrySendError::Full(a) | mpsc::error::TrySendError::Closed(a) => a,
                };
                self.audit.append(AuditEvent {
                    queued_at: Some(queued_at),
                    ..AuditEvent::new(&action.id, action.kind_name(), AuditStatus::Dropped)
                        .with_error("queue full")
                });
                Err(GuardrailError::QueueFull)
            }
        }
    }

    /// 큐를 직렬로 소비합니다. 취소될 때까지 반환하지 않습니다.
    pub async fn run(&self, cancel: CancellationToken) {
        let rx = self.queue_rx.lock().expect("queue_rx lock poisoned").take();
        let Some(mut queue_rx) = rx else {
            warn!("applier run() called twice");
            return;
        };

        loop {
            let action = tokio::select! {
                _ = cancel.cancelled() => return,
                action = queue_rx.recv() => match action {
                    Some(a) => a,
                    None => return,
                },
            };
            self.apply_one(&cancel, action).await;
        }
    }

    /// 액션 하나를 적용하고 터미널 감사 이벤트를 남깁니다.
    async fn apply_one(&self, cancel: &CancellationToken, action: Action) {
        let sent_at = SystemTime::now();
        self.audit.append(AuditEvent {
            sent_at: Some(sent_at),
            ..AuditEvent::new(&action.id, action.kind_name(), AuditStatus::Sent)
        });

        let result = match &action.kind {
            ActionKind::SetGamePref { pref, value } => {
                self.sink
                    .send_command(cancel, Command::set_game_pref(pref, value))
                    .await
            }
            ActionKind::Say { message } => {
                self.sink.send_command(cancel, Command::say(message)).await
            }
            ActionKind::RestoreBaseline => self.apply_restore_baseline(cancel).await,
            ActionKind::Noop => Ok(()),
        };

        let done_at = SystemTime::now();
        match result {
            Ok(()) => {
                debug!(action_id = %action.id, action_type = action.kind_name(), "action applied");
                self.audit.append(AuditEvent {
                    sent_at: Some(sent_at),
                    done_at: Some(done_at),
                    ..AuditEvent::new(&action.id, action.kind_name(), AuditStatus::Success)
                });
            }
            Err(e) => {
                warn!(
                    action_id = %action.id,
                    action_type = action.kind_name(),
                    error = %e,
                    "action failed"
                );
                self.audit.append(AuditEvent {
                    sent_at: Some(sent_at),
                    done_at: Some(done_at),
                    ..AuditEvent::new(&action.id, action.kind_name(), AuditStatus::Failure)
                        .with_error(e.to_string())
                });
            }
        }
    }

    /// 베이스라인의 각 pref에 대해 setpref를 하나씩 전송합니다.
    ///
    /// 순회 순서는 보장되지 않으며(프로세스 내에서는 안정적),
    /// 첫 실패에서 전체 액션이 실패합니다.
    async fn apply_restore_baseline(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(), GuardrailError> {
        let baseline = self
            .baseline
            .read()
            .expect("baseline lock poisoned")
            .clone();
        for (pref, value) in &baseline {
            self.sink
                .send_command(cancel, Command::set_game_pref(pref, value))
                .await?;
        }
        Ok(())
    }
}
