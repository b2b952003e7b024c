//! 파일 테일러 — 로테이션을 견디는 증분 라인 팔로워
//!
//! 이름이 지정된 파일에서 개행으로 끝나는 완전한 라인들을 순서대로
//! 전달합니다. `tail -f`와 유사하지만 다음 상황을 모두 견딥니다.
//!
//! # 로테이션 감지
//! - 파일 식별자 변경 감지 (rename + recreate, Unix에서는 inode)
//! - 파일 크기 축소 감지 (copytruncate)
//! - 파일 일시 부재 시 지수 백오프 후 재시도
//!
//! 감시는 **부모 디렉토리**에 겁니다. 파일 자체를 감시하면
//! rename 후 새로 생성된 파일을 놓치기 때문입니다.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::LogTailError;

const LINE_CHANNEL_CAPACITY: usize = 256;
const READ_CHUNK_BYTES: usize = 32 * 1024;
const BACKOFF_MIN: Duration = Duration::from_millis(100);
const BACKOFF_MAX: Duration = Duration::from_secs(5);

/// 테일러 설정
#[derive(Debug, Clone)]
pub struct TailerOptions {
    /// 파일시스템 이벤트가 없을 때의 폴링 주기
    pub poll_interval: Duration,
    /// 라인 최대 길이 (바이트). 초과분은 이 길이로 잘려 방출됨
    pub max_line_bytes: usize,
    /// true면 파일 처음부터 읽기 (기본은 EOF부터)
    pub from_beginning: bool,
}

impl Default for TailerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_line_bytes: 64 * 1024,
            from_beginning: false,
        }
    }
}

/// 한 followFile 사이클의 종료 사유
enum FollowEnd {
    /// 취소 토큰 발동
    Cancelled,
    /// 로테이션 감지 (식별자 변경, 축소, stat 실패)
    Rotated,
    /// 열기/읽기 실패 — 백오프 후 재시도
    Transient(std::io::Error),
}

/// 로테이션을 견디는 파일 테일러
///
/// [`Tailer::new`]가 라인 수신 채널을 함께 반환하며,
/// [`Tailer::run`]은 취소될 때까지 파일을 따라 읽습니다.
///
/// # 사용 예시
/// ```ignore
/// let (tailer, mut lines) = Tailer::new("/var/log/game/output.log", TailerOptions::default())?;
/// tokio::spawn(tailer.run(cancel.clone()));
/// while let Some(line) = lines.recv().await { /* ... */ }
/// ```
pub struct Tailer {
    /// 절대 경로로 해석된 대상 파일
    path: PathBuf,
    /// 테일러 설정
    opts: TailerOptions,
    /// 라인 전송 채널
    line_tx: mpsc::Sender<String>,
}

impl Tailer {
    /// 새 테일러와 라인 수신 채널을 생성합니다.
    ///
    /// 경로는 절대 경로로 해석됩니다. 수신 채널은 테일러가 멈출 때
    /// 정확히 한 번 닫힙니다.
    pub fn new(
        path: impl AsRef<Path>,
        opts: TailerOptions,
    ) -> Result<(Self, mpsc::Receiver<String>), LogTailError> {
        let path = path.as_ref();
        let abs = std::path::absolute(path).map_err(|e| LogTailError::Path {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let (line_tx, line_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        Ok((
            Self {
                path: abs,
                opts,
                line_tx,
            },
            line_rx,
        ))
    }

    /// 대상 파일 경로를 반환합니다.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 테일러를 실행합니다. 취소될 때까지 반환하지 않습니다.
    ///
    /// 일시적 파일시스템 에러(파일 부재, 권한, 읽기 실패)는 백오프 후
    /// 재시도하며 절대 종료 사유가 되지 않습니다. 감시자 생성 실패만이
    /// 치명적 에러로 반환됩니다.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), LogTailError> {
        let parent = self
            .path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let (fs_tx, mut fs_rx) = mpsc::channel::<notify::Event>(64);
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    let _ = fs_tx.blocking_send(event);
                }
            })
            .map_err(|e| LogTailError::Watcher(e.to_string()))?;
        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .map_err(|e| LogTailError::Watcher(e.to_string()))?;

        info!(path = %self.path.display(), "tailer started");

        let mut backoff = BACKOFF_MIN;
        let mut from_start = self.opts.from_beginning;

        loop {
            match self
                .follow_file(&cancel, &mut fs_rx, from_start, &mut backoff)
                .await
            {
                FollowEnd::Cancelled => break,
                FollowEnd::Rotated => {
                    info!(path = %self.path.display(), "rotation detected, reopening from start");
                    from_start = true;
                }
                FollowEnd::Transient(e) => {
                    debug!(path = %self.path.display(), error = %e, backoff_ms = backoff.as_millis() as u64, "file unavailable, backing off");
                    from_start = true;
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(BACKOFF_MAX);
                }
            }
            if cancel.is_cancelled() {
                break;
            }
        }

        info!(path = %self.path.display(), "tailer stopped");
        // line_tx는 self와 함께 drop되어 채널이 정확히 한 번 닫힘
        Ok(())
    }

    /// 파일을 열어 EOF까지 읽고, 이벤트/폴링으로 추가 데이터를 기다립니다.
    ///
    /// 로테이션이 감지되거나 파일이 사라지면 반환하여 바깥 루프가
    /// 재오픈하도록 합니다.
    async fn follow_file(
        &self,
        cancel: &CancellationToken,
        fs_rx: &mut mpsc::Receiver<notify::Event>,
        from_start: bool,
        backoff: &mut Duration,
    ) -> FollowEnd {
        let mut file = match File::open(&self.path).await {
            Ok(f) => f,
            Err(e) => return FollowEnd::Transient(e),
        };
        // 열기에 성공하면 백오프 리셋
        *backoff = BACKOFF_MIN;
        let meta = match file.metadata().await {
            Ok(m) => m,
            Err(e) => return FollowEnd::Transient(e),
        };
        let identity = file_identity(&meta);
        let mut known_size = meta.len();

        if !from_start {
            if let Err(e) = file.seek(SeekFrom::End(0)).await {
                return FollowEnd::Transient(e);
            }
        }

        let mut partial: Vec<u8> = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK_BYTES];

        loop {
            // EOF까지 읽기
            loop {
                let n = match file.read(&mut chunk).await {
                    Ok(n) => n,
                    Err(e) => {
                        self.discard_partial(&partial);
                        return FollowEnd::Transient(e);
                    }
                };
                if n == 0 {
                    break;
                }
                partial.extend_from_slice(&chunk[..n]);
                if !self.emit_complete_lines(&mut partial, cancel).await {
                    return FollowEnd::Cancelled;
                }
            }

            // EOF: 로테이션 확인 (stat 실패, 식별자 변경, 크기 축소)
            let cur = match tokio::fs::metadata(&self.path).await {
                Ok(m) => m,
                Err(_) => {
                    self.discard_partial(&partial);
                    return FollowEnd::Rotated;
                }
            };
            if file_identity(&cur) != identity || cur.len() < known_size {
                self.discard_partial(&partial);
                return FollowEnd::Rotated;
            }
            if cur.len() > known_size {
                known_size = cur.len();
            }

            // 추가 데이터 대기: 대상 파일 이벤트 또는 폴링 주기 중 먼저 오는 쪽
            let poll = tokio::time::sleep(self.opts.poll_interval);
            tokio::pin!(poll);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return FollowEnd::Cancelled,
                    maybe = fs_rx.recv() => {
                        let Some(event) = maybe else {
                            // 감시자 채널이 닫힘 — 폴링으로 계속 동작
                            poll.as_mut().await;
                            break;
                        };
                        if !event.paths.iter().any(|p| p == &self.path) {
                            continue;
                        }
                        match event.kind {
                            notify::EventKind::Modify(_) | notify::EventKind::Create(_) => break,
                            notify::EventKind::Remove(_) => {
                                self.discard_partial(&partial);
                                return FollowEnd::Rotated;
                            }
                            // chmod 등은 폴링 주기까지 대기
                            _ => continue,
                        }
                    }
                    () = &mut poll => break,
                }
            }
        }
    }

    /// 버퍼의 완전한 라인을 모두 방출합니다. 취소되면 false를 반환합니다.
    ///
    /// 개행 없는 잔여분이 `max_line_bytes`를 넘으면 정확히 그 길이의
    /// 접두어를 방출하고 나머지를 유지합니다. 조용히 버리지 않습니다.
    async fn emit_complete_lines(&self, partial: &mut Vec<u8>, cancel: &CancellationToken) -> bool {
        while let Some(idx) = partial.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = partial.drain(..=idx).collect();
            line.pop();
            if line.len() > self.opts.max_line_bytes {
                line.truncate(self.opts.max_line_bytes);
            }
            if !self.send_line(line, cancel).await {
                return false;
            }
        }
        while partial.len() > self.opts.max_line_bytes {
            let head: Vec<u8> = partial.drain(..self.opts.max_line_bytes).collect();
            if !self.send_line(head, cancel).await {
                return false;
            }
        }
        true
    }

    async fn send_line(&self, line: Vec<u8>, cancel: &CancellationToken) -> bool {
        let line = String::from_utf8_lossy(&line).into_owned();
        tokio::select! {
            _ = cancel.cancelled() => false,
            res = self.line_tx.send(line) => {
                if res.is_err() {
                    warn!(path = %self.path.display(), "line receiver dropped");
                    return false;
                }
                true
            }
        }
    }

    /// 로테이션으로 완성될 수 없게 된 잔여 조각을 버립니다.
    fn discard_partial(&self, partial: &[u8]) {
        if !partial.is_empty() {
            debug!(
                path = %self.path.display(),
                bytes = partial.len(),
                "discarding partial line at rotation"
            );
        }
    }
}

/// 파일 식별 토큰을 계산합니다.
///
/// Unix에서는 inode를 사용하고, 그 외 플랫폼에서는 크기와 수정 시각의
/// 조합으로 대체합니다 (동일 크기/시각 재작성은 구분 불가).
#[cfg(unix)]
fn file_identity(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn file_identity(meta: &std::fs::Metadata) -> u64 {
    use std::time::UNIX_EPOCH;
    let mtime_nanos = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_nanos() as u64);
    (meta.len() << 32) | (mtime_nanos & 0xffff_ffff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_options() {
        let opts = TailerOptions::default();
        assert_eq!(opts.poll_interval, Duration::from_secs(1));
        assert_eq!(opts.max_line_bytes, 64 * 1024);
        assert!(!opts.from_beginning);
    }

    #[test]
    fn new_resolves_absolute_path() {
        let temp = NamedTempFile::new().unwrap();
        let (tailer, _rx) = Tailer::new(temp.path(), TailerOptions::default()).unwrap();
        assert!(tailer.path().is_absolute());
    }

    #[cfg(unix)]
    #[test]
    fn identity_changes_on_recreate() {
        let temp = NamedTempFile::new().unwrap();
        let path = temp.path().to_owned();
        let old = file_identity(&std::fs::metadata(&path).unwrap());
        drop(temp); // 기존 파일 삭제
        std::fs::write(&path, b"new").unwrap();
        let new = file_identity(&std::fs::metadata(&path).unwrap());
        std::fs::remove_file(&path).unwrap();
        assert_ne!(old, new);
    }

    #[tokio::test]
    async fn emits_oversize_fragment_prefix() {
        let mut temp = NamedTempFile::new().unwrap();
        // 개행 없는 70바이트 조각
        write!(temp, "{}", "x".repeat(70)).unwrap();
        temp.flush().unwrap();

        let opts = TailerOptions {
            max_line_bytes: 64,
            from_beginning: true,
            poll_interval: Duration::from_millis(20),
        };
        let (tailer, mut rx) = Tailer::new(temp.path(), opts).unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(tailer.run(cancel.clone()));

        let line = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for oversize prefix")
            .expect("channel closed");
        assert_eq!(line.len(), 64);
        assert!(line.chars().all(|c| c == 'x'));

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn channel_closes_after_cancel() {
        let temp = NamedTempFile::new().unwrap();
        let (tailer, mut rx) = Tailer::new(temp.path(), TailerOptions::default()).unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(tailer.run(cancel.clone()));

        cancel.cancel();
        handle.await.unwrap().unwrap();
        // 테일러 종료 후 채널은 닫힘
        assert!(rx.recv().await.is_none());
    }
}
