//! 테일러 통합 테스트
//!
//! 실제 파일시스템 위에서 FIFO 순서, 부분 라인 이어붙이기,
//! copytruncate 로테이션 생존을 검증합니다.

use std::fs::OpenOptions;
use std::io::Write;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use mg7d_logtail::{Tailer, TailerOptions};

fn fast_options() -> TailerOptions {
    TailerOptions {
        poll_interval: Duration::from_millis(30),
        from_beginning: true,
        ..TailerOptions::default()
    }
}

async fn recv_line(rx: &mut mpsc::Receiver<String>) -> Option<String> {
    timeout(Duration::from_secs(2), rx.recv()).await.ok()?
}

#[tokio::test]
async fn emits_existing_lines_in_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.txt");
    std::fs::write(&path, "line1\nline2\n").unwrap();

    let (tailer, mut rx) = Tailer::new(&path, fast_options()).unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(tailer.run(cancel.clone()));

    assert_eq!(recv_line(&mut rx).await.as_deref(), Some("line1"));
    assert_eq!(recv_line(&mut rx).await.as_deref(), Some("line2"));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn stitches_partial_line_across_writes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.txt");
    // 개행 없는 불완전한 라인으로 시작
    std::fs::write(&path, "abc").unwrap();

    let (tailer, mut rx) = Tailer::new(&path, fast_options()).unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(tailer.run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(80)).await;
    let mut f = OpenOptions::new().append(true).open(&path).unwrap();
    write!(f, "def\n").unwrap();
    f.flush().unwrap();
    drop(f);

    // "abc" + "def\n" -> 단일 라인 "abcdef"
    assert_eq!(recv_line(&mut rx).await.as_deref(), Some("abcdef"));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn appended_lines_are_followed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.txt");
    std::fs::write(&path, "first\n").unwrap();

    let (tailer, mut rx) = Tailer::new(&path, fast_options()).unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(tailer.run(cancel.clone()));

    assert_eq!(recv_line(&mut rx).await.as_deref(), Some("first"));

    for i in 0..3 {
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "appended{i}").unwrap();
        f.flush().unwrap();
    }

    assert_eq!(recv_line(&mut rx).await.as_deref(), Some("appended0"));
    assert_eq!(recv_line(&mut rx).await.as_deref(), Some("appended1"));
    assert_eq!(recv_line(&mut rx).await.as_deref(), Some("appended2"));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn survives_copytruncate_rotation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("game.log");
    std::fs::write(&path, "before_rotation\n").unwrap();

    let (tailer, mut rx) = Tailer::new(&path, fast_options()).unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(tailer.run(cancel.clone()));

    assert_eq!(recv_line(&mut rx).await.as_deref(), Some("before_rotation"));

    // copytruncate 시뮬레이션: truncate 후 새 내용 기록
    let mut f = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(&path)
        .unwrap();
    write!(f, "after_rotation\n").unwrap();
    f.flush().unwrap();
    drop(f);

    assert_eq!(recv_line(&mut rx).await.as_deref(), Some("after_rotation"));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn survives_rename_and_recreate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("game.log");
    std::fs::write(&path, "old_file\n").unwrap();

    let (tailer, mut rx) = Tailer::new(&path, fast_options()).unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(tailer.run(cancel.clone()));

    assert_eq!(recv_line(&mut rx).await.as_deref(), Some("old_file"));

    // logrotate 시뮬레이션: rename 후 같은 이름으로 재생성
    std::fs::rename(&path, dir.path().join("game.log.1")).unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    std::fs::write(&path, "new_file\n").unwrap();

    assert_eq!(recv_line(&mut rx).await.as_deref(), Some("new_file"));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn waits_for_initially_missing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("late.log");

    let (tailer, mut rx) = Tailer::new(&path, fast_options()).unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(tailer.run(cancel.clone()));

    // 파일이 아직 없음 — 백오프 중
    tokio::time::sleep(Duration::from_millis(150)).await;
    std::fs::write(&path, "finally\n").unwrap();

    assert_eq!(recv_line(&mut rx).await.as_deref(), Some("finally"));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn from_eof_skips_existing_content() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.txt");
    std::fs::write(&path, "history1\nhistory2\n").unwrap();

    let opts = TailerOptions {
        poll_interval: Duration::from_millis(30),
        from_beginning: false,
        ..TailerOptions::default()
    };
    let (tailer, mut rx) = Tailer::new(&path, opts).unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(tailer.run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut f = OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(f, "live").unwrap();
    f.flush().unwrap();

    // 기존 내용은 건너뛰고 새 라인만 방출
    assert_eq!(recv_line(&mut rx).await.as_deref(), Some("live"));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}
