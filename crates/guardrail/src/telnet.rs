//! 텔넷 클라이언트 — 재연결/속도 제한/서킷 브레이커를 갖춘
//! 라인 프로토콜 클라이언트
//!
//! 원격 관리 포트에 최선 노력(best-effort) 영속 TCP 연결을 유지합니다.
//!
//! # 연결 생애주기
//! ```text
//! Disconnected(backoff) -> Connecting -> Authenticated -> Draining+Serving
//!         ^                                                     |
//!         +--------------------- I/O 실패 ----------------------+
//! ```
//!
//! - 연결 성공 시 백오프/실패 카운터/브레이커가 리셋됩니다.
//! - 비밀번호가 설정돼 있으면 접속 직후 한 줄로 전송하며 응답은
//!   기다리지 않습니다.
//! - 수신 바이트는 전부 읽어서 버립니다 (원격이 우리 때문에 블록되지
//!   않도록).
//! - 모든 송신은 토큰 버킷을 통과하며 `command_timeout`의 보호를
//!   받습니다. 연속 실패가 누적되면 브레이커가 열려 빠르게 실패합니다.

use std::future::Future;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::Command;
use crate::error::GuardrailError;

const COMMAND_QUEUE_CAPACITY: usize = 64;
const TOKEN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 텔넷 클라이언트 설정
#[derive(Debug, Clone)]
pub struct TelnetConfig {
    /// 원격 호스트
    pub host: String,
    /// 원격 포트
    pub port: u16,
    /// 접속 비밀번호. 비어있으면 인증 생략
    pub password: String,
    /// 초당 명령 전송 한도 (토큰 버킷 용량이자 리필 속도)
    pub rate_limit_per_sec: f64,
    /// 명령 쓰기 제한 시간
    pub command_timeout: Duration,
    /// 재연결 백오프 최소값
    pub reconnect_min: Duration,
    /// 재연결 백오프 최대값
    pub reconnect_max: Duration,
    /// 브레이커가 열리는 연속 실패 횟수
    pub circuit_break_after: u32,
    /// 브레이커가 열린 채 유지되는 시간
    pub circuit_break_window: Duration,
}

impl Default for TelnetConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
            password: String::new(),
            rate_limit_per_sec: 2.0,
            command_timeout: Duration::from_secs(10),
            reconnect_min: Duration::from_secs(2),
            reconnect_max: Duration::from_secs(60),
            circuit_break_after: 3,
            circuit_break_window: Duration::from_secs(30),
        }
    }
}

impl TelnetConfig {
    /// 0 이하/0 값을 기본값으로 보정합니다.
    fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.rate_limit_per_sec <= 0.0 {
            self.rate_limit_per_sec = defaults.rate_limit_per_sec;
        }
        if self.command_timeout.is_zero() {
            self.command_timeout = defaults.command_timeout;
        }
        if self.reconnect_min.is_zero() {
            self.reconnect_min = defaults.reconnect_min;
        }
        if self.reconnect_max.is_zero() {
            self.reconnect_max = defaults.reconnect_max;
        }
        if self.circuit_break_after == 0 {
            self.circuit_break_after = defaults.circuit_break_after;
        }
        if self.circuit_break_window.is_zero() {
            self.circuit_break_window = defaults.circuit_break_window;
        }
        self
    }
}

/// 명령 송신 추상화 — 어플라이어가 테스트에서 목으로 대체할 수 있는 심
pub trait CommandSink: Send + Sync {
    /// 명령 하나를 전송하고 결과를 기다립니다.
    fn send_command(
        &self,
        cancel: &CancellationToken,
        command: Command,
    ) -> impl Future<Output = Result<(), GuardrailError>> + Send;
}

/// 큐에 적재되는 요청 — 결과는 oneshot으로 회신
struct CommandRequest {
    command: Command,
    done: oneshot::Sender<Result<(), GuardrailError>>,
}

/// 토큰 버킷 내부 상태
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// 연속 리필 토큰 버킷. 용량 = 초당 한도, 시작 토큰 = 용량.
struct TokenBucket {
    rate: f64,
    state: StdMutex<BucketState>,
}

impl TokenBucket {
    fn new(rate: f64) -> Self {
        Self {
            rate,
            state: StdMutex::new(BucketState {
                tokens: rate,
                last_refill: Instant::now(),
            }),
        }
    }

    /// 토큰 하나를 얻을 때까지 100ms 간격으로 대기합니다.
    /// 취소되면 false를 반환합니다.
    async fn acquire(&self, cancel: &CancellationToken) -> bool {
        loop {
            {
                let mut st = self.state.lock().expect("bucket lock poisoned");
                let now = Instant::now();
                let elapsed = now.duration_since(st.last_refill).as_secs_f64();
                st.tokens = (st.tokens + elapsed * self.rate).min(self.rate);
                st.last_refill = now;
                if st.tokens >= 1.0 {
                    st.tokens -= 1.0;
                    return true;
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(TOKEN_POLL_INTERVAL) => {}
            }
        }
    }
}

/// 서킷 브레이커 상태
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// 재연결/속도 제한/서킷 브레이커를 갖춘 텔넷 클라이언트
///
/// [`TelnetClient::send`]는 논블로킹으로 요청을 적재하고 결과를
/// 기다립니다. [`TelnetClient::run`]이 연결 생애주기를 소유하며 취소될
/// 때까지 반환하지 않습니다.
pub struct TelnetClient {
    cfg: TelnetConfig,
    addr: String,
    cmd_tx: mpsc::Sender<CommandRequest>,
    cmd_rx: StdMutex<Option<mpsc::Receiver<CommandRequest>>>,
    bucket: TokenBucket,
    breaker: StdMutex<BreakerState>,
    closed: AtomicBool,
}

impl TelnetClient {
    /// 새 클라이언트를 생성합니다. [`TelnetClient::run`]을 호출해야
    /// 연결이 시작됩니다.
    pub fn new(cfg: TelnetConfig) -> Self {
        let cfg = cfg.normalized();
        let addr = format!("{}:{}", cfg.host, cfg.port);
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let bucket = TokenBucket::new(cfg.rate_limit_per_sec);
        Self {
            cfg,
            addr,
            cmd_tx,
            cmd_rx: StdMutex::new(Some(cmd_rx)),
            bucket,
            breaker: StdMutex::new(BreakerState {
                consecutive_failures: 0,
                opened_at: None,
            }),
            closed: AtomicBool::new(false),
        }
    }

    /// 원격 주소를 반환합니다.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// 명령을 큐에 적재하고 결과를 기다립니다.
    ///
    /// 큐가 가득 차 있으면 즉시 `CommandQueueFull`을, 클라이언트가
    /// 종료된 뒤에는 `Closed`를 반환합니다. 업스트림을 블록하지
    /// 않습니다.
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        command: Command,
    ) -> Result<(), GuardrailError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GuardrailError::Closed);
        }
        let (done_tx, done_rx) = oneshot::channel();
        self.cmd_tx
            .try_send(CommandRequest {
                command,
                done: done_tx,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => GuardrailError::CommandQueueFull,
                mpsc::error::TrySendError::Closed(_) => GuardrailError::Closed,
            })?;
        tokio::select! {
            _ = cancel.cancelled() => Err(GuardrailError::Cancelled),
            res = done_rx => res.unwrap_or(Err(GuardrailError::Closed)),
        }
    }

    /// 연결 생애주기를 실행합니다. 취소될 때까지 반환하지 않으며,
    /// 정상 동작 중에는 호출자에게 에러를 돌려주지 않습니다.
    pub async fn run(&self, cancel: CancellationToken) {
        let rx = self.cmd_rx.lock().expect("cmd_rx lock poisoned").take();
        let Some(mut cmd_rx) = rx else {
            warn!(addr = %self.addr, "telnet client run() called twice");
            return;
        };

        let mut backoff = self.cfg.reconnect_min;
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let stream = tokio::select! {
                _ = cancel.cancelled() => break,
                res = TcpStream::connect(&self.addr) => res,
            };
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    debug!(addr = %self.addr, error = %e, "telnet connect failed, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(self.cfg.reconnect_max);
                    continue;
                }
            };

            backoff = self.cfg.reconnect_min;
            self.reset_breaker();
            info!(addr = %self.addr, "telnet connected");

            let (read_half, mut write_half) = stream.into_split();

            // 인증: 비밀번호 한 줄, 응답은 기다리지 않음
            if !self.cfg.password.is_empty() {
                let _ = write_line(&mut write_half, &self.cfg.password).await;
            }

            // 수신 바이트를 전부 읽어 버리는 드레인 태스크
            let drain = tokio::spawn(drain_socket(read_half));

            self.pump_commands(&cancel, &mut write_half, &mut cmd_rx)
                .await;

            drain.abort();
            // write_half drop으로 연결 종료; 바깥 루프가 재연결
        }

        self.closed.store(true, Ordering::Release);
        info!(addr = %self.addr, "telnet client stopped");
    }

    /// 큐에서 요청을 하나씩 꺼내 전송합니다.
    ///
    /// 전송 실패 시 반환하여 바깥 루프가 재연결하도록 합니다.
    async fn pump_commands(
        &self,
        cancel: &CancellationToken,
        write_half: &mut OwnedWriteHalf,
        cmd_rx: &mut mpsc::Receiver<CommandRequest>,
    ) {
        loop {
            let req = tokio::select! {
                _ = cancel.cancelled() => return,
                req = cmd_rx.recv() => match req {
                    Some(r) => r,
                    None => return,
                },
            };

            // 1. 브레이커가 열려 있으면 즉시 실패
            if let Err(e) = self.check_breaker() {
                let _ = req.done.send(Err(e));
                continue;
            }

            // 2. 토큰 버킷 대기
            if !self.bucket.acquire(cancel).await {
                let _ = req.done.send(Err(GuardrailError::Cancelled));
                continue;
            }

            // 3. 제한 시간 내 쓰기
            let outcome = match tokio::time::timeout(
                self.cfg.command_timeout,
                write_line(write_half, &req.command.raw),
            )
            .await
            {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(GuardrailError::Io(e)),
                Err(_) => Err(GuardrailError::CommandTimeout),
            };

            match outcome {
                Ok(()) => {
                    let _ = req.done.send(Ok(()));
                }
                Err(e) => {
                    warn!(addr = %self.addr, error = %e, "telnet command failed");
                    self.record_failure();
                    let _ = req.done.send(Err(e));
                    // 연결을 버리고 재연결
                    return;
                }
            }
        }
    }

    /// 브레이커 검사. 윈도우가 지났으면 닫고, 열려 있으면 에러.
    fn check_breaker(&self) -> Result<(), GuardrailError> {
        let mut breaker = self.breaker.lock().expect("breaker lock poisoned");
        if let Some(at) = breaker.opened_at {
            if at.elapsed() < self.cfg.circuit_break_window {
                return Err(GuardrailError::CircuitOpen);
            }
            breaker.opened_at = None;
            breaker.consecutive_failures = 0;
        }
        Ok(())
    }

    fn record_failure(&self) {
        let mut breaker = self.breaker.lock().expect("breaker lock poisoned");
        breaker.consecutive_failures += 1;
        if breaker.consecutive_failures >= self.cfg.circuit_break_after {
            warn!(
                addr = %self.addr,
                failures = breaker.consecutive_failures,
                "circuit breaker opened"
            );
            breaker.opened_at = Some(Instant::now());
        }
    }

    fn reset_breaker(&self) {
        let mut breaker = self.breaker.lock().expect("breaker lock poisoned");
        breaker.consecutive_failures = 0;
        breaker.opened_at = None;
    }
}

impl CommandSink for TelnetClient {
    async fn send_command(
        &self,
        cancel: &CancellationToken,
        command: Command,
    ) -> Result<(), GuardrailError> {
        self.send(cancel, command).await
    }
}

/// 한 줄을 CRLF 프레이밍으로 씁니다.
async fn write_line(write_half: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    write_half.write_all(format!("{line}\r\n").as_bytes()).await?;
    write_half.flush().await
}

/// 소켓 수신부를 계속 읽어서 버립니다. 원격이 우리 쪽 수신 버퍼
/// 때문에 블록되지 않게 합니다.
async fn drain_socket(mut read_half: OwnedReadHalf) {
    let mut buf = [0u8; 4096];
    loop {
        match read_half.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}
