//! 설정 관리 — YAML 에이전트 설정 파싱 및 검증
//!
//! 설정 파일은 CLI 첫 번째 인자로 주어지며 기본값은 `config.yaml`입니다.
//! 알 수 없는 키는 무시됩니다. [`AgentConfig::load`]가 읽기/파싱/검증을
//! 한 번에 수행하며, 검증은 누락된 기본값도 채워 넣습니다.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 기본 API listen 주소
pub const DEFAULT_API_LISTEN: &str = "127.0.0.1:9090";
/// 기본 메트릭 경로
pub const DEFAULT_METRICS_PATH: &str = "/metrics";
/// `rate_limit_per_sec`가 0 이하일 때 적용되는 값
pub const DEFAULT_RATE_LIMIT_PER_SEC: f64 = 2.0;

/// mg7d 통합 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// 일반 설정 (로깅)
    #[serde(default)]
    pub general: GeneralConfig,
    /// 감시 대상 인스턴스 목록
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
    /// HTTP API 설정
    #[serde(default)]
    pub api: ApiConfig,
    /// 메트릭 노출 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// 로그 레벨
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_log_format() -> String {
    "pretty".to_owned()
}

/// 단일 게임 서버 인스턴스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// 인스턴스 이름 (필수)
    #[serde(default)]
    pub name: String,
    /// 상태 로그 파일 경로 (필수)
    #[serde(default)]
    pub log_path: String,
    /// 텔넷 연결 설정
    #[serde(default)]
    pub telnet: TelnetSettings,
    /// 정책 설정
    #[serde(default)]
    pub policy: PolicyConfig,
    /// 액션 설정 (스로틀 프로파일, 베이스라인)
    #[serde(default)]
    pub actions: ActionsConfig,
}

/// 텔넷 연결 및 안전장치 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelnetSettings {
    /// 호스트. 비어있으면 원격 제어 비활성화
    #[serde(default)]
    pub host: String,
    /// 포트. 0이면 원격 제어 비활성화
    #[serde(default)]
    pub port: u16,
    /// 접속 비밀번호. 비어있으면 인증 생략
    #[serde(default)]
    pub password: String,
    /// 초당 명령 전송 한도. 0 이하는 2.0으로 보정
    #[serde(default)]
    pub rate_limit_per_sec: f64,
}

/// 정책별 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// FPS 가드레일 설정
    #[serde(default)]
    pub fps_guard: Option<FpsGuardConfig>,
}

/// FPS 가드레일 정책 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FpsGuardConfig {
    /// 활성화 여부
    #[serde(default)]
    pub enabled: bool,
    /// 이 값 미만의 샘플을 "low"로 집계
    #[serde(default)]
    pub threshold_low: f64,
    /// 이 값 이상의 샘플을 "recovered"로 집계
    #[serde(default)]
    pub threshold_restore: f64,
    /// 스로틀 트리거에 필요한 최소 low 샘플 수. 0이면 3
    #[serde(default)]
    pub require_low_samples: usize,
    /// FPS 샘플 윈도우 크기. 0이면 60
    #[serde(default)]
    pub sample_window_samples: usize,
    /// 복원 전 요구되는 연속 회복 시간 (초)
    #[serde(default)]
    pub restore_stable_seconds: f64,
    /// 연속 스로틀 스텝 사이 최소 간격 (초)
    #[serde(default)]
    pub cooldown_seconds: f64,
    /// 예약됨 — 향후 스파이크 탐지 정책용
    #[serde(default)]
    pub delta_spike_threshold: f64,
    /// 예약됨 — 향후 스파이크 탐지 정책용
    #[serde(default)]
    pub spike_window_seconds: f64,
    /// 사용할 스로틀 프로파일 이름
    #[serde(default)]
    pub throttle_profile: String,
}

/// 액션 관련 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionsConfig {
    /// 이름 -> 스로틀 프로파일
    #[serde(default)]
    pub throttle_profiles: HashMap<String, ThrottleProfile>,
    /// RestoreBaseline이 복원할 pref -> value 맵
    #[serde(default)]
    pub baseline: HashMap<String, String>,
}

/// 스로틀 프로파일 — 순서 있는 스텝 목록
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThrottleProfile {
    /// 점진적으로 적용되는 스텝들
    #[serde(default)]
    pub steps: Vec<ThrottleStep>,
}

/// 스로틀 프로파일의 스텝 하나
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleStep {
    /// 게임 설정 이름
    pub pref: String,
    /// 설정할 값
    pub value: String,
}

/// HTTP API 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    /// listen 주소. 비어있으면 127.0.0.1:9090
    #[serde(default)]
    pub listen: String,
    /// 예약됨 — 향후 제어 API 인증 토큰
    #[serde(default)]
    pub auth_token: String,
}

/// 메트릭 노출 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// 활성화 여부
    #[serde(default)]
    pub enable: bool,
    /// 노출 경로. 비어있으면 /metrics
    #[serde(default)]
    pub path: String,
}

impl AgentConfig {
    /// 설정 파일을 읽고 파싱한 뒤 검증합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                ConfigError::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ConfigError::ParseFailed {
                    reason: format!("failed to read {}: {e}", path.display()),
                }
            }
        })?;
        let mut cfg: Self = serde_yaml::from_str(&data).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// YAML 문자열에서 설정을 파싱하고 검증합니다 (테스트 편의용).
    pub fn from_yaml(data: &str) -> Result<Self, ConfigError> {
        let mut cfg: Self = serde_yaml::from_str(data).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 설정을 검증하고 누락된 기본값을 채웁니다.
    ///
    /// - 인스턴스가 1개 이상 있어야 하며 각 인스턴스는 `name`과
    ///   `log_path`가 필요합니다.
    /// - `rate_limit_per_sec <= 0`은 2.0으로 보정됩니다.
    /// - 예약 필드(`delta_spike_threshold`, `spike_window_seconds`)는
    ///   음수가 아니어야 합니다.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.instances.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "instances".to_owned(),
                reason: "at least one instance required".to_owned(),
            });
        }

        for (i, inst) in self.instances.iter_mut().enumerate() {
            if inst.name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("instances[{i}].name"),
                    reason: "must not be empty".to_owned(),
                });
            }
            if inst.log_path.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("instances[{i}].log_path"),
                    reason: "must not be empty".to_owned(),
                });
            }
            if inst.telnet.rate_limit_per_sec <= 0.0 {
                inst.telnet.rate_limit_per_sec = DEFAULT_RATE_LIMIT_PER_SEC;
            }
            if let Some(guard) = &inst.policy.fps_guard {
                if guard.delta_spike_threshold < 0.0 {
                    return Err(ConfigError::InvalidValue {
                        field: format!("instances[{i}].policy.fps_guard.delta_spike_threshold"),
                        reason: "must not be negative".to_owned(),
                    });
                }
                if guard.spike_window_seconds < 0.0 {
                    return Err(ConfigError::InvalidValue {
                        field: format!("instances[{i}].policy.fps_guard.spike_window_seconds"),
                        reason: "must not be negative".to_owned(),
                    });
                }
            }
        }

        if self.api.listen.is_empty() {
            self.api.listen = DEFAULT_API_LISTEN.to_owned();
        }
        if self.metrics.path.is_empty() {
            self.metrics.path = DEFAULT_METRICS_PATH.to_owned();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r"
instances:
  - name: alpha
    log_path: /var/log/game/output.log
";

    #[test]
    fn minimal_config_fills_defaults() {
        let cfg = AgentConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(cfg.instances.len(), 1);
        assert_eq!(cfg.instances[0].name, "alpha");
        assert_eq!(cfg.api.listen, DEFAULT_API_LISTEN);
        assert_eq!(cfg.metrics.path, DEFAULT_METRICS_PATH);
        assert_eq!(cfg.general.log_level, "info");
        assert_eq!(cfg.general.log_format, "pretty");
        // 텔넷 미설정 시에도 rate limit은 보정됨
        assert_eq!(
            cfg.instances[0].telnet.rate_limit_per_sec,
            DEFAULT_RATE_LIMIT_PER_SEC
        );
    }

    #[test]
    fn empty_instances_rejected() {
        let err = AgentConfig::from_yaml("instances: []").unwrap_err();
        assert!(err.to_string().contains("instances"));
    }

    #[test]
    fn missing_name_rejected() {
        let yaml = r"
instances:
  - log_path: /var/log/game/output.log
";
        let err = AgentConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn missing_log_path_rejected() {
        let yaml = r"
instances:
  - name: alpha
";
        let err = AgentConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("log_path"));
    }

    #[test]
    fn rate_limit_coerced() {
        let yaml = r"
instances:
  - name: alpha
    log_path: /tmp/a.log
    telnet:
      host: 127.0.0.1
      port: 8081
      rate_limit_per_sec: -1.0
";
        let cfg = AgentConfig::from_yaml(yaml).unwrap();
        assert_eq!(
            cfg.instances[0].telnet.rate_limit_per_sec,
            DEFAULT_RATE_LIMIT_PER_SEC
        );
    }

    #[test]
    fn full_instance_config_parses() {
        let yaml = r#"
general:
  log_level: debug
  log_format: json
instances:
  - name: alpha
    log_path: /var/log/game/output.log
    telnet:
      host: 127.0.0.1
      port: 8081
      password: hunter2
      rate_limit_per_sec: 4.0
    policy:
      fps_guard:
        enabled: true
        threshold_low: 25
        threshold_restore: 40
        require_low_samples: 3
        sample_window_samples: 60
        restore_stable_seconds: 120
        cooldown_seconds: 60
        throttle_profile: default
    actions:
      throttle_profiles:
        default:
          steps:
            - { pref: MaxSpawnedZombies, value: "30" }
            - { pref: MaxSpawnedZombies, value: "20" }
      baseline:
        MaxSpawnedZombies: "60"
api:
  listen: 0.0.0.0:9091
  auth_token: secret
metrics:
  enable: true
  path: /metrics
"#;
        let cfg = AgentConfig::from_yaml(yaml).unwrap();
        let inst = &cfg.instances[0];
        assert_eq!(inst.telnet.port, 8081);
        assert_eq!(inst.telnet.rate_limit_per_sec, 4.0);
        let guard = inst.policy.fps_guard.as_ref().unwrap();
        assert!(guard.enabled);
        assert_eq!(guard.threshold_low, 25.0);
        assert_eq!(guard.throttle_profile, "default");
        let profile = &inst.actions.throttle_profiles["default"];
        assert_eq!(profile.steps.len(), 2);
        assert_eq!(profile.steps[0].pref, "MaxSpawnedZombies");
        assert_eq!(inst.actions.baseline["MaxSpawnedZombies"], "60");
        assert_eq!(cfg.api.listen, "0.0.0.0:9091");
        assert!(cfg.metrics.enable);
        assert_eq!(cfg.general.log_format, "json");
    }

    #[test]
    fn unknown_keys_ignored() {
        let yaml = r"
instances:
  - name: alpha
    log_path: /tmp/a.log
    flux_capacitor: 88
unknown_section:
  whatever: true
";
        let cfg = AgentConfig::from_yaml(yaml).unwrap();
        assert_eq!(cfg.instances[0].name, "alpha");
    }

    #[test]
    fn negative_spike_fields_rejected() {
        let yaml = r"
instances:
  - name: alpha
    log_path: /tmp/a.log
    policy:
      fps_guard:
        enabled: true
        delta_spike_threshold: -5.0
";
        let err = AgentConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("delta_spike_threshold"));
    }

    #[tokio::test]
    async fn load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{MINIMAL}").unwrap();
        file.flush().unwrap();

        let cfg = AgentConfig::load(file.path()).await.unwrap();
        assert_eq!(cfg.instances[0].name, "alpha");
    }

    #[tokio::test]
    async fn load_missing_file_fails() {
        let err = AgentConfig::load("/nonexistent/mg7d.yaml").await.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn load_invalid_yaml_fails() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "instances: [[[").unwrap();
        file.flush().unwrap();

        let err = AgentConfig::load(file.path()).await.unwrap_err();
        assert!(matches!(err, ConfigError::ParseFailed { .. }));
    }
}
