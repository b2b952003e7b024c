//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 게이지의 이름과 설명을 중앙에서 정의합니다.
//! 각 게이지는 `instance` 레이블을 달고 노출됩니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `mg7d_`
//! - 단위 접미어: `_mb` (메가바이트), 없음 (개수/비율)

/// 인스턴스 레이블 키
pub const LABEL_INSTANCE: &str = "instance";

/// 현재 FPS (gauge)
pub const GAUGE_FPS: &str = "mg7d_fps";

/// 접속 플레이어 수 (gauge)
pub const GAUGE_PLAYERS: &str = "mg7d_players";

/// 로드된 청크 수 (gauge)
pub const GAUGE_CHUNKS: &str = "mg7d_chunks";

/// 전체 엔티티 수 (gauge)
pub const GAUGE_ENTITIES: &str = "mg7d_entities";

/// 좀비 수 (gauge)
pub const GAUGE_ZOMBIES: &str = "mg7d_zombies";

/// 힙 사용량 MB (gauge)
pub const GAUGE_HEAP_MB: &str = "mg7d_heap_mb";

/// RSS MB (gauge)
pub const GAUGE_RSS_MB: &str = "mg7d_rss_mb";

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `mg7d-agent`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::describe_gauge;

    describe_gauge!(GAUGE_FPS, "Current FPS from game log.");
    describe_gauge!(GAUGE_PLAYERS, "Current player count.");
    describe_gauge!(GAUGE_CHUNKS, "Current chunk count.");
    describe_gauge!(GAUGE_ENTITIES, "Total entities.");
    describe_gauge!(GAUGE_ZOMBIES, "Zombie count.");
    describe_gauge!(GAUGE_HEAP_MB, "Heap size in MB.");
    describe_gauge!(GAUGE_RSS_MB, "RSS in MB.");
}
