//! 상태 라인 파서 — `Time:` 라인을 [`Snapshot`]으로 변환
//!
//! 전건(total) 파서입니다. 어떤 입력에도 패닉하지 않으며, 상태 라인이
//! 아니면 `None`, 상태 라인이면 항상 유효한 스냅샷을 반환합니다.
//! 개별 토큰의 파싱 실패는 조용히 무시되고 해당 필드는 기본값을
//! 유지합니다.
//!
//! # 토큰 형식
//!
//! `Key: value` 쌍의 나열이며 **값에는 내부 공백이 올 수 있습니다**
//! (예: `Heap: 100 MB`, `Time: 2024-01-15 14:30:00`). 값은 다음
//! `" Key:"` 경계 또는 라인 끝까지 이어집니다. 첫 키 앞의 선행
//! 텍스트는 합성 키 `Time` 아래에 저장됩니다.

use std::time::SystemTime;

use chrono::{DateTime, NaiveDateTime, Utc};

use mg7d_core::Snapshot;

/// 한 라인을 파싱합니다.
///
/// 앞뒤 공백 제거 후 `Time:`으로 시작하면 스냅샷을, 아니면 `None`을
/// 반환합니다.
pub fn parse_status_line(line: &str) -> Option<Snapshot> {
    let line = line.trim();
    let rest = line.strip_prefix("Time:")?;

    let now = SystemTime::now();
    let mut snap = Snapshot {
        parsed_at: now,
        timestamp: now,
        ..Snapshot::default()
    };

    for (key, value) in key_value_pairs(rest.trim()) {
        match key.to_ascii_lowercase().as_str() {
            "time" => {
                if let Some(t) = parse_time_value(&value) {
                    snap.timestamp = t;
                }
            }
            "fps" => {
                if let Ok(f) = value.trim().parse::<f64>() {
                    snap.fps = f;
                }
            }
            "heap" => {
                if let Some(f) = parse_mb(&value) {
                    snap.heap_mb = f;
                }
            }
            "rss" => {
                if let Some(f) = parse_mb(&value) {
                    snap.rss_mb = f;
                }
            }
            "chunks" => {
                if let Ok(n) = value.trim().parse::<i64>() {
                    snap.chunks = n;
                }
            }
            "cgo" => {
                // 토큰이 존재하면 값 파싱 실패와 무관하게 "있음"으로 표시
                snap.cgo_missing = false;
                if let Ok(n) = value.trim().parse::<i64>() {
                    snap.cgo = n;
                }
            }
            "ply" | "players" => {
                if let Ok(n) = value.trim().parse::<i64>() {
                    snap.players = n;
                }
            }
            "zom" | "zombies" => {
                if let Ok(n) = value.trim().parse::<i64>() {
                    snap.zombies = n;
                }
            }
            "ent" | "entities" => {
                if let Ok(n) = value.trim().parse::<i64>() {
                    snap.entities_total = n;
                }
            }
            "ent_active" | "entities_active" => {
                if let Ok(n) = value.trim().parse::<i64>() {
                    snap.entities_active = n;
                }
            }
            "co" | "connections" => {
                if let Ok(n) = value.trim().parse::<i64>() {
                    snap.co = n;
                }
            }
            _ => {}
        }
    }

    Some(snap)
}

/// `"val0 Key1: val1 Key2: val2"` 형태를 (key, value) 목록으로 나눕니다.
///
/// 키는 `:`로 끝나는 비공백 문자 열이고, 값은 다음 키 경계까지입니다.
/// 첫 키 앞의 선행 값은 합성 키 `Time`으로 저장됩니다.
fn key_value_pairs(s: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut s = s.trim();

    // 문자열이 키로 시작하지 않을 때만 선행 값을 캡처
    if !starts_with_key(s) {
        if let Some(idx) = next_key_boundary(s) {
            if idx > 0 {
                out.push(("Time".to_owned(), s[..idx].trim().to_owned()));
                s = s[idx..].trim_start();
            }
        }
    }

    while !s.is_empty() {
        let bytes = s.as_bytes();
        let mut i = 0;
        while i < bytes.len() && bytes[i] != b' ' && bytes[i] != b'\t' && bytes[i] != b':' {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b':' {
            break;
        }
        let key = s[..i].to_owned();
        s = s[i + 1..].trim_start();

        let val_end = next_key_boundary(s).unwrap_or(s.len());
        out.push((key, s[..val_end].trim().to_owned()));
        s = s[val_end..].trim_start();
    }

    out
}

/// 문자열이 곧바로 `Key:`로 시작하는지 확인합니다.
fn starts_with_key(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut k = 0;
    while k < bytes.len() && bytes[k] != b' ' && bytes[k] != b'\t' && bytes[k] != b':' {
        k += 1;
    }
    k < bytes.len() && bytes[k] == b':'
}

/// 다음 `" Key:"` 경계(공백 + 단어 + 콜론)의 시작 인덱스를 찾습니다.
fn next_key_boundary(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    for j in 0..bytes.len() {
        if bytes[j] != b' ' && bytes[j] != b'\t' {
            continue;
        }
        let rest = s[j..].trim_start();
        let rb = rest.as_bytes();
        let mut k = 0;
        while k < rb.len() && rb[k] != b' ' && rb[k] != b'\t' && rb[k] != b':' {
            k += 1;
        }
        if k < rb.len() && rb[k] == b':' {
            return Some(j);
        }
    }
    None
}

/// `MB` 접미어(대소문자 무관)를 허용하는 실수 파서
fn parse_mb(s: &str) -> Option<f64> {
    let lowered = s.trim().to_ascii_lowercase();
    let stripped = lowered.strip_suffix("mb").unwrap_or(&lowered);
    stripped.trim().parse::<f64>().ok()
}

/// 알려진 시각 형식들을 순서대로 시도합니다.
fn parse_time_value(s: &str) -> Option<SystemTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.into());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).into());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_status_line_returns_none() {
        assert!(parse_status_line("INFO spawn wave complete").is_none());
        assert!(parse_status_line("").is_none());
        assert!(parse_status_line("time: 1 FPS: 2").is_none()); // 접두어는 대소문자 구분
    }

    #[test]
    fn recognizes_after_leading_whitespace() {
        assert!(parse_status_line("   Time: 1.0 FPS: 30").is_some());
    }

    #[test]
    fn happy_path_full_line() {
        let snap = parse_status_line(
            "Time: 123.45 FPS: 30.5 Heap: 512.2 RSS: 600 Chunks: 100 Ply: 2 Zom: 50 Ent: 200 CO: 2",
        )
        .unwrap();
        assert_eq!(snap.fps, 30.5);
        assert_eq!(snap.heap_mb, 512.2);
        assert_eq!(snap.rss_mb, 600.0);
        assert_eq!(snap.chunks, 100);
        assert_eq!(snap.players, 2);
        assert_eq!(snap.zombies, 50);
        assert_eq!(snap.entities_total, 200);
        assert_eq!(snap.co, 2);
        // 센티널: ent_active 부재 -> -1, cgo 부재 -> missing
        assert_eq!(snap.entities_active, -1);
        assert!(snap.cgo_missing);
    }

    #[test]
    fn value_with_embedded_space() {
        let snap = parse_status_line("Time: FPS: 60 Heap: 100 MB").unwrap();
        assert_eq!(snap.fps, 60.0);
        assert_eq!(snap.heap_mb, 100.0);
    }

    #[test]
    fn mb_suffix_any_case() {
        assert_eq!(parse_mb("512.2"), Some(512.2));
        assert_eq!(parse_mb("100 MB"), Some(100.0));
        assert_eq!(parse_mb("100mb"), Some(100.0));
        assert_eq!(parse_mb("100 Mb"), Some(100.0));
        assert_eq!(parse_mb("abc"), None);
    }

    #[test]
    fn keys_are_case_insensitive() {
        let snap = parse_status_line("Time: fps: 30 PLY: 4 zombies: 9").unwrap();
        assert_eq!(snap.fps, 30.0);
        assert_eq!(snap.players, 4);
        assert_eq!(snap.zombies, 9);
    }

    #[test]
    fn long_key_aliases() {
        let snap = parse_status_line(
            "Time: Players: 5 Zombies: 10 Entities: 40 Connections: 3 Entities_active: 12",
        )
        .unwrap();
        assert_eq!(snap.players, 5);
        assert_eq!(snap.zombies, 10);
        assert_eq!(snap.entities_total, 40);
        assert_eq!(snap.co, 3);
        assert_eq!(snap.entities_active, 12);
    }

    #[test]
    fn cgo_present_clears_missing() {
        let snap = parse_status_line("Time: CGO: 7 FPS: 30").unwrap();
        assert!(!snap.cgo_missing);
        assert_eq!(snap.cgo, 7);
    }

    #[test]
    fn cgo_with_bad_value_still_marks_present() {
        let snap = parse_status_line("Time: CGO: banana").unwrap();
        assert!(!snap.cgo_missing);
        assert_eq!(snap.cgo, 0);
    }

    #[test]
    fn malformed_tokens_silently_ignored() {
        let snap = parse_status_line("Time: FPS: fast Heap: lots Chunks: 12").unwrap();
        // 실패한 토큰은 기본값 유지
        assert_eq!(snap.fps, 0.0);
        assert_eq!(snap.heap_mb, 0.0);
        assert_eq!(snap.chunks, 12);
    }

    #[test]
    fn timestamp_space_separated_format() {
        let snap = parse_status_line("Time: 2024-01-15 14:30:00 FPS: 30").unwrap();
        assert_ne!(snap.timestamp, snap.parsed_at);
        assert_eq!(snap.fps, 30.0);

        let dt: DateTime<Utc> = snap.timestamp.into();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-15 14:30:00");
    }

    #[test]
    fn timestamp_rfc3339_format() {
        let snap = parse_status_line("Time: 2024-01-15T14:30:00Z FPS: 30").unwrap();
        let dt: DateTime<Utc> = snap.timestamp.into();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-15 14:30:00");
    }

    #[test]
    fn timestamp_us_format() {
        let snap = parse_status_line("Time: 01/15/2024 14:30:00 FPS: 30").unwrap();
        let dt: DateTime<Utc> = snap.timestamp.into();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2024-01-15");
    }

    #[test]
    fn unparseable_timestamp_keeps_parsed_at() {
        let snap = parse_status_line("Time: day 123 FPS: 30").unwrap();
        assert_eq!(snap.timestamp, snap.parsed_at);
    }

    #[test]
    fn key_value_pairs_leading_value() {
        let pairs = key_value_pairs("123.45 FPS: 30.5 Heap: 100 MB");
        assert_eq!(pairs[0], ("Time".to_owned(), "123.45".to_owned()));
        assert_eq!(pairs[1], ("FPS".to_owned(), "30.5".to_owned()));
        assert_eq!(pairs[2], ("Heap".to_owned(), "100 MB".to_owned()));
    }

    #[test]
    fn key_value_pairs_without_leading_value() {
        let pairs = key_value_pairs("FPS: 60 Heap: 100 MB");
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], ("FPS".to_owned(), "60".to_owned()));
        assert_eq!(pairs[1], ("Heap".to_owned(), "100 MB".to_owned()));
    }

    #[test]
    fn key_value_pairs_no_keys() {
        // 키가 전혀 없으면 빈 목록
        assert!(key_value_pairs("123.45").is_empty());
    }

    #[test]
    fn parser_is_total_on_garbage() {
        // 어떤 입력에도 패닉하지 않아야 함
        for line in [
            "Time:",
            "Time: ::::",
            "Time: \t\t",
            "Time: a: b: c: d",
            "Time: 無限 FPS: 30",
            "Time: FPS:",
        ] {
            let _ = parse_status_line(line);
        }
    }
}
