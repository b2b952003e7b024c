//! 와이어 명령 빌더
//!
//! 원격 피어로 전송되는 명령은 CRLF로 끝나는 한 줄의 불투명한
//! 텍스트입니다. 여기서는 명령 문자열만 조립하고 프레이밍은
//! [`telnet`](crate::telnet) 모듈이 담당합니다.

use std::fmt;

/// 전송할 텔넷 명령 한 줄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// 와이어에 쓰일 원시 문자열 (CRLF 제외)
    pub raw: String,
}

impl Command {
    /// 게임 설정값 변경 명령을 만듭니다.
    pub fn set_game_pref(name: &str, value: &str) -> Self {
        Self {
            raw: format!("setpref {name} {value}"),
        }
    }

    /// 채팅 메시지 명령을 만듭니다.
    pub fn say(message: &str) -> Self {
        Self {
            raw: format!("say {message}"),
        }
    }

    /// 로그인 명령(비밀번호 원문)을 만듭니다.
    pub fn authenticate(password: &str) -> Self {
        Self {
            raw: password.to_owned(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
