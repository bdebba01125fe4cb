use super::notice::{self, Notice};

pub const EXPIRED: u16 = 4000;
pub const CAPTCHA_FAILED: u16 = 4001;
pub const RATE_LIMITED: u16 = 4002;
/// Reported when the transport died without a close frame.
pub const ABNORMAL: u16 = 1006;

/// Why a session ended, as far as the client acts on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Play time ran out; reconnect with the same identity.
    Expired,
    CaptchaFailed,
    RateLimited,
    /// Transport error or disappearance without a close frame.
    Abnormal,
    Other(u16),
}

impl CloseKind {
    pub fn classify(code: Option<u16>) -> Self {
        match code {
            Some(EXPIRED) => CloseKind::Expired,
            Some(CAPTCHA_FAILED) => CloseKind::CaptchaFailed,
            Some(RATE_LIMITED) => CloseKind::RateLimited,
            Some(code) => CloseKind::Other(code),
            None => CloseKind::Abnormal,
        }
    }

    pub fn code(self) -> u16 {
        match self {
            CloseKind::Expired => EXPIRED,
            CloseKind::CaptchaFailed => CAPTCHA_FAILED,
            CloseKind::RateLimited => RATE_LIMITED,
            CloseKind::Abnormal => ABNORMAL,
            CloseKind::Other(code) => code,
        }
    }

    pub fn reconnects(self) -> bool {
        matches!(self, CloseKind::Expired)
    }

    /// Notice shown for a server-initiated close, if any.
    pub fn notice(self) -> Option<Notice> {
        match self {
            CloseKind::Expired => None,
            CloseKind::CaptchaFailed => Some(Notice::error(notice::CAPTCHA_FAILED)),
            CloseKind::RateLimited => Some(Notice::error(notice::TOO_FAST)),
            CloseKind::Abnormal => Some(Notice::error(notice::CONNECTION_ERROR)),
            CloseKind::Other(_) => Some(Notice::info(notice::CONNECTION_CLOSED)),
        }
    }
}
