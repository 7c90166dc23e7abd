//! 심볼 정의.
//!
//! 현물 암호화폐 마켓의 거래 쌍을 나타냅니다. 예: BTC-USDT.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 거래 가능한 현물 마켓을 나타내는 심볼.
///
/// 기준 자산과 호가 자산으로 구성되며, 거래소 표기(`BASE-QUOTE`)로
/// 직렬화됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    /// 기준 자산 (예: BTC)
    pub base: String,
    /// 호가 자산 (예: USDT)
    pub quote: String,
}

impl Symbol {
    /// 새 심볼을 생성합니다.
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// "BASE-QUOTE" 또는 "BASE/QUOTE" 형식 문자열에서 심볼을 파싱합니다.
    pub fn parse(s: &str) -> Option<Self> {
        let (base, quote) = s.split_once('-').or_else(|| s.split_once('/'))?;
        if base.is_empty() || quote.is_empty() {
            return None;
        }
        Some(Self::new(base, quote))
    }

    /// 거래소 표기 형식 반환 (예: "BTC-USDT").
    pub fn exchange_code(&self) -> String {
        format!("{}-{}", self.base, self.quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}
