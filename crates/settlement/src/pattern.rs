//! Versioned priority table mapping work-code kinds to rate codes.
//!
//! Resolution normalises each catalog code (lowercase, alphanumerics only) and
//! returns the first rate, in catalog order, whose code contains one of the
//! kind's patterns. Two codes matching the same pattern collide silently: the
//! earlier one always wins.

use serde::{Deserialize, Serialize};

use crate::rate::{RateCatalog, RateDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeKind {
    Socket,
    Connection,
    ModemNetTel,
    Decoder1Way,
    Decoder2Way,
    Riser,
    Trunk,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodePattern {
    pub kind: CodeKind,
    pub patterns: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodePatternTable {
    version: u32,
    entries: Vec<CodePattern>,
}

impl CodePatternTable {
    pub fn new(version: u32, entries: Vec<CodePattern>) -> Self {
        Self { version, entries }
    }

    /// Patterns in use since the first rate tables.
    pub fn v1() -> Self {
        Self::new(
            1,
            vec![
                CodePattern { kind: CodeKind::Socket, patterns: &["gniaz"] },
                CodePattern { kind: CodeKind::Connection, patterns: &["przylacz", "przyłącz"] },
                CodePattern { kind: CodeKind::ModemNetTel, patterns: &["modem"] },
                CodePattern { kind: CodeKind::Decoder1Way, patterns: &["1way", "jednokier"] },
                CodePattern { kind: CodeKind::Decoder2Way, patterns: &["2way", "dwukier"] },
                CodePattern { kind: CodeKind::Riser, patterns: &["pion"] },
                CodePattern { kind: CodeKind::Trunk, patterns: &["listw"] },
            ],
        )
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn patterns_for(&self, kind: CodeKind) -> &[&'static str] {
        self.entries
            .iter()
            .find(|e| e.kind == kind)
            .map(|e| e.patterns)
            .unwrap_or(&[])
    }

    pub fn resolve<'a>(&self, kind: CodeKind, catalog: &'a RateCatalog) -> Option<&'a RateDefinition> {
        let patterns = self.patterns_for(kind);
        if patterns.is_empty() {
            return None;
        }
        catalog.iter().find(|rate| {
            let code = normalize_code(&rate.code);
            patterns.iter().any(|p| code.contains(*p))
        })
    }
}

impl Default for CodePatternTable {
    fn default() -> Self {
        Self::v1()
    }
}

pub fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(codes: &[&str]) -> RateCatalog {
        RateCatalog::new(codes.iter().map(|c| crate::rate::RateDefinition::new(*c, 1)).collect()).unwrap()
    }

    #[test]
    fn normalisation_drops_separators_and_case() {
        assert_eq!(normalize_code("DEKODER_1-WAY"), "dekoder1way");
        assert_eq!(normalize_code("Przyłącze"), "przyłącze");
    }

    #[test]
    fn resolves_each_kind_from_polish_codes() {
        let c = catalog(&["GNIAZDO", "PRZYLACZE", "MODEM_NET_TEL", "DEKODER_1WAY", "DEKODER_2WAY", "PION", "LISTWA"]);
        let t = CodePatternTable::v1();
        let code = |k| t.resolve(k, &c).map(|r| r.code.as_str());

        assert_eq!(code(CodeKind::Socket), Some("GNIAZDO"));
        assert_eq!(code(CodeKind::Connection), Some("PRZYLACZE"));
        assert_eq!(code(CodeKind::ModemNetTel), Some("MODEM_NET_TEL"));
        assert_eq!(code(CodeKind::Decoder1Way), Some("DEKODER_1WAY"));
        assert_eq!(code(CodeKind::Decoder2Way), Some("DEKODER_2WAY"));
        assert_eq!(code(CodeKind::Riser), Some("PION"));
        assert_eq!(code(CodeKind::Trunk), Some("LISTWA"));
    }

    #[test]
    fn first_match_in_catalog_order_wins() {
        let c = catalog(&["GNIAZDO_DODATKOWE", "GNIAZDO"]);
        let rate = CodePatternTable::v1().resolve(CodeKind::Socket, &c).unwrap();
        assert_eq!(rate.code, "GNIAZDO_DODATKOWE");
    }

    #[test]
    fn unmatched_kind_resolves_to_none() {
        let c = catalog(&["GNIAZDO"]);
        assert!(CodePatternTable::v1().resolve(CodeKind::Trunk, &c).is_none());
        assert!(CodePatternTable::new(2, vec![]).resolve(CodeKind::Socket, &c).is_none());
    }
}
