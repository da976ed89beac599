use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DockError, Result};

/// Способ интерпретации шаблона имени окна
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternMode {
    /// Буквальный текст, спецсимволы экранируются
    #[default]
    Normal,
    Regex,
    Wildcard,
}

impl FromStr for PatternMode {
    type Err = DockError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "n" => Ok(PatternMode::Normal),
            "r" => Ok(PatternMode::Regex),
            "w" => Ok(PatternMode::Wildcard),
            other => Err(DockError::InvalidPattern {
                pattern: other.to_string(),
                reason: "допустимые режимы: n, r, w".to_string(),
            }),
        }
    }
}

/// Скомпилированный шаблон для сопоставления заголовков окон
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    pub fn compile(text: &str, mode: PatternMode, case_sensitive: bool) -> Result<Self> {
        let expression = match mode {
            PatternMode::Normal => regex::escape(text),
            PatternMode::Regex => text.to_string(),
            PatternMode::Wildcard => wildcard_to_regex(text),
        };

        let regex = RegexBuilder::new(&expression)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| DockError::InvalidPattern {
                pattern: text.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            source: text.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, title: &str) -> bool {
        self.regex.is_match(title)
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.source)
    }
}

/// Переводит shell-шаблон (`*`, `?`, `[...]`) в регулярное выражение,
/// совпадающее с заголовком целиком.
fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                // Ищем закрывающую скобку, иначе '[' - обычный символ
                let class: String = chars.clone().take_while(|&c| c != ']').collect();
                let closed = chars.clone().nth(class.chars().count()) == Some(']');
                if closed && !class.is_empty() {
                    out.push('[');
                    let mut body = class.as_str();
                    if let Some(rest) = body.strip_prefix('!') {
                        out.push('^');
                        body = rest;
                    }
                    for ch in body.chars() {
                        if ch == '\\' || ch == '[' {
                            out.push('\\');
                        }
                        out.push(ch);
                    }
                    out.push(']');
                    for _ in 0..=class.chars().count() {
                        chars.next();
                    }
                } else {
                    out.push_str("\\[");
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    out
}
