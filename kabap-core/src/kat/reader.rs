//! `.kat` 读入
//!
//! 这里只追求速度不追求健壮：任何不对劲都让加载整体失败，不产生
//! 错误消息。

use std::collections::HashMap;

use thiserror::Error;

use super::kind_for_sigil;
use crate::token::{Program, Statement, Token};
use crate::VERSION_MAJOR;

/// 解析出的 `.kat` 内容
#[derive(Debug)]
pub(crate) struct KatFile {
    pub program: Program,
    pub scale: Option<i32>,
    pub watchdog: Option<i32>,
}

#[derive(Debug, Error, PartialEq)]
pub(crate) enum ReadError {
    #[error("first line is not a header comment")]
    NotTokenFormat,
    #[error("header predicates are missing or invalid")]
    BadHeader,
    #[error("token version is not supported")]
    UnsupportedVersion,
    #[error("line {0} is malformed")]
    MalformedLine(usize),
    #[error("line {0} has an unknown type sigil")]
    UnknownSigil(usize),
}

pub(crate) fn read(text: &str) -> Result<KatFile, ReadError> {
    let lines: Vec<&str> = text.split('\n').collect();

    let header = lines[0];
    if !header.starts_with("//") {
        return Err(ReadError::NotTokenFormat);
    }

    // 头部形如 // Kabap=Tokens v=1 utf8=✓ s=3 wd=1000 o=0 e=
    let mut predicates: HashMap<&str, &str> = HashMap::new();
    for chunk in header.split(' ') {
        let parts: Vec<&str> = chunk.split('=').collect();
        if let [key, value] = parts[..] {
            predicates.insert(key, value);
        }
    }

    if predicates.get("Kabap") != Some(&"Tokens") {
        return Err(ReadError::BadHeader);
    }
    let version: u32 = predicates
        .get("v")
        .and_then(|v| v.parse().ok())
        .ok_or(ReadError::BadHeader)?;
    if version < 1 || version > VERSION_MAJOR {
        return Err(ReadError::UnsupportedVersion);
    }
    if predicates.get("utf8") != Some(&"\u{2713}") {
        return Err(ReadError::BadHeader);
    }

    let scale = match predicates.get("s") {
        Some(s) => Some(s.parse().map_err(|_| ReadError::BadHeader)?),
        None => None,
    };
    let watchdog = match predicates.get("wd") {
        Some(wd) => Some(wd.parse().map_err(|_| ReadError::BadHeader)?),
        None => None,
    };

    // token 行；最后追加一次伪读保证末条语句收尾
    let mut statements: Vec<Statement> = Vec::new();
    let mut labels: HashMap<String, usize> = HashMap::new();
    let mut stmt: Statement = Vec::new();
    let mut last_immediate = false;

    for i in 1..=lines.len() {
        let (c, value) = if i < lines.len() {
            let line = lines[i];
            if line.starts_with("//") {
                continue;
            }
            let mut chars = line.chars();
            let c = chars.next().ok_or(ReadError::MalformedLine(i + 1))?;
            (c, chars.as_str())
        } else {
            (';', "")
        };

        let kind = kind_for_sigil(c).ok_or(ReadError::UnknownSigil(i + 1))?;

        let this_immediate = matches!(c, ';' | '.' | ':' | '{' | '}');
        if (this_immediate || last_immediate || i == lines.len()) && !stmt.is_empty() {
            statements.push(std::mem::take(&mut stmt));
        }

        // 标签指向自己即将占据的语句下标
        if c == ':' {
            labels.insert(value.to_string(), statements.len());
        }

        if c == ';' {
            last_immediate = false;
        } else {
            last_immediate = this_immediate;
            stmt.push(Token::new(kind, value));
        }
    }

    debug_assert!(stmt.is_empty());

    Ok(KatFile {
        program: Program { statements, labels },
        scale,
        watchdog,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    const HEADER: &str = "// Kabap=Tokens v=1 utf8=\u{2713} s=3 wd=1000 o=0 e=";

    #[test]
    fn test_rejects_plain_text() {
        assert_eq!(read("$x = 5;").unwrap_err(), ReadError::NotTokenFormat);
    }

    #[test]
    fn test_rejects_wrong_header() {
        assert_eq!(read("// hello").unwrap_err(), ReadError::BadHeader);
        assert_eq!(
            read("// Kabap=Tokens v=1 s=3").unwrap_err(),
            ReadError::BadHeader
        );
    }

    #[test]
    fn test_rejects_future_version() {
        assert_eq!(
            read("// Kabap=Tokens v=99 utf8=\u{2713}").unwrap_err(),
            ReadError::UnsupportedVersion
        );
        assert_eq!(
            read("// Kabap=Tokens v=0 utf8=\u{2713}").unwrap_err(),
            ReadError::UnsupportedVersion
        );
    }

    #[test]
    fn test_header_settings_extracted() {
        let kat = read(&format!("{HEADER}\n.1\n$x\n_=\n#5")).expect("valid tokens");
        assert_eq!(kat.scale, Some(3));
        assert_eq!(kat.watchdog, Some(1000));
    }

    #[test]
    fn test_header_without_settings() {
        let kat = read("// Kabap=Tokens v=1 utf8=\u{2713}").expect("valid tokens");
        assert_eq!(kat.scale, None);
        assert_eq!(kat.watchdog, None);
        assert!(kat.program.is_empty());
    }

    #[test]
    fn test_statement_assembly() {
        let kat = read(&format!("{HEADER}\n.1\n$x\n_=\n#5")).expect("valid tokens");
        assert_eq!(kat.program.statements.len(), 2);
        assert_eq!(kat.program.statements[0][0].kind, TokenKind::LineHint);
        assert_eq!(kat.program.statements[1].len(), 3);
        assert_eq!(kat.program.statements[1][0].value, "x");
    }

    #[test]
    fn test_semicolon_line_separates() {
        let kat = read(&format!("{HEADER}\n$x\n_=\n#1\n;\n$y\n_=\n#2")).expect("valid tokens");
        assert_eq!(kat.program.statements.len(), 2);
        assert_eq!(kat.program.statements[1][0].value, "y");
    }

    #[test]
    fn test_labels_point_at_own_statement() {
        let kat = read(&format!("{HEADER}\n.1\n:loop\n.2\n>goto\n@loop")).expect("valid tokens");
        assert_eq!(kat.program.labels.get("loop"), Some(&1));
        assert_eq!(kat.program.statements[1][0].kind, TokenKind::Label);
    }

    #[test]
    fn test_label_as_first_statement() {
        let kat = read(&format!("{HEADER}\n:loop\n>goto\n@loop")).expect("valid tokens");
        assert_eq!(kat.program.labels.get("loop"), Some(&0));
    }

    #[test]
    fn test_comment_lines_skipped() {
        let kat = read(&format!("{HEADER}\n// note\n.1\n$x\n_=\n#5")).expect("valid tokens");
        assert_eq!(kat.program.statements.len(), 2);
    }

    #[test]
    fn test_empty_string_token() {
        let kat = read(&format!("{HEADER}\n$x\n_=\n\"")).expect("valid tokens");
        let statement = &kat.program.statements[0];
        assert_eq!(statement[2].kind, TokenKind::String);
        assert_eq!(statement[2].value, "");
    }

    #[test]
    fn test_unknown_sigil_rejected() {
        assert!(matches!(
            read(&format!("{HEADER}\n!boom")),
            Err(ReadError::UnknownSigil(_))
        ));
    }

    #[test]
    fn test_empty_line_rejected() {
        assert!(matches!(
            read(&format!("{HEADER}\n\n$x")),
            Err(ReadError::MalformedLine(_))
        ));
    }
}
