//! `.kat` 写出

use std::fmt::Write as _;

use super::sigil;
use crate::token::{Program, TokenKind};
use crate::VERSION_MAJOR;

/// 把程序序列化成 `.kat` 文本
///
/// `extensions` 是头部 `e=` 列出的扩展前缀（不含内建扩展）。
pub(crate) fn write(
    program: &Program,
    scale: i32,
    watchdog: i32,
    optimise_level: i32,
    extensions: &[String],
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "// Kabap=Tokens v={VERSION_MAJOR} utf8=\u{2713} s={scale} wd={watchdog} o={optimise_level} e={}",
        extensions.join(",")
    );

    let mut last_immediate = false;
    for statement in &program.statements {
        for (k, token) in statement.iter().enumerate() {
            let this_immediate = matches!(
                token.kind,
                TokenKind::LineHint | TokenKind::Label | TokenKind::BlockStart | TokenKind::BlockEnd
            );

            // 只在两个非立即 token 之间写分隔行
            if k == 0 && !last_immediate && !this_immediate {
                out.push_str(";\n");
            }
            last_immediate = this_immediate;

            out.push(sigil(token.kind));
            out.push_str(&token.value);
            out.push('\n');
        }
    }

    while out.ends_with('\n') {
        out.pop();
    }
    out
}
