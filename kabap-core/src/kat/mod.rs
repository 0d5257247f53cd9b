//! `.kat` token 交换格式
//!
//! UTF-8 文本：首行是头部注释（版本、scale、watchdog、优化等级、扩展
//! 列表），随后每行一个 token，行首一个类型符号，其后是词素。立即型
//! token（`.` `;` `:` `{` `}`）自带语句边界，两个非立即 token 之间用
//! 单独的 `;` 行分隔。

mod reader;
mod writer;

pub(crate) use reader::read;
pub(crate) use writer::write;

use crate::token::TokenKind;

/// token 类型到行首符号
pub(crate) fn sigil(kind: TokenKind) -> char {
    match kind {
        TokenKind::LineHint => '.',
        TokenKind::StatementEnd => ';',
        TokenKind::BlockStart => '{',
        TokenKind::BlockEnd => '}',
        TokenKind::Flow => '>',
        TokenKind::Operator => '_',
        TokenKind::Variable => '$',
        TokenKind::String => '"',
        TokenKind::Number => '#',
        TokenKind::Reference => '@',
        TokenKind::Label => ':',
    }
}

/// 行首符号到 token 类型
pub(crate) fn kind_for_sigil(c: char) -> Option<TokenKind> {
    Some(match c {
        '.' => TokenKind::LineHint,
        ';' => TokenKind::StatementEnd,
        '{' => TokenKind::BlockStart,
        '}' => TokenKind::BlockEnd,
        '>' => TokenKind::Flow,
        '_' => TokenKind::Operator,
        '$' => TokenKind::Variable,
        '"' => TokenKind::String,
        '#' => TokenKind::Number,
        '@' => TokenKind::Reference,
        ':' => TokenKind::Label,
        _ => return None,
    })
}
