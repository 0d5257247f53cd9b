//! Token 模型
//!
//! Token 是执行的最小单元；Statement 是 token 的有序非空序列；Program 是
//! statement 的有序序列加标签表。引擎的外层循环下标就是程序计数器。

use std::collections::HashMap;

/// Token 类型
///
/// 空白和注释在 tokeniser 内部被吞掉，完成的程序里不会出现。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// 行号提示（值为十进制行号）
    LineHint,
    /// 语句结束；只做分隔，不会存入语句
    StatementEnd,
    BlockStart,
    BlockEnd,
    /// 流程控制关键字 `break` / `goto` / `if`
    Flow,
    Operator,
    /// `$` 前缀变量（存储时不带 `$`）
    Variable,
    String,
    Number,
    /// 点分引用，由扩展处理（`prefix.key`）
    Reference,
    /// `:` 前缀标签（存储时不带 `:`）
    Label,
}

impl TokenKind {
    /// 错误消息里使用的小写名称
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::LineHint => "linehint",
            TokenKind::StatementEnd => "statementend",
            TokenKind::BlockStart => "blockstart",
            TokenKind::BlockEnd => "blockend",
            TokenKind::Flow => "flow",
            TokenKind::Operator => "operator",
            TokenKind::Variable => "variable",
            TokenKind::String => "string",
            TokenKind::Number => "number",
            TokenKind::Reference => "reference",
            TokenKind::Label => "label",
        }
    }
}

/// Token：类型 + 源文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// 语句：token 的有序非空序列
pub type Statement = Vec<Token>;

/// 解析完成的程序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
    /// 标签名（小写）到标签语句下标的映射；`goto` 跳到下标 + 1
    pub labels: HashMap<String, usize>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// 流程控制关键字
pub(crate) const FLOW_KEYWORDS: &[&str] = &["break", "goto", "if"];

/// 比较运算符
pub(crate) const OPERATORS_COMPARATOR: &[&str] = &["<", "<=", "==", ">=", ">", "!="];

/// 数学运算符
pub(crate) const OPERATORS_MATHEMATICAL: &[&str] = &["+", "-", "*", "/", "%", "^", "++", "--"];

/// 赋值运算符
pub(crate) const OPERATORS_ASSIGNMENT: &[&str] = &["="];

/// 字符串运算符
pub(crate) const OPERATORS_STRING: &[&str] = &["<<"];

/// 运算符是否是引擎认识的任何一种
pub(crate) fn operator_known(value: &str) -> bool {
    OPERATORS_COMPARATOR.contains(&value)
        || OPERATORS_MATHEMATICAL.contains(&value)
        || OPERATORS_ASSIGNMENT.contains(&value)
        || OPERATORS_STRING.contains(&value)
}
