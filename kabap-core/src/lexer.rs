//! Tokeniser：单遍字符扫描
//!
//! 一次读一个字符，维护一个打开中的 token（类型 + 累积文本），在 token
//! 关闭时做基本合法性检查并装配语句。空白和注释在这里被吞掉；`$` 与 `:`
//! 先以占位 token 进入语句，后随的标识符把名字并入占位。

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::error::{ErrorKind, ScriptError};
use crate::token::{operator_known, Program, Statement, Token, TokenKind, FLOW_KEYWORDS};

/// 扫描结果：程序 + 扫描结束时的行号
#[derive(Debug)]
pub(crate) struct TokeniseOutput {
    pub program: Program,
    pub final_line: usize,
}

/// 把脚本源文本切成语句流
pub(crate) fn tokenise(source: &str) -> Result<TokeniseOutput, ScriptError> {
    trace!(target: "kabap::lexer", bytes = source.len(), "tokenising script");

    let mut scan = Tokeniser::default();
    scan.run(source)?;

    debug!(
        target: "kabap::lexer",
        statements = scan.statements.len(),
        labels = scan.labels.len(),
        "tokenise complete"
    );

    Ok(TokeniseOutput {
        program: Program {
            statements: scan.statements,
            labels: scan.labels,
        },
        final_line: scan.line,
    })
}

#[derive(Default)]
struct Tokeniser {
    statements: Vec<Statement>,
    labels: HashMap<String, usize>,
    stmt: Statement,
    line: usize,
    nests: i32,
    conditional: bool,
    after_comment: bool,
}

impl Tokeniser {
    fn run(&mut self, source: &str) -> Result<(), ScriptError> {
        if source.is_empty() {
            return Ok(());
        }

        let chars: Vec<char> = source.chars().collect();

        // 扫描从一条起始行提示开始
        self.line = 1;
        let mut open: Option<(TokenKind, String)> = Some((TokenKind::LineHint, "1".to_string()));
        let mut in_comment = false;

        for i in 0..=chars.len() {
            let at_eof = i == chars.len();
            let c = if at_eof { '\0' } else { chars[i] };

            if in_comment && !at_eof && c != '\n' {
                continue;
            }

            // 行尾与文件尾
            if c == '\n' || at_eof {
                if in_comment {
                    // 注释替语句收尾
                    in_comment = false;
                    self.after_comment = true;
                    self.close(TokenKind::StatementEnd, String::new(), at_eof)?;
                } else if let Some((kind, value)) = open.take() {
                    match kind {
                        TokenKind::LineHint
                        | TokenKind::StatementEnd
                        | TokenKind::BlockStart
                        | TokenKind::BlockEnd => self.close(kind, value, at_eof)?,
                        TokenKind::Reference if self.pending_label() => {
                            // 行尾完成标签，立即独立成句
                            self.close(kind, value, at_eof)?;
                            if !self.stmt.is_empty() {
                                self.statements.push(std::mem::take(&mut self.stmt));
                            }
                        }
                        TokenKind::Reference => {
                            return Err(self.fail(ErrorKind::Unterminated(self.refined_kind())));
                        }
                        other => return Err(self.fail(ErrorKind::Unterminated(other))),
                    }
                }

                if !at_eof {
                    self.line += 1;
                    open = Some((TokenKind::LineHint, self.line.to_string()));
                    self.after_comment = false;
                }
                continue;
            }

            // 字符串内部优先于其它一切分类
            if matches!(&open, Some((TokenKind::String, _))) {
                if c == '"' {
                    if let Some((kind, value)) = open.take() {
                        self.close(kind, value, false)?;
                    }
                } else if let Some((_, text)) = &mut open {
                    text.push(c);
                }
                continue;
            }
            if c == '"' {
                open = Some(self.switch(open.take(), TokenKind::String)?);
                continue;
            }

            if c == ' ' || c == '\t' || c == '\0' {
                if let Some((kind, value)) = open.take() {
                    self.close(kind, value, false)?;
                }
                continue;
            }

            if c == '{' {
                self.nests += 1;
                open = Some(self.switch(open.take(), TokenKind::BlockStart)?);
                continue;
            }
            if c == '}' {
                self.nests -= 1;
                if self.nests < 0 {
                    return Err(self.fail(ErrorKind::ClosingUnopenedBlock));
                }
                open = Some(self.switch(open.take(), TokenKind::BlockEnd)?);
                continue;
            }

            if matches!(c, '<' | '=' | '>' | '!' | '+' | '-' | '*' | '/' | '%' | '^') {
                // 连续两个斜杠切入注释模式
                if c == '/' && matches!(&open, Some((TokenKind::Operator, v)) if v == "/") {
                    open = None;
                    in_comment = true;
                    continue;
                }
                if let Some((TokenKind::Operator, value)) = &mut open {
                    value.push(c);
                } else {
                    let mut token = self.switch(open.take(), TokenKind::Operator)?;
                    token.1.push(c);
                    open = Some(token);
                }
                continue;
            }

            if c == '$' {
                if let Some((TokenKind::Variable, value)) = &mut open {
                    value.push(c);
                } else {
                    let mut token = self.switch(open.take(), TokenKind::Variable)?;
                    token.1.push(c);
                    open = Some(token);
                }
                continue;
            }

            if c == ':' {
                if let Some((TokenKind::Label, value)) = &mut open {
                    value.push(c);
                } else {
                    let mut token = self.switch(open.take(), TokenKind::Label)?;
                    token.1.push(c);
                    open = Some(token);
                }
                continue;
            }

            let open_kind = open.as_ref().map(|(kind, _)| *kind);

            if open_kind != Some(TokenKind::Reference)
                && (c.is_ascii_digit() || (c == '.' && open_kind == Some(TokenKind::Number)))
            {
                if open_kind != Some(TokenKind::Number) {
                    open = Some(self.switch(open.take(), TokenKind::Number)?);
                }
                if let Some((_, value)) = &mut open {
                    value.push(c);
                }
                continue;
            }

            if c == '.' || c == '_' || c.is_ascii_alphanumeric() {
                if open_kind != Some(TokenKind::Reference) {
                    open = Some(self.switch(open.take(), TokenKind::Reference)?);
                }
                if let Some((_, value)) = &mut open {
                    value.push(c);
                }
                continue;
            }

            if c == ';' {
                if open_kind != Some(TokenKind::StatementEnd) {
                    open = Some(self.switch(open.take(), TokenKind::StatementEnd)?);
                }
                continue;
            }

            return Err(self.fail(ErrorKind::UnexpectedCharacter(c)));
        }

        if self.nests > 0 {
            return Err(self.fail(ErrorKind::UnclosedOpenBlock));
        }
        if self.conditional {
            return Err(self.fail(ErrorKind::ConditionalWithoutStatement));
        }

        Ok(())
    }

    /// 关闭当前 token 并打开一个新的空 token
    fn switch(
        &mut self,
        open: Option<(TokenKind, String)>,
        kind: TokenKind,
    ) -> Result<(TokenKind, String), ScriptError> {
        if let Some((prev_kind, prev_value)) = open {
            self.close(prev_kind, prev_value, false)?;
        }
        self.after_comment = false;
        Ok((kind, String::new()))
    }

    /// token 关闭：重分类、合法性检查、装入语句，并在需要时收尾语句
    fn close(&mut self, kind: TokenKind, value: String, at_eof: bool) -> Result<(), ScriptError> {
        let mut kind = kind;
        let mut value = value;

        // 流程关键字由引用重分类而来
        if kind == TokenKind::Reference {
            let lower = value.to_lowercase();
            if FLOW_KEYWORDS.contains(&lower.as_str()) {
                kind = TokenKind::Flow;
                value = lower;
                if value == "if" {
                    self.conditional = true;
                }
            }
        }

        let pending = self.stmt.last().and_then(|t| match (t.kind, t.value.as_str()) {
            (TokenKind::Variable, "$") | (TokenKind::Label, ":") => Some(t.kind),
            _ => None,
        });

        if !self.stmt.is_empty() && kind == TokenKind::Label {
            return Err(self.fail(ErrorKind::LabelNotAlone));
        } else if let Some(placeholder) = pending {
            // 占位 token 后必须跟一个合法标识符
            if kind != TokenKind::Reference {
                let sigil = if placeholder == TokenKind::Variable { "$" } else { ":" };
                return Err(self.fail(ErrorKind::RequiredNameAfter(placeholder, sigil.to_string())));
            }
            value = value.to_lowercase();
            if !valid_identifier(&value) {
                return Err(self.fail(ErrorKind::InvalidName(placeholder)));
            }
            if placeholder == TokenKind::Label {
                if let Some(&existing) = self.labels.get(&value) {
                    let mut line_hint = String::from("unknown");
                    for k in (0..existing).rev() {
                        let first = &self.statements[k][0];
                        if first.kind == TokenKind::LineHint {
                            line_hint = first.value.clone();
                            break;
                        }
                    }
                    return Err(self.fail(ErrorKind::LabelAlreadyUsed(line_hint, value)));
                }
                self.labels.insert(value.clone(), self.statements.len());
            }
            if let Some(last) = self.stmt.last_mut() {
                last.value = value;
            }
        } else if kind == TokenKind::Operator && !operator_known(&value) {
            return Err(self.fail(ErrorKind::UnknownOperator(value)));
        } else if kind == TokenKind::StatementEnd && self.stmt.is_empty() && !self.after_comment {
            return Err(self.fail(ErrorKind::MissingStatement));
        } else if self.conditional && (kind == TokenKind::Label || kind == TokenKind::BlockEnd) {
            return Err(self.fail(ErrorKind::ConditionalFollowedBy(kind)));
        } else if kind != TokenKind::StatementEnd {
            self.stmt.push(Token::new(kind, value));
        }

        // 语句收尾
        if !self.stmt.is_empty()
            && matches!(
                kind,
                TokenKind::StatementEnd
                    | TokenKind::LineHint
                    | TokenKind::BlockStart
                    | TokenKind::BlockEnd
            )
        {
            if self.conditional
                && self.stmt[0].kind != TokenKind::LineHint
                && !(self.stmt[0].kind == TokenKind::Flow && self.stmt[0].value == "if")
            {
                self.conditional = false;
            }

            let merge_hint = kind == TokenKind::LineHint
                && matches!(self.statements.last(), Some(prev) if prev[0].kind == TokenKind::LineHint);
            if merge_hint {
                // 连续的行提示折叠成最新一条
                let hint = self.stmt[0].value.clone();
                if let Some(prev) = self.statements.last_mut() {
                    prev[0].value = hint;
                }
                self.stmt.clear();
            } else if !at_eof || kind != TokenKind::LineHint {
                self.statements.push(std::mem::take(&mut self.stmt));
            } else {
                // 文件尾的行提示直接丢弃
                self.stmt.clear();
            }
        }

        Ok(())
    }

    /// 语句是否以等待名字的标签占位结尾
    fn pending_label(&self) -> bool {
        matches!(self.stmt.last(), Some(t) if t.kind == TokenKind::Label && t.value == ":")
    }

    /// 未终结引用的报错种类按前一个 token 细化
    fn refined_kind(&self) -> TokenKind {
        match self.stmt.last() {
            Some(t) if t.kind == TokenKind::Label || t.kind == TokenKind::Variable => t.kind,
            _ => TokenKind::Reference,
        }
    }

    fn fail(&self, kind: ErrorKind) -> ScriptError {
        ScriptError::new(self.line, kind)
    }
}

fn valid_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
