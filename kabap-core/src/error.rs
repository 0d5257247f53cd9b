//! 错误类型
//!
//! 引擎对宿主不抛异常：第一个错误被渲染成 stderr 字符串并终止执行，
//! 这里的 Display 文本本身就是对外契约的一部分。

use thiserror::Error;

use crate::token::TokenKind;

/// 引擎错误种类，每个变体对应一条契约消息
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    // ==================== 语法（tokeniser）====================
    #[error("Unexpected character: {0}")]
    UnexpectedCharacter(char),

    #[error("Unterminated {}", .0.name())]
    Unterminated(TokenKind),

    #[error("Required {} after {}", .0.name(), .1)]
    RequiredNameAfter(TokenKind, String),

    #[error("Invalid {}, must start with a letter or underscore, and contain only letters, numbers and underscores", .0.name())]
    InvalidName(TokenKind),

    #[error("Label already used on line {0}: {1}")]
    LabelAlreadyUsed(String, String),

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Missing statement")]
    MissingStatement,

    #[error("A label must be in its own statement")]
    LabelNotAlone,

    #[error("A conditional cannot be followed by a {}", .0.name())]
    ConditionalFollowedBy(TokenKind),

    #[error("A conditional requires a statement after")]
    ConditionalWithoutStatement,

    #[error("Closing unopened block")]
    ClosingUnopenedBlock,

    #[error("Unclosed open block")]
    UnclosedOpenBlock,

    #[error("Cannot load tokens as a script")]
    TokensAsScript,

    // ==================== 引擎生命周期 ====================
    #[error("Optimisation level is out of bounds")]
    OptimiseLevelOutOfBounds,

    #[error("Script or tokens must be loaded before running")]
    NothingLoaded,

    #[error("No script or tokens have yet been loaded")]
    NothingToSave,

    // ==================== 语义（executor）====================
    #[error("Nothing can be after break")]
    TokensAfterBreak,

    #[error("Expected label after goto")]
    ExpectedLabelAfterGoto,

    #[error("Nothing can be after label")]
    TokensAfterLabel,

    #[error("Unknown label: {0}")]
    UnknownLabel(String),

    #[error("Only 1 assignment can be in a statement")]
    MultipleAssignments,

    #[error("Assignment expects 1 left-hand value")]
    AssignmentLeftCount,

    #[error("Assignment expects a right-hand value")]
    AssignmentMissingRight,

    #[error("Assignment left-hand value must be a variable or reference")]
    AssignmentLeftKind,

    #[error("Assignment cannot contain a {}", .0.name())]
    AssignmentContains(TokenKind),

    #[error("Assignment takes only one right-hand value")]
    AssignmentRightCount,

    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("Cannot read from a return")]
    ReadFromReturn,

    #[error("Cannot call from a return")]
    CallFromReturn,

    #[error("Missing left-hand operand before operator: {0}")]
    MissingLeftOperand(String),

    #[error("Missing right-hand operand after operator: {0}")]
    MissingRightOperand(String),

    #[error("Left-hand operand cannot be a {}", .0.name())]
    LeftOperandKind(TokenKind),

    #[error("Right-hand operand cannot be a {}", .0.name())]
    RightOperandKind(TokenKind),

    #[error("Missing if condition to be evaluated")]
    MissingIfCondition,

    #[error("Only 1 if condition can be evaluated")]
    MultipleIfConditions,

    #[error("An if condition cannot contain a {}", .0.name())]
    IfConditionContains(TokenKind),

    #[error("Could not find the end of a conditional block")]
    UnterminatedConditionalBlock,

    // ==================== 运行时 ====================
    #[error("Watchdog {0} ticks timeout, execution break")]
    WatchdogTimeout(i64),

    #[error("Reference not found: {0}")]
    ReferenceNotFound(String),

    #[error("Extension is broken (no error message given)")]
    ExtensionNoMessage,

    #[error("Extension is broken (invalid result value)")]
    ExtensionInvalidResult,

    #[error("Anonymous extensions cannot be removed")]
    AnonymousExtensionRemove,

    /// 扩展通过 HandledFail 自带的错误消息
    #[error("{0}")]
    Extension(String),
}

/// 带行号的引擎错误
///
/// 行号为 0 表示未知，Display 时不加前缀。
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    pub line: usize,
    pub kind: ErrorKind,
}

impl ScriptError {
    pub fn new(line: usize, kind: ErrorKind) -> Self {
        Self { line, kind }
    }

    /// 没有可用行号的错误
    pub fn bare(kind: ErrorKind) -> Self {
        Self { line: 0, kind }
    }
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.line > 0 {
            write!(f, "Line {}: {}", self.line, self.kind)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

impl std::error::Error for ScriptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}
