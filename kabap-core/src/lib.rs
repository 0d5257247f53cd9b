//! Kabap Core - 可嵌入的沙箱脚本引擎（纯逻辑，无 IO）
//!
//! 面向宿主应用内嵌的小脚本语言：终端用户写运费计算、价格规则这类
//! 小片段，引擎保证它们碰不到文件系统、网络和进程状态，除非宿主
//! 明确装上暴露这些能力的扩展。
//!
//! 唯一的数据类型是字符串，数值和布尔按需解码。执行管线三段：
//! tokeniser（单遍字符扫描）、optimiser（分级 token 流改写）、
//! executor（逐语句五趟求值）。解析结果可以用 `.kat` 格式持久化，
//! 跳过下次的解析开销。
//!
//! # 快速开始
//!
//! ```
//! use kabap_core::Kabap;
//!
//! let mut kabap = Kabap::new();
//! assert!(kabap.script("return = 2 + 2;"));
//! assert!(kabap.run());
//! assert_eq!(kabap.stdout(), "4");
//! ```
//!
//! 配置通过实例方法传入，没有全局状态；一个实例不支持并发使用。

pub mod engine;
pub mod error;
pub mod extension;
pub mod token;

pub(crate) mod executor;
pub(crate) mod kat;
pub(crate) mod lexer;
pub(crate) mod number;
pub(crate) mod optimiser;

// ==================== 核心导出 ====================

/// 引擎实例
pub use engine::Kabap;

/// 错误类型
pub use error::{ErrorKind, ScriptError};

/// 扩展协议
pub use extension::{
    Extension, ReferenceMessage, ReferenceMessageResult, ReferenceMessageType,
};

/// Token 模型
pub use token::{Program, Statement, Token, TokenKind};

/// 引擎主版本，扩展注册握手时会收到
pub const VERSION_MAJOR: u32 = 1;

/// 引擎次版本
pub const VERSION_MINOR: u32 = 0;
