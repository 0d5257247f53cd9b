//! Engine façade
//!
//! `Kabap` 是宿主拿在手里的那个对象：装载脚本或 token、执行、读写变量
//! 和配置、管理扩展。所有状态都挂在实例上，实例之间互不相干；同一个
//! 实例可以反复 run / reset / 换脚本回收使用。

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::error::{ErrorKind, ScriptError};
use crate::extension::{Extension, ExtensionRegistry, KabapExtension};
use crate::token::Program;
use crate::{kat, lexer, optimiser};

pub(crate) const DEFAULT_SCALE: i32 = 3;
pub(crate) const DEFAULT_WATCHDOG: i32 = 1000;

/// 负数恢复默认值
pub(crate) fn normalise_scale(scale: i32) -> i32 {
    if scale < 0 {
        DEFAULT_SCALE
    } else {
        scale
    }
}

/// Kabap 引擎实例
pub struct Kabap {
    pub(crate) program: Option<Program>,
    /// 脚本传入后直到成功 tokenise 为止都为真；失败时保住原始错误
    pub(crate) parse_pending: bool,
    pub(crate) variables: HashMap<String, String>,
    pub(crate) extensions: ExtensionRegistry,
    /// 内建扩展通过同一个句柄读写 scale
    pub(crate) scale: Rc<Cell<i32>>,
    pub(crate) watchdog: i32,
    /// 当前已知行号，0 表示未知
    pub(crate) line: usize,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

impl Default for Kabap {
    fn default() -> Self {
        Self::new()
    }
}

impl Kabap {
    /// 新实例，默认配置，内建扩展就位
    pub fn new() -> Self {
        let mut engine = Self {
            program: None,
            parse_pending: false,
            variables: HashMap::new(),
            extensions: ExtensionRegistry::default(),
            scale: Rc::new(Cell::new(DEFAULT_SCALE)),
            watchdog: DEFAULT_WATCHDOG,
            line: 0,
            stdout: String::new(),
            stderr: String::new(),
        };
        engine.extension_remove_all();
        engine
    }

    // ==================== 装载 ====================

    /// 解析并装载脚本（优化等级 1），不执行
    ///
    /// 失败时 stderr 带着原因，之后的 `run` 持续返回 false 并保留该错误。
    pub fn script(&mut self, source: &str) -> bool {
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        let source = source.replace("\r\n", "\n").replace('\r', "\n");

        // token 文件走 tokens_load，不能当脚本装
        let head: String = source.chars().take(64).collect();
        if head.to_lowercase().contains("kabap=tokens") {
            return self.fail(ScriptError::new(self.line, ErrorKind::TokensAsScript));
        }

        self.parse_pending = true;
        self.reset();
        self.scale.set(DEFAULT_SCALE);
        self.watchdog = DEFAULT_WATCHDOG;

        match lexer::tokenise(&source) {
            Ok(output) => {
                self.line = output.final_line;
                self.program = Some(output.program);
                self.parse_pending = false;
                match self.optimise_program(1) {
                    Ok(()) => true,
                    Err(e) => self.fail(e),
                }
            }
            Err(e) => {
                self.line = e.line;
                self.program = None;
                self.fail(e)
            }
        }
    }

    /// 绕过 tokeniser，直接装载 `.kat` 格式的预解析 token
    ///
    /// 头部的 scale 和 watchdog 会生效。这里只看速度不看健壮，坏文件
    /// 一律静默返回 false。
    pub fn tokens_load(&mut self, tokens: &str) -> bool {
        let kat = match kat::read(tokens) {
            Ok(kat) => kat,
            Err(e) => {
                debug!(target: "kabap::executor", error = %e, "tokens rejected");
                return false;
            }
        };

        self.reset();
        self.scale_set(kat.scale.unwrap_or(-1));
        self.watchdog_set(kat.watchdog.unwrap_or(-1));
        self.program = Some(kat.program);
        self.parse_pending = false;
        true
    }

    /// 按要求的优化等级序列化当前程序为 `.kat` 文本
    pub fn tokens_save(&mut self, optimise_level: i32) -> Option<String> {
        if self.program.is_none() {
            self.fail(ScriptError::new(self.line, ErrorKind::NothingToSave));
            return None;
        }

        if let Err(e) = self.optimise_program(optimise_level) {
            self.fail(e);
            return None;
        }

        let prefixes = self.extensions.prefixes();
        self.program.as_ref().map(|program| {
            kat::write(
                program,
                self.scale.get(),
                self.watchdog,
                optimise_level,
                &prefixes,
            )
        })
    }

    fn optimise_program(&mut self, level: i32) -> Result<(), ScriptError> {
        let line = self.line;
        match self.program.as_mut() {
            Some(program) => optimiser::optimise(program, level).map_err(|kind| ScriptError::new(line, kind)),
            None => Ok(()),
        }
    }

    // ==================== 生命周期 ====================

    /// 清空变量、stdout、stderr 并 reset 所有扩展；程序保持装载
    pub fn reset(&mut self) {
        self.line = 0;
        self.stdout.clear();
        self.stderr.clear();
        self.variables.clear();
        self.extensions.reset_all();
        debug!(target: "kabap::executor", "engine reset");
    }

    /// 执行当前程序
    ///
    /// 成功返回 true；失败返回 false 且 stderr 带着原因。执行状态不会
    /// 自动清零，变量和扩展跨 run 保留，需要时先 `reset`。
    pub fn run(&mut self) -> bool {
        if self.parse_pending {
            return false;
        }

        self.line = 0;
        self.stdout.clear();
        self.stderr.clear();

        if self.program.is_none() {
            return self.fail(ScriptError::bare(ErrorKind::NothingLoaded));
        }

        match self.execute_program() {
            Ok(()) => true,
            Err(e) => self.fail(e),
        }
    }

    /// 错误落到 stderr，统一返回 false
    pub(crate) fn fail(&mut self, error: ScriptError) -> bool {
        self.stderr = error.to_string();
        false
    }

    // ==================== 输出 ====================

    /// 脚本通过 `return =` 写出的内容
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// 第一个错误的文本，空串表示没有错误
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    // ==================== 变量 ====================

    pub fn variable_has(&self, key: &str) -> bool {
        self.variables.contains_key(key)
    }

    pub fn variable_get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    /// 宿主设置的键保留原样大小写；脚本总是按小写查
    pub fn variable_set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    pub fn variable_remove(&mut self, key: &str) {
        self.variables.remove(key);
    }

    pub fn variable_remove_all(&mut self) {
        self.variables.clear();
    }

    pub fn variable_store_get(&self) -> &HashMap<String, String> {
        &self.variables
    }

    pub fn variable_store_set(&mut self, variables: HashMap<String, String>) {
        self.variables = variables;
    }

    // ==================== 配置 ====================

    pub fn scale_get(&self) -> i32 {
        self.scale.get()
    }

    /// 数学结果保留的小数位；负数恢复默认 3
    pub fn scale_set(&mut self, scale: i32) {
        self.scale.set(normalise_scale(scale));
    }

    pub fn watchdog_get(&self) -> i32 {
        self.watchdog
    }

    /// 语句迭代上限；0 关闭看门狗，负数恢复默认 1000
    pub fn watchdog_set(&mut self, limit: i32) {
        self.watchdog = if limit < 0 { DEFAULT_WATCHDOG } else { limit };
    }

    // ==================== 扩展 ====================

    /// 注册扩展并完成握手；拒绝注册或身份重复返回 false
    pub fn extension_add(&mut self, extension: Box<dyn Extension>) -> bool {
        let debug = self.debug_enabled();
        self.extensions.add(extension, debug)
    }

    /// 按身份移除扩展；匿名扩展只能靠 `extension_remove_all`
    pub fn extension_remove(&mut self, extension: &dyn Extension) -> bool {
        match extension.identity() {
            None => {
                self.fail(ScriptError::new(
                    self.line,
                    ErrorKind::AnonymousExtensionRemove,
                ));
                false
            }
            Some(identity) => self.extensions.remove(identity),
        }
    }

    /// 清空扩展并重新装上内建扩展
    pub fn extension_remove_all(&mut self) {
        self.extensions.clear();
        let builtin = KabapExtension::new(self.scale.clone());
        let debug = self.debug_enabled();
        self.extensions.add(Box::new(builtin), debug);
    }

    fn debug_enabled(&self) -> bool {
        tracing::enabled!(target: "kabap::extension", tracing::Level::DEBUG)
    }
}
