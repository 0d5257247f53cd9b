//! 端到端测试辅助
//!
//! `TestExtension` 是测试专用的 `test.*` 扩展：一个内存键值池，加上
//! 几个固定应答的键，用来验证注册、派发和链式处理。

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use kabap_core::{
    Extension, Kabap, ReferenceMessage, ReferenceMessageResult, ReferenceMessageType,
};

pub const TEST_PREFIX: &str = "test";

/// `test.*` 键值池扩展
pub struct TestExtension {
    store: HashMap<String, String>,
}

impl TestExtension {
    pub fn new() -> Self {
        let mut extension = Self {
            store: HashMap::new(),
        };
        extension.seed();
        extension
    }

    fn seed(&mut self) {
        self.store.clear();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis().to_string())
            .unwrap_or_default();
        self.store.insert("instantiated".to_string(), now);
        self.store.insert("foo".to_string(), "bar".to_string());
    }
}

impl Default for TestExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for TestExtension {
    fn register(&mut self, version: u32, _debug: bool) -> Option<String> {
        // 只认识第 1 版的扩展系统
        if version != 1 {
            return None;
        }
        Some(TEST_PREFIX.to_string())
    }

    fn reset(&mut self) {
        self.seed();
    }

    fn handle(&mut self, mut message: ReferenceMessage) -> ReferenceMessage {
        let name = message.name.to_lowercase();
        let parts: Vec<&str> = name.split('.').collect();

        if !name.starts_with("test.") {
            message.value = format!("TestExtension requires references to start with: {TEST_PREFIX}.");
            message.result = Some(ReferenceMessageResult::HandledFail);
        } else if parts.len() != 2 {
            message.value = "TestExtension requires references to have only 1 dot".to_string();
            message.result = Some(ReferenceMessageResult::HandledFail);
        } else if name == "test.duplicate" {
            message.value.push_str("ALPHA ");
            message.result = Some(ReferenceMessageResult::HandledOkay);
        } else if name == "test.duplicatea" {
            message.value = "TestExtension".to_string();
            message.result = Some(ReferenceMessageResult::HandledOkay);
        } else if name == "test.duplicateb" || name == "test.duplicatec" {
            message.result = Some(ReferenceMessageResult::Ignored);
        } else if name == "test.a" {
            message.value = "Pass".to_string();
            message.result = Some(ReferenceMessageResult::HandledOkay);
        } else if name == "test.immutable" {
            if message.message_type == ReferenceMessageType::Write {
                message.value = format!("{TEST_PREFIX}.immutable is immutable");
                message.result = Some(ReferenceMessageResult::HandledFail);
            } else {
                message.value = "let it=go;".to_string();
                message.result = Some(ReferenceMessageResult::HandledOkay);
            }
        } else {
            match message.message_type {
                ReferenceMessageType::Read => {
                    message.value = self.store.get(parts[1]).cloned().unwrap_or_default();
                    message.result = Some(ReferenceMessageResult::HandledOkay);
                }
                ReferenceMessageType::Write => {
                    self.store.insert(parts[1].to_string(), message.value.clone());
                    message.result = Some(ReferenceMessageResult::HandledOkay);
                }
            }
        }

        message
    }

    fn identity(&self) -> Option<&str> {
        Some("TestExtension")
    }
}

/// 跑一段脚本，返回 (成功, stdout, stderr)
#[allow(dead_code)]
pub fn run_script(source: &str) -> (bool, String, String) {
    let mut kabap = Kabap::new();
    if !kabap.script(source) {
        return (false, kabap.stdout().to_string(), kabap.stderr().to_string());
    }
    let ok = kabap.run();
    (ok, kabap.stdout().to_string(), kabap.stderr().to_string())
}

/// 跑一段脚本并断言成功，返回 stdout
#[allow(dead_code)]
pub fn run_ok(source: &str) -> String {
    let (ok, stdout, stderr) = run_script(source);
    assert!(ok, "script failed: {stderr}");
    stdout
}
