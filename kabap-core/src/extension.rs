//! 扩展协议与注册表
//!
//! 扩展是宿主交给引擎的能力对象：注册时返回一个引用前缀（空串表示
//! 兜底），执行期通过 `ReferenceMessage` 收发 READ/WRITE。注册表按前缀
//! 分桶，桶内按插入顺序派发；没接住的消息落到 `*` 兜底桶。

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use rand::Rng;
use tracing::{debug, trace};

use crate::engine::normalise_scale;
use crate::error::ErrorKind;
use crate::number;
use crate::{VERSION_MAJOR, VERSION_MINOR};

/// 兜底桶的保留键
pub(crate) const CATCH_ALL: &str = "*";

/// 消息方向，以调用方（脚本）视角命名
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceMessageType {
    Read,
    Write,
}

/// 消息处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceMessageResult {
    /// 没接住，传给下一个扩展
    Ignored,
    /// 处理成功，`value` 是结果
    HandledOkay,
    /// 处理失败，`value` 是错误消息
    HandledFail,
}

/// 引擎与扩展之间传递的消息
pub struct ReferenceMessage {
    /// READ 还是 WRITE
    pub message_type: ReferenceMessageType,
    /// 处理结果；扩展必须设置，留空视为扩展损坏
    pub result: Option<ReferenceMessageResult>,
    /// 完整引用名，通常是 `前缀.键`
    pub name: String,
    /// WRITE 时带着 RValue，READ 时由扩展填入结果
    pub value: String,
    /// 扩展之间自由使用的挂载点
    pub custom: Option<Box<dyn Any>>,
}

impl ReferenceMessage {
    pub fn new(
        message_type: ReferenceMessageType,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            message_type,
            result: None,
            name: name.into(),
            value: value.into(),
            custom: None,
        }
    }
}

/// 扩展能力接口
pub trait Extension {
    /// 注册握手：返回引用前缀（空串表示兜底），或 `None` 拒绝注册
    fn register(&mut self, version: u32, debug: bool) -> Option<String>;

    /// 引擎 reset 时的清理钩子
    fn reset(&mut self);

    /// 消息处理，必须把消息（通常是同一个）带着结果还回来
    fn handle(&mut self, message: ReferenceMessage) -> ReferenceMessage;

    /// 稳定身份标识；`None` 表示匿名，匿名扩展不能被单独移除
    fn identity(&self) -> Option<&str> {
        None
    }
}

/// 前缀到扩展列表的注册表，桶和桶内都保持插入顺序
#[derive(Default)]
pub(crate) struct ExtensionRegistry {
    buckets: Vec<(String, Vec<Box<dyn Extension>>)>,
}

impl ExtensionRegistry {
    /// 注册握手；重复身份或拒绝注册都返回 false
    pub(crate) fn add(&mut self, mut extension: Box<dyn Extension>, debug: bool) -> bool {
        if let Some(identity) = extension.identity() {
            let duplicate = self
                .buckets
                .iter()
                .flat_map(|(_, extensions)| extensions.iter())
                .any(|existing| existing.identity() == Some(identity));
            if duplicate {
                debug!(target: "kabap::extension", identity, "extension already added, skipping");
                return false;
            }
        }

        let prefix = match extension.register(VERSION_MAJOR, debug) {
            None => {
                debug!(target: "kabap::extension", "extension chose not to be added");
                return false;
            }
            Some(prefix) if prefix.is_empty() => CATCH_ALL.to_string(),
            Some(prefix) => prefix.to_lowercase(),
        };

        debug!(target: "kabap::extension", prefix = %prefix, "extension added");
        match self.buckets.iter_mut().find(|(key, _)| *key == prefix) {
            Some((_, extensions)) => extensions.push(extension),
            None => self.buckets.push((prefix, vec![extension])),
        }
        true
    }

    /// 按身份移除；空桶随之消失
    pub(crate) fn remove(&mut self, identity: &str) -> bool {
        let mut removed = false;
        for (_, extensions) in &mut self.buckets {
            if let Some(index) = extensions
                .iter()
                .position(|e| e.identity() == Some(identity))
            {
                extensions.remove(index);
                removed = true;
                break;
            }
        }
        self.buckets.retain(|(_, extensions)| !extensions.is_empty());
        removed
    }

    pub(crate) fn clear(&mut self) {
        self.buckets.clear();
    }

    /// reset 扇出到每一个扩展
    pub(crate) fn reset_all(&mut self) {
        for (_, extensions) in &mut self.buckets {
            for extension in extensions {
                extension.reset();
            }
        }
    }

    /// 注册顺序的前缀列表，内建扩展不露出
    pub(crate) fn prefixes(&self) -> Vec<String> {
        self.buckets
            .iter()
            .map(|(key, _)| key.clone())
            .filter(|key| key != "kabap")
            .collect()
    }

    /// 派发一次引用访问：先前缀桶，再兜底桶，都没有就是未知引用
    pub(crate) fn dispatch(
        &mut self,
        message_type: ReferenceMessageType,
        name: &str,
        value: Option<&str>,
    ) -> Result<String, ErrorKind> {
        trace!(target: "kabap::extension", name, ?message_type, "dispatching reference");

        let prefix = name
            .split('.')
            .next()
            .unwrap_or(name)
            .to_lowercase();

        for key in [prefix.as_str(), CATCH_ALL] {
            let Some((_, extensions)) = self.buckets.iter_mut().find(|(k, _)| k == key) else {
                continue;
            };

            let mut message =
                ReferenceMessage::new(message_type, name, value.unwrap_or_default());
            for extension in extensions {
                message = extension.handle(message);
                match message.result {
                    Some(ReferenceMessageResult::Ignored) => continue,
                    Some(ReferenceMessageResult::HandledOkay) => return Ok(message.value),
                    Some(ReferenceMessageResult::HandledFail) => {
                        return Err(if message.value.is_empty() {
                            ErrorKind::ExtensionNoMessage
                        } else {
                            ErrorKind::Extension(message.value)
                        });
                    }
                    None => return Err(ErrorKind::ExtensionInvalidResult),
                }
            }
        }

        Err(ErrorKind::ReferenceNotFound(name.to_string()))
    }
}

/// 内建扩展，前缀 `kabap`
///
/// 提供 `kabap.version`（只读）、`kabap.scale`（读写）和
/// `kabap.random`（只读，0..10000）。
pub(crate) struct KabapExtension {
    scale: Rc<Cell<i32>>,
}

impl KabapExtension {
    pub(crate) fn new(scale: Rc<Cell<i32>>) -> Self {
        Self { scale }
    }
}

impl Extension for KabapExtension {
    fn register(&mut self, _version: u32, _debug: bool) -> Option<String> {
        Some("kabap".to_string())
    }

    fn reset(&mut self) {}

    fn handle(&mut self, mut message: ReferenceMessage) -> ReferenceMessage {
        let name = message.name.to_lowercase();
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() != 2 {
            message.result = Some(ReferenceMessageResult::Ignored);
            return message;
        }

        match parts[1] {
            "version" => {
                if message.message_type == ReferenceMessageType::Read {
                    message.value = format!("{VERSION_MAJOR}.{VERSION_MINOR}");
                    message.result = Some(ReferenceMessageResult::HandledOkay);
                } else {
                    message.value = format!("{} is read only", message.name);
                    message.result = Some(ReferenceMessageResult::HandledFail);
                }
            }
            "scale" => {
                match message.message_type {
                    ReferenceMessageType::Write => {
                        let requested = number::extract(&message.value, -1.0) as i32;
                        self.scale.set(normalise_scale(requested));
                    }
                    ReferenceMessageType::Read => {
                        message.value = self.scale.get().to_string();
                    }
                }
                message.result = Some(ReferenceMessageResult::HandledOkay);
            }
            "random" => {
                if message.message_type == ReferenceMessageType::Read {
                    message.value = rand::thread_rng().gen_range(0..10000).to_string();
                    message.result = Some(ReferenceMessageResult::HandledOkay);
                } else {
                    message.value = format!("{} is read only", message.name);
                    message.result = Some(ReferenceMessageResult::HandledFail);
                }
            }
            _ => {
                message.result = Some(ReferenceMessageResult::Ignored);
            }
        }

        message
    }

    fn identity(&self) -> Option<&str> {
        Some("kabap")
    }
}
