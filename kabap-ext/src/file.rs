//! `file.*` 文件系统扩展
//!
//! 面向句柄的 API：`file.open` 打开或新建文件并选中句柄，其余操作都
//! 作用在当前句柄上。`file.handle` 可以在多个打开的文件之间切换。
//! reset 丢掉全部句柄。

use std::fs;
use std::io::{ErrorKind as IoErrorKind, Write as _};
use std::path::PathBuf;

use tracing::debug;

use kabap_core::{Extension, ReferenceMessage, ReferenceMessageResult, ReferenceMessageType};

const REFERENCE_PREFIX: &str = "file";

/// 写入时把 `\\` 先换成哨兵，避免和 `\n` 等序列互相干扰
const ESCAPE_SENTINEL: &str = "__!*DBLBCKSLSH()__";

/// 一个打开的文件
struct FileEntry {
    escaped: bool,
    created: bool,
    path: PathBuf,
}

/// 本地文件系统扩展，前缀 `file`
///
/// 危险能力：脚本将以引擎进程的权限操作文件。
pub struct FileExtension {
    /// 已打开的文件；关闭的句柄留下 None 占位
    files: Vec<Option<FileEntry>>,
    /// 当前句柄下标
    pointer: Option<usize>,
}

impl FileExtension {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            pointer: None,
        }
    }

    /// 当前句柄必须存在且未关闭
    fn current(&mut self) -> Result<&mut FileEntry, &'static str> {
        match self.pointer {
            None => Err("File not opened"),
            Some(pointer) => match self.files.get_mut(pointer) {
                Some(Some(entry)) => Ok(entry),
                _ => Err("File already closed"),
            },
        }
    }

    fn open(&mut self, message: &mut ReferenceMessage) {
        let path_text = message.value.trim().to_string();
        if path_text.is_empty() {
            message.value = "Filename cannot be empty".to_string();
            message.result = Some(ReferenceMessageResult::HandledFail);
            return;
        }

        let path = PathBuf::from(&path_text);
        let outcome = if path.exists() {
            match fs::File::open(&path) {
                Err(e) if e.kind() == IoErrorKind::PermissionDenied => {
                    Err("Read permission denied".to_string())
                }
                Err(e) => Err(e.to_string()),
                Ok(_) => {
                    if path.is_file() {
                        Ok(false)
                    } else {
                        Err("Path is not a file".to_string())
                    }
                }
            }
        } else {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => Ok(true),
                Err(e) if e.kind() == IoErrorKind::PermissionDenied => {
                    Err("Create permission denied".to_string())
                }
                Err(e) => Err(e.to_string()),
            }
        };

        match outcome {
            Ok(created) => {
                debug!(target: "kabap::extension", path = %path.display(), created, "file opened");
                self.files.push(Some(FileEntry {
                    escaped: false,
                    created,
                    path,
                }));
                self.pointer = Some(self.files.len() - 1);
                message.result = Some(ReferenceMessageResult::HandledOkay);
            }
            Err(error) => {
                message.value = error;
                message.result = Some(ReferenceMessageResult::HandledFail);
            }
        }
    }
}

impl Default for FileExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for FileExtension {
    fn register(&mut self, version: u32, _debug: bool) -> Option<String> {
        // 只认识第 1 版的扩展系统
        if version != 1 {
            return None;
        }
        Some(REFERENCE_PREFIX.to_string())
    }

    fn reset(&mut self) {
        self.files.clear();
        self.pointer = None;
    }

    fn handle(&mut self, mut message: ReferenceMessage) -> ReferenceMessage {
        use ReferenceMessageResult::{HandledFail, HandledOkay, Ignored};
        use ReferenceMessageType::{Read, Write};

        let name = message.name.to_lowercase();
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() != 2 {
            message.result = Some(Ignored);
            return message;
        }

        match (parts[1], message.message_type) {
            ("handle", Read) => {
                message.value = self.pointer.map(|p| p + 1).unwrap_or(0).to_string();
                message.result = Some(HandledOkay);
            }
            ("handle", Write) => {
                let requested = message.value.trim().parse::<i64>().unwrap_or(0);
                let valid = requested > 0
                    && (requested as usize) <= self.files.len()
                    && self.files[requested as usize - 1].is_some();
                if valid {
                    self.pointer = Some(requested as usize - 1);
                    message.result = Some(HandledOkay);
                } else {
                    message.value = "File handle invalid".to_string();
                    message.result = Some(HandledFail);
                }
            }
            ("escape", kind) => match self.current() {
                Ok(entry) => {
                    if kind == Read {
                        message.value = if entry.escaped { "1" } else { "0" }.to_string();
                    } else {
                        entry.escaped = message.value != "0";
                    }
                    message.result = Some(HandledOkay);
                }
                Err(error) => {
                    message.value = error.to_string();
                    message.result = Some(HandledFail);
                }
            },
            ("isnew", Read) => match self.current() {
                Ok(entry) => {
                    message.value = if entry.created { "1" } else { "0" }.to_string();
                    message.result = Some(HandledOkay);
                }
                Err(error) => {
                    message.value = error.to_string();
                    message.result = Some(HandledFail);
                }
            },
            ("size", Read) => match self.current() {
                Ok(entry) => {
                    message.value = fs::metadata(&entry.path)
                        .map(|meta| meta.len())
                        .unwrap_or(0)
                        .to_string();
                    message.result = Some(HandledOkay);
                }
                Err(error) => {
                    message.value = error.to_string();
                    message.result = Some(HandledFail);
                }
            },
            ("open", Write) => self.open(&mut message),
            ("close", Read) => match self.current() {
                Ok(_) => {
                    if let Some(pointer) = self.pointer {
                        self.files[pointer] = None;
                    }
                    message.value = "1".to_string();
                    message.result = Some(HandledOkay);
                }
                Err(error) => {
                    message.value = error.to_string();
                    message.result = Some(HandledFail);
                }
            },
            ("delete", Read) => match self.current() {
                Ok(entry) => match fs::remove_file(&entry.path) {
                    Ok(()) => {
                        if let Some(pointer) = self.pointer {
                            self.files[pointer] = None;
                        }
                        message.value = "1".to_string();
                        message.result = Some(HandledOkay);
                    }
                    Err(_) => {
                        message.value = "Unable to delete file".to_string();
                        message.result = Some(HandledFail);
                    }
                },
                Err(error) => {
                    message.value = error.to_string();
                    message.result = Some(HandledFail);
                }
            },
            ("read", Read) => match self.current() {
                Ok(entry) => match fs::read(&entry.path) {
                    Ok(bytes) => {
                        message.value = String::from_utf8_lossy(&bytes).into_owned();
                        message.result = Some(HandledOkay);
                    }
                    Err(_) => {
                        message.value = "File could not be read".to_string();
                        message.result = Some(HandledFail);
                    }
                },
                Err(error) => {
                    message.value = error.to_string();
                    message.result = Some(HandledFail);
                }
            },
            (key @ ("write" | "append"), Write) => match self.current() {
                Ok(entry) => {
                    let content = if entry.escaped {
                        unescape(&message.value)
                    } else {
                        message.value.clone()
                    };
                    let append = key == "append";
                    let opened = fs::OpenOptions::new()
                        .write(true)
                        .create(true)
                        .truncate(!append)
                        .append(append)
                        .open(&entry.path);
                    let written =
                        opened.and_then(|mut file| file.write_all(content.as_bytes()));
                    match written {
                        Ok(()) => message.result = Some(HandledOkay),
                        Err(e) => {
                            message.value = e.to_string();
                            message.result = Some(HandledFail);
                        }
                    }
                }
                Err(error) => {
                    message.value = error.to_string();
                    message.result = Some(HandledFail);
                }
            },
            _ => message.result = Some(Ignored),
        }

        message
    }

    fn identity(&self) -> Option<&str> {
        Some("FileExtension")
    }
}

/// 把 `\n` `\r` `\t` `\\` 字面序列换成真实字符
fn unescape(value: &str) -> String {
    value
        .replace("\\\\", ESCAPE_SENTINEL)
        .replace("\\n", "\n")
        .replace("\\r", "\r")
        .replace("\\t", "\t")
        .replace(ESCAPE_SENTINEL, "\\")
}
