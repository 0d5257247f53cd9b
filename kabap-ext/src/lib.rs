//! Kabap 示例扩展
//!
//! 引擎核心碰不到文件系统和网络；这两个扩展把这些能力按引用前缀
//! 暴露给脚本，由宿主决定装不装。两者都属于危险能力：
//!
//! - [`FileExtension`]（前缀 `file`）：脚本以引擎进程的权限读写本地
//!   文件。引擎跑在比用户更高的安全上下文里时等于送出提权。
//! - [`NetExtension`]（前缀 `net`）：脚本可以对外发 HTTP 请求，请求
//!   本身就携带数据外发；和 file 扩展组合起来能把本地磁盘内容送到
//!   远端。
//!
//! # 用法
//!
//! ```no_run
//! use kabap_core::Kabap;
//! use kabap_ext::FileExtension;
//!
//! let mut kabap = Kabap::new();
//! kabap.extension_add(Box::new(FileExtension::new()));
//! kabap.script("file.open = \"out.txt\"; file.write = \"hi\"; return = file.size;");
//! kabap.run();
//! ```

mod file;
mod net;

pub use file::FileExtension;
pub use net::NetExtension;
