//! `net.*` 网络扩展
//!
//! 一次暂存一个请求：脚本先设置 method / url / header / data，读
//! `net.request` 触发请求，随后从 `net.status` 和 `net.response` 取
//! 结果。reset 或 `net.reset` 清空全部暂存。

use std::io::Read as _;
use std::time::Duration;

use tracing::debug;
use ureq::Agent;

use kabap_core::{Extension, ReferenceMessage, ReferenceMessageResult, ReferenceMessageType};

const REFERENCE_PREFIX: &str = "net";

const HTTP_TIMEOUT_CONNECT: Duration = Duration::from_millis(5000);
const HTTP_TIMEOUT_READ: Duration = Duration::from_millis(20000);

/// 响应体读取上限
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

/// 网络访问扩展，前缀 `net`
///
/// 危险能力：请求本身就是数据外发通道。
pub struct NetExtension {
    requested: bool,
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    post_data: String,
    response_code: i32,
    response_data: String,
}

impl NetExtension {
    pub fn new() -> Self {
        Self {
            requested: false,
            method: "GET".to_string(),
            url: String::new(),
            headers: Vec::new(),
            post_data: String::new(),
            response_code: -1,
            response_data: String::new(),
        }
    }

    /// 请求必须发生过才能读结果
    fn check_requested(&self, message: &mut ReferenceMessage) -> bool {
        if !self.requested {
            message.value = "Network request has not been made yet".to_string();
            message.result = Some(ReferenceMessageResult::HandledFail);
            return false;
        }
        true
    }

    fn perform_request(&mut self, message: &mut ReferenceMessage) {
        if self.url.is_empty() {
            message.value = "URL has not been set".to_string();
            message.result = Some(ReferenceMessageResult::HandledFail);
            return;
        }

        self.response_code = -1;
        self.response_data = String::new();
        self.requested = true;

        let agent: Agent = ureq::AgentBuilder::new()
            .timeout_connect(HTTP_TIMEOUT_CONNECT)
            .timeout_read(HTTP_TIMEOUT_READ)
            .redirects(5)
            .build();

        let mut request = agent.request(&self.method, &self.url);
        for (key, value) in &self.headers {
            request = request.set(key, value);
        }

        let outcome = if self.method == "POST" && !self.post_data.is_empty() {
            request.send_string(&self.post_data)
        } else {
            request.call()
        };

        debug!(target: "kabap::extension", url = %self.url, method = %self.method, "request performed");

        match outcome {
            Ok(response) => {
                self.response_code = response.status() as i32;
                self.response_data = read_body(response);
                message.value = "1".to_string();
                message.result = Some(ReferenceMessageResult::HandledOkay);
            }
            // 非 2xx 也算收到响应，响应体照常可读
            Err(ureq::Error::Status(code, response)) => {
                self.response_code = code as i32;
                self.response_data = read_body(response);
                message.value = "1".to_string();
                message.result = Some(ReferenceMessageResult::HandledOkay);
            }
            Err(ureq::Error::Transport(e)) => {
                message.value = format!("I/O exception: {e}");
                message.result = Some(ReferenceMessageResult::HandledFail);
            }
        }
    }
}

impl Default for NetExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for NetExtension {
    fn register(&mut self, version: u32, _debug: bool) -> Option<String> {
        // 只认识第 1 版的扩展系统
        if version != 1 {
            return None;
        }
        Some(REFERENCE_PREFIX.to_string())
    }

    fn reset(&mut self) {
        *self = Self::new();
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
            ("reset", Read) => {
                self.reset();
                message.value = "1".to_string();
                message.result = Some(HandledOkay);
            }
            ("method", Read) => {
                message.value = self.method.clone();
                message.result = Some(HandledOkay);
            }
            ("method", Write) => {
                let requested = message.value.to_uppercase();
                if requested == "GET" || requested == "POST" {
                    self.method = requested;
                    message.result = Some(HandledOkay);
                } else {
                    message.value = "Method must be GET or POST".to_string();
                    message.result = Some(HandledFail);
                }
            }
            ("url", Read) => {
                message.value = self.url.clone();
                message.result = Some(HandledOkay);
            }
            ("url", Write) => {
                self.url = message.value.trim().to_string();
                message.result = Some(HandledOkay);
            }
            ("data", Read) => {
                message.value = self.post_data.clone();
                message.result = Some(HandledOkay);
            }
            ("data", Write) => {
                self.post_data = message.value.clone();
                message.result = Some(HandledOkay);
            }
            ("header", Write) => {
                let pieces: Vec<&str> = message.value.trim().split(':').collect();
                if pieces.len() != 2 {
                    message.value = "A header can contain only 1 colon".to_string();
                    message.result = Some(HandledFail);
                } else if pieces[0].trim().is_empty() {
                    message.value = "Header key cannot be empty".to_string();
                    message.result = Some(HandledFail);
                } else if pieces[1].trim().is_empty() {
                    message.value = "Header value cannot be empty".to_string();
                    message.result = Some(HandledFail);
                } else {
                    self.headers
                        .push((pieces[0].trim().to_string(), pieces[1].trim().to_string()));
                    message.value = "1".to_string();
                    message.result = Some(HandledOkay);
                }
            }
            ("status", Read) => {
                if self.check_requested(&mut message) {
                    message.value = self.response_code.to_string();
                    message.result = Some(HandledOkay);
                }
            }
            ("response", Read) => {
                if self.check_requested(&mut message) {
                    message.value = self.response_data.clone();
                    message.result = Some(HandledOkay);
                }
            }
            ("request", Read) => self.perform_request(&mut message),
            _ => message.result = Some(Ignored),
        }

        message
    }

    fn identity(&self) -> Option<&str> {
        Some("NetExtension")
    }
}

fn read_body(response: ureq::Response) -> String {
    let mut body = String::new();
    let _ = response
        .into_reader()
        .take(MAX_RESPONSE_SIZE)
        .read_to_string(&mut body);
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use kabap_core::Kabap;

    fn engine_with_net() -> Kabap {
        let mut kabap = Kabap::new();
        assert!(kabap.extension_add(Box::new(NetExtension::new())));
        kabap
    }

    fn run(kabap: &mut Kabap, source: &str) -> (bool, String, String) {
        assert!(kabap.script(source), "parse failed: {}", kabap.stderr());
        let ok = kabap.run();
        (ok, kabap.stdout().to_string(), kabap.stderr().to_string())
    }

    #[test]
    fn test_register_declines_other_versions() {
        let mut extension = NetExtension::new();
        assert_eq!(extension.register(1, false), Some("net".to_string()));
        assert_eq!(extension.register(3, false), None);
    }

    #[test]
    fn test_method_defaults_to_get() {
        let mut kabap = engine_with_net();
        let (ok, stdout, stderr) = run(&mut kabap, "return = net.method;");
        assert!(ok, "{stderr}");
        assert_eq!(stdout, "GET");
    }

    #[test]
    fn test_method_validation() {
        let mut kabap = engine_with_net();
        let (ok, stdout, stderr) = run(&mut kabap, "net.method = \"post\";\nreturn = net.method;");
        assert!(ok, "{stderr}");
        assert_eq!(stdout, "POST");

        let (ok, _, stderr) = run(&mut kabap, "net.method = \"PATCH\";");
        assert!(!ok);
        assert_eq!(stderr, "Line 1: Method must be GET or POST");
    }

    #[test]
    fn test_url_and_data_round_trip() {
        let mut kabap = engine_with_net();
        let source = "net.url = \" https1.example \";\nnet.data = \"k=v\";\nreturn = net.url << \"|\" << net.data;";
        let (ok, stdout, stderr) = run(&mut kabap, source);
        assert!(ok, "{stderr}");
        assert_eq!(stdout, "https1.example|k=v");
    }

    #[test]
    fn test_header_validation() {
        let mut kabap = engine_with_net();

        let (ok, _, stderr) = run(&mut kabap, "net.header = \"Too:Many:Colons\";");
        assert!(!ok);
        assert_eq!(stderr, "Line 1: A header can contain only 1 colon");

        let (ok, _, stderr) = run(&mut kabap, "net.header = \": value\";");
        assert!(!ok);
        assert_eq!(stderr, "Line 1: Header key cannot be empty");

        let (ok, _, stderr) = run(&mut kabap, "net.header = \"Accept: \";");
        assert!(!ok);
        assert_eq!(stderr, "Line 1: Header value cannot be empty");

        let (ok, _, stderr) = run(&mut kabap, "net.header = \"Accept: text\";\nreturn = net.method;");
        assert!(ok, "{stderr}");
    }

    #[test]
    fn test_header_is_write_only() {
        let mut kabap = engine_with_net();
        let (ok, _, stderr) = run(&mut kabap, "$r = net.header;");
        assert!(!ok);
        assert_eq!(stderr, "Line 1: Reference not found: net.header");
    }

    #[test]
    fn test_request_without_url() {
        let mut kabap = engine_with_net();
        let (ok, _, stderr) = run(&mut kabap, "return = net.request;");
        assert!(!ok);
        assert_eq!(stderr, "Line 1: URL has not been set");
    }

    #[test]
    fn test_status_before_request() {
        let mut kabap = engine_with_net();
        let (ok, _, stderr) = run(&mut kabap, "return = net.status;");
        assert!(!ok);
        assert_eq!(stderr, "Line 1: Network request has not been made yet");
    }

    #[test]
    fn test_net_reset_clears_staging() {
        let mut kabap = engine_with_net();
        let source = "net.method = \"POST\";\n$ok = net.reset;\nreturn = net.method;";
        let (ok, stdout, stderr) = run(&mut kabap, source);
        assert!(ok, "{stderr}");
        assert_eq!(stdout, "GET");
    }

    #[test]
    fn test_unknown_key_ignored() {
        let mut kabap = engine_with_net();
        let (ok, _, stderr) = run(&mut kabap, "return = net.teleport;");
        assert!(!ok);
        assert_eq!(stderr, "Line 1: Reference not found: net.teleport");
    }
}
