//! Kabap CLI
//!
//! `kabap <sourcefile>` 执行一段脚本，stdout/stderr 原样透出。退出码：
//! 0 成功，1 脚本错误，2 帮助/版本/误用，3 文件不存在，4 文件其它
//! 错误，13 文件权限不足。

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process;

use clap::Parser;

use kabap_core::{Kabap, VERSION_MAJOR, VERSION_MINOR};
use kabap_ext::{FileExtension, NetExtension};

mod logging;

/// 内置示例脚本，`--hello` 时执行
const HELLO_SCRIPT: &str = "$answer = 2 + 2;\nreturn = \"Hello world! 2+2=\" << $answer;";

#[derive(Parser)]
#[command(
    name = "kabap",
    about = "Kabap scripting language",
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Cli {
    /// Kabap script to execute
    #[arg(value_name = "SOURCEFILE")]
    sourcefile: Option<PathBuf>,

    /// Show this help
    #[arg(long)]
    help: bool,

    /// Show version information
    #[arg(long = "v")]
    version: bool,

    /// Run internal example script
    #[arg(long)]
    hello: bool,

    /// Enable engine debug logging
    #[arg(long)]
    debug: bool,
}

fn main() {
    process::exit(run_cli());
}

fn run_cli() -> i32 {
    let cli = Cli::parse();
    logging::init(cli.debug);

    let misuse = cli.sourcefile.is_none() && !cli.hello;
    if cli.version || cli.help || misuse {
        println!("Kabap for Rust (v {VERSION_MAJOR}.{VERSION_MINOR})");
        println!();
        if cli.help || misuse {
            println!("Usage:  kabap sourcefile");
            println!("        (to execute a Kabap script)");
            println!();
            println!("Options:");
            println!("    --help     Show this help");
            println!("       --v     Show version information");
            println!("   --hello     Run internal example script");
            println!("   --debug     Enable engine debug logging");
        }
        return 2;
    }

    let source = if cli.hello {
        HELLO_SCRIPT.to_string()
    } else {
        let Some(path) = cli.sourcefile else {
            return 2;
        };
        if !path.exists() {
            eprintln!("File does not exist: {}", path.display());
            return 3;
        }
        match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                eprintln!("File read permission denied: {}", path.display());
                return 13;
            }
            Err(_) => {
                eprintln!("File unknown error: {}", path.display());
                return 4;
            }
        }
    };

    execute(&source)
}

/// 跑脚本并把引擎输出透给 shell
fn execute(source: &str) -> i32 {
    let mut kabap = Kabap::new();
    kabap.extension_add(Box::new(FileExtension::new()));
    kabap.extension_add(Box::new(NetExtension::new()));

    let success = kabap.script(source) && kabap.run();

    if !kabap.stdout().is_empty() {
        println!("{}", kabap.stdout());
    }
    if !kabap.stderr().is_empty() {
        eprintln!("{}", kabap.stderr());
    }

    if success {
        0
    } else {
        1
    }
}
