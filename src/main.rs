//! Tailord 命令行对话
//!
//! 入口：初始化日志、加载配置、构建 Agent，然后逐行读取用户输入。
//! /reset 清空历史，/exit 或 /quit 退出。

use anyhow::Context;
use tailord::config::load_config;
use tailord::{observability, ChatTurn, ShoppingAgent};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const CLI_SESSION: &str = "cli";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let agent = ShoppingAgent::from_config(&cfg);

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    stdout
        .write_all(b"Tailord stylist. Type /reset to start over, /exit to quit.\n")
        .await?;

    loop {
        stdout.write_all(b"\nyou> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/exit" | "/quit" => break,
            "/reset" => {
                agent.sessions().acquire(CLI_SESSION).await?.history.reset();
                stdout.write_all(b"(history cleared)\n").await?;
                continue;
            }
            _ => {}
        }

        match agent.chat(ChatTurn::new(CLI_SESSION, input)).await {
            Ok(r) => {
                stdout
                    .write_all(format!("tailord> {}\n", r.reply).as_bytes())
                    .await?
            }
            Err(e) => {
                tracing::error!(error = %e, "turn failed");
                stdout.write_all(format!("[error] {e}\n").as_bytes()).await?;
            }
        }
    }

    Ok(())
}
