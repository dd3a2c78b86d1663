//! Paramodus - 多角色对话助手
//!
//! 入口：初始化日志、加载配置与凭据、创建编排器，并运行行式对话循环。
//! 以 `/` 开头的输入为命令（/help 查看），其余作为一个用户回合提交。

use std::io::Write;

use anyhow::Context;
use crossterm::style::Stylize;
use paramodus::{
    config::{load_config, AppConfig, Credentials},
    core::{Analysis, Orchestrator, SessionState},
    observability,
    render::{segment, write_message, write_segments},
};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "Commands:
  /tasks              list tasks
  /add <text>         add a manual task
  /done <n>           toggle task n
  /rm <n>             delete task n
  /clear-tasks        delete all tasks
  /extract [text]     extract tasks from text (default: last prompt)
  /personality [text] personality analysis (default: last prompt)
  /doc <path>         use a text file as document context
  /doc                drop the document context
  /new                start a new conversation
  /quit               exit";

fn notice(msg: &str) {
    println!("{}", msg.yellow());
}

fn print_tasks(state: &SessionState) {
    if state.tasks().is_empty() {
        println!("No tasks yet. Start chatting to extract tasks!");
        return;
    }
    for (i, task) in state.tasks().iter().enumerate() {
        let mark = if task.completed { "x" } else { " " };
        println!("{:>3}. [{}] {}", i + 1, mark, task.text());
    }
    println!("{} pending", state.pending_tasks());
}

fn parse_index(arg: &str) -> Option<usize> {
    arg.trim().parse::<usize>().ok().and_then(|n| n.checked_sub(1))
}

/// 处理一条命令；返回 false 表示退出
async fn handle_command(
    orch: &Orchestrator,
    state: &mut SessionState,
    last_prompt: &mut Option<String>,
    line: &str,
) -> bool {
    let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
    let arg = arg.trim();
    match cmd {
        "/quit" | "/exit" => return false,
        "/help" => println!("{}", HELP),
        "/tasks" => print_tasks(state),
        "/add" => match state.add_manual_task(arg) {
            Ok(task) => println!("Added: {}", task.text()),
            Err(e) => notice(&e.to_string()),
        },
        "/done" => match parse_index(arg).map(|i| state.toggle_task(i)) {
            Some(Ok(done)) => println!("{}", if done { "Completed" } else { "Reopened" }),
            Some(Err(e)) => notice(&e.to_string()),
            None => notice("usage: /done <n>"),
        },
        "/rm" => match parse_index(arg).map(|i| state.remove_task(i)) {
            Some(Ok(task)) => println!("Deleted: {}", task.text()),
            Some(Err(e)) => notice(&e.to_string()),
            None => notice("usage: /rm <n>"),
        },
        "/clear-tasks" => state.clear_tasks(),
        "/extract" | "/personality" => {
            let text = if arg.is_empty() {
                last_prompt.clone()
            } else {
                Some(arg.to_string())
            };
            let Some(text) = text else {
                notice("Nothing to analyze yet");
                return true;
            };
            if cmd == "/extract" {
                match orch.extract_tasks(state, &text).await {
                    Analysis::Completed(extraction) => {
                        print_rendered(&extraction.raw);
                        println!("{} new task(s)", extraction.added.len());
                    }
                    Analysis::Failed(msg) => notice(&msg),
                }
            } else {
                match orch.analyze_personality(state, &text).await {
                    Analysis::Completed(content) => print_rendered(&content),
                    Analysis::Failed(msg) => notice(&msg),
                }
            }
        }
        "/doc" if arg.is_empty() => {
            state.clear_document_context();
            println!("Document context dropped");
        }
        "/doc" => match std::fs::read_to_string(arg) {
            Ok(text) => {
                state.set_document_context(text);
                println!("Document loaded");
            }
            Err(e) => notice(&format!("Failed to read {}: {}", arg, e)),
        },
        "/new" => {
            orch.new_conversation(state);
            *last_prompt = None;
            println!("New conversation started");
        }
        _ => notice("Unknown command, try /help"),
    }
    true
}

fn print_rendered(content: &str) {
    let mut out = std::io::stdout();
    if let Err(e) = write_segments(&mut out, &segment(content)) {
        tracing::warn!("Render failed: {}", e);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let creds = Credentials::from_env();
    let orch = Orchestrator::from_config(&cfg, &creds).context("Failed to configure model provider")?;

    let selection = orch.selection();
    println!(
        "{} ({} - {})  /help for commands",
        cfg.app.name.as_deref().unwrap_or("Paramodus AI Assistant").bold(),
        selection.provider,
        selection.model
    );

    let mut state = SessionState::new();
    let mut last_prompt: Option<String> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("You: ");
        std::io::stdout().flush().ok();
        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('/') {
            if !handle_command(&orch, &mut state, &mut last_prompt, line).await {
                break;
            }
            continue;
        }

        match orch.handle_turn(&mut state, line).await {
            Ok(report) => {
                if let Some(e) = &report.error {
                    notice(&format!("Error getting response: {}", e));
                }
                write_message(&mut std::io::stdout(), &report.reply)?;
                if let Some(Analysis::Completed(extraction)) = &report.tasks {
                    if !extraction.added.is_empty() {
                        println!("{} new task(s), /tasks to view", extraction.added.len());
                    }
                }
                if let Some(notice_msg) = report.tasks.as_ref().and_then(|t| t.notice()) {
                    notice(notice_msg);
                }
                match &report.personality {
                    Some(Analysis::Completed(content)) => print_rendered(content),
                    Some(Analysis::Failed(msg)) => notice(msg),
                    None => {}
                }
            }
            Err(e) => notice(&format!("Configuration error: {}", e)),
        }
        last_prompt = Some(line.to_string());
    }

    Ok(())
}
