use anyhow::{Context, Result};
use shopkeep_agent::{AgentRuntime, Message, Role};
use shopkeep_core::config::AppConfig;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{error, info};

use super::{build_agent, CommandResult};

const HELP: &str = "commands: /reset clears the conversation, /history shows it, \
/cost shows the running cost, /quit exits";
const PREVIEW_CHARS: usize = 160;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub turns: usize,
    pub failures: usize,
}

#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Blank,
    Quit,
    Reset,
    History,
    Cost,
    Help,
    Message(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    match line.trim() {
        "" => Input::Blank,
        "/quit" | "/exit" | "quit" | "exit" => Input::Quit,
        "/reset" => Input::Reset,
        "/history" => Input::History,
        "/cost" => Input::Cost,
        "/help" => Input::Help,
        text => Input::Message(text),
    }
}

pub async fn run(config: &AppConfig) -> CommandResult {
    let mut agent = match build_agent(config) {
        Ok(agent) => agent,
        Err(error) => return CommandResult::agent_failure("chat", &error),
    };
    info!(
        event_name = "cli.chat.started",
        agent = agent.name(),
        model = agent.model(),
        "interactive session started"
    );

    let mut summary = SessionSummary::default();
    let mut stdout = tokio::io::stdout();
    let stdin = BufReader::new(tokio::io::stdin());
    let outcome = tokio::select! {
        result = run_session(&mut agent, stdin, &mut stdout, &mut summary) => result,
        _ = tokio::signal::ctrl_c() => Ok(()),
    };

    if let Err(error) = outcome {
        error!(event_name = "cli.chat.io_failed", error = %error, "chat session aborted");
        return CommandResult::failure("chat", "io", error.to_string(), 1);
    }

    info!(
        event_name = "cli.chat.finished",
        turns = summary.turns,
        failures = summary.failures,
        "interactive session finished"
    );
    CommandResult::text(farewell(&agent, summary))
}

/// Reads lines from `input` until EOF or `/quit`, writing replies to `output`.
pub async fn run_session<R, W>(
    agent: &mut AgentRuntime,
    input: R,
    output: &mut W,
    summary: &mut SessionSummary,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_line(output, &format!("{} ({}) ready. {HELP}", agent.name(), agent.model())).await?;
    let mut lines = input.lines();

    loop {
        output.write_all(b"you> ").await.context("failed to write prompt")?;
        output.flush().await.context("failed to flush prompt")?;
        let Some(line) = lines.next_line().await.context("failed to read chat input")? else {
            break;
        };

        match parse_input(&line) {
            Input::Blank => continue,
            Input::Quit => break,
            Input::Reset => {
                agent.reset();
                write_line(output, "Conversation reset.").await?;
            }
            Input::History => write_line(output, &render_history(agent.history())).await?,
            Input::Cost => write_line(output, &render_cost(agent)).await?,
            Input::Help => write_line(output, HELP).await?,
            Input::Message(text) => {
                summary.turns += 1;
                match agent.chat(text).await {
                    Ok(reply) => {
                        write_line(output, &format!("{}> {reply}", agent.name())).await?;
                        if let Some(usage) = render_turn_usage(agent) {
                            write_line(output, &usage).await?;
                        }
                    }
                    Err(error) => {
                        summary.failures += 1;
                        error!(
                            event_name = "cli.chat.turn_failed",
                            error = %error,
                            "chat turn failed"
                        );
                        write_line(output, &format!("error: {}", error.user_message())).await?;
                    }
                }
            }
        }
    }

    Ok(())
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, line: &str) -> Result<()> {
    output.write_all(line.as_bytes()).await.context("failed to write chat output")?;
    output.write_all(b"\n").await.context("failed to write chat output")?;
    output.flush().await.context("failed to flush chat output")
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn preview(text: &str) -> String {
    let mut preview = text.chars().take(PREVIEW_CHARS).collect::<String>();
    if text.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview.replace('\n', " ")
}

pub fn render_history(messages: &[Message]) -> String {
    messages
        .iter()
        .enumerate()
        .map(|(index, message)| {
            let label = role_label(message.role);
            match &message.tool_calls {
                Some(calls) => {
                    let names = calls.iter().map(|call| call.name.as_str()).collect::<Vec<_>>();
                    format!("{index:>3} [{label}] requested tools: {}", names.join(", "))
                }
                None => format!("{index:>3} [{label}] {}", preview(&message.content)),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_cost(agent: &AgentRuntime) -> String {
    if !agent.cost_tracking() {
        return "Cost tracking is disabled (use --track-cost or SHOPKEEP_AGENT_COST_TRACKING=true)."
            .to_string();
    }

    let mut line = format!("Total cost: ${}", agent.total_cost().normalize());
    if let Some(turn) = agent.last_turn() {
        line.push_str(&format!(
            " (last turn: {} input + {} output tokens, ${})",
            turn.usage.input_tokens,
            turn.usage.output_tokens,
            turn.cost.normalize()
        ));
    }
    line
}

fn render_turn_usage(agent: &AgentRuntime) -> Option<String> {
    let turn = agent.last_turn()?;
    let mut line = format!(
        "  [{} model call(s), {} tool call(s), {} tokens",
        turn.iterations,
        turn.tool_calls,
        turn.usage.total()
    );
    if agent.cost_tracking() {
        line.push_str(&format!(", ${}", turn.cost.normalize()));
    }
    if turn.iteration_limit_reached {
        line.push_str(", stopped at the iteration limit");
    }
    line.push(']');
    Some(line)
}

fn farewell(agent: &AgentRuntime, summary: SessionSummary) -> String {
    if agent.cost_tracking() {
        format!(
            "Goodbye! {} turn(s), total cost ${}.",
            summary.turns,
            agent.total_cost().normalize()
        )
    } else {
        format!("Goodbye! {} turn(s).", summary.turns)
    }
}
