//! `tandem run`: headless client driven from stdin.
//!
//! Each stdin line is one command:
//!
//! ```text
//! push /inbox          pop            pop_to /home     replace_all /
//! poll                 rpc /save      open https://…
//! set name Ada         set done true  show
//! bg                   fg             quit
//! ```
//!
//! The two ways out mirror the two ways a client goes away:
//!
//! - `quit` only backgrounds the client, like a host suspending it. The
//!   persisted stack stays and the next `tandem run` restores it.
//! - Ctrl+C terminates the session. The stack is erased so the next run
//!   starts from the initial page; variables survive either way.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use tandem::app::App;
use tandem::config::cfg;
use tandem::core::setup_shutdown_handler;
use tandem::logger::{is_verbose, status_error, status_loading, status_success};
use tandem::server::HttpTransport;
use tandem::spec::{ActionSpec, Var};
use tandem::stack::{PageView, Renderer};
use tandem::{debug, log};

// ============================================================================
// Renderer
// ============================================================================

/// Prints the visible page through the status line.
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn update(&self, pages: &[PageView]) {
        let Some(top) = pages.last() else {
            status_loading("(empty stack)");
            return;
        };
        let trail = pages
            .iter()
            .map(|p| p.key.as_str())
            .collect::<Vec<_>>()
            .join(" › ");

        if top.spec.is_loading() {
            status_loading(&format!("{trail}  loading..."));
        } else if top.spec.is_ephemeral() {
            status_error(&trail, top.spec.title());
        } else {
            status_success(&format!("{trail}  {}", top.spec.title()));
        }

        if is_verbose() {
            for view in &top.views {
                view.walk(&mut |node| {
                    debug!("stack"; "{} {}", node.kind, node.text.as_deref().unwrap_or(""));
                });
            }
        }
    }

    fn launch_url(&self, url: &str) {
        log!("app"; "open {}", url);
    }
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Actions(Vec<ActionSpec>),
    Set(String, Var),
    Show,
    Background,
    Foreground,
    Quit,
}

/// Parse one stdin line. Blank lines yield `Ok(None)`.
fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    let need = |what: &str| arg.ok_or_else(|| format!("`{verb}` needs {what}"));

    let command = match verb {
        "push" => Command::Actions(vec![ActionSpec::push(need("a page")?)]),
        "pop" => Command::Actions(vec![ActionSpec::Pop]),
        "pop_to" => Command::Actions(vec![ActionSpec::pop_to(need("a page")?)]),
        "replace_all" => Command::Actions(vec![ActionSpec::replace_all(need("a page")?)]),
        "poll" => Command::Actions(vec![ActionSpec::Poll]),
        "rpc" => Command::Actions(vec![ActionSpec::rpc(need("an endpoint")?)]),
        "open" => Command::Actions(vec![ActionSpec::LaunchUrl {
            url: need("a url")?.to_string(),
        }]),
        "set" => {
            let name = need("a name")?.to_string();
            let rest: Vec<&str> = words.collect();
            let value = match rest.as_slice() {
                ["true"] => Var::Bool(true),
                ["false"] => Var::Bool(false),
                parts => Var::from(parts.join(" ")),
            };
            Command::Set(name, value)
        }
        "show" => Command::Show,
        "bg" => Command::Background,
        "fg" => Command::Foreground,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command `{other}`")),
    };
    Ok(Some(command))
}

/// Forward stdin lines to the async side. The channel closes at EOF.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

// ============================================================================
// Driver
// ============================================================================

pub async fn run(page: Option<&str>) -> Result<()> {
    let config = cfg();
    let shutdown = setup_shutdown_handler()?;
    let transport =
        HttpTransport::new(config.server.timeout()).context("failed to create http client")?;
    let app = App::new(config, Arc::new(transport), Arc::new(LogRenderer))
        .context("failed to start client")?;

    app.start().await;
    if let Some(page) = page {
        app.stack().do_actions(&[ActionSpec::push(page)]).await;
    }

    let mut lines = spawn_stdin_reader();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                app.terminate().await;
                return Ok(());
            }
            line = lines.recv(), if stdin_open => {
                let Some(line) = line else {
                    debug!("app"; "stdin closed, waiting for Ctrl+C");
                    stdin_open = false;
                    continue;
                };
                match parse_command(&line) {
                    // Suspend, not terminate: the next run restores this stack.
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => execute(&app, command).await,
                    Ok(None) => {}
                    Err(e) => log!("error"; "{}", e),
                }
            }
        }
    }

    app.background();
    Ok(())
}

async fn execute(app: &App, command: Command) {
    match command {
        Command::Actions(actions) => {
            let outcome = app.stack().do_actions(&actions).await;
            if let Some(e) = outcome.error {
                debug!("app"; "batch ended with {} error", e.kind());
            }
        }
        Command::Set(name, value) => app.stack().set_var(&name, value),
        Command::Show => {
            for (depth, key) in app.stack().keys().iter().enumerate() {
                log!("stack"; "{} {}", depth, key);
            }
            for (name, value) in app.stack().vars().snapshot() {
                log!("stack"; "{} = {}", name, value);
            }
        }
        Command::Background => app.background(),
        Command::Foreground => app.foreground().await,
        Command::Quit => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actions() {
        assert_eq!(
            parse_command("push /inbox").unwrap(),
            Some(Command::Actions(vec![ActionSpec::push("/inbox")]))
        );
        assert_eq!(
            parse_command("  pop  ").unwrap(),
            Some(Command::Actions(vec![ActionSpec::Pop]))
        );
        assert_eq!(parse_command("").unwrap(), None);
    }

    #[test]
    fn test_parse_set() {
        assert_eq!(
            parse_command("set name Ada Lovelace").unwrap(),
            Some(Command::Set("name".into(), Var::from("Ada Lovelace")))
        );
        assert_eq!(
            parse_command("set done true").unwrap(),
            Some(Command::Set("done".into(), Var::Bool(true)))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("push").unwrap_err().contains("needs a page"));
        assert!(parse_command("teleport /x").unwrap_err().contains("unknown"));
    }
}
