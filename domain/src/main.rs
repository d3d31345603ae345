use std::env;
use std::io::{self, BufRead, Write};
use std::process;
use std::sync::Arc;

use domain::adapters::memory_repo::{InMemoryClickRepo, InMemoryLinkRepo, InMemoryUserRepo};
use domain::router::{ButtonAction, MenuRouter, Reply};
use domain::service::ConfigStore;
use domain::session::InMemorySessionStore;
use domain::stats::ClickLog;
use domain::validate::UrlPolicy;
use domain::workflow::{EditWorkflow, WorkflowOptions};
use domain::{AdminList, Clock, SystemClock, User, UserId};

fn print_usage() {
    eprintln!(
        "{}\n\nUsage:\n  domain [--admin <user_id>]...\n\nThen type one event per line:\n  <user_id> <message or callback data>\n\nExamples:\n  1 /start\n  1 click:contest\n  1 edit:support\n  1 https://t.me/new_support\n\nNotes:\n  - This demo console uses in-memory storage; data is not persisted across runs.",
        domain::about()
    );
}

fn parse_args() -> Result<Vec<UserId>, String> {
    let rest: Vec<String> = env::args().skip(1).collect();
    let mut admins = Vec::new();
    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "--admin" => {
                let Some(val) = rest.get(i + 1) else {
                    return Err("--admin requires a user id".into());
                };
                let id: i64 = val
                    .parse()
                    .map_err(|_| format!("invalid --admin id: {}", val))?;
                admins.push(UserId::new(id));
                i += 2;
            }
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            unk => return Err(format!("unknown argument: {}", unk)),
        }
    }
    Ok(admins)
}

fn build_router(admins: AdminList) -> Result<MenuRouter, String> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let config = ConfigStore::new(
        Arc::new(InMemoryLinkRepo::new()),
        clock.clone(),
        UrlPolicy::default(),
    );
    config
        .seed_defaults()
        .map_err(|e| format!("seeding defaults failed: {}", e))?;
    let workflow = EditWorkflow::new(
        admins.clone(),
        Arc::new(InMemorySessionStore::new()),
        config.clone(),
        clock.clone(),
        WorkflowOptions::default(),
    );
    let log = ClickLog::new(
        Arc::new(InMemoryClickRepo::new()),
        Arc::new(InMemoryUserRepo::new()),
    );
    Ok(MenuRouter::new(config, log, workflow, admins, clock))
}

fn print_reply(out: &mut impl Write, reply: &Reply) -> io::Result<()> {
    match reply {
        Reply::Text { text } => writeln!(out, "{}", text),
        Reply::Menu { text, buttons } => {
            writeln!(out, "{}", text)?;
            for b in buttons {
                match &b.action {
                    ButtonAction::Url(url) => writeln!(out, "  [{}] -> {}", b.label, url)?,
                    ButtonAction::Callback(data) => writeln!(out, "  [{}] ({})", b.label, data)?,
                }
            }
            Ok(())
        }
        Reply::Document { filename, content } => {
            writeln!(out, "--- {} ---", filename)?;
            write!(out, "{}", content)
        }
    }
}

fn run() -> Result<(), String> {
    let admins = AdminList::new(parse_args()?);
    if admins.is_empty() {
        eprintln!("note: no --admin given, admin commands will be refused");
    }
    let router = build_router(admins)?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line.map_err(|e| format!("read failed: {}", e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((id, input)) = line.split_once(char::is_whitespace) else {
            eprintln!("expected: <user_id> <input>");
            continue;
        };
        let Ok(id) = id.parse::<i64>() else {
            eprintln!("invalid user id: {}", id);
            continue;
        };
        for reply in router.handle_raw(User::new(UserId::new(id)), input) {
            print_reply(&mut stdout, &reply).map_err(|e| format!("write failed: {}", e))?;
        }
    }
    Ok(())
}

fn main() {
    if let Err(msg) = run() {
        eprintln!("error: {}", msg);
        process::exit(1);
    }
}
