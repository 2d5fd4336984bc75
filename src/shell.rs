//! Line-oriented front end over [`AppController`].

use std::future::Future;

use anyhow::Result;
use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::broadcast::{self, error::RecvError},
};

use crate::{
    app::AppController,
    composer::{
        catalog::{self, MIRRORS, SOFAS, WALL_COLORS},
        ApartmentDraft, Wall,
    },
    gateway::ApartmentGateway,
    ranking::render_lines,
    votes::{EngineEvent, ToggleOutcome, ToggleRejection},
};

const HELP: &str = "\
Commands:
  login <email>             start a session
  whoami                    show the current voter and draft
  palette                   list colors, sofas and mirrors
  left <color|index>        set the left wall color
  right <color|index>       set the right wall color
  sofa <index>              pick a sofa
  mirror <index>            pick a mirror
  save                      save your apartment and open the ranking
  rank                      open or redraw the ranking
  vote <email>              toggle your vote for an apartment
  refresh                   reload listings
  logout                    end the session
  help                      show this text
  quit                      exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login(String),
    WhoAmI,
    Palette,
    Wall(Wall, String),
    Sofa(usize),
    Mirror(usize),
    Save,
    Rank,
    Vote(String),
    Refresh,
    Logout,
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut parts = line.split_whitespace();
        let Some(name) = parts.next() else {
            return Ok(None);
        };
        let argument = parts.collect::<Vec<_>>().join(" ");

        let command = match name.to_ascii_lowercase().as_str() {
            "login" => Self::Login(required(&argument, "login <email>")?),
            "whoami" => Self::WhoAmI,
            "palette" => Self::Palette,
            "left" => Self::Wall(Wall::Left, required(&argument, "left <color|index>")?),
            "right" => Self::Wall(Wall::Right, required(&argument, "right <color|index>")?),
            "sofa" => Self::Sofa(index(&argument, "sofa <index>")?),
            "mirror" => Self::Mirror(index(&argument, "mirror <index>")?),
            "save" => Self::Save,
            "rank" => Self::Rank,
            "vote" => Self::Vote(required(&argument, "vote <email>")?),
            "refresh" => Self::Refresh,
            "logout" => Self::Logout,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("Unknown command `{other}`. Type `help`.")),
        };
        Ok(Some(command))
    }
}

fn required(argument: &str, usage: &str) -> Result<String, String> {
    if argument.is_empty() {
        Err(format!("Usage: {usage}"))
    } else {
        Ok(argument.to_string())
    }
}

fn index(argument: &str, usage: &str) -> Result<usize, String> {
    argument
        .parse()
        .map_err(|_| format!("Usage: {usage}"))
}

pub enum Flow {
    Continue,
    Quit,
}

/// Run one command against the controller. Errors come back as text and
/// never end the session.
pub async fn execute<G: ApartmentGateway + 'static>(
    app: &mut AppController<G>,
    command: Command,
) -> (Flow, Vec<String>) {
    let lines = match command {
        Command::Quit => return (Flow::Quit, vec!["Bye.".into()]),
        Command::Help => Ok(HELP.lines().map(str::to_string).collect()),
        Command::Palette => Ok(palette_lines()),
        Command::WhoAmI => Ok(whoami_lines(app)),
        Command::Login(email) => app
            .login(&email)
            .await
            .map(|voter| vec![format!("Logged in as {}. Compose your apartment, then `save`.", voter.email)])
            .map_err(|err| err.to_string()),
        Command::Wall(wall, value) => app
            .draft_mut()
            .set_wall_color(wall, &value)
            .map(|color| vec![format!("{} wall set to {}", wall_label(wall), describe_color(color))])
            .map_err(|err| err.to_string()),
        Command::Sofa(index) => app
            .draft_mut()
            .pick_sofa(index)
            .map(|sofa| vec![format!("Sofa set to {}", catalog::asset_label(sofa))])
            .map_err(|err| err.to_string()),
        Command::Mirror(index) => app
            .draft_mut()
            .pick_mirror(index)
            .map(|mirror| vec![format!("Mirror set to {}", catalog::asset_label(mirror))])
            .map_err(|err| err.to_string()),
        Command::Save => save(app).await,
        Command::Rank => match app.open_ranking().await {
            Ok(()) => ranking_lines(app).await,
            Err(err) => Err(format!("{err:#}")),
        },
        Command::Vote(owner) => vote(app, &owner).await,
        Command::Refresh => match app.refresh().await {
            Ok(()) => ranking_lines(app).await,
            Err(err) => Err(format!("{err:#}")),
        },
        Command::Logout => {
            app.logout().await;
            Ok(vec!["Logged out.".into()])
        }
    };

    match lines {
        Ok(lines) => (Flow::Continue, lines),
        Err(err) => (Flow::Continue, vec![format!("error: {err}")]),
    }
}

async fn save<G: ApartmentGateway + 'static>(
    app: &mut AppController<G>,
) -> Result<Vec<String>, String> {
    let outcome = app.save().await.map_err(|err| format!("{err:#}"))?;
    let mut lines = vec![if outcome.persisted {
        "Apartment saved.".to_string()
    } else {
        "Apartment kept for this session, but saving it failed.".to_string()
    }];
    if app.is_ranking_open() {
        lines.extend(ranking_lines(app).await?);
    }
    Ok(lines)
}

async fn vote<G: ApartmentGateway + 'static>(
    app: &AppController<G>,
    owner: &str,
) -> Result<Vec<String>, String> {
    let outcome = app
        .toggle_vote(owner)
        .await
        .map_err(|err| format!("{err:#}"))?;

    let summary = match outcome {
        ToggleOutcome::Applied { voted: true, .. } => format!("Voted for {owner}."),
        ToggleOutcome::Applied { voted: false, .. } => format!("Removed your vote for {owner}."),
        ToggleOutcome::RolledBack { error, .. } => {
            format!("Vote for {owner} failed and was undone: {error}")
        }
        ToggleOutcome::Rejected { reason } => match reason {
            ToggleRejection::SelfVote => "You cannot vote for your own apartment.".into(),
            ToggleRejection::NotLoaded => "The ranking is still loading.".into(),
            ToggleRejection::UnknownListing => format!("No apartment belongs to {owner}."),
            ToggleRejection::InFlight => format!("A vote for {owner} is already on its way."),
        },
    };

    let mut lines = vec![summary];
    lines.extend(ranking_lines(app).await?);
    Ok(lines)
}

async fn ranking_lines<G: ApartmentGateway + 'static>(
    app: &AppController<G>,
) -> Result<Vec<String>, String> {
    let rows = app.ranking().await.map_err(|err| format!("{err:#}"))?;
    if rows.is_empty() {
        return Ok(vec!["No apartments yet.".into()]);
    }
    Ok(render_lines(&rows))
}

fn whoami_lines<G: ApartmentGateway + 'static>(app: &AppController<G>) -> Vec<String> {
    let Some(voter) = app.voter() else {
        return vec!["Not logged in.".into()];
    };

    let mut lines = vec![format!("Logged in as {}", voter.email)];
    lines.extend(draft_lines(app.draft()));
    if voter.apartment.is_none() {
        lines.push("Not saved yet.".into());
    }
    lines
}

fn draft_lines(draft: &ApartmentDraft) -> Vec<String> {
    let show = |value: &Option<String>, describe: fn(&str) -> String| {
        value.as_deref().map(describe).unwrap_or_else(|| "(unset)".into())
    };
    vec![
        format!("  left wall:  {}", show(&draft.left_wall_color, describe_color)),
        format!("  right wall: {}", show(&draft.right_wall_color, describe_color)),
        format!("  sofa:       {}", show(&draft.sofa, |s| catalog::asset_label(s).to_string())),
        format!("  mirror:     {}", show(&draft.mirror, |m| catalog::asset_label(m).to_string())),
    ]
}

fn palette_lines() -> Vec<String> {
    let mut lines = vec!["Wall colors:".to_string()];
    lines.extend(
        WALL_COLORS
            .iter()
            .enumerate()
            .map(|(i, (hex, name))| format!("  {}. {name} {hex}", i + 1)),
    );
    lines.push("Sofas:".into());
    lines.extend(
        SOFAS
            .iter()
            .enumerate()
            .map(|(i, sofa)| format!("  {}. {}", i + 1, catalog::asset_label(sofa))),
    );
    lines.push("Mirrors:".into());
    lines.extend(
        MIRRORS
            .iter()
            .enumerate()
            .map(|(i, mirror)| format!("  {}. {}", i + 1, catalog::asset_label(mirror))),
    );
    lines
}

fn describe_color(hex: &str) -> String {
    match catalog::color_name(hex) {
        Some(name) => format!("{name} ({hex})"),
        None => hex.to_string(),
    }
}

fn wall_label(wall: Wall) -> &'static str {
    match wall {
        Wall::Left => "Left",
        Wall::Right => "Right",
    }
}

/// Lines to print for an engine event, if any.
async fn event_lines<G: ApartmentGateway + 'static>(
    app: &AppController<G>,
    event: EngineEvent,
) -> Vec<String> {
    match event {
        EngineEvent::Pushed { .. } => {
            let mut lines = vec!["* rankings updated".to_string()];
            lines.extend(ranking_lines(app).await.unwrap_or_default());
            lines
        }
        EngineEvent::VoteRolledBack { owner, error } => {
            vec![format!("* vote for {owner} was undone: {error}")]
        }
        EngineEvent::Loaded { .. } | EngineEvent::VoteApplied { .. } => Vec::new(),
    }
}

async fn next_event(events: &mut Option<broadcast::Receiver<EngineEvent>>) -> Option<EngineEvent> {
    loop {
        let Some(receiver) = events.as_mut() else {
            return std::future::pending().await;
        };
        match receiver.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => {
                *events = None;
                return None;
            }
        }
    }
}

/// Read commands from stdin until `quit`, end of input or Ctrl-C, then end
/// the session.
pub async fn run<G: ApartmentGateway + 'static>(app: &mut AppController<G>) -> Result<()> {
    run_session(app, BufReader::new(io::stdin()), interrupted()).await
}

async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::warn!("Ctrl-C handler unavailable: {err}");
        std::future::pending::<()>().await;
    }
}

/// Serve commands from `input` until `quit`, end of input or `interrupt`
/// resolves. The session is shut down on every exit path.
pub async fn run_session<G, R, S>(app: &mut AppController<G>, input: R, interrupt: S) -> Result<()>
where
    G: ApartmentGateway + 'static,
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let result = serve_commands(app, input, interrupt).await;
    app.shutdown().await;
    result
}

async fn serve_commands<G, R, S>(app: &mut AppController<G>, input: R, interrupt: S) -> Result<()>
where
    G: ApartmentGateway + 'static,
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let mut lines = input.lines();
    let mut events = app.events();
    tokio::pin!(interrupt);

    println!("Apartment voting. Type `help` for commands.");
    if let Some(voter) = app.voter() {
        println!("Welcome back, {}.", voter.email);
    }

    loop {
        tokio::select! {
            _ = &mut interrupt => {
                println!();
                println!("Interrupted. Bye.");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let command = match Command::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(err) => {
                        println!("error: {err}");
                        continue;
                    }
                };

                let (flow, output) = execute(app, command).await;
                for line in output {
                    println!("{line}");
                }
                if let Flow::Quit = flow {
                    break;
                }
                events = app.events();
            }
            Some(event) = next_event(&mut events) => {
                for line in event_lines(app, event).await {
                    println!("{line}");
                }
            }
        }
    }

    Ok(())
}
