mod commands;
mod config;
mod db;
mod error;
mod fingerprint;
mod handlers;
mod models;
mod realtime;
mod service;
mod tasks;
mod voting;

use commands::Input;
use config::{Config, ViewKind};
use db::Database;
use error::Result;
use fingerprint::Environment;
use handlers::{Snapshot, SubmitOutcome, View, ViewHandle};
use log::{error, info};
use models::{BallotOption, OPTIONS};
use realtime::{RealtimeClient, RealtimeConfig};
use service::RestStore;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    // Without both connection parameters there is no data-service client.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    let store = Arc::new(RestStore::new(&config)?);
    let flags = Arc::new(Database::connect(&config.local_db_url).await?);

    let fingerprint = fingerprint::generate(&Environment::detect(config.screen));
    info!("Device fingerprint: {}", fingerprint);

    // Shared by the view and its change feed so teardown releases both.
    let stop = CancellationToken::new();
    let (client, changes) = RealtimeClient::new(
        RealtimeConfig::new(config.realtime_url()?, config.anon_key.clone()),
        stop.clone(),
    );
    let listener = tokio::spawn(client.run());

    let view = View {
        kind: config.view,
        debounce: config.debounce,
        fingerprint,
        store,
        flags,
    }
    .mount(changes, stop);

    let renderer = tokio::spawn(render(view.subscribe()));

    match config.view {
        ViewKind::Ballot => ballot(&view).await?,
        ViewKind::Results => {
            println!("Live Voting Results (Ctrl-C to exit)");
            tokio::select! {
                _ = view.wait_until(|s| s.loaded) => {
                    tokio::signal::ctrl_c().await.ok();
                }
                _ = tokio::signal::ctrl_c() => {}
            }
        }
    }

    view.shutdown().await;
    renderer.abort();
    listener.await.ok();
    Ok(())
}

async fn ballot(view: &ViewHandle) -> Result<()> {
    println!("Build on incident.io");
    println!("Choose your favorite project: the winner gets a new MacBook Pro!\n");
    print_options();
    println!("{}", commands::help_text());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read input: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        };

        match commands::parse(&line) {
            Input::Vote(option) => match view.vote(option).await {
                Ok(SubmitOutcome::Recorded) => {
                    let title = BallotOption::find(option).map(|o| o.title).unwrap_or("your choice");
                    println!("Thanks! Your vote for {} was recorded.", title);
                }
                Ok(SubmitOutcome::AlreadyVoted) => println!("You have already voted."),
                Ok(SubmitOutcome::Busy) => println!("Voting..."),
                Err(e) => println!("Your vote could not be recorded ({}). Please try again.", e),
            },
            Input::Results => {
                let snapshot = view.snapshot();
                if snapshot.voted {
                    println!("{}", snapshot.tally.summary(true));
                } else {
                    println!("Vote first to see the results.");
                }
            }
            Input::Refresh => view.refresh().await?,
            Input::Options => print_options(),
            Input::Help => println!("{}", commands::help_text()),
            Input::Quit => break,
            Input::Empty => {}
            Input::Unknown(text) => println!("Unknown command '{}'. {}", text, commands::help_text()),
        }
    }

    Ok(())
}

fn print_options() {
    for option in &OPTIONS {
        println!("{}\n", commands::option_card(option));
    }
}

/// Prints the tally whenever the view publishes a change worth showing. The
/// ballot view keeps results hidden until this device has voted.
async fn render(mut state: watch::Receiver<Snapshot>) {
    let mut shown: Option<Snapshot> = None;
    loop {
        let snapshot = state.borrow_and_update().clone();
        let visible = snapshot.loaded && (snapshot.kind == ViewKind::Results || snapshot.voted);
        let changed = shown.as_ref().is_none_or(|last| {
            last.tally != snapshot.tally || last.voted != snapshot.voted
        });

        if visible && changed {
            println!("{}\n", snapshot.tally.summary(snapshot.kind == ViewKind::Ballot));
            shown = Some(snapshot);
        }

        if state.changed().await.is_err() {
            break;
        }
    }
}
