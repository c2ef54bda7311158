use std::io::{self, BufRead};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{info, warn};

use galaxy_sim::{
    build_headless_app, run_turn, SimulationMetrics, TeamManager, TeamManagerAi, TeamPlan,
    TeamRoster,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut app = build_headless_app();
    let command_rx = spawn_command_listener();

    info!(
        target: "galaxy_sim::headless",
        "galaxy headless runner ready (commands: turn N, metrics, teams, quit)"
    );

    while let Ok(command) = command_rx.recv() {
        match command {
            Command::Turn(turns) => {
                for _ in 0..turns {
                    run_turn(&mut app);
                }
                log_metrics(app.world.resource::<SimulationMetrics>());
            }
            Command::Metrics => log_metrics(app.world.resource::<SimulationMetrics>()),
            Command::Teams => log_teams(&mut app),
            Command::Quit => break,
        }
    }

    info!(target: "galaxy_sim::headless", "galaxy headless runner stopped");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Turn(u32),
    Metrics,
    Teams,
    Quit,
}

fn spawn_command_listener() -> Receiver<Command> {
    let (sender, receiver) = unbounded::<Command>();
    thread::spawn(move || read_commands(io::stdin().lock(), sender));
    receiver
}

fn read_commands(input: impl BufRead, sender: Sender<Command>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(target: "galaxy_sim::headless", error = %err, "stdin.read_failed");
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_command(trimmed) {
            Some(command) => {
                let quit = command == Command::Quit;
                if sender.send(command).is_err() || quit {
                    return;
                }
            }
            None => warn!(target: "galaxy_sim::headless", input = trimmed, "command.unknown"),
        }
    }
    let _ = sender.send(Command::Quit);
}

fn parse_command(line: &str) -> Option<Command> {
    let mut parts = line.split_whitespace();
    match parts.next()? {
        "turn" => {
            let turns = match parts.next() {
                Some(value) => value.parse().ok()?,
                None => 1,
            };
            Some(Command::Turn(turns))
        }
        "metrics" => Some(Command::Metrics),
        "teams" => Some(Command::Teams),
        "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

fn log_metrics(metrics: &SimulationMetrics) {
    info!(
        target: "galaxy_sim::headless",
        turn = metrics.turn,
        teams_alive = metrics.teams_alive,
        planets_per_team = ?metrics.planets_per_team,
        neutral_planets = metrics.neutral_planets,
        ships_per_team = ?metrics.ships_per_team,
        total_ships = metrics.total_ships,
        buildings = metrics.buildings,
        spatial_elements = metrics.spatial_elements,
        spatial_excess = metrics.spatial_excess,
        digest = format_args!("{:016x}", metrics.digest),
        "metrics"
    );
}

fn log_teams(app: &mut bevy::app::App) {
    let alive: Vec<bool> = {
        let roster = app.world.resource::<TeamRoster>();
        roster
            .entries()
            .iter()
            .map(|entry| roster.is_alive(entry.id))
            .collect()
    };
    let mut managers = app
        .world
        .query::<(&TeamManager, &TeamManagerAi, &TeamPlan)>();
    for (manager, brain, plan) in managers.iter(&app.world) {
        info!(
            target: "galaxy_sim::headless",
            team = manager.team.0,
            name = %manager.name,
            alive = alive.get(manager.team.index()).copied().unwrap_or(false),
            owned_planets = brain.empire.owned_planets,
            fighter_actions = plan.fighter_actions.len(),
            worker_actions = plan.worker_actions.len(),
            trader_actions = plan.trader_actions.len(),
            factory_actions = plan.factory_actions.len(),
            "team"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("turn 5"), Some(Command::Turn(5)));
        assert_eq!(parse_command("turn"), Some(Command::Turn(1)));
        assert_eq!(parse_command("turn many"), None);
        assert_eq!(parse_command("metrics"), Some(Command::Metrics));
        assert_eq!(parse_command("quit"), Some(Command::Quit));
        assert_eq!(parse_command("warp"), None);
    }

    #[test]
    fn listener_stops_after_quit() {
        let (sender, receiver) = unbounded();
        read_commands("turn 2\nbogus\nmetrics\nquit\nturn 9\n".as_bytes(), sender);
        let received: Vec<Command> = receiver.try_iter().collect();
        assert_eq!(
            received,
            vec![Command::Turn(2), Command::Metrics, Command::Quit]
        );
    }
}
