/// Terminal replay of a finished schedule
///
/// This module contains:
/// - `ReplayBoard`: the starting contents of every stack and buffer point
/// - `Replay`: the warehouse state at any time, rebuilt from the operation log
/// - A ratatui/crossterm UI that plays the replay on the virtual clock

use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Paragraph, Tabs, Wrap},
    Terminal,
};

use crate::model::graph::{Graph, Location};
use crate::model::log::{Operation, OperationLog};
use crate::model::storage::{BoxId, BoxStorage, Capacity, Storage};
use crate::model::time::{truncate, Time};
use crate::model::vehicle::Vehicle;

#[derive(Debug, Clone, PartialEq)]
pub struct StorageView {
    pub name: String,
    pub location: Location,
    /// None for buffer points
    pub capacity: Option<usize>,
    /// Bottom to top
    pub boxes: Vec<BoxId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleView {
    pub name: String,
    pub location: Location,
    pub load: Vec<BoxId>,
    /// Destination of the operation in progress
    pub heading_to: Option<Location>,
}

/// Starting point of a replay. Capture it before scheduling.
#[derive(Debug, Clone)]
pub struct ReplayBoard {
    storages: Vec<StorageView>,
    vehicles: Vec<VehicleView>,
}

impl ReplayBoard {
    pub fn capture(graph: &Graph, vehicles: &[Vehicle]) -> Self {
        let storages = graph
            .nodes()
            .iter()
            .map(|node| StorageView {
                name: node.name().to_string(),
                location: node.location,
                capacity: match node.storage.capacity() {
                    Capacity::Bounded(capacity) => Some(capacity),
                    Capacity::Unbounded => None,
                },
                boxes: match &node.storage {
                    Storage::Stack(stack) => stack.boxes().to_vec(),
                    Storage::Buffer(buffer) => buffer.boxes().to_vec(),
                },
            })
            .collect();
        let vehicles = vehicles
            .iter()
            .map(|v| VehicleView {
                name: v.name.clone(),
                location: v.location,
                load: v.carried().to_vec(),
                heading_to: None,
            })
            .collect();
        ReplayBoard { storages, vehicles }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayState {
    pub time: Time,
    pub storages: Vec<StorageView>,
    pub vehicles: Vec<VehicleView>,
    /// Operations finished by `time`
    pub done: usize,
}

pub struct Replay {
    board: ReplayBoard,
    /// Ordered by end time
    operations: Vec<Operation>,
}

impl Replay {
    pub fn new(board: ReplayBoard, log: &OperationLog) -> Self {
        let mut operations = log.entries().to_vec();
        operations.sort_by(|a, b| {
            a.end_time
                .partial_cmp(&b.end_time)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Replay { board, operations }
    }

    pub fn end_time(&self) -> Time {
        self.operations.last().map_or(0.0, |op| op.end_time)
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// End time of the first operation finishing after `time`.
    pub fn next_event_after(&self, time: Time) -> Option<Time> {
        self.operations
            .iter()
            .map(|op| op.end_time)
            .find(|end| *end > time)
    }

    /// Warehouse contents once every operation ending by `time` is applied.
    pub fn state_at(&self, time: Time) -> ReplayState {
        let mut storages = self.board.storages.clone();
        let mut vehicles = self.board.vehicles.clone();
        let mut done = 0;

        for op in &self.operations {
            let vehicle = match vehicles.iter_mut().find(|v| v.name == op.vehicle) {
                Some(vehicle) => vehicle,
                None => continue,
            };
            if op.end_time > time {
                if op.start_time <= time && vehicle.heading_to.is_none() {
                    vehicle.heading_to = Some(op.end);
                }
                continue;
            }

            done += 1;
            vehicle.location = op.end;
            let storage = storages.iter_mut().find(|s| s.location == op.end);
            if op.kind.is_pickup() {
                if let Some(storage) = storage {
                    if let Some(index) = storage.boxes.iter().rposition(|b| *b == op.box_id) {
                        storage.boxes.remove(index);
                    }
                }
                vehicle.load.push(op.box_id.clone());
            } else {
                if let Some(index) = vehicle.load.iter().rposition(|b| *b == op.box_id) {
                    vehicle.load.remove(index);
                }
                if let Some(storage) = storage {
                    storage.boxes.push(op.box_id.clone());
                }
            }
        }

        ReplayState {
            time,
            storages,
            vehicles,
            done,
        }
    }
}

struct App {
    replay: Replay,
    time: Time,
    /// Virtual time per frame while playing
    speed: Time,
    playing: bool,
    tick_rate: Duration,
    last_tick: Instant,
    title: String,
    panel: usize,
}

impl App {
    fn step(&mut self) {
        self.time = self
            .replay
            .next_event_after(self.time)
            .unwrap_or_else(|| self.replay.end_time());
    }

    fn advance(&mut self) {
        self.time = (self.time + self.speed).min(self.replay.end_time());
        if self.time >= self.replay.end_time() {
            self.playing = false;
        }
    }
}

/// Play the replay until the user quits.
pub fn run(replay: Replay, title: &str) -> Result<(), Box<dyn std::error::Error>> {
    let speed = (replay.end_time() / 400.0).max(1.0);
    let mut app = App {
        replay,
        time: 0.0,
        speed,
        playing: true,
        tick_rate: Duration::from_millis(50),
        last_tick: Instant::now(),
        title: format!("stackyard - {}", title),
        panel: 0,
    };

    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    app: &mut App,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        terminal.draw(|f| draw_ui(f, app))?;

        let timeout = app
            .tick_rate
            .checked_sub(app.last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if event::poll(timeout)? {
            if let CEvent::Key(KeyEvent { code, kind: KeyEventKind::Press, .. }) = event::read()? {
                match code {
                    KeyCode::Char('q') => return Ok(()),
                    KeyCode::Char(' ') => app.playing = !app.playing,
                    KeyCode::Char('n') => app.step(),
                    KeyCode::Tab => app.panel = (app.panel + 1) % 2,
                    KeyCode::BackTab => app.panel = (app.panel + 1) % 2,
                    _ => {}
                }
            }
        }

        if app.last_tick.elapsed() >= app.tick_rate {
            if app.playing {
                app.advance();
            }
            app.last_tick = Instant::now();
        }
    }
}

fn draw_ui(f: &mut ratatui::Frame, app: &App) {
    let state = app.replay.state_at(app.time);
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)].as_ref())
        .split(f.size());

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(11), Constraint::Min(0)].as_ref())
        .split(chunks[0]);

    draw_metrics(f, left[0], app, &state);
    draw_recent(f, left[1], app, &state);
    draw_panels(f, chunks[1], app, &state);
}

fn draw_metrics(f: &mut ratatui::Frame, area: Rect, app: &App, state: &ReplayState) {
    let mode = if app.playing { "Playing" } else { "Paused" };
    let lines = vec![
        Line::from(app.title.clone()),
        Line::from(format!("Mode: {}", mode)),
        Line::from(format!(
            "Time: {} / {}",
            truncate(state.time),
            truncate(app.replay.end_time())
        )),
        Line::from(format!(
            "Operations: {} / {}",
            state.done,
            app.replay.operations().len()
        )),
        Line::from("Controls:"),
        Line::from("  space - play/pause"),
        Line::from("  n     - next operation"),
        Line::from("  tab   - vehicles/stacks"),
        Line::from("  q     - quit"),
    ];
    let metrics = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Replay"))
        .wrap(Wrap { trim: true });
    f.render_widget(metrics, area);
}

fn draw_recent(f: &mut ratatui::Frame, area: Rect, app: &App, state: &ReplayState) {
    let shown = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = app.replay.operations()[..state.done]
        .iter()
        .rev()
        .take(shown)
        .map(|op| {
            Line::from(format!(
                "{:>6} {} {} {}",
                truncate(op.end_time),
                op.vehicle,
                op.kind,
                op.box_id
            ))
        })
        .collect();
    let para = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Recent operations"))
        .style(Style::default().fg(Color::White));
    f.render_widget(para, area);
}

fn draw_panels(f: &mut ratatui::Frame, area: Rect, app: &App, state: &ReplayState) {
    let tabs_area = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let titles = vec![Line::from("Vehicles"), Line::from("Stacks")];
    let tabs = Tabs::new(titles)
        .select(app.panel)
        .block(Block::default().borders(Borders::ALL).title("Warehouse"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, tabs_area[0]);

    let lines: Vec<Line> = match app.panel {
        0 => state
            .vehicles
            .iter()
            .map(|v| {
                let doing = match v.heading_to {
                    Some(target) => format!("moving to {}", target),
                    None => "idle".to_string(),
                };
                Line::from(format!(
                    "{} at {} | {} | load [{}]",
                    v.name,
                    v.location,
                    doing,
                    v.load.join(", ")
                ))
            })
            .collect(),
        _ => state
            .storages
            .iter()
            .map(|s| {
                let fill = match s.capacity {
                    Some(capacity) => format!("{}/{}", s.boxes.len(), capacity),
                    None => format!("{} (buffer)", s.boxes.len()),
                };
                Line::from(format!("{} {}: [{}]", s.name, fill, s.boxes.join(", ")))
            })
            .collect(),
    };
    let para = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    f.render_widget(para, tabs_area[1]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::Logger;
    use crate::model::request::Request;
    use crate::scheduling::warehouse::fixtures::{node, warehouse};
    use crate::scheduling::Scheduler;

    fn replay_of_top_box_run() -> Replay {
        let mut wh = warehouse(&[("A", 3, "b1 b2 b3")], &[2]);
        let (a, buf) = (node(&wh, "A"), node(&wh, "BUF"));
        wh.add_request(Request::new(1, a, buf, "b3")).unwrap();
        let board = ReplayBoard::capture(&wh.graph, &wh.vehicles);
        Scheduler::new(Logger::silent()).run(&mut wh).unwrap();
        Replay::new(board, &wh.log)
    }

    fn boxes<'a>(state: &'a ReplayState, name: &str) -> &'a [BoxId] {
        &state.storages.iter().find(|s| s.name == name).unwrap().boxes
    }

    #[test]
    fn start_shows_the_initial_contents() {
        let replay = replay_of_top_box_run();
        let state = replay.state_at(0.0);
        assert_eq!(state.done, 0);
        assert_eq!(boxes(&state, "A"), &["b1", "b2", "b3"]);
        assert!(boxes(&state, "BUF").is_empty());
        assert_eq!(state.vehicles[0].heading_to, Some(Location::new(0, 0)));
    }

    #[test]
    fn box_travels_with_the_vehicle() {
        let replay = replay_of_top_box_run();
        // picked at 7, placed at 19
        let state = replay.state_at(10.0);
        assert_eq!(state.done, 1);
        assert_eq!(boxes(&state, "A"), &["b1", "b2"]);
        assert_eq!(state.vehicles[0].load, vec!["b3"]);
        assert_eq!(state.vehicles[0].location, Location::new(0, 0));

        let end = replay.state_at(replay.end_time());
        assert_eq!(end.done, 2);
        assert_eq!(boxes(&end, "BUF"), &["b3"]);
        assert!(end.vehicles[0].load.is_empty());
        assert_eq!(end.vehicles[0].heading_to, None);
    }

    #[test]
    fn stepping_jumps_between_operation_ends() {
        let replay = replay_of_top_box_run();
        assert_eq!(replay.end_time(), 19.0);
        assert_eq!(replay.next_event_after(0.0), Some(7.0));
        assert_eq!(replay.next_event_after(7.0), Some(19.0));
        assert_eq!(replay.next_event_after(19.0), None);
    }
}
