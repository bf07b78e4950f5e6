use crossterm::{
    event::{
        self, Event, KeyCode, KeyEventKind, KeyboardEnhancementFlags,
        PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    terminal::{
        disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
    ExecutableCommand,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame, Terminal,
};
use std::{
    io::{self, stdout},
    time::{Duration, Instant},
};

use quadra::config::GameConfig;
use quadra::game::{
    CellState, Game, GameEvent, GameState, PieceKind, Position, ShiftDirection, GRID_HEIGHT,
    GRID_WIDTH, QUEUE_LENGTH, TICKS_PER_SECOND,
};

// ============================================================================
// Visual Constants
// ============================================================================

const CELL_WIDTH: u16 = 2;
const BLOCK_CHAR: &str = "██";
const GHOST_CHAR: &str = "░░";
const EMPTY_CHAR: &str = "  ";

const HIGH_SCORE_FILE: &str = "highscore.txt";

// ============================================================================
// Color Mapping
// ============================================================================

fn piece_color(kind: PieceKind) -> Color {
    match kind {
        PieceKind::I => Color::Cyan,
        PieceKind::J => Color::Blue,
        PieceKind::L => Color::Rgb(255, 165, 0),
        PieceKind::O => Color::Yellow,
        PieceKind::S => Color::Green,
        PieceKind::T => Color::Magenta,
        PieceKind::Z => Color::Red,
    }
}

// ============================================================================
// High Score Persistence
// ============================================================================

fn load_high_score() -> u32 {
    std::fs::read_to_string(HIGH_SCORE_FILE)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

fn save_high_score(score: u32) {
    let _ = std::fs::write(HIGH_SCORE_FILE, score.to_string());
}

// ============================================================================
// Rendering
// ============================================================================

fn render(frame: &mut Frame, game: &Game, high_score: u32) {
    let area = frame.size();

    match game.state {
        GameState::Playing => render_game(frame, game, high_score, area),
        GameState::Paused => render_paused(frame, game, high_score, area),
        GameState::GameOver => render_game_over(frame, game, high_score, area),
    }
}

fn render_game(frame: &mut Frame, game: &Game, high_score: u32, area: Rect) {
    // Calculate dimensions
    let grid_display_width = (GRID_WIDTH as u16 * CELL_WIDTH) + 2;
    let grid_display_height = GRID_HEIGHT as u16 + 2;
    let side_width = 14;
    let info_width = 14;
    let total_width = grid_display_width + side_width + info_width + 4;
    let total_height = grid_display_height + 3;

    // Center everything
    let main_area = centered_rect(total_width, total_height, area);

    // Split vertically first: game area and controls
    let vertical = Layout::vertical([
        Constraint::Length(grid_display_height),
        Constraint::Fill(1),
    ])
    .split(main_area);

    let game_row = vertical[0];

    // Layout: [Grid][Hold+Next][Info]
    let horizontal = Layout::horizontal([
        Constraint::Length(grid_display_width),
        Constraint::Length(side_width),
        Constraint::Length(info_width),
    ])
    .split(game_row);

    render_grid(frame, game, horizontal[0]);

    let side = Layout::vertical([Constraint::Length(6), Constraint::Fill(1)]).split(horizontal[1]);
    render_hold(frame, game, side[0]);
    render_queue(frame, game, side[1]);

    render_info(frame, game, high_score, horizontal[2]);

    // Render controls hint below
    let controls_area = Rect {
        x: area.x,
        y: game_row.y + game_row.height,
        width: area.width,
        height: 2,
    };

    if controls_area.y + 1 < area.height {
        let controls = Paragraph::new(vec![Line::from(
            "←→: Move | Z/X/A: Rotate | ↓: Soft Drop | Space: Hard Drop | C: Hold | P: Pause | Q: Quit",
        )])
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(controls, controls_area);
    }
}

fn render_grid(frame: &mut Frame, game: &Game, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Quadra ")
        .title_alignment(Alignment::Center);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    // Complete visual state from the engine, with the ghost outline layered
    // into empty cells underneath the active piece.
    let visual_grid = game.render_grid();
    let ghost: Vec<Position> = game.ghost_cells();

    let mut lines: Vec<Line> = Vec::new();

    for y in 0..GRID_HEIGHT {
        let mut spans: Vec<Span> = Vec::new();

        for x in 0..GRID_WIDTH {
            let (symbol, style) = match visual_grid[y][x] {
                CellState::Filled(kind) => (BLOCK_CHAR, Style::default().fg(piece_color(kind))),
                CellState::Empty => {
                    let is_ghost = ghost
                        .iter()
                        .any(|pos| pos.x == x as i16 && pos.y == y as i16);
                    if is_ghost {
                        (GHOST_CHAR, Style::default().fg(Color::DarkGray))
                    } else {
                        (EMPTY_CHAR, Style::default())
                    }
                }
            };

            spans.push(Span::styled(symbol, style));
        }

        lines.push(Line::from(spans));
    }

    let paragraph = Paragraph::new(lines);
    frame.render_widget(paragraph, inner);
}

/// Draw the occupied rows of a kind's spawn figure, two columns per cell.
fn figure_lines(game: &Game, kind: PieceKind) -> Vec<Line<'static>> {
    let figure = game.config().figure(kind.index(), 0);
    let color = piece_color(kind);
    let rows: Vec<u8> = figure.iter().map(|&cell| cell / 5).collect();
    let min_row = *rows.iter().min().unwrap_or(&0);
    let max_row = *rows.iter().max().unwrap_or(&0);

    let mut lines = Vec::new();
    for row in min_row..=max_row {
        let mut spans: Vec<Span> = vec![Span::raw(" ")];
        for col in 0..5u8 {
            if figure.contains(&(row * 5 + col)) {
                spans.push(Span::styled(BLOCK_CHAR, Style::default().fg(color)));
            } else {
                spans.push(Span::raw(EMPTY_CHAR));
            }
        }
        lines.push(Line::from(spans));
    }
    lines
}

fn render_hold(frame: &mut Frame, game: &Game, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Hold ")
        .title_alignment(Alignment::Center);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines = match game.held_piece {
        Some(kind) => figure_lines(game, kind),
        None => vec![Line::from("")],
    };

    let paragraph = Paragraph::new(lines);
    frame.render_widget(paragraph, inner);
}

fn render_queue(frame: &mut Frame, game: &Game, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Next ")
        .title_alignment(Alignment::Center);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let mut lines: Vec<Line> = Vec::new();

    for (i, &kind) in game.queue.iter().take(QUEUE_LENGTH).enumerate() {
        if i > 0 {
            lines.push(Line::from(""));
        }
        lines.extend(figure_lines(game, kind));
    }

    let paragraph = Paragraph::new(lines);
    frame.render_widget(paragraph, inner);
}

fn render_info(frame: &mut Frame, game: &Game, high_score: u32, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Info ")
        .title_alignment(Alignment::Center);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled("Score", Style::default().fg(Color::Yellow))),
        Line::from(format!("{}", game.score)),
        Line::from(""),
        Line::from(Span::styled("Lines", Style::default().fg(Color::Cyan))),
        Line::from(format!("{}", game.lines_cleared)),
        Line::from(""),
        Line::from(Span::styled("Level", Style::default().fg(Color::Green))),
        Line::from(format!("{}", game.level)),
        Line::from(""),
        Line::from(Span::styled("Best", Style::default().fg(Color::Magenta))),
        Line::from(format!("{}", high_score)),
    ];

    let paragraph = Paragraph::new(lines).alignment(Alignment::Center);
    frame.render_widget(paragraph, inner);
}

fn render_game_over(frame: &mut Frame, game: &Game, high_score: u32, area: Rect) {
    // First render the game in background
    render_game(frame, game, high_score, area);

    // Then overlay game over popup
    let text = vec![
        Line::from(""),
        Line::from(Span::styled("GAME OVER", Style::default().fg(Color::Red))),
        Line::from(""),
        Line::from(format!("Score: {}", game.score)),
        Line::from(format!("Lines: {}", game.lines_cleared)),
        Line::from(format!("Level: {}", game.level)),
        Line::from(""),
        Line::from(Span::styled(
            "R: restart | ESC: quit",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let paragraph = Paragraph::new(text).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Game Over ")
            .title_alignment(Alignment::Center)
            .style(Style::default().bg(Color::Black)),
    );

    let popup_area = centered_rect(26, 12, area);
    frame.render_widget(paragraph, popup_area);
}

fn render_paused(frame: &mut Frame, game: &Game, high_score: u32, area: Rect) {
    // First render the game in background
    render_game(frame, game, high_score, area);

    // Then overlay paused popup
    let text = vec![
        Line::from(""),
        Line::from(Span::styled("PAUSED", Style::default().fg(Color::Yellow))),
        Line::from(""),
        Line::from(Span::styled(
            "Press P to continue",
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(Span::styled(
            "Press ESC to quit",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let paragraph = Paragraph::new(text).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Paused ")
            .title_alignment(Alignment::Center)
            .style(Style::default().bg(Color::Black)),
    );

    let popup_area = centered_rect(24, 10, area);
    frame.render_widget(paragraph, popup_area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let horizontal = Layout::horizontal([
        Constraint::Fill(1),
        Constraint::Length(width.min(area.width)),
        Constraint::Fill(1),
    ])
    .split(area);

    let vertical = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(height.min(area.height)),
        Constraint::Fill(1),
    ])
    .split(horizontal[1]);

    vertical[1]
}

// ============================================================================
// Main Loop
// ============================================================================

fn main() -> io::Result<()> {
    // Rule tables can be swapped out by passing a JSON config path.
    let config: GameConfig = match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str(&text)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        }
        None => GameConfig::default(),
    };

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;

    // Key release reporting drives auto-shift and soft drop; fall back to
    // per-press movement on terminals that cannot report releases.
    let release_events = supports_keyboard_enhancement().unwrap_or(false);
    if release_events {
        stdout().execute(PushKeyboardEnhancementFlags(
            KeyboardEnhancementFlags::REPORT_EVENT_TYPES,
        ))?;
    }

    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;

    // Create game
    let mut game = Game::new(config);
    let mut high_score = load_high_score();
    let tick_duration = Duration::from_micros(1_000_000 / TICKS_PER_SECOND as u64);
    let mut last_tick = Instant::now();

    // Main loop
    loop {
        // Render
        terminal.draw(|frame| render(frame, &game, high_score))?;

        // Calculate time until next tick
        let timeout = tick_duration
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        // Handle input
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.kind {
                    KeyEventKind::Press => match key.code {
                        // Always allow quit
                        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => break,
                        // Always allow pause/unpause toggle
                        KeyCode::Char('p') | KeyCode::Char('P') => {
                            game.toggle_pause();
                        }
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            game.restart();
                        }
                        // Only process game controls when playing
                        _ if game.state == GameState::Playing => match key.code {
                            KeyCode::Left => {
                                if release_events {
                                    game.shift_start(ShiftDirection::Left);
                                } else {
                                    game.move_x(-1);
                                }
                            }
                            KeyCode::Right => {
                                if release_events {
                                    game.shift_start(ShiftDirection::Right);
                                } else {
                                    game.move_x(1);
                                }
                            }
                            KeyCode::Down => {
                                if release_events {
                                    game.soft_drop_start();
                                } else {
                                    game.move_y(1);
                                }
                            }
                            KeyCode::Up | KeyCode::Char('x') | KeyCode::Char('X') => {
                                game.rotate(1);
                            }
                            KeyCode::Char('z') | KeyCode::Char('Z') => {
                                game.rotate(-1);
                            }
                            KeyCode::Char('a') | KeyCode::Char('A') => {
                                game.rotate(2);
                            }
                            KeyCode::Char('c') | KeyCode::Char('C') => {
                                game.hold();
                            }
                            KeyCode::Char(' ') => {
                                game.hard_drop();
                            }
                            _ => {}
                        },
                        _ => {}
                    },
                    KeyEventKind::Release => match key.code {
                        KeyCode::Left => game.shift_stop(ShiftDirection::Left),
                        KeyCode::Right => game.shift_stop(ShiftDirection::Right),
                        KeyCode::Down => game.soft_drop_stop(),
                        _ => {}
                    },
                    _ => {}
                }
            }
        }

        // Update game state
        if last_tick.elapsed() >= tick_duration {
            game.tick();
            last_tick = Instant::now();
        }

        // Persist a beaten high score as soon as the game ends
        for event in game.take_events() {
            if event == GameEvent::GameOver && game.score > high_score {
                high_score = game.score;
                save_high_score(high_score);
            }
        }
    }

    // Restore terminal
    if release_events {
        stdout().execute(PopKeyboardEnhancementFlags)?;
    }
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
