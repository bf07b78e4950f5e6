use std::collections::VecDeque;

use rand::seq::SliceRandom;

use crate::config::{GameConfig, TimingConfig};

// ============================================================================
// Configuration
// ============================================================================

pub const GRID_WIDTH: usize = 10;
pub const GRID_HEIGHT: usize = 20;
pub const QUEUE_LENGTH: usize = 5;
pub const BAG_SIZE: usize = 7;

/// Nominal tick rate the timing tables are tuned for.
pub const TICKS_PER_SECOND: u32 = 60;
pub const LINES_PER_LEVEL: u32 = 10;

// Scoring (multiplied by the current level)
pub const SCORE_SINGLE: u32 = 100;
pub const SCORE_DOUBLE: u32 = 300;
pub const SCORE_TRIPLE: u32 = 500;
pub const SCORE_TETRIS: u32 = 800;

// ============================================================================
// Types
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Position {
    pub x: i16,
    pub y: i16,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PieceKind {
    I,
    J,
    L,
    O,
    S,
    T,
    Z,
}

impl PieceKind {
    pub const ALL: [PieceKind; BAG_SIZE] = [
        PieceKind::I,
        PieceKind::J,
        PieceKind::L,
        PieceKind::O,
        PieceKind::S,
        PieceKind::T,
        PieceKind::Z,
    ];

    /// Index into the config data tables (I=0 .. Z=6).
    pub fn index(self) -> usize {
        self as usize
    }

    /// Box origin at spawn. The I piece spawns one column left and one row
    /// up so its cells line up with the other six kinds.
    pub fn spawn_position(self) -> Position {
        match self {
            PieceKind::I => Position { x: 2, y: 0 },
            _ => Position { x: 3, y: 1 },
        }
    }
}

/// The currently falling piece: kind, rotation state, and the board
/// coordinates of its 5x5 box origin.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ActivePiece {
    pub kind: PieceKind,
    pub rotation: usize,
    pub x: i16,
    pub y: i16,
}

impl ActivePiece {
    pub fn spawn(kind: PieceKind) -> Self {
        let Position { x, y } = kind.spawn_position();
        Self {
            kind,
            rotation: 0,
            x,
            y,
        }
    }

    pub fn at(kind: PieceKind, x: i16, y: i16) -> Self {
        Self {
            kind,
            rotation: 0,
            x,
            y,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CellState {
    Empty,
    Filled(PieceKind),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GameState {
    Playing,
    Paused,
    GameOver,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ShiftDirection {
    Left,
    Right,
}

impl ShiftDirection {
    fn dx(self) -> i16 {
        match self {
            ShiftDirection::Left => -1,
            ShiftDirection::Right => 1,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum GameEvent {
    PieceMoved,
    PieceRotated,
    PieceHeld,
    PieceLocked,
    LinesCleared(u32),
    LevelUp(u32),
    Paused,
    Unpaused,
    GameRestarted,
    GameOver,
}

// ============================================================================
// Bag Generator Trait
// ============================================================================

/// Source of shuffled 7-piece bags for the next-piece queue.
pub trait BagGenerator: Send {
    fn next_bag(&mut self) -> [PieceKind; BAG_SIZE];
}

struct ShuffleBagGenerator;

impl BagGenerator for ShuffleBagGenerator {
    fn next_bag(&mut self) -> [PieceKind; BAG_SIZE] {
        let mut bag = PieceKind::ALL;
        bag.shuffle(&mut rand::thread_rng());
        bag
    }
}

/// Deals bags from a fixed repeating sequence; deterministic, for tests and
/// scripted demos.
pub struct SequenceBagGenerator {
    pieces: Vec<PieceKind>,
    index: usize,
}

impl SequenceBagGenerator {
    pub fn new(pieces: Vec<PieceKind>) -> Self {
        Self { pieces, index: 0 }
    }
}

impl BagGenerator for SequenceBagGenerator {
    fn next_bag(&mut self) -> [PieceKind; BAG_SIZE] {
        let mut bag = [PieceKind::I; BAG_SIZE];
        for slot in &mut bag {
            *slot = self.pieces[self.index % self.pieces.len()];
            self.index += 1;
        }
        bag
    }
}

// ============================================================================
// Game
// ============================================================================

pub struct Game {
    pub grid: Vec<Vec<CellState>>,
    pub current_piece: Option<ActivePiece>,
    pub queue: VecDeque<PieceKind>,
    pub held_piece: Option<PieceKind>,
    pub score: u32,
    pub lines_cleared: u32,
    pub level: u32,
    pub state: GameState,
    config: GameConfig,
    bag: Box<dyn BagGenerator>,
    events: Vec<GameEvent>,
    ghost_y: Option<i16>,
    hold_used: bool,
    dropping_hard: bool,
    dropping_soft: bool,
    lock_delay: bool,
    lock_delay_ticks_left: u32,
    move_reset_counter: u32,
    gravity_ticks: u32,
    left_held_ticks: u32,
    right_held_ticks: u32,
}

// ============================================================================
// Game Logic
// ============================================================================

impl Game {
    pub fn new(config: GameConfig) -> Self {
        Self::with_bag(config, Box::new(ShuffleBagGenerator))
    }

    pub fn with_bag(config: GameConfig, bag: Box<dyn BagGenerator>) -> Self {
        let mut game = Self {
            grid: vec![vec![CellState::Empty; GRID_WIDTH]; GRID_HEIGHT],
            current_piece: None,
            queue: VecDeque::new(),
            held_piece: None,
            score: 0,
            lines_cleared: 0,
            level: 0,
            state: GameState::Playing,
            config,
            bag,
            events: Vec::new(),
            ghost_y: None,
            hold_used: false,
            dropping_hard: false,
            dropping_soft: false,
            lock_delay: false,
            lock_delay_ticks_left: 0,
            move_reset_counter: 0,
            gravity_ticks: 0,
            left_held_ticks: 0,
            right_held_ticks: 0,
        };
        game.refill_queue();
        game.advance_queue();
        game
    }

    /// Construct a game over a prepared grid with a specific active piece.
    pub fn with_grid(config: GameConfig, grid: Vec<Vec<CellState>>, piece: ActivePiece) -> Self {
        let mut game = Self::with_bag(config, Box::new(ShuffleBagGenerator));
        game.grid = grid;
        game.current_piece = Some(piece);
        game.refresh_ghost();
        game
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    fn timing(&self) -> TimingConfig {
        self.config.timing
    }

    // ------------------------------------------------------------------
    // Collision
    // ------------------------------------------------------------------

    /// The single placement oracle: true if any occupied cell of the figure
    /// at (x, y, rotation) falls outside the matrix or on a filled cell.
    pub fn intersects(&self, x: i16, y: i16, rotation: usize, kind: PieceKind) -> bool {
        for cell in self.config.figure(kind.index(), rotation) {
            let row = y + (cell / 5) as i16;
            let col = x + (cell % 5) as i16;
            if row < 0 || row >= GRID_HEIGHT as i16 || col < 0 || col >= GRID_WIDTH as i16 {
                return true;
            }
            if self.grid[row as usize][col as usize] != CellState::Empty {
                return true;
            }
        }
        false
    }

    /// True if the placement itself is clear but the row below is not, i.e.
    /// the piece is resting on the stack or the floor.
    pub fn can_place(&self, x: i16, y: i16, rotation: usize, kind: PieceKind) -> bool {
        !self.intersects(x, y, rotation, kind) && self.intersects(x, y + 1, rotation, kind)
    }

    /// Board cells occupied by a piece.
    pub fn piece_cells(&self, piece: &ActivePiece) -> Vec<Position> {
        self.config
            .figure(piece.kind.index(), piece.rotation)
            .iter()
            .map(|&cell| Position {
                x: piece.x + (cell % 5) as i16,
                y: piece.y + (cell / 5) as i16,
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Movement
    // ------------------------------------------------------------------

    /// Lateral movement: all-or-nothing, no kicks.
    pub fn move_x(&mut self, dx: i16) -> bool {
        if self.state != GameState::Playing {
            return false;
        }
        let Some(piece) = self.current_piece else {
            return false;
        };
        if self.intersects(piece.x + dx, piece.y, piece.rotation, piece.kind) {
            return false;
        }
        self.current_piece = Some(ActivePiece {
            x: piece.x + dx,
            ..piece
        });
        self.refresh_ghost();
        self.events.push(GameEvent::PieceMoved);
        true
    }

    /// Vertical movement. A blocked destination is pulled back one row at a
    /// time toward zero, so multi-row drops land on the stack instead of
    /// failing. Landing interacts with the lock-delay state machine.
    pub fn move_y(&mut self, dy: i16) -> bool {
        if self.state != GameState::Playing {
            return false;
        }
        let Some(piece) = self.current_piece else {
            return false;
        };

        if !self.intersects(piece.x, piece.y + dy, piece.rotation, piece.kind) {
            // Unobstructed: just advance.
            self.current_piece = Some(ActivePiece {
                y: piece.y + dy,
                ..piece
            });
            self.refresh_ghost();
            self.events.push(GameEvent::PieceMoved);
            if self.lock_delay && dy > 0 {
                self.reset_lock_delay();
            }
            return true;
        }

        let mut dy = dy;
        while self.intersects(piece.x, piece.y + dy, piece.rotation, piece.kind) {
            if dy > 0 {
                dy -= 1;
            } else if dy < 0 {
                dy += 1;
            } else {
                break;
            }
        }
        let moved = dy != 0;
        self.current_piece = Some(ActivePiece {
            y: piece.y + dy,
            ..piece
        });
        self.refresh_ghost();
        if moved {
            self.events.push(GameEvent::PieceMoved);
        }

        if self.should_lock() {
            self.lock_and_spawn();
        } else if !self.lock_delay {
            self.lock_delay = true;
            self.lock_delay_ticks_left = self.timing().lock_delay_ticks;
            self.move_reset_counter = 0;
        } else if moved && dy > 0 {
            self.reset_lock_delay();
        }
        moved
    }

    /// Landing locks immediately when hard-dropping or once the lock-delay
    /// extensions are used up; otherwise the lock-delay window decides.
    fn should_lock(&self) -> bool {
        self.dropping_hard || self.move_reset_counter >= self.timing().move_reset_limit
    }

    /// Extend the lock-delay window, bounded by the move-reset limit.
    fn reset_lock_delay(&mut self) {
        if self.move_reset_counter < self.timing().move_reset_limit {
            self.move_reset_counter += 1;
            self.lock_delay_ticks_left = self.timing().lock_delay_ticks;
        }
    }

    // ------------------------------------------------------------------
    // Rotation
    // ------------------------------------------------------------------

    /// Rotate the active piece by `distance` quarter turns (-1 ccw, +1 cw,
    /// +2 half turn), trying each kick candidate in table order. Fails
    /// silently when every candidate collides.
    pub fn rotate(&mut self, distance: i8) -> bool {
        if self.state != GameState::Playing {
            return false;
        }
        let piece = self.current_piece.expect("active piece does not exist");
        let target = (piece.rotation as i8 + distance).rem_euclid(4) as usize;

        for (dx, dy) in self
            .config
            .kick_candidates(piece.kind.index(), piece.rotation, target)
        {
            // Offset-table y is up-positive, board y is down-positive.
            let (x, y) = (piece.x + dx, piece.y - dy);
            if !self.intersects(x, y, target, piece.kind) {
                self.current_piece = Some(ActivePiece {
                    rotation: target,
                    x,
                    y,
                    ..piece
                });
                self.refresh_ghost();
                if self.lock_delay {
                    self.reset_lock_delay();
                }
                self.events.push(GameEvent::PieceRotated);
                return true;
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Lock, Clear, Score
    // ------------------------------------------------------------------

    /// Write the active piece into the matrix. Only valid while the piece is
    /// resting on something; returns false otherwise.
    fn lock_piece(&mut self) -> bool {
        let piece = self.current_piece.expect("active piece does not exist");
        if !self.can_place(piece.x, piece.y, piece.rotation, piece.kind) {
            return false;
        }
        for block in self.piece_cells(&piece) {
            self.grid[block.y as usize][block.x as usize] = CellState::Filled(piece.kind);
        }
        self.current_piece = None;
        self.dropping_hard = false;
        self.lock_delay = false;
        self.move_reset_counter = 0;
        self.events.push(GameEvent::PieceLocked);
        true
    }

    fn lock_and_spawn(&mut self) {
        if !self.lock_piece() {
            return;
        }
        let lines = self.clear_lines();
        self.add_score(lines);
        self.advance_queue();
    }

    /// Collapse full rows in a single top-to-bottom pass. Rows shifted into
    /// an already-scanned position are not re-examined, and the bottom row
    /// is excluded from the scan.
    pub fn clear_lines(&mut self) -> u32 {
        let mut cleared = 0;
        for row in 0..GRID_HEIGHT - 1 {
            if self.grid[row].iter().all(|cell| *cell != CellState::Empty) {
                cleared += 1;
                for shift in (1..=row).rev() {
                    let above = self.grid[shift - 1].clone();
                    self.grid[shift] = above;
                }
                self.grid[0] = vec![CellState::Empty; GRID_WIDTH];
            }
        }
        if cleared > 0 {
            self.events.push(GameEvent::LinesCleared(cleared));
        }
        cleared
    }

    pub fn add_score(&mut self, lines: u32) {
        let base = match lines {
            1 => SCORE_SINGLE,
            2 => SCORE_DOUBLE,
            3 => SCORE_TRIPLE,
            4 => SCORE_TETRIS,
            _ => 0,
        };
        self.score += base * self.level;
        self.lines_cleared += lines;

        // The level is derived from lines cleared, never stepped on its own.
        let new_level = self.lines_cleared / LINES_PER_LEVEL;
        if new_level > self.level {
            self.events.push(GameEvent::LevelUp(new_level));
        }
        self.level = new_level;
    }

    // ------------------------------------------------------------------
    // Queue, Spawn, Hold
    // ------------------------------------------------------------------

    /// Consume the queue head and spawn it. Calling this while a piece is
    /// still active is a caller bug.
    pub fn advance_queue(&mut self) {
        assert!(self.current_piece.is_none(), "active piece already exists");
        let kind = self.queue.pop_front().expect("next-piece queue is empty");
        self.refill_queue();
        self.hold_used = false;
        self.spawn_piece(kind);
    }

    fn refill_queue(&mut self) {
        if self.queue.len() < QUEUE_LENGTH {
            self.queue.extend(self.bag.next_bag());
        }
    }

    fn spawn_piece(&mut self, kind: PieceKind) {
        let piece = ActivePiece::spawn(kind);
        self.current_piece = Some(piece);
        self.lock_delay = false;
        self.move_reset_counter = 0;

        // A spawn position overlapping the stack is a top-out.
        if self.intersects(piece.x, piece.y, piece.rotation, piece.kind) {
            self.ghost_y = Some(piece.y);
            self.state = GameState::GameOver;
            self.events.push(GameEvent::GameOver);
        } else {
            self.refresh_ghost();
        }
    }

    /// Swap the active piece with the hold slot (or the queue head when the
    /// slot is empty). Usable once per piece lifetime.
    pub fn hold(&mut self) -> bool {
        if self.state != GameState::Playing || self.hold_used {
            return false;
        }
        let Some(piece) = self.current_piece else {
            return false;
        };

        self.current_piece = None;
        match self.held_piece.take() {
            Some(kind) => self.spawn_piece(kind),
            None => self.advance_queue(),
        }
        self.held_piece = Some(piece.kind);
        self.hold_used = true;
        self.events.push(GameEvent::PieceHeld);
        true
    }

    // ------------------------------------------------------------------
    // Drops
    // ------------------------------------------------------------------

    pub fn hard_drop(&mut self) -> bool {
        if self.state != GameState::Playing || self.current_piece.is_none() {
            return false;
        }
        self.dropping_hard = true;
        self.dropping_soft = false;
        while self.dropping_hard {
            self.move_y(1);
        }
        // Collapse the intermediate per-row move events from the drop.
        self.events.retain(|e| *e != GameEvent::PieceMoved);
        true
    }

    pub fn soft_drop_start(&mut self) -> bool {
        if self.state != GameState::Playing {
            return false;
        }
        self.dropping_soft = true;
        true
    }

    pub fn soft_drop_stop(&mut self) {
        self.dropping_soft = false;
    }

    // ------------------------------------------------------------------
    // Auto-shift input
    // ------------------------------------------------------------------

    /// Direction key pressed: move once immediately and start the held
    /// counter; `tick` takes over auto-repeat from there.
    pub fn shift_start(&mut self, direction: ShiftDirection) -> bool {
        match direction {
            ShiftDirection::Left => self.left_held_ticks = 1,
            ShiftDirection::Right => self.right_held_ticks = 1,
        }
        self.move_x(direction.dx())
    }

    /// Direction key released: a held counter of 0 means "not held".
    pub fn shift_stop(&mut self, direction: ShiftDirection) {
        match direction {
            ShiftDirection::Left => self.left_held_ticks = 0,
            ShiftDirection::Right => self.right_held_ticks = 0,
        }
    }

    fn handle_auto_shift(&mut self) {
        let TimingConfig {
            das_delay_ticks,
            das_repeat_ticks,
            ..
        } = self.timing();
        let (left, right) = (self.left_held_ticks, self.right_held_ticks);
        let left_passed_delay = left > das_delay_ticks;
        let right_passed_delay = right > das_delay_ticks;
        let left_on_rate = left > 0 && left % das_repeat_ticks == 0;
        let right_on_rate = right > 0 && right % das_repeat_ticks == 0;

        if !(left_on_rate || right_on_rate) {
            return;
        }

        if left_passed_delay && !right_passed_delay {
            if left_on_rate {
                self.move_x(-1);
            }
        } else if right_passed_delay && !left_passed_delay {
            if right_on_rate {
                self.move_x(1);
            }
        } else if left_passed_delay && right_passed_delay {
            // The more recently pressed direction wins; an exact tie goes
            // right. The winner still only moves on its own rate multiples.
            if right <= left {
                if right_on_rate {
                    self.move_x(1);
                }
            } else if left_on_rate {
                self.move_x(-1);
            }
        }
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance all timing state by one fixed-rate tick: held-key counters,
    /// the lock-delay countdown, gravity, then auto-shift.
    pub fn tick(&mut self) {
        if self.state != GameState::Playing {
            return;
        }

        if self.left_held_ticks > 0 {
            self.left_held_ticks += 1;
        }
        if self.right_held_ticks > 0 {
            self.right_held_ticks += 1;
        }

        if self.lock_delay {
            self.lock_delay_ticks_left = self.lock_delay_ticks_left.saturating_sub(1);
            if self.lock_delay_ticks_left == 0 {
                self.lock_delay = false;
                if let Some(piece) = self.current_piece {
                    if self.intersects(piece.x, piece.y + 1, piece.rotation, piece.kind) {
                        self.lock_and_spawn();
                    }
                }
            }
        }
        if self.state != GameState::Playing {
            return;
        }

        let step = self.config.gravity_for(self.level);
        let every = if self.dropping_soft {
            (step.every_ticks / self.timing().soft_drop_divisor).max(1)
        } else {
            step.every_ticks
        };
        self.gravity_ticks += 1;
        if self.gravity_ticks >= every {
            self.gravity_ticks = 0;
            self.move_y(step.rows);
        }
        if self.state != GameState::Playing {
            return;
        }

        self.handle_auto_shift();
    }

    // ------------------------------------------------------------------
    // Ghost
    // ------------------------------------------------------------------

    /// Row the active piece would rest on if dropped straight down.
    pub fn find_ghost_y(&self) -> i16 {
        let piece = self.current_piece.expect("active piece does not exist");
        let mut ghost_y = piece.y;
        while !self.intersects(piece.x, ghost_y + 1, piece.rotation, piece.kind) {
            ghost_y += 1;
        }
        ghost_y
    }

    fn refresh_ghost(&mut self) {
        self.ghost_y = self.current_piece.map(|_| self.find_ghost_y());
    }

    /// Cached ghost row; derived state, refreshed on every piece change.
    pub fn ghost_y(&self) -> Option<i16> {
        self.ghost_y
    }

    /// Board cells of the ghost outline.
    pub fn ghost_cells(&self) -> Vec<Position> {
        match (self.current_piece, self.ghost_y) {
            (Some(piece), Some(y)) => self.piece_cells(&ActivePiece { y, ..piece }),
            _ => Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn toggle_pause(&mut self) {
        match self.state {
            GameState::Playing => {
                self.state = GameState::Paused;
                self.events.push(GameEvent::Paused);
            }
            GameState::Paused => {
                self.state = GameState::Playing;
                self.events.push(GameEvent::Unpaused);
            }
            GameState::GameOver => {
                // Cannot pause when game is over
            }
        }
    }

    pub fn restart(&mut self) {
        self.grid = vec![vec![CellState::Empty; GRID_WIDTH]; GRID_HEIGHT];
        self.score = 0;
        self.lines_cleared = 0;
        self.level = 0;
        self.held_piece = None;
        self.hold_used = false;
        self.dropping_hard = false;
        self.dropping_soft = false;
        self.lock_delay = false;
        self.lock_delay_ticks_left = 0;
        self.move_reset_counter = 0;
        self.gravity_ticks = 0;
        self.left_held_ticks = 0;
        self.right_held_ticks = 0;
        self.state = GameState::Playing;
        self.events.clear();
        self.queue.clear();
        self.current_piece = None;

        self.refill_queue();
        self.advance_queue();
        self.events.push(GameEvent::GameRestarted);
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Returns the visual grid state with the current piece overlaid
    pub fn render_grid(&self) -> Vec<Vec<CellState>> {
        let mut visual_grid = self.grid.clone();
        if let Some(piece) = self.current_piece {
            for block in self.piece_cells(&piece) {
                if block.y >= 0
                    && block.y < GRID_HEIGHT as i16
                    && block.x >= 0
                    && block.x < GRID_WIDTH as i16
                {
                    visual_grid[block.y as usize][block.x as usize] =
                        CellState::Filled(piece.kind);
                }
            }
        }
        visual_grid
    }

    /// Takes and clears all pending events
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Check if a specific row is complete (all filled)
    pub fn is_row_complete(&self, y: usize) -> bool {
        self.grid[y].iter().all(|cell| *cell != CellState::Empty)
    }

    /// Count filled cells in a row
    pub fn filled_count_in_row(&self, y: usize) -> usize {
        self.grid[y]
            .iter()
            .filter(|cell| **cell != CellState::Empty)
            .count()
    }

    /// Check if game is over
    pub fn is_game_over(&self) -> bool {
        self.state == GameState::GameOver
    }

    /// Count total filled cells in grid
    pub fn total_filled_cells(&self) -> usize {
        self.grid
            .iter()
            .flatten()
            .filter(|cell| **cell != CellState::Empty)
            .count()
    }

    pub fn hold_used(&self) -> bool {
        self.hold_used
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new(GameConfig::default())
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

pub mod test_helpers {
    use super::*;

    pub fn empty_grid() -> Vec<Vec<CellState>> {
        vec![vec![CellState::Empty; GRID_WIDTH]; GRID_HEIGHT]
    }

    pub fn fill_row(grid: &mut Vec<Vec<CellState>>, y: usize) {
        for x in 0..GRID_WIDTH {
            grid[y][x] = CellState::Filled(PieceKind::T);
        }
    }

    pub fn fill_row_with_gap(grid: &mut Vec<Vec<CellState>>, y: usize, gap_x: usize) {
        for x in 0..GRID_WIDTH {
            if x != gap_x {
                grid[y][x] = CellState::Filled(PieceKind::T);
            }
        }
    }
}
