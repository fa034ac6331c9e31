//! Character-cell render surface for terminals.
//!
//! Exposes a virtual pixel grid (`CELL_W` × `CELL_H` pixels per character) so
//! graph geometry keeps its pixel margins; drawing snaps to cells.

use crate::graph::{RenderSurface, TextAnchor};
use crossterm::cursor::MoveTo;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use crossterm::queue;
use std::io::{self, Write};

pub const CELL_W: f64 = 4.0;
pub const CELL_H: f64 = 8.0;

const TRACE: char = '*';

pub struct CharCanvas {
    cols: usize,
    rows: usize,
    cells: Vec<char>,
}

impl CharCanvas {
    pub fn new(cols: usize, rows: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            cols,
            rows,
            cells: vec![' '; cols * rows],
        }
    }

    /// Canvas filling the current terminal, leaving `reserved_rows` for text below it.
    pub fn fit_terminal(reserved_rows: u16) -> io::Result<Self> {
        let (cols, rows) = crossterm::terminal::size()?;
        Ok(Self::new(cols as usize, rows.saturating_sub(reserved_rows) as usize))
    }

    fn cell(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let col = (x / CELL_W).floor();
        let row = (y / CELL_H).floor();
        if col < 0.0 || row < 0.0 || col >= self.cols as f64 || row >= self.rows as f64 {
            return None;
        }
        Some((col as usize, row as usize))
    }

    fn put(&mut self, col: i64, row: i64, ch: char) {
        if col >= 0 && row >= 0 && (col as usize) < self.cols && (row as usize) < self.rows {
            self.cells[row as usize * self.cols + col as usize] = ch;
        }
    }

    pub fn get(&self, col: usize, row: usize) -> Option<char> {
        (col < self.cols && row < self.rows).then(|| self.cells[row * self.cols + col])
    }

    fn line(&mut self, from: (i64, i64), to: (i64, i64)) {
        let (mut x0, mut y0) = from;
        let (x1, y1) = to;
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.put(x0, y0, TRACE);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    pub fn to_lines(&self) -> Vec<String> {
        self.cells
            .chunks(self.cols)
            .map(|row| row.iter().collect::<String>().trim_end().to_string())
            .collect()
    }

    /// Draw the canvas at the top-left of the terminal.
    pub fn present<W: Write>(&self, out: &mut W) -> io::Result<()> {
        queue!(out, MoveTo(0, 0), Clear(ClearType::All))?;
        for (row, line) in self.to_lines().iter().enumerate() {
            queue!(out, MoveTo(0, row as u16), Print(line))?;
        }
        queue!(out, MoveTo(0, self.rows as u16))?;
        out.flush()
    }
}

impl RenderSurface for CharCanvas {
    fn size(&self) -> (f64, f64) {
        (self.cols as f64 * CELL_W, self.rows as f64 * CELL_H)
    }

    fn clear(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = ' ');
    }

    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        // Rects are axis bars here: one cell thick along their short side.
        if w < h {
            let col = ((x + w / 2.0) / CELL_W).floor() as i64;
            let r0 = (y / CELL_H).floor() as i64;
            let r1 = ((y + h) / CELL_H).floor() as i64;
            for row in r0..r1.max(r0 + 1) {
                self.put(col, row, '│');
            }
        } else {
            let row = ((y + h / 2.0) / CELL_H).floor() as i64;
            let c0 = (x / CELL_W).floor() as i64;
            let c1 = ((x + w) / CELL_W).floor() as i64;
            for col in c0..c1.max(c0 + 1) {
                self.put(col, row, '─');
            }
        }
    }

    fn text(&mut self, x: f64, y: f64, text: &str, anchor: TextAnchor) {
        let Some((col, row)) = self.cell(x, y) else {
            return;
        };
        let len = text.chars().count() as i64;
        let start = match anchor {
            TextAnchor::Left => col as i64,
            TextAnchor::Center => col as i64 - len / 2,
            TextAnchor::Right => col as i64 - len + 1,
        };
        for (i, ch) in text.chars().enumerate() {
            self.put(start + i as i64, row as i64, ch);
        }
    }

    fn stroke_path(&mut self, points: &[(f64, f64)]) {
        let to_cell = |(x, y): (f64, f64)| ((x / CELL_W).floor() as i64, (y / CELL_H).floor() as i64);
        for pair in points.windows(2) {
            self.line(to_cell(pair[0]), to_cell(pair[1]));
        }
    }
}
