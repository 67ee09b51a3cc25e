//! This module contains the definition of the job placed on processor memory
use getset::CopyGetters;
use std::io::{self, Write};

/// A unit of work occupying `size` contiguous memory units while `remaining_time` is positive.
/// `id` is only unique inside a single processor (or a single priority of the waiting area).
#[derive(Debug, Clone, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct Job {
    id: i32,
    size: usize,
    remaining_time: i32,
    offset: Option<usize>,
}

impl Job {
    pub fn new(id: i32, size: usize, remaining_time: i32) -> Self {
        assert!(size > 0, "Job {} must occupy memory. size: {}", id, size);
        assert!(
            remaining_time >= 0,
            "Job {} cannot start with a negative time. remaining_time: {}",
            id,
            remaining_time
        );
        Self {
            id,
            size,
            remaining_time,
            offset: None,
        }
    }

    pub fn is_placed(&self) -> bool {
        self.offset.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.remaining_time <= 0
    }

    pub(crate) fn place_at(&mut self, offset: usize) {
        self.offset = Some(offset);
    }

    pub(crate) fn advance(&mut self, time: i32) {
        self.remaining_time -= time;
    }

    /// `<id> <size> <remaining_time>`
    pub fn write_line<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{} {} {}", self.id, self.size, self.remaining_time)
    }

    /// `<offset> <id> <size> <remaining_time>`
    pub fn write_placed_line<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let offset = self
            .offset
            .unwrap_or_else(|| panic!("Job {} has not been placed", self.id));
        write!(out, "{} ", offset)?;
        self.write_line(out)
    }
}
